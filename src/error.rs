use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::accounts::{AccountError, LOGIN_URL};
use crate::boards::domain::PostInputError;
use crate::db::RepositoryError;
use crate::media::MediaError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    /// No identity on the session; the client should send the user to log in.
    #[error("Login required")]
    Unauthorized,

    /// An identity is present but may not touch the resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn internal(kind: &str, detail: &dyn std::fmt::Display) -> (StatusCode, String) {
    tracing::error!("{}: {}", kind, detail);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Unauthorized => {
                let body = serde_json::json!({
                    "success": false,
                    "message": "login_required",
                    "login_url": LOGIN_URL,
                });
                return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Account(e) if e.is_client_error() => (StatusCode::BAD_REQUEST, e.to_string()),
            AppError::Media(e) if e.is_client_error() => (StatusCode::BAD_REQUEST, e.to_string()),
            AppError::Account(e) => internal("Account error", e),
            AppError::Media(e) => internal("Media error", e),
            AppError::Repository(e) => internal("Repository error", e),
            AppError::Database(e) => internal("Database error", e),
            AppError::Pool(e) => internal("Pool error", e),
            AppError::Internal(msg) => internal("Internal error", msg),
            AppError::Json(e) => internal("JSON error", e),
        };

        let body = serde_json::json!({ "success": false, "message": message });
        (status, Json(body)).into_response()
    }
}

impl From<PostInputError> for AppError {
    fn from(e: PostInputError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
