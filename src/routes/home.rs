use askama::Template;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::accounts::session::CurrentUser;
use crate::error::AppResult;
use crate::extractors::MaybeUser;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/landing.html")]
pub struct LandingTemplate {
    pub user: Option<CurrentUser>,
    pub board_count: i64,
    pub note_count: i64,
}

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

pub async fn index(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let board_count: i64 =
        conn.query_row("SELECT COUNT(*) FROM boards WHERE is_public = 1", [], |row| row.get(0))?;
    let note_count: i64 = conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;

    Ok(Html(LandingTemplate {
        user,
        board_count,
        note_count,
    })
    .into_response())
}
