use std::collections::HashMap;

use axum::extract::{FromRequest, FromRequestParts, Multipart, Request};
use axum::http::header;
use axum::http::request::Parts;
use axum::Form;

use crate::accounts::middleware::is_ajax;
use crate::accounts::session::{CurrentUser, Session};
use crate::error::AppError;
use crate::media::Upload;
use crate::state::AppState;

impl CurrentUser {
    /// Owners and superusers may change or delete a record.
    pub fn may_modify(&self, owner_id: i64) -> bool {
        self.is_superuser || self.id == owner_id
    }

    pub fn ensure_can_modify(&self, owner_id: i64, what: &str) -> Result<(), AppError> {
        if self.may_modify(owner_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "You do not have permission to modify this {what}."
            )))
        }
    }
}

/// The request's session, installed by the session layer.
impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal("Session layer not installed".into()))
    }
}

/// Extractor that requires authentication.
/// Returns 401 if the session holds no identity. Guests count as authenticated.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        session.user().ok_or(AppError::Unauthorized)
    }
}

/// Optional user extractor, `None` instead of 401 when not authenticated.
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        Ok(MaybeUser(session.user()))
    }
}

/// Whether the client sent `X-Requested-With: XMLHttpRequest`.
pub struct IsAjax(pub bool);

impl<S: Send + Sync> FromRequestParts<S> for IsAjax {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(IsAjax(is_ajax(&parts.headers)))
    }
}

/// Form body that may arrive as multipart or urlencoded. Text fields and file
/// parts are split apart; empty file parts are dropped.
#[derive(Debug, Default)]
pub struct FormPayload {
    fields: HashMap<String, String>,
    files: HashMap<String, Upload>,
}

impl FormPayload {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn take_file(&mut self, name: &str) -> Option<Upload> {
        self.files.remove(name)
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            files: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn with_file(mut self, name: &str, upload: Upload) -> Self {
        self.files.insert(name.to_string(), upload);
        self
    }
}

impl<S: Send + Sync> FromRequest<S> for FormPayload {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if !is_multipart {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            return Ok(FormPayload {
                fields: pairs.into_iter().collect(),
                files: HashMap::new(),
            });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        let mut payload = FormPayload::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?
        {
            let Some(name) = field.name().map(String::from) else {
                continue;
            };
            match field.file_name().map(String::from) {
                Some(file_name) => {
                    let content_type = field.content_type().map(String::from);
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(e.body_text()))?;
                    if file_name.is_empty() || data.is_empty() {
                        continue;
                    }
                    payload.files.insert(
                        name,
                        Upload {
                            file_name,
                            content_type,
                            data,
                        },
                    );
                }
                None => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(e.body_text()))?;
                    payload.fields.insert(name, value);
                }
            }
        }

        Ok(payload)
    }
}
