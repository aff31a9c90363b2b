use axum::extract::{Request, State};
use axum::http::{header, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;

use crate::accounts::guest::{self, GuestDecision, RequestInfo};
use crate::accounts::phase::PhaseEvent;
use crate::accounts::session::{self, CurrentUser, Session, SessionState};
use crate::state::AppState;

pub fn is_ajax(headers: &axum::http::HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
}

/// Load (or start) the browser session, run the auto-guest policy, hand the
/// session to the handler, then persist it and issue the cookie if needed.
pub async fn session_layer(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let now = Utc::now();
    let auth = &state.config.auth;

    let loaded = match session::get_cookie_value(req.headers(), &auth.cookie_name) {
        Some(token) => session::load_session(&state.db, token, now).unwrap_or_else(|e| {
            tracing::warn!("Failed to load session, starting a new one: {}", e);
            None
        }),
        None => None,
    };
    let mut current = loaded.unwrap_or_else(|| SessionState::fresh(now, auth.session_hours));

    let info = RequestInfo {
        path: req.uri().path(),
        is_ajax: is_ajax(req.headers()),
    };
    let decision = guest::evaluate(&state.config.guest, info, current.user.as_ref(), current.phase, now);
    match decision {
        GuestDecision::Rearm => current.apply(PhaseEvent::AuthPageVisited),
        GuestDecision::Mint => {
            let minted = guest::provision_guest(
                state.db.clone(),
                state.config.guest.clone(),
                auth.bcrypt_cost,
                now,
            )
            .await;
            match minted {
                Ok(user) => {
                    current.login(CurrentUser::from(&user));
                    current.apply(PhaseEvent::GuestProvisioned);
                }
                Err(e) => tracing::warn!(path = %info.path, "Auto-guest provisioning failed: {}", e),
            }
        }
        GuestDecision::Skip(reason) => {
            tracing::trace!(path = %info.path, ?reason, "No auto-guest");
        }
    }

    let handle = Session::new(current);
    req.extensions_mut().insert(handle.clone());

    let mut response = next.run(req).await;

    let finished = handle.snapshot();
    if !finished.is_dirty() {
        return response;
    }
    if let Err(e) = session::save_session(&state.db, &finished) {
        tracing::error!(session_id = %finished.id, "Failed to save session: {}", e);
        return response;
    }
    handle.mark_saved();

    if finished.cookie_pending() {
        let cookie = session::session_cookie(&auth.cookie_name, &finished.token, auth.session_hours);
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::error!("Invalid session cookie header: {}", e),
        }
    }
    response
}
