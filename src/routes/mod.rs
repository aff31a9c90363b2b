pub mod accounts;
pub mod assets;
pub mod collaboration;
pub mod forum;
pub mod home;

use axum::extract::{DefaultBodyLimit, Request};
use axum::http::{header, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::accounts::middleware::session_layer;
use crate::state::AppState;

/// The full application router with the session layer applied.
pub fn app(state: AppState) -> Router {
    let media_prefix = state.config.storage.media_url.trim_end_matches('/').to_string();
    let body_limit = state.config.storage.max_upload_bytes;
    let media = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(middleware::from_fn(download_attachments))
        .service(ServeDir::new(state.config.uploads_path()));

    Router::new()
        .route("/", get(home::index))
        .route("/static/{*path}", get(assets::serve))
        .merge(accounts::router())
        .merge(collaboration::router())
        .merge(forum::router())
        .nest_service(&media_prefix, media)
        .layer(middleware::from_fn_with_state(state.clone(), session_layer))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Attached files are always downloaded, never rendered in the page's origin.
async fn download_attachments(req: Request, next: Next) -> Response {
    let attachment = req.uri().path().starts_with("/files/");
    let mut response = next.run(req).await;
    if attachment {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, HeaderValue::from_static("attachment"));
    }
    response
}
