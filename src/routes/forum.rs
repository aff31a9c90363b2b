use axum::routing::{get, post};
use axum::Router;

use crate::forum::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/forum/", get(handlers::post_list))
        .route("/forum/create/", get(handlers::create_page).post(handlers::create))
        .route(
            "/forum/{id}/",
            get(handlers::post_detail).post(handlers::comment_create),
        )
        .route(
            "/forum/{id}/update/",
            get(handlers::update_page).post(handlers::update),
        )
        .route(
            "/forum/{id}/delete/",
            get(handlers::delete_page).post(handlers::delete),
        )
        .route("/forum/{id}/like/", post(handlers::like))
        .route("/forum/comment/{id}/delete/", post(handlers::comment_delete))
}
