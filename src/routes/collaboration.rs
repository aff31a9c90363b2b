use axum::routing::{get, post};
use axum::Router;

use crate::boards::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/collaboration/", get(handlers::board_list))
        .route("/collaboration/gallery/", get(handlers::gallery))
        .route("/collaboration/board/{id}/", get(handlers::board_detail))
        .route(
            "/collaboration/board/create/",
            get(handlers::board_create_page).post(handlers::board_create),
        )
        .route("/collaboration/board/{id}/delete/", post(handlers::board_delete))
        .route("/collaboration/post/create/", post(handlers::post_create))
        .route("/collaboration/post/{id}/update/", post(handlers::post_update))
        .route("/collaboration/post/{id}/delete/", post(handlers::post_delete))
        .route("/collaboration/post/{id}/feedback/", post(handlers::post_feedback))
        .route(
            "/collaboration/post/{id}/comment/create/",
            post(handlers::comment_create),
        )
        .route("/collaboration/comment/{id}/delete/", post(handlers::comment_delete))
}
