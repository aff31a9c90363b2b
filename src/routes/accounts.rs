use axum::routing::{get, post};
use axum::Router;

use crate::accounts::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/accounts/login/", get(handlers::login_page).post(handlers::login))
        .route("/accounts/signup/", get(handlers::signup_page).post(handlers::signup))
        .route("/accounts/logout/", get(handlers::logout).post(handlers::logout))
        .route("/accounts/guest-login/", post(handlers::guest_login))
        .route("/accounts/profile/", get(handlers::profile))
}
