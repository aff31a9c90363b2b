use askama::Template;
use axum::extract::State;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use chrono::{Duration, Utc};
use serde::Deserialize;

use crate::accounts::guest;
use crate::accounts::phase::PhaseEvent;
use crate::accounts::session::{CurrentUser, Session};
use crate::accounts::{users, AccountError, LOGIN_URL};
use crate::boards::handlers::BOARD_LIST_URL;
use crate::db::models::Board;
use crate::error::AppResult;
use crate::routes::home::Html;
use crate::state::AppState;

// -- Templates --

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub user: Option<CurrentUser>,
    pub username: String,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/signup.html")]
pub struct SignupTemplate {
    pub user: Option<CurrentUser>,
    pub username: String,
    pub errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "pages/profile.html")]
pub struct ProfileTemplate {
    pub user: Option<CurrentUser>,
    pub profile: CurrentUser,
    pub boards: Vec<Board>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
}

/// A guest heading into login or signup is signed out first, and auto-guest
/// stays off for a short while so the form can be used.
fn evict_guest(state: &AppState, session: &Session) {
    if session.user().is_some_and(|u| u.is_guest()) {
        let until = Utc::now() + Duration::seconds(state.config.auth.login_suspend_secs);
        session.clear_identity();
        session.apply(PhaseEvent::GuestEvicted { until });
        tracing::debug!("Guest signed out for login");
    }
}

// -- Login / logout --

/// GET /accounts/login/
pub async fn login_page(State(state): State<AppState>, session: Session) -> AppResult<Response> {
    evict_guest(&state, &session);
    Ok(Html(LoginTemplate {
        user: session.user(),
        username: String::new(),
        error: None,
    })
    .into_response())
}

/// POST /accounts/login/
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    evict_guest(&state, &session);
    let username = form.username.trim();

    match users::authenticate(&state.db, username, &form.password)? {
        Some(user) => {
            session.login(CurrentUser::from(&user));
            session.apply(PhaseEvent::LoggedIn);
            tracing::info!(user_id = user.id, "User logged in");
            Ok(Redirect::to(BOARD_LIST_URL).into_response())
        }
        None => {
            let until = Utc::now() + Duration::seconds(state.config.auth.login_suspend_secs);
            session.apply(PhaseEvent::LoginFailed { until });
            tracing::debug!(username, "Login failed");
            Ok(Html(LoginTemplate {
                user: session.user(),
                username: username.to_string(),
                error: Some("Please enter a correct username and password.".into()),
            })
            .into_response())
        }
    }
}

/// GET|POST /accounts/logout/: the next page may mint a fresh guest
pub async fn logout(session: Session) -> Response {
    if let Some(user) = session.user() {
        tracing::info!(user_id = user.id, "User logged out");
    }
    session.clear_identity();
    session.apply(PhaseEvent::LoggedOut);
    Redirect::to("/").into_response()
}

// -- Signup --

/// GET /accounts/signup/
pub async fn signup_page(State(state): State<AppState>, session: Session) -> AppResult<Response> {
    evict_guest(&state, &session);
    Ok(Html(SignupTemplate {
        user: session.user(),
        username: String::new(),
        errors: Vec::new(),
    })
    .into_response())
}

/// POST /accounts/signup/
pub async fn signup(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<SignupForm>,
) -> AppResult<Response> {
    evict_guest(&state, &session);
    let username = form.username.trim();

    let mut errors = users::validate_signup(
        username,
        &form.password1,
        &form.password2,
        &state.config.guest.username_prefix,
    );

    if errors.is_empty() {
        match users::create_registered(
            &state.db,
            username,
            &form.password1,
            false,
            state.config.auth.bcrypt_cost,
        ) {
            Ok(user) => {
                session.login(CurrentUser::from(&user));
                session.apply(PhaseEvent::LoggedIn);
                return Ok(Redirect::to(BOARD_LIST_URL).into_response());
            }
            Err(AccountError::UsernameTaken(_)) => {
                errors.push("A user with that username already exists.".to_string());
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(Html(SignupTemplate {
        user: session.user(),
        username: username.to_string(),
        errors,
    })
    .into_response())
}

// -- Guest --

/// POST /accounts/guest-login/
pub async fn guest_login(State(state): State<AppState>, session: Session) -> AppResult<Response> {
    if session.user().is_some_and(|u| u.is_guest()) {
        return Ok(Redirect::to(BOARD_LIST_URL).into_response());
    }

    let user = guest::provision_guest(
        state.db.clone(),
        state.config.guest.clone(),
        state.config.auth.bcrypt_cost,
        Utc::now(),
    )
    .await?;
    session.login(CurrentUser::from(&user));
    session.apply(PhaseEvent::GuestProvisioned);
    Ok(Redirect::to(BOARD_LIST_URL).into_response())
}

// -- Profile --

/// GET /accounts/profile/: boards the user created, newest first
pub async fn profile(State(state): State<AppState>, session: Session) -> AppResult<Response> {
    let Some(profile) = session.user() else {
        return Ok(Redirect::to(LOGIN_URL).into_response());
    };
    let boards = state.boards.boards_by_creator(profile.id).await?;

    Ok(Html(ProfileTemplate {
        user: Some(profile.clone()),
        profile,
        boards,
    })
    .into_response())
}
