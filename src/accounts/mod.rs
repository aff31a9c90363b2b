pub mod guest;
pub mod handlers;
pub mod middleware;
pub mod phase;
pub mod reaper;
pub mod session;
pub mod users;

use thiserror::Error;

pub use phase::{PhaseEvent, SessionPhase};
pub use session::Session;

pub const LOGIN_URL: &str = "/accounts/login/";

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Database error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("The username {0} is already taken")]
    UsernameTaken(String),

    #[error("No free guest username after {0} attempts")]
    GuestNamesExhausted(u32),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AccountError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, AccountError::UsernameTaken(_))
    }
}

/// True when an INSERT lost to the `UNIQUE(username)` constraint.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
