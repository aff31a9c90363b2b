use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::accounts::{is_unique_violation, AccountError};
use crate::db::models::{AccountKind, User};
use crate::state::DbPool;

const USER_COLUMNS: &str = "id, username, password_hash, kind, is_superuser, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        kind: row.get(3)?,
        is_superuser: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Insert a user row. A clash on the username surfaces as `UsernameTaken`.
pub(crate) fn insert_user(
    conn: &rusqlite::Connection,
    username: &str,
    password_hash: &str,
    kind: AccountKind,
    is_superuser: bool,
    now: DateTime<Utc>,
) -> Result<User, AccountError> {
    conn.execute(
        "INSERT INTO users (username, password_hash, kind, is_superuser, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![username, password_hash, kind, is_superuser, now],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AccountError::UsernameTaken(username.to_string())
        } else {
            AccountError::Sql(e)
        }
    })?;

    Ok(User {
        id: conn.last_insert_rowid(),
        username: username.to_string(),
        password_hash: password_hash.to_string(),
        kind,
        is_superuser,
        created_at: now,
    })
}

pub fn create_registered(
    pool: &DbPool,
    username: &str,
    password: &str,
    is_superuser: bool,
    bcrypt_cost: u32,
) -> Result<User, AccountError> {
    let hash = bcrypt::hash(password, bcrypt_cost)?;
    let conn = pool.get()?;
    let user = insert_user(
        &conn,
        username,
        &hash,
        AccountKind::Registered,
        is_superuser,
        Utc::now(),
    )?;
    tracing::info!(user_id = user.id, username, is_superuser, "Registered account created");
    Ok(user)
}

pub fn find_by_id(pool: &DbPool, id: i64) -> Result<Option<User>, AccountError> {
    let conn = pool.get()?;
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn find_by_username(pool: &DbPool, username: &str) -> Result<Option<User>, AccountError> {
    let conn = pool.get()?;
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            params![username],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

/// Check a username/password pair. Guests never authenticate by password:
/// theirs is random and was never shown to anyone.
pub fn authenticate(
    pool: &DbPool,
    username: &str,
    password: &str,
) -> Result<Option<User>, AccountError> {
    let Some(user) = find_by_username(pool, username)? else {
        return Ok(None);
    };
    if user.is_guest() {
        return Ok(None);
    }
    let valid = bcrypt::verify(password, &user.password_hash).unwrap_or(false);
    Ok(valid.then_some(user))
}

/// Signup form rules. Returns every problem found, not just the first.
pub fn validate_signup(
    username: &str,
    password: &str,
    password_confirm: &str,
    guest_prefix: &str,
) -> Vec<String> {
    let mut errors = Vec::new();

    if username.is_empty() || username.chars().count() > 150 {
        errors.push("Username must be between 1 and 150 characters.".to_string());
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "@.+-_".contains(c))
    {
        errors.push("Username may only contain letters, digits and @/./+/-/_.".to_string());
    }
    if !guest_prefix.is_empty()
        && username
            .to_lowercase()
            .starts_with(&guest_prefix.to_lowercase())
    {
        errors.push(format!(
            "Usernames starting with {guest_prefix} are reserved for guests."
        ));
    }
    if password.chars().count() < 8 {
        errors.push("Password must be at least 8 characters.".to_string());
    }
    if password != password_confirm {
        errors.push("The two password fields didn't match.".to_string());
    }

    errors
}
