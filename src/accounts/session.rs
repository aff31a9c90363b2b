use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::accounts::phase::{PhaseEvent, SessionPhase};
use crate::accounts::AccountError;
use crate::db::models::{AccountKind, User};
use crate::state::DbPool;

/// The identity a session is logged in as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub kind: AccountKind,
    pub is_superuser: bool,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            kind: user.kind,
            is_superuser: user.is_superuser,
        }
    }
}

impl CurrentUser {
    pub fn is_guest(&self) -> bool {
        self.kind == AccountKind::Guest
    }
}

/// Server-side session data for one browser.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub id: String,
    pub token: String,
    pub user: Option<CurrentUser>,
    pub phase: SessionPhase,
    pub liked_posts: Vec<i64>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    dirty: bool,
    cookie_pending: bool,
}

impl SessionState {
    /// A brand-new session that has not been stored or sent to the browser yet.
    pub fn fresh(now: DateTime<Utc>, lifetime_hours: u64) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            token: generate_token(),
            user: None,
            phase: SessionPhase::Fresh,
            liked_posts: Vec::new(),
            expires_at: now + Duration::hours(lifetime_hours as i64),
            created_at: now,
            dirty: false,
            cookie_pending: true,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The browser does not hold the current token yet.
    pub fn cookie_pending(&self) -> bool {
        self.cookie_pending
    }

    pub fn apply(&mut self, event: PhaseEvent) {
        let next = self.phase.on(event);
        if next != self.phase {
            self.phase = next;
            self.dirty = true;
        }
    }

    /// Attach an identity. The token is rotated so a pre-login token cannot be replayed.
    pub fn login(&mut self, user: CurrentUser) {
        self.user = Some(user);
        self.rotate_token();
    }

    /// Drop the identity, keeping the rest of the session.
    pub fn clear_identity(&mut self) {
        if self.user.take().is_some() {
            self.rotate_token();
        }
    }

    pub fn has_liked(&self, post_id: i64) -> bool {
        self.liked_posts.contains(&post_id)
    }

    pub fn record_like(&mut self, post_id: i64) {
        if !self.has_liked(post_id) {
            self.liked_posts.push(post_id);
            self.dirty = true;
        }
    }

    fn rotate_token(&mut self) {
        self.token = generate_token();
        self.cookie_pending = true;
        self.dirty = true;
    }

    fn mark_saved(&mut self) {
        self.dirty = false;
    }
}

/// Shared handle to the request's session, placed in request extensions by the
/// session layer.
#[derive(Debug, Clone)]
pub struct Session(Arc<Mutex<SessionState>>);

impl Session {
    pub fn new(state: SessionState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn user(&self) -> Option<CurrentUser> {
        self.lock().user.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().phase
    }

    pub fn id(&self) -> String {
        self.lock().id.clone()
    }

    pub fn token(&self) -> String {
        self.lock().token.clone()
    }

    pub fn login(&self, user: CurrentUser) {
        self.lock().login(user);
    }

    pub fn clear_identity(&self) {
        self.lock().clear_identity();
    }

    pub fn apply(&self, event: PhaseEvent) {
        self.lock().apply(event);
    }

    pub fn has_liked(&self, post_id: i64) -> bool {
        self.lock().has_liked(post_id)
    }

    pub fn record_like(&self, post_id: i64) {
        self.lock().record_like(post_id);
    }

    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    pub fn mark_saved(&self) {
        self.lock().mark_saved();
    }
}

/// Load a live session by token. Expired or unknown tokens yield `None`.
pub fn load_session(
    pool: &DbPool,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<SessionState>, AccountError> {
    let conn = pool.get()?;
    let row = conn
        .query_row(
            "SELECT s.id, s.token, s.phase, s.liked_posts, s.expires_at, s.created_at, \
                    u.id, u.username, u.kind, u.is_superuser \
             FROM sessions s LEFT JOIN users u ON u.id = s.user_id \
             WHERE s.token = ?1 AND s.expires_at > ?2",
            params![token, now],
            |row| {
                let user_id: Option<i64> = row.get(6)?;
                let user = match user_id {
                    Some(id) => Some(CurrentUser {
                        id,
                        username: row.get(7)?,
                        kind: row.get(8)?,
                        is_superuser: row.get(9)?,
                    }),
                    None => None,
                };
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, DateTime<Utc>>(4)?,
                    row.get::<_, DateTime<Utc>>(5)?,
                    user,
                ))
            },
        )
        .optional()?;

    let Some((id, token, phase_json, liked_json, expires_at, created_at, user)) = row else {
        return Ok(None);
    };

    let phase: SessionPhase = serde_json::from_str(&phase_json).unwrap_or_else(|e| {
        tracing::warn!(session_id = %id, "Unreadable session phase, resetting: {}", e);
        SessionPhase::Fresh
    });
    let liked_posts = parse_likes(&liked_json);

    let mut state = SessionState {
        id,
        token,
        user,
        phase,
        liked_posts,
        expires_at,
        created_at,
        dirty: false,
        cookie_pending: false,
    };
    if state.user.is_none() {
        state.apply(PhaseEvent::IdentityLost);
    }
    Ok(Some(state))
}

fn parse_likes(json: &str) -> Vec<i64> {
    serde_json::from_str(json).unwrap_or_default()
}

fn merge_likes(stored: Vec<i64>, extra: &[i64]) -> Vec<i64> {
    let mut liked = stored;
    for id in extra {
        if !liked.contains(id) {
            liked.push(*id);
        }
    }
    liked
}

/// Insert or update a session row. Liked notes are merged with what is
/// already stored, so overlapping requests from one browser never drop a like.
pub fn save_session(pool: &DbPool, state: &SessionState) -> Result<(), AccountError> {
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let stored: Option<String> = tx
        .query_row(
            "SELECT liked_posts FROM sessions WHERE id = ?1",
            params![state.id],
            |row| row.get(0),
        )
        .optional()?;
    let liked = merge_likes(stored.as_deref().map(parse_likes).unwrap_or_default(), &state.liked_posts);

    let phase = serde_json::to_string(&state.phase).unwrap_or_else(|_| "{\"phase\":\"fresh\"}".into());
    let liked = serde_json::to_string(&liked).unwrap_or_else(|_| "[]".into());

    tx.execute(
        "INSERT INTO sessions (id, token, user_id, phase, liked_posts, expires_at, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
         ON CONFLICT(id) DO UPDATE SET \
           token = excluded.token, \
           user_id = excluded.user_id, \
           phase = excluded.phase, \
           liked_posts = excluded.liked_posts, \
           expires_at = excluded.expires_at",
        params![
            state.id,
            state.token,
            state.user.as_ref().map(|u| u.id),
            phase,
            liked,
            state.expires_at,
            state.created_at,
        ],
    )?;
    tx.commit()?;
    Ok(())
}

/// Atomically add `post_id` to a stored session's likes. Returns `false` when
/// the session already holds it. A session with no stored row yet has
/// nothing to conflict with and gets `true`.
pub fn claim_like(pool: &DbPool, session_id: &str, post_id: i64) -> Result<bool, AccountError> {
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let stored: Option<String> = tx
        .query_row(
            "SELECT liked_posts FROM sessions WHERE id = ?1",
            params![session_id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(stored) = stored else {
        return Ok(true);
    };

    let liked = parse_likes(&stored);
    if liked.contains(&post_id) {
        return Ok(false);
    }
    let liked = serde_json::to_string(&merge_likes(liked, &[post_id])).unwrap_or_else(|_| "[]".into());
    tx.execute(
        "UPDATE sessions SET liked_posts = ?1 WHERE id = ?2",
        params![liked, session_id],
    )?;
    tx.commit()?;
    Ok(true)
}

/// Remove sessions past their expiry. Returns how many were deleted.
pub fn purge_expired(pool: &DbPool, now: DateTime<Utc>) -> Result<usize, AccountError> {
    let conn = pool.get()?;
    let deleted = conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])?;
    Ok(deleted)
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// -- Cookie helpers --

pub fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

pub fn get_cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name {
                Some(val)
            } else {
                None
            }
        })
}
