// Guest reaper - removes expired guest accounts and everything they own
use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use thiserror::Error;

use crate::accounts::AccountError;
use crate::db::models::AccountKind;
use crate::state::DbPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReapReport {
    pub deleted: usize,
    pub cutoff: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ReapError {
    #[error("Could not list expired guests: {0}")]
    Scan(#[from] AccountError),

    #[error("Failed to delete guest {username} (id {user_id}) after removing {deleted}: {source}")]
    Delete {
        user_id: i64,
        username: String,
        deleted: usize,
        #[source]
        source: rusqlite::Error,
    },
}

/// Delete every guest created strictly before `now - retention`. Each guest
/// goes in its own transaction: notes, then boards, then the account. The first
/// failure stops the run.
pub fn reap_expired_guests(
    pool: &DbPool,
    retention: Duration,
    now: DateTime<Utc>,
) -> Result<ReapReport, ReapError> {
    let cutoff = now - retention;
    let mut conn = pool.get().map_err(AccountError::from)?;

    let expired: Vec<(i64, String)> = {
        let mut stmt = conn
            .prepare(
                "SELECT id, username FROM users WHERE kind = ?1 AND created_at < ?2 ORDER BY id",
            )
            .map_err(AccountError::from)?;
        let rows = stmt
            .query_map(params![AccountKind::Guest, cutoff], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(AccountError::from)?;
        rows.collect::<Result<_, _>>().map_err(AccountError::from)?
    };

    let mut deleted = 0;
    for (user_id, username) in expired {
        let result = (|| -> rusqlite::Result<()> {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM posts WHERE user_id = ?1", params![user_id])?;
            tx.execute("DELETE FROM boards WHERE creator_id = ?1", params![user_id])?;
            tx.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
            tx.commit()
        })();

        if let Err(source) = result {
            tracing::error!(user_id, %username, deleted, "Guest reap failed: {}", source);
            return Err(ReapError::Delete {
                user_id,
                username,
                deleted,
                source,
            });
        }
        tracing::debug!(user_id, %username, "Guest reaped");
        deleted += 1;
    }

    tracing::info!(deleted, %cutoff, "Guest reap complete");
    Ok(ReapReport { deleted, cutoff })
}
