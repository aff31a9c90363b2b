// Guest accounts: the per-request provisioning policy and the minting loop
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rusqlite::params;

use crate::accounts::phase::SessionPhase;
use crate::accounts::session::CurrentUser;
use crate::accounts::users::insert_user;
use crate::accounts::AccountError;
use crate::config::GuestConfig;
use crate::db::models::{AccountKind, User};
use crate::state::DbPool;

/// What the session layer should do with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestDecision {
    /// Provision a guest and log it into the session
    Mint,
    /// Login or signup page: reset the phase so a later page can mint again
    Rearm,
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Registered,
    Excluded,
    Authenticated,
    Suppressed,
    NotAutoPath,
}

/// The parts of a request the policy looks at.
#[derive(Debug, Clone, Copy)]
pub struct RequestInfo<'a> {
    pub path: &'a str,
    pub is_ajax: bool,
}

/// Decide whether this request provisions a guest. Rules apply in order; the
/// first one that matches wins.
pub fn evaluate(
    cfg: &GuestConfig,
    req: RequestInfo<'_>,
    user: Option<&CurrentUser>,
    phase: SessionPhase,
    now: DateTime<Utc>,
) -> GuestDecision {
    if user.is_some_and(|u| !u.is_guest()) {
        return GuestDecision::Skip(SkipReason::Registered);
    }
    if req.path == cfg.login_path || req.path == cfg.signup_path {
        return GuestDecision::Rearm;
    }
    if req.is_ajax || cfg.excluded_paths.iter().any(|p| req.path.starts_with(p.as_str())) {
        return GuestDecision::Skip(SkipReason::Excluded);
    }
    if user.is_some() {
        return GuestDecision::Skip(SkipReason::Authenticated);
    }
    if !phase.allows_auto_guest(now) {
        return GuestDecision::Skip(SkipReason::Suppressed);
    }
    if !cfg.auto_paths.is_empty() && !cfg.auto_paths.iter().any(|p| auto_path_matches(p, req.path)) {
        return GuestDecision::Skip(SkipReason::NotAutoPath);
    }
    GuestDecision::Mint
}

/// `/` only matches the site root; any other entry matches as a prefix.
fn auto_path_matches(entry: &str, path: &str) -> bool {
    if entry == "/" {
        path == "/"
    } else {
        path.starts_with(entry)
    }
}

pub fn guest_username(prefix: &str, digits: usize) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..digits)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect();
    format!("{prefix}{suffix}")
}

pub fn random_password(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Create a guest account with a fresh random name.
pub fn mint_guest(
    pool: &DbPool,
    cfg: &GuestConfig,
    bcrypt_cost: u32,
    now: DateTime<Utc>,
) -> Result<User, AccountError> {
    mint_guest_with(pool, cfg, bcrypt_cost, now, || {
        guest_username(&cfg.username_prefix, cfg.suffix_digits)
    })
}

/// `mint_guest` on the blocking pool, for callers on the async runtime.
pub async fn provision_guest(
    pool: DbPool,
    cfg: GuestConfig,
    bcrypt_cost: u32,
    now: DateTime<Utc>,
) -> Result<User, AccountError> {
    tokio::task::spawn_blocking(move || mint_guest(&pool, &cfg, bcrypt_cost, now)).await?
}

/// Minting loop with a pluggable name source. A name is regenerated when it
/// already exists or when a concurrent insert claimed it first.
pub fn mint_guest_with(
    pool: &DbPool,
    cfg: &GuestConfig,
    bcrypt_cost: u32,
    now: DateTime<Utc>,
    mut next_name: impl FnMut() -> String,
) -> Result<User, AccountError> {
    let hash = bcrypt::hash(random_password(cfg.password_length), bcrypt_cost)?;
    let conn = pool.get()?;

    for attempt in 1..=cfg.max_mint_attempts {
        let username = next_name();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
            params![username],
            |row| row.get(0),
        )?;
        if exists {
            tracing::debug!(attempt, %username, "Guest name taken, regenerating");
            continue;
        }

        match insert_user(&conn, &username, &hash, AccountKind::Guest, false, now) {
            Ok(user) => {
                tracing::info!(user_id = user.id, username = %user.username, "Guest account created");
                return Ok(user);
            }
            Err(AccountError::UsernameTaken(_)) => {
                tracing::debug!(attempt, %username, "Lost guest name race, regenerating");
            }
            Err(e) => return Err(e),
        }
    }

    Err(AccountError::GuestNamesExhausted(cfg.max_mint_attempts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::Duration;

    fn cfg() -> GuestConfig {
        GuestConfig::default()
    }

    fn req(path: &str) -> RequestInfo<'_> {
        RequestInfo { path, is_ajax: false }
    }

    fn guest() -> CurrentUser {
        CurrentUser {
            id: 7,
            username: "Guest_000001".into(),
            kind: AccountKind::Guest,
            is_superuser: false,
        }
    }

    fn registered() -> CurrentUser {
        CurrentUser {
            id: 8,
            username: "alice".into(),
            kind: AccountKind::Registered,
            is_superuser: false,
        }
    }

    #[test]
    fn anonymous_visitor_on_allowed_path_gets_a_guest() {
        let now = Utc::now();
        for path in ["/", "/collaboration/", "/collaboration/board/3/", "/forum/?page=2"] {
            assert_eq!(
                evaluate(&cfg(), req(path), None, SessionPhase::Fresh, now),
                GuestDecision::Mint,
                "{path}"
            );
        }
    }

    #[test]
    fn root_entry_does_not_match_everything() {
        let decision = evaluate(&cfg(), req("/somewhere/else/"), None, SessionPhase::Fresh, Utc::now());
        assert_eq!(decision, GuestDecision::Skip(SkipReason::NotAutoPath));
    }

    #[test]
    fn empty_allow_list_means_everywhere() {
        let mut cfg = cfg();
        cfg.auto_paths.clear();
        let decision = evaluate(&cfg, req("/somewhere/"), None, SessionPhase::Fresh, Utc::now());
        assert_eq!(decision, GuestDecision::Mint);
    }

    #[test]
    fn registered_users_are_left_alone_even_on_login_page() {
        let user = registered();
        let decision = evaluate(&cfg(), req("/accounts/login/"), Some(&user), SessionPhase::Fresh, Utc::now());
        assert_eq!(decision, GuestDecision::Skip(SkipReason::Registered));
    }

    #[test]
    fn auth_pages_rearm() {
        let user = guest();
        let now = Utc::now();
        assert_eq!(
            evaluate(&cfg(), req("/accounts/signup/"), None, SessionPhase::GuestActive, now),
            GuestDecision::Rearm
        );
        assert_eq!(
            evaluate(&cfg(), req("/accounts/login/"), Some(&user), SessionPhase::GuestActive, now),
            GuestDecision::Rearm
        );
    }

    #[test]
    fn excluded_paths_and_ajax_skip() {
        let now = Utc::now();
        for path in ["/static/css/app.css", "/media/posts/x.png", "/accounts/logout/", "/admin/"] {
            assert_eq!(
                evaluate(&cfg(), req(path), None, SessionPhase::Fresh, now),
                GuestDecision::Skip(SkipReason::Excluded),
                "{path}"
            );
        }
        let ajax = RequestInfo { path: "/collaboration/", is_ajax: true };
        assert_eq!(
            evaluate(&cfg(), ajax, None, SessionPhase::Fresh, now),
            GuestDecision::Skip(SkipReason::Excluded)
        );
    }

    #[test]
    fn existing_guest_is_not_replaced() {
        let user = guest();
        let decision = evaluate(&cfg(), req("/forum/"), Some(&user), SessionPhase::Fresh, Utc::now());
        assert_eq!(decision, GuestDecision::Skip(SkipReason::Authenticated));
    }

    #[test]
    fn suppressed_phase_skips_until_expiry() {
        let now = Utc::now();
        let phase = SessionPhase::LoggingIn { until: now + Duration::seconds(300) };
        assert_eq!(
            evaluate(&cfg(), req("/"), None, phase, now),
            GuestDecision::Skip(SkipReason::Suppressed)
        );
        assert_eq!(
            evaluate(&cfg(), req("/"), None, phase, now + Duration::seconds(301)),
            GuestDecision::Mint
        );
        assert_eq!(
            evaluate(&cfg(), req("/"), None, SessionPhase::GuestActive, now),
            GuestDecision::Skip(SkipReason::Suppressed)
        );
    }

    #[test]
    fn generated_names_and_passwords_have_expected_shape() {
        let name = guest_username("Guest_", 6);
        assert!(name.starts_with("Guest_"));
        assert_eq!(name.len(), 12);
        assert!(name["Guest_".len()..].chars().all(|c| c.is_ascii_digit()));

        let pw = random_password(12);
        assert_eq!(pw.len(), 12);
        assert!(pw.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn mint_creates_guest_kind_user() {
        let pool = test_pool();
        let user = mint_guest(&pool, &cfg(), 4, Utc::now()).unwrap();
        assert!(user.is_guest());
        assert!(user.username.starts_with("Guest_"));
        assert!(!user.is_superuser);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn provisioning_leaves_the_runtime_free() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let pool = test_pool();
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = tokio::spawn({
            let ticks = ticks.clone();
            async move {
                loop {
                    ticks.fetch_add(1, Ordering::Relaxed);
                    tokio::task::yield_now().await;
                }
            }
        });

        let user = provision_guest(pool.clone(), cfg(), 8, Utc::now()).await.unwrap();
        ticker.abort();

        assert!(user.is_guest());
        assert!(ticks.load(Ordering::Relaxed) > 0, "other tasks ran while the guest was minted");
    }

    #[test]
    fn mint_regenerates_on_collision() {
        let pool = test_pool();
        let now = Utc::now();
        {
            let conn = pool.get().unwrap();
            insert_user(&conn, "Guest_111111", "x", AccountKind::Guest, false, now).unwrap();
        }

        let mut names = vec!["Guest_222222", "Guest_111111"];
        let user = mint_guest_with(&pool, &cfg(), 4, now, || names.pop().unwrap().to_string()).unwrap();
        assert_eq!(user.username, "Guest_222222");
    }

    #[test]
    fn mint_gives_up_after_bounded_attempts() {
        let pool = test_pool();
        let now = Utc::now();
        {
            let conn = pool.get().unwrap();
            insert_user(&conn, "Guest_000000", "x", AccountKind::Guest, false, now).unwrap();
        }
        let mut cfg = cfg();
        cfg.max_mint_attempts = 3;

        let mut calls = 0;
        let err = mint_guest_with(&pool, &cfg, 4, now, || {
            calls += 1;
            "Guest_000000".to_string()
        })
        .unwrap_err();
        assert!(matches!(err, AccountError::GuestNamesExhausted(3)));
        assert_eq!(calls, 3);
    }
}
