// Session phase - pure state machine for the auto-guest lifecycle
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a browser session stands with respect to automatic guest accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionPhase {
    /// Nothing provisioned yet, or re-armed by a visit to login/signup
    #[default]
    Fresh,

    /// A guest has been minted for this session; no further minting
    GuestActive,

    /// On its way through login or signup; auto-guest held off until `until`
    LoggingIn { until: DateTime<Utc> },

    /// Explicitly logged out; a new guest may be minted straight away
    JustLoggedOut,
}

/// Things that move a session between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    AuthPageVisited,
    GuestProvisioned,
    GuestEvicted { until: DateTime<Utc> },
    LoginFailed { until: DateTime<Utc> },
    LoggedOut,
    LoggedIn,
    /// The session's guest row disappeared (reaped or deleted)
    IdentityLost,
}

impl SessionPhase {
    pub fn on(self, event: PhaseEvent) -> SessionPhase {
        match (self, event) {
            (_, PhaseEvent::AuthPageVisited) => SessionPhase::Fresh,
            (_, PhaseEvent::GuestProvisioned) => SessionPhase::GuestActive,
            (_, PhaseEvent::GuestEvicted { until }) => SessionPhase::LoggingIn { until },
            (_, PhaseEvent::LoginFailed { until }) => SessionPhase::LoggingIn { until },
            (_, PhaseEvent::LoggedOut) => SessionPhase::JustLoggedOut,
            (_, PhaseEvent::LoggedIn) => SessionPhase::Fresh,
            (SessionPhase::GuestActive, PhaseEvent::IdentityLost) => SessionPhase::Fresh,
            (phase, PhaseEvent::IdentityLost) => phase,
        }
    }

    pub fn allows_auto_guest(&self, now: DateTime<Utc>) -> bool {
        match self {
            SessionPhase::Fresh | SessionPhase::JustLoggedOut => true,
            SessionPhase::GuestActive => false,
            SessionPhase::LoggingIn { until } => now >= *until,
        }
    }
}
