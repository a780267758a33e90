//! Session phases and the immutable snapshots published to observers.

use super::models::{AuthSession, AuthUser, ProviderSession};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Instant};

/// Phase of the progressive authentication flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    Idle,
    Authenticating,
    Enhancing,
    Ready,
    Degraded,
    Error,
}

impl AuthPhase {
    /// Whether the machine may move from `self` to `next`.
    ///
    /// Within one sign-in attempt phases only move forward; retry and
    /// continue are the only ways back from `Degraded`/`Error`, and any
    /// phase may drop to `Idle` on sign-out.
    pub fn can_transition_to(self, next: AuthPhase) -> bool {
        use AuthPhase::*;
        match (self, next) {
            (_, Idle) => true,
            (Idle, Authenticating) => true,
            (Authenticating, Enhancing | Error) => true,
            (Enhancing, Ready | Degraded | Error) => true,
            (Degraded, Enhancing | Ready) => true,
            (Error, Authenticating | Enhancing | Ready) => true,
            _ => false,
        }
    }

    /// Phases in which a decision about the user would be premature
    pub fn is_pending(self) -> bool {
        matches!(self, AuthPhase::Authenticating | AuthPhase::Enhancing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuthPhase::Idle => "idle",
            AuthPhase::Authenticating => "authenticating",
            AuthPhase::Enhancing => "enhancing",
            AuthPhase::Ready => "ready",
            AuthPhase::Degraded => "degraded",
            AuthPhase::Error => "error",
        }
    }
}

impl fmt::Display for AuthPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable state owned by the session manager
#[derive(Debug)]
pub(crate) struct SessionState {
    pub phase: AuthPhase,
    /// Identity and tokens from the provider; held from sign-in until sign-out
    pub identity: Option<ProviderSession>,
    /// Resolved application session; absent until enhancement settles
    pub session: Option<AuthSession>,
    pub profile_enhancement_failed: bool,
    pub basic_mode_accepted: bool,
    pub last_error: Option<String>,
    /// Incremented for every sign-in, retry, cancellation and sign-out so
    /// that results of superseded attempts can be discarded.
    pub attempt: u64,
    pub initialized: bool,
    pub phase_entered_at: Instant,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: AuthPhase::Idle,
            identity: None,
            session: None,
            profile_enhancement_failed: false,
            basic_mode_accepted: false,
            last_error: None,
            attempt: 0,
            initialized: false,
            phase_entered_at: Instant::now(),
        }
    }

    /// Drop everything tied to the signed-in user
    pub fn clear(&mut self) {
        self.phase = AuthPhase::Idle;
        self.identity = None;
        self.session = None;
        self.profile_enhancement_failed = false;
        self.basic_mode_accepted = false;
        self.last_error = None;
        self.attempt += 1;
        self.initialized = true;
        self.phase_entered_at = Instant::now();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            user: self.session.as_ref().map(|s| s.user.clone()),
            session_expires_at: self.identity.as_ref().map(|s| s.expires_at),
            has_identity: self.identity.is_some(),
            profile_enhancement_failed: self.profile_enhancement_failed,
            basic_mode_accepted: self.basic_mode_accepted,
            last_error: self.last_error.clone(),
            attempt: self.attempt,
            initialized: self.initialized,
            phase_entered_at: self.phase_entered_at,
        }
    }
}

/// Read-only view of the session published after every change
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub phase: AuthPhase,
    pub user: Option<AuthUser>,
    pub session_expires_at: Option<DateTime<Utc>>,
    /// Provider session held, even if no user could be resolved
    pub has_identity: bool,
    pub profile_enhancement_failed: bool,
    pub basic_mode_accepted: bool,
    pub last_error: Option<String>,
    pub attempt: u64,
    pub initialized: bool,
    pub phase_entered_at: Instant,
}

impl SessionSnapshot {
    /// Snapshot of a machine that has not resolved its stored session yet
    pub fn uninitialized() -> Self {
        SessionState::new().snapshot()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && matches!(self.phase, AuthPhase::Ready | AuthPhase::Degraded)
    }

    /// The guard must not decide anything while this is true
    pub fn is_loading(&self) -> bool {
        !self.initialized || self.phase.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [AuthPhase; 6] = [
        AuthPhase::Idle,
        AuthPhase::Authenticating,
        AuthPhase::Enhancing,
        AuthPhase::Ready,
        AuthPhase::Degraded,
        AuthPhase::Error,
    ];

    #[test]
    fn test_every_phase_can_sign_out() {
        for phase in ALL {
            assert!(phase.can_transition_to(AuthPhase::Idle), "{phase} -> idle");
        }
    }

    #[test]
    fn test_happy_path_is_legal() {
        assert!(AuthPhase::Idle.can_transition_to(AuthPhase::Authenticating));
        assert!(AuthPhase::Authenticating.can_transition_to(AuthPhase::Enhancing));
        assert!(AuthPhase::Enhancing.can_transition_to(AuthPhase::Ready));
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        assert!(!AuthPhase::Idle.can_transition_to(AuthPhase::Ready));
        assert!(!AuthPhase::Idle.can_transition_to(AuthPhase::Enhancing));
        assert!(!AuthPhase::Authenticating.can_transition_to(AuthPhase::Ready));
        assert!(!AuthPhase::Ready.can_transition_to(AuthPhase::Enhancing));
        assert!(!AuthPhase::Ready.can_transition_to(AuthPhase::Authenticating));
        assert!(!AuthPhase::Enhancing.can_transition_to(AuthPhase::Authenticating));
    }

    #[test]
    fn test_recovery_edges() {
        assert!(AuthPhase::Degraded.can_transition_to(AuthPhase::Enhancing));
        assert!(AuthPhase::Degraded.can_transition_to(AuthPhase::Ready));
        assert!(AuthPhase::Error.can_transition_to(AuthPhase::Enhancing));
        assert!(AuthPhase::Error.can_transition_to(AuthPhase::Authenticating));
    }

    #[test]
    fn test_clear_bumps_attempt_and_marks_initialized() {
        let mut state = SessionState::new();
        state.phase = AuthPhase::Degraded;
        state.profile_enhancement_failed = true;
        state.clear();

        let snapshot = state.snapshot();
        assert_eq!(snapshot.phase, AuthPhase::Idle);
        assert!(snapshot.user.is_none());
        assert!(!snapshot.profile_enhancement_failed);
        assert_eq!(snapshot.attempt, 1);
        assert!(snapshot.initialized);
        assert!(!snapshot.is_loading());
    }

    #[test]
    fn test_uninitialized_snapshot_is_loading() {
        assert!(SessionSnapshot::uninitialized().is_loading());
    }

    fn rank(phase: AuthPhase) -> u8 {
        match phase {
            AuthPhase::Idle => 0,
            AuthPhase::Authenticating => 1,
            AuthPhase::Enhancing => 2,
            AuthPhase::Ready | AuthPhase::Degraded | AuthPhase::Error => 3,
        }
    }

    proptest::proptest! {
        /// Within one attempt the phase only moves forward; only sign-out and
        /// the retry/continue actions out of degraded or error go back.
        #[test]
        fn test_random_walk_is_monotonic(targets in proptest::collection::vec(0usize..6, 1..40)) {
            let mut phase = AuthPhase::Idle;
            for next in targets.into_iter().map(|i| ALL[i]) {
                if !phase.can_transition_to(next) {
                    continue;
                }
                let recovery = matches!(phase, AuthPhase::Degraded | AuthPhase::Error);
                if next != AuthPhase::Idle && !recovery {
                    proptest::prop_assert!(rank(next) > rank(phase), "{} -> {}", phase, next);
                }
                phase = next;
            }
        }
    }
}
