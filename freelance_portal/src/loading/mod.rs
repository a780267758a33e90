//! Loading progress for the authentication flow.
//!
//! Maps the session phase and the time spent in it to a progress value,
//! copy for the loading screen, and the recovery actions worth offering.
//! A phase that outlives the soft timeout is reported as slow; being slow
//! never fails the attempt.

use crate::auth::{AuthPhase, SessionSnapshot};
use crate::network::TimeoutBudget;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Action the loading screen may offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Re-run the failed or slow step
    Retry,
    /// Proceed with the basic user
    ContinueDegraded,
    /// Leave for the public landing page
    Skip,
}

/// What the loading screen shows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadingProgress {
    pub phase: AuthPhase,
    pub percent: u8,
    pub headline: &'static str,
    pub detail: String,
    pub slow: bool,
    pub elapsed_ms: u64,
    pub actions: Vec<RecoveryAction>,
}

/// Ramp from `floor` toward `ceiling` that never reaches it
fn asymptotic(floor: f64, ceiling: f64, elapsed: Duration, scale: Duration) -> u8 {
    let scale = scale.as_secs_f64().max(0.001);
    let x = elapsed.as_secs_f64() / scale;
    let value = floor + (ceiling - floor) * (1.0 - (-x).exp());
    value.floor().clamp(floor, ceiling - 1.0) as u8
}

/// Progress percentage for `phase` after `elapsed` in it
///
/// `idle` 0, `authenticating` 10 to 45, `enhancing` 50 to 95, `ready` and
/// `degraded` 100, `error` 0.
pub fn phase_progress(phase: AuthPhase, elapsed: Duration, budget: &TimeoutBudget) -> u8 {
    match phase {
        AuthPhase::Idle | AuthPhase::Error => 0,
        // Reach roughly two thirds of the span when the request budget runs out
        AuthPhase::Authenticating => asymptotic(10.0, 45.0, elapsed, budget.auth_request),
        AuthPhase::Enhancing => asymptotic(50.0, 95.0, elapsed, budget.profile_fetch),
        AuthPhase::Ready | AuthPhase::Degraded => 100,
    }
}

fn copy(phase: AuthPhase) -> (&'static str, &'static str) {
    match phase {
        AuthPhase::Idle => ("Welcome", "Sign in to continue."),
        AuthPhase::Authenticating => ("Signing you in", "Verifying your credentials."),
        AuthPhase::Enhancing => (
            "Loading your workspace",
            "Fetching your profile and permissions.",
        ),
        AuthPhase::Ready => ("All set", "Your workspace is ready."),
        AuthPhase::Degraded => (
            "Limited access",
            "Some profile details could not be loaded. You can retry or continue.",
        ),
        AuthPhase::Error => ("Sign-in problem", "Something went wrong while signing in."),
    }
}

/// Derives loading-screen state from session snapshots
#[derive(Debug, Clone, Default)]
pub struct LoadingCoordinator {
    budget: TimeoutBudget,
}

impl LoadingCoordinator {
    pub fn new(budget: TimeoutBudget) -> Self {
        Self { budget }
    }

    /// Use a fresh budget after the network quality changed
    pub fn set_budget(&mut self, budget: TimeoutBudget) {
        self.budget = budget;
    }

    pub fn progress(&self, snapshot: &SessionSnapshot) -> LoadingProgress {
        self.progress_at(snapshot, Instant::now())
    }

    /// Progress as of `now`
    pub fn progress_at(&self, snapshot: &SessionSnapshot, now: Instant) -> LoadingProgress {
        let elapsed = now.saturating_duration_since(snapshot.phase_entered_at);
        let phase = snapshot.phase;
        let slow = phase.is_pending() && elapsed >= self.budget.soft_timeout;

        let (headline, detail) = copy(phase);
        let detail = match (&snapshot.last_error, phase) {
            (Some(error), AuthPhase::Error | AuthPhase::Degraded) => error.clone(),
            _ if slow => "This is taking longer than expected.".to_string(),
            _ => detail.to_string(),
        };

        LoadingProgress {
            phase,
            percent: phase_progress(phase, elapsed, &self.budget),
            headline,
            detail,
            slow,
            elapsed_ms: elapsed.as_millis() as u64,
            actions: Self::actions(snapshot, slow),
        }
    }

    fn actions(snapshot: &SessionSnapshot, slow: bool) -> Vec<RecoveryAction> {
        let phase = snapshot.phase;
        let mut actions = Vec::new();

        let can_retry = match phase {
            AuthPhase::Degraded | AuthPhase::Error => true,
            AuthPhase::Enhancing => slow,
            _ => false,
        };
        if can_retry {
            actions.push(RecoveryAction::Retry);
        }

        let can_continue = snapshot.has_identity
            && match phase {
                AuthPhase::Degraded | AuthPhase::Error => true,
                AuthPhase::Enhancing => slow,
                _ => false,
            };
        if can_continue {
            actions.push(RecoveryAction::ContinueDegraded);
        }

        if slow {
            actions.push(RecoveryAction::Skip);
        }
        actions
    }
}
