//! Network quality estimation and per-request timeout budgets.
//!
//! Round-trip times of backend calls feed an exponentially weighted moving
//! average which classifies the connection as fast, medium or slow. A run of
//! transport failures marks it offline until the next success. The session
//! manager derives its auth and profile timeouts from the current class.

use crate::backend::{BackendError, BackendResult};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    future::Future,
    sync::Mutex,
    time::{Duration, Instant},
};

/// Remote sign-out is always bounded by this, independent of quality
pub const SIGN_OUT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Below this RTT the connection counts as fast
pub const FAST_RTT: Duration = Duration::from_millis(150);

/// Below this RTT the connection counts as medium
pub const MEDIUM_RTT: Duration = Duration::from_millis(600);

/// Consecutive transport failures before reporting offline
pub const OFFLINE_AFTER_FAILURES: u32 = 3;

/// Weight of the newest sample in the moving average
const EWMA_ALPHA: f64 = 0.3;

/// Coarse connection class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkQuality {
    Fast,
    Medium,
    Slow,
    Offline,
}

impl NetworkQuality {
    pub fn from_rtt(rtt: Duration) -> Self {
        if rtt < FAST_RTT {
            NetworkQuality::Fast
        } else if rtt < MEDIUM_RTT {
            NetworkQuality::Medium
        } else {
            NetworkQuality::Slow
        }
    }

    /// Timeout budget for requests issued under this quality
    pub fn budget(self) -> TimeoutBudget {
        let (auth, profile, soft) = match self {
            NetworkQuality::Fast => (8, 5, 3),
            NetworkQuality::Medium => (12, 8, 6),
            NetworkQuality::Slow => (20, 15, 10),
            // Fail fast; waiting longer will not bring the network back
            NetworkQuality::Offline => (5, 3, 2),
        };
        TimeoutBudget {
            auth_request: Duration::from_secs(auth),
            profile_fetch: Duration::from_secs(profile),
            soft_timeout: Duration::from_secs(soft),
            sign_out: SIGN_OUT_TIMEOUT,
        }
    }
}

impl fmt::Display for NetworkQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            NetworkQuality::Fast => "fast",
            NetworkQuality::Medium => "medium",
            NetworkQuality::Slow => "slow",
            NetworkQuality::Offline => "offline",
        };
        f.write_str(repr)
    }
}

/// Per-request timeouts derived from network quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeoutBudget {
    pub auth_request: Duration,
    pub profile_fetch: Duration,
    /// After this long in a pending phase the UI offers recovery actions
    pub soft_timeout: Duration,
    pub sign_out: Duration,
}

impl Default for TimeoutBudget {
    fn default() -> Self {
        NetworkQuality::Medium.budget()
    }
}

#[derive(Debug, Default)]
struct MonitorState {
    ewma_ms: Option<f64>,
    consecutive_failures: u32,
    samples: u64,
}

/// Tracks observed round-trip times of backend calls
#[derive(Debug, Default)]
pub struct NetworkMonitor {
    state: Mutex<MonitorState>,
}

impl NetworkMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MonitorState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Record a completed round trip
    pub fn record_rtt(&self, rtt: Duration) {
        let sample = rtt.as_secs_f64() * 1000.0;
        self.with_state(|s| {
            s.ewma_ms = Some(match s.ewma_ms {
                Some(prev) => EWMA_ALPHA * sample + (1.0 - EWMA_ALPHA) * prev,
                None => sample,
            });
            s.consecutive_failures = 0;
            s.samples += 1;
        });
    }

    /// Record a transport-level failure
    pub fn record_failure(&self) {
        self.with_state(|s| s.consecutive_failures += 1);
    }

    /// Smoothed round-trip time, if any call has completed
    pub fn estimated_rtt(&self) -> Option<Duration> {
        self.with_state(|s| s.ewma_ms)
            .map(|ms| Duration::from_secs_f64(ms / 1000.0))
    }

    pub fn quality(&self) -> NetworkQuality {
        let (ewma, failures) = self.with_state(|s| (s.ewma_ms, s.consecutive_failures));
        if failures >= OFFLINE_AFTER_FAILURES {
            return NetworkQuality::Offline;
        }
        match ewma {
            Some(ms) => NetworkQuality::from_rtt(Duration::from_secs_f64(ms / 1000.0)),
            None => NetworkQuality::Medium,
        }
    }

    pub fn budget(&self) -> TimeoutBudget {
        self.quality().budget()
    }

    /// Run a backend call, recording its round trip or transport failure
    pub async fn observe<T, F>(&self, future: F) -> BackendResult<T>
    where
        F: Future<Output = BackendResult<T>>,
    {
        let started = Instant::now();
        let result = future.await;
        match &result {
            Err(e) if e.is_network() => self.record_failure(),
            // The backend answered, so the round trip is a valid sample
            _ => self.record_rtt(started.elapsed()),
        }
        result
    }
}

/// Execute a backend call with a timeout
///
/// # Arguments
///
/// * `duration` - Timeout duration
/// * `future` - Backend call to execute
///
/// # Returns
///
/// * `BackendResult<T>` - Result, or `BackendError::Timeout` if the timer won
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> BackendResult<T>
where
    F: Future<Output = BackendResult<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_thresholds() {
        assert_eq!(
            NetworkQuality::from_rtt(Duration::from_millis(40)),
            NetworkQuality::Fast
        );
        assert_eq!(
            NetworkQuality::from_rtt(Duration::from_millis(150)),
            NetworkQuality::Medium
        );
        assert_eq!(
            NetworkQuality::from_rtt(Duration::from_millis(1200)),
            NetworkQuality::Slow
        );
    }

    #[test]
    fn test_unknown_network_defaults_to_medium() {
        let monitor = NetworkMonitor::new();
        assert_eq!(monitor.quality(), NetworkQuality::Medium);
        assert!(monitor.estimated_rtt().is_none());
    }

    #[test]
    fn test_slow_connection_gets_longer_budget() {
        let fast = NetworkQuality::Fast.budget();
        let slow = NetworkQuality::Slow.budget();
        assert!(slow.profile_fetch > fast.profile_fetch);
        assert!(slow.auth_request > fast.auth_request);
        assert_eq!(slow.sign_out, SIGN_OUT_TIMEOUT);
        assert_eq!(fast.sign_out, Duration::from_millis(3000));
    }

    #[test]
    fn test_failures_mark_offline_until_success() {
        let monitor = NetworkMonitor::new();
        monitor.record_rtt(Duration::from_millis(50));
        for _ in 0..OFFLINE_AFTER_FAILURES {
            monitor.record_failure();
        }
        assert_eq!(monitor.quality(), NetworkQuality::Offline);

        monitor.record_rtt(Duration::from_millis(50));
        assert_eq!(monitor.quality(), NetworkQuality::Fast);
    }

    #[test]
    fn test_ewma_moves_toward_recent_samples() {
        let monitor = NetworkMonitor::new();
        monitor.record_rtt(Duration::from_millis(50));
        for _ in 0..10 {
            monitor.record_rtt(Duration::from_millis(900));
        }
        assert_eq!(monitor.quality(), NetworkQuality::Slow);
    }

    #[tokio::test]
    async fn test_with_timeout_maps_elapsed() {
        let result: BackendResult<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(BackendError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_observe_records_network_failures() {
        let monitor = NetworkMonitor::new();
        for _ in 0..OFFLINE_AFTER_FAILURES {
            let _ = monitor
                .observe(async { Err::<(), _>(BackendError::Offline) })
                .await;
        }
        assert_eq!(monitor.quality(), NetworkQuality::Offline);

        let _ = monitor
            .observe(async { Err::<(), _>(BackendError::InvalidCredentials) })
            .await;
        assert_ne!(monitor.quality(), NetworkQuality::Offline);
    }
}
