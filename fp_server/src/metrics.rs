//! Prometheus metrics for the portal gateway.
//!
//! Metrics are exposed in Prometheus text format on a separate listener.
//!
//! # Metrics Categories
//!
//! - **HTTP Metrics**: Request counts and duration
//! - **Auth Metrics**: Sign-in outcomes, profile enhancement outcomes, live sessions
//! - **Access Metrics**: Guard denials by reason
//! - **Workspace Metrics**: Optimistic writes rolled back
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use fp_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::http_requests_total("POST", "/api/v1/auth/sign-in", 200);
//! metrics::active_sessions(10);
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
///
/// # Arguments
///
/// - `addr`: Address to bind the metrics server to (e.g., `0.0.0.0:9090`)
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// Auth Metrics
// ============================================================================

/// Increment sign-in attempts by outcome (`ready`, `degraded`, `error`, `rejected`).
pub fn sign_in_attempts_total(outcome: &str) {
    metrics::counter!("sign_in_attempts_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Increment profile enhancement outcomes by the phase they settled in.
pub fn enhancement_outcomes_total(phase: &str) {
    metrics::counter!("profile_enhancement_total",
        "phase" => phase.to_string()
    )
    .increment(1);
}

/// Set current live browser sessions count.
pub fn active_sessions(count: usize) {
    metrics::gauge!("active_sessions").set(count as f64);
}

// ============================================================================
// Access Metrics
// ============================================================================

/// Increment guard denials by reason.
pub fn guard_denials_total(reason: &str) {
    metrics::counter!("guard_denials_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

// ============================================================================
// Workspace Metrics
// ============================================================================

/// Increment optimistic writes rolled back, by entity.
pub fn optimistic_reverts_total(entity: &str) {
    metrics::counter!("optimistic_reverts_total",
        "entity" => entity.to_string()
    )
    .increment(1);
}
