//! Route-guard decisions for page navigation.
//!
//! The browser asks before rendering a protected page; the answer is the
//! same [`GuardOutcome`] the portal's own router acts on.

use axum::{Json, extract::State, http::HeaderMap};
use freelance_portal::{GuardOutcome, guard::RouteContext};
use std::sync::Arc;

use super::{AppState, SESSION_HEADER, sessions};

/// Evaluate a page's protection rules for the caller's session.
///
/// Works without a session header: the caller is then treated as signed out.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/v1/navigation/check \
///   -H "x-portal-session: <id>" -H "Content-Type: application/json" \
///   -d '{"path": "/admin"}'
/// ```
pub async fn check(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(context): Json<RouteContext>,
) -> Json<GuardOutcome> {
    let header = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok());
    let snapshot = match state.sessions.resolve(header).await {
        Some(session) => session.manager.snapshot(),
        None => Arc::new(sessions::signed_out_snapshot()),
    };

    let config = state.routes.lookup(&context.path);
    let outcome = state.guard.evaluate(&snapshot, config, &context).await;
    if let Some(denial) = outcome.denial() {
        crate::metrics::guard_denials_total(denial.reason.as_str());
    }
    Json(outcome)
}
