//! Session lookup and route protection for API routes.
//!
//! - [`session_middleware`]: requires a known `x-portal-session` header and
//!   injects the [`PortalSession`]; used by the session endpoints, which must
//!   stay reachable while a session is degraded or failed
//! - [`guard_middleware`]: additionally evaluates the route's protection
//!   rules and injects the signed-in [`AuthUser`] and [`AccessMode`]
//!
//! # Extracting the session
//!
//! ```rust,no_run
//! use axum::extract::Extension;
//! use fp_server::api::PortalSession;
//! use freelance_portal::AuthUser;
//! use std::sync::Arc;
//!
//! async fn handler(
//!     Extension(session): Extension<Arc<PortalSession>>,
//!     Extension(user): Extension<AuthUser>,
//! ) -> String {
//!     format!("{} in session {}", user.email, session.id)
//! }
//! # let _ = handler;
//! ```

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use freelance_portal::{
    AuthUser,
    guard::{AccessMode, DenialReason, GuardOutcome, RouteContext},
};
use std::sync::Arc;

use super::{AppState, ErrorResponse, PortalSession, SESSION_HEADER, sessions};
use crate::logging::log_security_event;

/// Response header telling the client a degraded session sees a reduced view
pub const ACCESS_MODE_HEADER: &str = "x-portal-access";

fn session_header(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
}

fn no_session() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(
            ErrorResponse::new("Please sign in to continue.")
                .reason(DenialReason::NotAuthenticated.as_str()),
        ),
    )
        .into_response()
}

/// Require a known browser session and inject it into request extensions.
///
/// - **Known session**: Injects `Arc<PortalSession>` → Calls next handler
/// - **Missing or unknown header**: Returns `401 Unauthorized`
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(session) = state.sessions.resolve(session_header(&request)).await else {
        return no_session();
    };
    request.extensions_mut().insert(session);
    next.run(request).await
}

/// Evaluate the route's protection rules for the request's session.
///
/// # Behavior
///
/// - **Allow**: Injects `Arc<PortalSession>`, `AuthUser` and `AccessMode`; a
///   reduced view is flagged with the `x-portal-access: reduced` header
/// - **Loading**: `503 Service Unavailable`; the session is still resolving
/// - **Recover**: `403 Forbidden` with reason `profile_incomplete`
/// - **Deny**: `401` when not signed in, `403` otherwise, with the denial
///   reason, redirect and message in the body
pub async fn guard_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let session = state.sessions.resolve(session_header(&request)).await;
    let snapshot = match &session {
        Some(session) => session.manager.snapshot(),
        None => Arc::new(sessions::signed_out_snapshot()),
    };

    let path = request.uri().path().to_string();
    let config = state.api_routes.lookup(&path);
    let outcome = state
        .guard
        .evaluate(&snapshot, config, &RouteContext::new(path.as_str()))
        .await;

    match outcome {
        GuardOutcome::Allow { mode } => {
            let (Some(session), Some(user)) = (session, snapshot.user.clone()) else {
                // Public API route opened without a session
                return next.run(request).await;
            };
            request.extensions_mut().insert::<Arc<PortalSession>>(session);
            request.extensions_mut().insert::<AuthUser>(user);
            request.extensions_mut().insert(mode);

            let mut response = next.run(request).await;
            if mode == AccessMode::Reduced {
                response
                    .headers_mut()
                    .insert(ACCESS_MODE_HEADER, HeaderValue::from_static("reduced"));
            }
            response
        }
        GuardOutcome::Loading => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("Your session is still loading.").reason("loading")),
        )
            .into_response(),
        GuardOutcome::Recover => (
            StatusCode::FORBIDDEN,
            Json(
                ErrorResponse::new(
                    "Your profile could not be loaded. Retry or continue with basic access.",
                )
                .reason("profile_incomplete"),
            ),
        )
            .into_response(),
        GuardOutcome::Deny(denial) => {
            crate::metrics::guard_denials_total(denial.reason.as_str());
            let session_id = session.as_ref().map(|s| s.id.to_string());
            log_security_event(
                "guard_denial",
                snapshot.user.as_ref().map(|u| u.id),
                session_id.as_deref(),
                &format!("{} denied: {}", path, denial.reason),
            );

            let status = if denial.reason == DenialReason::NotAuthenticated {
                StatusCode::UNAUTHORIZED
            } else {
                StatusCode::FORBIDDEN
            };
            (
                status,
                Json(
                    ErrorResponse::new(denial.message)
                        .reason(denial.reason.as_str())
                        .redirect(denial.redirect_to),
                ),
            )
                .into_response()
        }
    }
}
