//! Session API handlers.
//!
//! Sign-in and sign-up drive the browser session's state machine and answer
//! with its snapshot. A degraded session can then retry the profile load or
//! continue with basic access.
//!
//! # Examples
//!
//! Sign in:
//! ```bash
//! curl -i -X POST http://localhost:8080/api/v1/auth/sign-in \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "freelancer@portal.local", "password": "freelancer-password"}'
//! ```
//!
//! Continue after a degraded sign-in:
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/auth/continue-basic \
//!   -H "x-portal-session: <id from the sign-in response>"
//! ```

use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use freelance_portal::{
    AuthPhase, AuthUser, SessionSnapshot,
    auth::{AuthError, Credentials, SignOutOutcome, SignUpOutcome, SignUpRequest, UserRole},
    loading::{LoadingCoordinator, LoadingProgress},
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};
use uuid::Uuid;

use super::{ApiError, AppState, ErrorResponse, PortalSession, SESSION_HEADER, auth_error};
use crate::{logging, metrics};

#[derive(Debug, Deserialize)]
pub struct SignUpPayload {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub company: Option<String>,
    #[serde(default = "default_sign_up_role")]
    pub role: UserRole,
}

fn default_sign_up_role() -> UserRole {
    UserRole::Client
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordPayload {
    pub email: String,
}

/// Client view of a session snapshot
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub phase: AuthPhase,
    pub authenticated: bool,
    pub user: Option<AuthUser>,
    pub expires_at: Option<DateTime<Utc>>,
    pub profile_enhancement_failed: bool,
    pub basic_mode_accepted: bool,
    pub last_error: Option<String>,
    /// Landing page for the user's role once authenticated
    pub redirect_to: Option<&'static str>,
}

impl SessionView {
    pub fn new(session_id: Uuid, snapshot: &SessionSnapshot) -> Self {
        let authenticated = snapshot.is_authenticated();
        Self {
            session_id,
            phase: snapshot.phase,
            authenticated,
            user: snapshot.user.clone(),
            expires_at: snapshot.session_expires_at,
            profile_enhancement_failed: snapshot.profile_enhancement_failed,
            basic_mode_accepted: snapshot.basic_mode_accepted,
            last_error: snapshot.last_error.clone(),
            redirect_to: snapshot
                .user
                .as_ref()
                .filter(|_| authenticated)
                .map(|user| user.role.default_route()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    pub outcome: SignUpOutcome,
    pub session: SessionView,
}

#[derive(Debug, Serialize)]
pub struct ContinueResponse {
    pub redirect_to: &'static str,
    pub session: SessionView,
}

/// Attach the session header to any response
fn with_session(session_id: Uuid, response: impl IntoResponse) -> Response {
    ([(SESSION_HEADER, session_id.to_string())], response).into_response()
}

/// Session named by the request, if it can start a new attempt; otherwise a
/// fresh one
async fn session_for_attempt(state: &AppState, headers: &HeaderMap) -> Arc<PortalSession> {
    let header = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok());
    if let Some(session) = state.sessions.resolve(header).await {
        if matches!(
            session.manager.snapshot().phase,
            AuthPhase::Idle | AuthPhase::Error
        ) {
            return session;
        }
    }
    state.sessions.create().await
}

/// Answer a failed attempt; a session that never started is not kept
async fn attempt_failed(state: &AppState, session: &PortalSession, err: AuthError) -> Response {
    if !session.manager.snapshot().initialized {
        state.sessions.remove(session.id).await;
        return auth_error(err).into_response();
    }
    with_session(session.id, auth_error(err))
}

fn record_settled(snapshot: &SessionSnapshot) {
    metrics::enhancement_outcomes_total(snapshot.phase.as_str());
}

/// Sign in with email and password.
///
/// # Response
///
/// `200 OK` with the session view and an `x-portal-session` header. The
/// phase is `ready`, or `degraded` when the profile could not be loaded.
///
/// # Errors
///
/// - `400 Bad Request`: Malformed email or empty password; nothing was sent
/// - `401 Unauthorized`: Invalid credentials
/// - `403 Forbidden`: Email not confirmed
/// - `503 Service Unavailable`: Profile unavailable and fallback disabled
pub async fn sign_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(credentials): Json<Credentials>,
) -> Response {
    let session = session_for_attempt(&state, &headers).await;
    let started = Instant::now();

    let result = session.manager.sign_in(credentials).await;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(snapshot) => {
            logging::log_performance("sign_in", elapsed_ms, Some(snapshot.phase.as_str()));
            metrics::sign_in_attempts_total(snapshot.phase.as_str());
            record_settled(&snapshot);
            with_session(session.id, Json(SessionView::new(session.id, &snapshot)))
        }
        Err(err) => {
            logging::log_performance("sign_in", elapsed_ms, Some("failed"));
            match &err {
                AuthError::EnhancementFailed(_) => {
                    metrics::sign_in_attempts_total("error");
                    record_settled(&session.manager.snapshot());
                }
                AuthError::InvalidCredentials | AuthError::EmailNotConfirmed => {
                    metrics::sign_in_attempts_total("rejected");
                    logging::log_security_event(
                        "failed_sign_in",
                        None,
                        Some(&session.id.to_string()),
                        &err.to_string(),
                    );
                }
                AuthError::Validation(_) => {}
                _ => metrics::sign_in_attempts_total("error"),
            }
            attempt_failed(&state, &session, err).await
        }
    }
}

/// Register a new account.
///
/// # Response
///
/// `201 Created` with `outcome` (`signed_in` or `confirmation_required`)
/// and the session view.
///
/// Only `client` and `freelancer` accounts can be self-registered.
pub async fn sign_up(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SignUpPayload>,
) -> Response {
    if !matches!(payload.role, UserRole::Client | UserRole::Freelancer) {
        return auth_error(AuthError::Validation(format!(
            "Accounts with the {} role are created by an administrator",
            payload.role.as_str()
        )))
        .into_response();
    }

    let session = session_for_attempt(&state, &headers).await;

    let result = session
        .manager
        .sign_up(SignUpRequest {
            email: payload.email,
            password: payload.password,
            full_name: payload.full_name,
            company: payload.company,
            role: payload.role,
        })
        .await;

    match result {
        Ok(outcome) => {
            let snapshot = session.manager.snapshot();
            if outcome == SignUpOutcome::SignedIn {
                record_settled(&snapshot);
            }
            with_session(
                session.id,
                (
                    StatusCode::CREATED,
                    Json(SignUpResponse {
                        outcome,
                        session: SessionView::new(session.id, &snapshot),
                    }),
                ),
            )
        }
        Err(err) => attempt_failed(&state, &session, err).await,
    }
}

/// Request a password-reset email.
///
/// Answers `202 Accepted` whether or not the address has an account.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordPayload>,
) -> Result<StatusCode, ApiError> {
    let session = state.sessions.detached();
    session
        .manager
        .reset_password(&payload.email)
        .await
        .map_err(auth_error)?;
    Ok(StatusCode::ACCEPTED)
}

/// Sign out and forget the browser session.
///
/// Local state is cleared even when the remote revocation fails or times
/// out; `remote_confirmed` reports whether it succeeded.
pub async fn sign_out(
    State(state): State<AppState>,
    Extension(session): Extension<Arc<PortalSession>>,
) -> Json<SignOutOutcome> {
    let outcome = session.manager.sign_out().await;
    state.sessions.remove(session.id).await;
    tracing::info!(
        session_id = %session.id,
        remote_confirmed = outcome.remote_confirmed,
        "Session signed out"
    );
    Json(outcome)
}

/// Current session view, restoring a held provider session on first use.
pub async fn session(Extension(session): Extension<Arc<PortalSession>>) -> Json<SessionView> {
    if !session.manager.snapshot().initialized {
        if let Err(e) = session.manager.restore_session().await {
            tracing::warn!(session_id = %session.id, "Session restore failed: {}", e);
        }
    }
    Json(SessionView::new(session.id, &session.manager.snapshot()))
}

/// Loading-screen progress for the session's current phase.
pub async fn progress(Extension(session): Extension<Arc<PortalSession>>) -> Json<LoadingProgress> {
    let coordinator = LoadingCoordinator::new(session.manager.network().budget());
    Json(coordinator.progress(&session.manager.snapshot()))
}

/// Retry loading the profile of a degraded or failed session.
pub async fn retry_profile(
    Extension(session): Extension<Arc<PortalSession>>,
) -> Result<Json<SessionView>, ApiError> {
    let result = session.manager.retry_profile_enhancement().await;
    record_settled(&session.manager.snapshot());
    let snapshot = result.map_err(auth_error)?;
    Ok(Json(SessionView::new(session.id, &snapshot)))
}

/// Accept basic access and get the landing page for the user's role.
pub async fn continue_basic(
    Extension(session): Extension<Arc<PortalSession>>,
) -> Result<Json<ContinueResponse>, ApiError> {
    let redirect_to = session
        .manager
        .continue_with_basic_auth()
        .await
        .map_err(auth_error)?;
    Ok(Json(ContinueResponse {
        redirect_to,
        session: SessionView::new(session.id, &session.manager.snapshot()),
    }))
}

/// Stop an in-flight profile load; the session settles as degraded or failed.
pub async fn cancel_enhancement(
    Extension(session): Extension<Arc<PortalSession>>,
) -> Result<Json<SessionView>, ApiError> {
    let snapshot = session
        .manager
        .cancel_enhancement()
        .await
        .map_err(auth_error)?;
    Ok(Json(SessionView::new(session.id, &snapshot)))
}

/// Exchange the session's refresh token for new tokens.
pub async fn refresh(
    Extension(session): Extension<Arc<PortalSession>>,
) -> Result<Json<SessionView>, ApiError> {
    let snapshot = session.manager.refresh_session().await.map_err(|err| {
        if matches!(err, AuthError::NoSession) {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new(err.client_message()).reason("not_authenticated")),
            )
        } else {
            auth_error(err)
        }
    })?;
    Ok(Json(SessionView::new(session.id, &snapshot)))
}
