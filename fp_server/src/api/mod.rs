//! HTTP API for the client portal.
//!
//! # Modules
//!
//! - [`auth`]: Sign-in, sign-up, sign-out and recovery from degraded sessions
//! - [`navigation`]: Route-guard decisions for page navigation
//! - [`tasks`], [`projects`], [`proposals`]: Workspace endpoints
//! - [`middleware`]: Session lookup and route protection for API routes
//! - [`sessions`]: Per-browser session registry
//! - [`request_id`]: Request correlation
//!
//! # Sessions
//!
//! Sign-in and sign-up answer with an `x-portal-session` header. Clients send
//! it back on every later request; it names the server-side session state
//! machine of that browser.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use fp_server::api::{AppState, SessionRegistry, create_router};
//! use freelance_portal::{auth::AuthConfig, backend::MemoryBackend, guard::GuardRoutes};
//! use std::time::Duration;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!
//! let backend = MemoryBackend::with_demo_data("development-only-jwt-secret").await;
//! let sessions = SessionRegistry::new(
//!     move || backend.fresh_session(),
//!     AuthConfig::default(),
//!     Duration::from_secs(1800),
//!     10_000,
//! );
//! let app = create_router(AppState::new(sessions, GuardRoutes::default()));
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod middleware;
pub mod navigation;
pub mod projects;
pub mod proposals;
pub mod request_id;
pub mod sessions;
pub mod tasks;

pub use sessions::{PortalSession, SESSION_HEADER, SessionRegistry};

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, patch, post},
};
use freelance_portal::{
    auth::{AuthError, Permission},
    backend::BackendError,
    guard::{GuardRoutes, PermissionMode, RouteGuard, RouteProtectionConfig, RouteTable},
    workspace::{ValidationErrors, WorkspaceError},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers.
///
/// - `sessions`: Live browser sessions
/// - `routes`: Protection rules of the portal's pages, for navigation checks
/// - `api_routes`: Protection rules of the workspace API
/// - `guard`: Evaluates rules against session snapshots
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub routes: Arc<RouteTable>,
    pub api_routes: Arc<RouteTable>,
    pub guard: Arc<RouteGuard>,
}

impl AppState {
    pub fn new(sessions: SessionRegistry, guard_routes: GuardRoutes) -> Self {
        Self {
            sessions: Arc::new(sessions),
            routes: Arc::new(RouteTable::portal_defaults()),
            api_routes: Arc::new(api_route_table()),
            guard: Arc::new(RouteGuard::new(guard_routes)),
        }
    }
}

/// Protection rules of the workspace API, keyed by path below `/api/v1`
pub fn api_route_table() -> RouteTable {
    RouteTable::new(RouteProtectionConfig::authenticated())
        .with(
            "/tasks",
            RouteProtectionConfig::authenticated()
                .permissions([Permission::ViewTasks], PermissionMode::All)
                .client_portal()
                .degraded_ok(),
        )
        .with(
            "/projects",
            RouteProtectionConfig::authenticated()
                .permissions([Permission::ViewProjects], PermissionMode::All)
                .client_portal()
                .degraded_ok(),
        )
        .with(
            "/proposals",
            RouteProtectionConfig::authenticated()
                .permissions(
                    [Permission::CreateProposals, Permission::ApproveProposals],
                    PermissionMode::Any,
                )
                .client_portal(),
        )
}

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<ValidationErrors>,
    pub retryable: bool,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            reason: None,
            redirect_to: None,
            fields: None,
            retryable: false,
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn redirect(mut self, to: impl Into<String>) -> Self {
        self.redirect_to = Some(to.into());
        self
    }

    fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn backend_status(err: &BackendError) -> StatusCode {
    match err {
        BackendError::Unauthorized => StatusCode::UNAUTHORIZED,
        BackendError::NotFound { .. } => StatusCode::NOT_FOUND,
        e if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// Map a session error to a response
pub fn auth_error(err: AuthError) -> ApiError {
    let status = match &err {
        AuthError::Validation(_) => StatusCode::BAD_REQUEST,
        AuthError::InvalidCredentials
        | AuthError::NoSession
        | AuthError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        AuthError::EmailNotConfirmed | AuthError::FallbackDisabled => StatusCode::FORBIDDEN,
        AuthError::Backend(e) => backend_status(e),
        AuthError::InvalidTransition { .. } | AuthError::Superseded => StatusCode::CONFLICT,
        AuthError::EnhancementFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    if status.is_server_error() {
        tracing::warn!("Session request failed: {}", err);
    }
    (
        status,
        Json(ErrorResponse::new(err.client_message()).retryable(err.is_retryable())),
    )
}

/// Map a workspace error to a response
pub fn workspace_error(err: WorkspaceError) -> ApiError {
    match err {
        WorkspaceError::Validation(fields) => {
            let mut body = ErrorResponse::new("Please fix the highlighted fields.")
                .reason("validation_failed");
            body.fields = Some(fields);
            (StatusCode::UNPROCESSABLE_ENTITY, Json(body))
        }
        WorkspaceError::PermissionDenied(permission) => (
            StatusCode::FORBIDDEN,
            Json(
                ErrorResponse::new(WorkspaceError::PermissionDenied(permission).client_message())
                    .reason("missing_permissions"),
            ),
        ),
        other => {
            let status = match &other {
                WorkspaceError::NotFound { .. } => StatusCode::NOT_FOUND,
                WorkspaceError::Backend(e) => backend_status(e),
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(ErrorResponse::new(other.client_message()).retryable(other.is_retryable())),
            )
        }
    }
}

/// Create the complete API router with all endpoints and middleware.
///
/// # Endpoint Summary
///
/// ```text
/// GET    /health                             - Health check
/// POST   /api/v1/auth/sign-in                - Sign in (public)
/// POST   /api/v1/auth/sign-up                - Register (public)
/// POST   /api/v1/auth/reset-password         - Password-reset email (public)
/// POST   /api/v1/navigation/check            - Guard decision for a page (public)
/// POST   /api/v1/auth/sign-out               - Sign out (session)
/// GET    /api/v1/auth/session                - Current session (session)
/// GET    /api/v1/auth/progress               - Loading progress (session)
/// POST   /api/v1/auth/retry-profile          - Retry profile loading (session)
/// POST   /api/v1/auth/continue-basic         - Continue with basic access (session)
/// POST   /api/v1/auth/cancel-enhancement     - Stop profile loading (session)
/// POST   /api/v1/auth/refresh                - Refresh tokens (session)
/// GET    /api/v1/tasks                       - List tasks (guarded)
/// POST   /api/v1/tasks                       - Create task (guarded)
/// GET    /api/v1/tasks/context               - Tasks with project names (guarded)
/// PATCH  /api/v1/tasks/{task_id}             - Update task (guarded)
/// DELETE /api/v1/tasks/{task_id}             - Delete task (guarded)
/// GET    /api/v1/projects                    - List projects (guarded)
/// POST   /api/v1/projects                    - Create project (guarded)
/// PATCH  /api/v1/projects/{project_id}       - Update project (guarded)
/// POST   /api/v1/projects/{project_id}/archive
/// POST   /api/v1/proposals                   - Submit proposal (guarded)
/// POST   /api/v1/proposals/{proposal_id}/respond
/// ```
pub fn create_router(state: AppState) -> Router {
    let v1_routes = create_v1_router(state.clone());

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", v1_routes)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn create_v1_router(state: AppState) -> Router<AppState> {
    let public_routes = Router::new()
        .route("/auth/sign-in", post(auth::sign_in))
        .route("/auth/sign-up", post(auth::sign_up))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/navigation/check", post(navigation::check));

    // Reachable in every phase so degraded and failed sessions can recover
    let session_routes = Router::new()
        .route("/auth/sign-out", post(auth::sign_out))
        .route("/auth/session", get(auth::session))
        .route("/auth/progress", get(auth::progress))
        .route("/auth/retry-profile", post(auth::retry_profile))
        .route("/auth/continue-basic", post(auth::continue_basic))
        .route("/auth/cancel-enhancement", post(auth::cancel_enhancement))
        .route("/auth/refresh", post(auth::refresh))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::session_middleware,
        ));

    let guarded_routes = Router::new()
        .route("/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route("/tasks/context", get(tasks::tasks_with_context))
        .route(
            "/tasks/{task_id}",
            patch(tasks::update_task).delete(tasks::delete_task),
        )
        .route(
            "/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route("/projects/{project_id}", patch(projects::update_project))
        .route(
            "/projects/{project_id}/archive",
            post(projects::archive_project),
        )
        .route("/proposals", post(proposals::submit_proposal))
        .route(
            "/proposals/{proposal_id}/respond",
            post(proposals::respond_to_proposal),
        )
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::guard_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(session_routes)
        .merge(guarded_routes)
}

/// Health check endpoint for monitoring and load balancers.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "active_sessions": state.sessions.len().await,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (StatusCode::OK, Json(response))
}
