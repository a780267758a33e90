//! Route protection.
//!
//! [`RouteGuard::evaluate`] decides whether the current session may enter a
//! route. It never decides while the session manager is still resolving the
//! user, and runs its checks in a fixed order where the first failure wins:
//!
//! 1. authentication
//! 2. client-portal exclusivity (including assigned projects)
//! 3. role allowlist
//! 4. required permissions
//! 5. custom validator
//!
//! Every denial carries the redirect target and the message to show.

pub mod routes;
pub mod validator;

pub use routes::RouteTable;
pub use validator::{AccessValidator, FnValidator};

use crate::auth::{AuthPhase, AuthUser, Permission, ProjectId, SessionSnapshot, UserRole};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, sync::Arc};

/// How `required_permissions` is matched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    #[default]
    All,
    Any,
}

impl PermissionMode {
    pub fn satisfied_by(self, user: &AuthUser, required: &BTreeSet<Permission>) -> bool {
        if required.is_empty() {
            return true;
        }
        match self {
            PermissionMode::All => required.iter().all(|p| user.has_permission(*p)),
            PermissionMode::Any => required.iter().any(|p| user.has_permission(*p)),
        }
    }
}

/// Protection rules for one route
#[derive(Clone, Default)]
pub struct RouteProtectionConfig {
    pub require_auth: bool,
    /// `None` admits every role
    pub allowed_roles: Option<BTreeSet<UserRole>>,
    pub required_permissions: BTreeSet<Permission>,
    pub permission_mode: PermissionMode,
    /// Client-portal users may enter
    pub allow_client_portal: bool,
    /// Route renders a reduced view for a degraded session
    pub allow_degraded: bool,
    pub validator: Option<Arc<dyn AccessValidator>>,
    /// Overrides the reason-specific redirect
    pub redirect_to: Option<String>,
}

impl fmt::Debug for RouteProtectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteProtectionConfig")
            .field("require_auth", &self.require_auth)
            .field("allowed_roles", &self.allowed_roles)
            .field("required_permissions", &self.required_permissions)
            .field("permission_mode", &self.permission_mode)
            .field("allow_client_portal", &self.allow_client_portal)
            .field("allow_degraded", &self.allow_degraded)
            .field("validator", &self.validator.is_some())
            .field("redirect_to", &self.redirect_to)
            .finish()
    }
}

impl RouteProtectionConfig {
    /// Route anyone may open, signed in or not
    pub fn public() -> Self {
        Self {
            allow_client_portal: true,
            allow_degraded: true,
            ..Self::default()
        }
    }

    /// Route for any signed-in internal user
    pub fn authenticated() -> Self {
        Self {
            require_auth: true,
            ..Self::default()
        }
    }

    pub fn roles(mut self, roles: impl IntoIterator<Item = UserRole>) -> Self {
        self.allowed_roles = Some(roles.into_iter().collect());
        self
    }

    pub fn permissions(
        mut self,
        permissions: impl IntoIterator<Item = Permission>,
        mode: PermissionMode,
    ) -> Self {
        self.required_permissions = permissions.into_iter().collect();
        self.permission_mode = mode;
        self
    }

    pub fn client_portal(mut self) -> Self {
        self.allow_client_portal = true;
        self
    }

    pub fn degraded_ok(mut self) -> Self {
        self.allow_degraded = true;
        self
    }

    pub fn validator(mut self, validator: impl AccessValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn redirect(mut self, to: impl Into<String>) -> Self {
        self.redirect_to = Some(to.into());
        self
    }
}

/// Navigation target being checked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteContext {
    pub path: String,
    #[serde(default)]
    pub project_id: Option<ProjectId>,
}

impl RouteContext {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            project_id: None,
        }
    }

    pub fn with_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }
}

/// Why access was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    NotAuthenticated,
    ClientPortalUser,
    InsufficientRole,
    MissingPermissions,
    CustomValidationFailed,
}

impl DenialReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenialReason::NotAuthenticated => "not_authenticated",
            DenialReason::ClientPortalUser => "client_portal_user",
            DenialReason::InsufficientRole => "insufficient_role",
            DenialReason::MissingPermissions => "missing_permissions",
            DenialReason::CustomValidationFailed => "custom_validation_failed",
        }
    }

    fn default_message(self) -> &'static str {
        match self {
            DenialReason::NotAuthenticated => "Please sign in to continue.",
            DenialReason::ClientPortalUser => {
                "This area is not available from the client portal."
            }
            DenialReason::InsufficientRole => "Your role does not have access to this page.",
            DenialReason::MissingPermissions => {
                "You do not have the permissions required for this page."
            }
            DenialReason::CustomValidationFailed => "You cannot access this page.",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refusal with where to send the user and what to tell them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDenial {
    pub reason: DenialReason,
    pub redirect_to: String,
    pub message: String,
}

/// How much of the route may be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Full,
    /// Profile-dependent regions fall back and a retry banner is shown
    Reduced,
}

/// Result of a guard evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GuardOutcome {
    /// Session still resolving; render a loading state
    Loading,
    Allow { mode: AccessMode },
    /// Degraded session on a route that needs the full profile; offer
    /// retry or continue
    Recover,
    Deny(AccessDenial),
}

impl GuardOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardOutcome::Allow { .. })
    }

    pub fn denial(&self) -> Option<&AccessDenial> {
        match self {
            GuardOutcome::Deny(denial) => Some(denial),
            _ => None,
        }
    }
}

/// Redirect targets used by the guard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardRoutes {
    pub landing: String,
    pub login: String,
    pub unauthorized: String,
    pub client_portal: String,
}

impl Default for GuardRoutes {
    fn default() -> Self {
        Self {
            landing: "/".to_string(),
            login: "/login".to_string(),
            unauthorized: "/unauthorized".to_string(),
            client_portal: "/client-portal".to_string(),
        }
    }
}

/// Evaluates route protection rules against session snapshots
#[derive(Debug, Clone, Default)]
pub struct RouteGuard {
    routes: GuardRoutes,
}

impl RouteGuard {
    pub fn new(routes: GuardRoutes) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &GuardRoutes {
        &self.routes
    }

    /// Decide whether the session may enter the route
    ///
    /// # Arguments
    ///
    /// * `snapshot` - Current session snapshot
    /// * `config` - Protection rules of the route
    /// * `context` - Path and optional project being opened
    pub async fn evaluate(
        &self,
        snapshot: &SessionSnapshot,
        config: &RouteProtectionConfig,
        context: &RouteContext,
    ) -> GuardOutcome {
        if snapshot.is_loading() {
            return GuardOutcome::Loading;
        }

        let user = if snapshot.is_authenticated() {
            snapshot.user.as_ref()
        } else {
            None
        };

        let Some(user) = user else {
            if config.require_auth {
                return self.deny(DenialReason::NotAuthenticated, config, context, None);
            }
            return GuardOutcome::Allow {
                mode: AccessMode::Full,
            };
        };

        let degraded = snapshot.phase == AuthPhase::Degraded;
        if degraded && config.require_auth && !config.allow_degraded {
            return GuardOutcome::Recover;
        }

        if let Some(reason) = self.check_user(user, config, context) {
            return self.deny(reason, config, context, None);
        }

        if let Some(validator) = &config.validator {
            if !validator.validate(user, context).await {
                return self.deny(
                    DenialReason::CustomValidationFailed,
                    config,
                    context,
                    validator.denial_message(),
                );
            }
        }

        GuardOutcome::Allow {
            mode: if degraded {
                AccessMode::Reduced
            } else {
                AccessMode::Full
            },
        }
    }

    /// Built-in checks two to four; the first failure wins
    fn check_user(
        &self,
        user: &AuthUser,
        config: &RouteProtectionConfig,
        context: &RouteContext,
    ) -> Option<DenialReason> {
        if user.client_portal.is_client {
            if !config.allow_client_portal {
                return Some(DenialReason::ClientPortalUser);
            }
            if let Some(project_id) = &context.project_id {
                if !user.client_portal.can_access_project(project_id) {
                    return Some(DenialReason::ClientPortalUser);
                }
            }
        }

        if let Some(roles) = &config.allowed_roles {
            if !roles.contains(&user.role) {
                return Some(DenialReason::InsufficientRole);
            }
        }

        if !config
            .permission_mode
            .satisfied_by(user, &config.required_permissions)
        {
            return Some(DenialReason::MissingPermissions);
        }

        None
    }

    fn deny(
        &self,
        reason: DenialReason,
        config: &RouteProtectionConfig,
        context: &RouteContext,
        message: Option<String>,
    ) -> GuardOutcome {
        let redirect_to = match &config.redirect_to {
            Some(to) => to.clone(),
            None => match reason {
                DenialReason::NotAuthenticated => format!(
                    "{}?redirect={}",
                    self.routes.login,
                    urlencoding::encode(&context.path)
                ),
                DenialReason::ClientPortalUser => self.routes.client_portal.clone(),
                DenialReason::InsufficientRole
                | DenialReason::MissingPermissions
                | DenialReason::CustomValidationFailed => self.routes.unauthorized.clone(),
            },
        };

        log::debug!("Access to {} denied: {}", context.path, reason);
        GuardOutcome::Deny(AccessDenial {
            reason,
            redirect_to,
            message: message.unwrap_or_else(|| reason.default_message().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn snapshot_for(user: Option<AuthUser>, phase: AuthPhase) -> SessionSnapshot {
        let mut snapshot = SessionSnapshot::uninitialized();
        snapshot.initialized = true;
        snapshot.phase = phase;
        snapshot.has_identity = user.is_some();
        snapshot.user = user;
        snapshot
    }

    fn user(role: UserRole) -> AuthUser {
        AuthUser::basic(Uuid::new_v4(), "u@studio.dev", role)
    }

    #[tokio::test]
    async fn test_loading_never_decides() {
        let guard = RouteGuard::default();
        let mut snapshot = snapshot_for(None, AuthPhase::Enhancing);
        let outcome = guard
            .evaluate(
                &snapshot,
                &RouteProtectionConfig::authenticated(),
                &RouteContext::new("/dashboard"),
            )
            .await;
        assert_eq!(outcome, GuardOutcome::Loading);

        snapshot.phase = AuthPhase::Idle;
        snapshot.initialized = false;
        let outcome = guard
            .evaluate(
                &snapshot,
                &RouteProtectionConfig::authenticated(),
                &RouteContext::new("/dashboard"),
            )
            .await;
        assert_eq!(outcome, GuardOutcome::Loading);
    }

    #[tokio::test]
    async fn test_login_redirect_keeps_destination() {
        let guard = RouteGuard::default();
        let outcome = guard
            .evaluate(
                &snapshot_for(None, AuthPhase::Idle),
                &RouteProtectionConfig::authenticated(),
                &RouteContext::new("/projects/a b"),
            )
            .await;
        let denial = outcome.denial().unwrap();
        assert_eq!(denial.reason, DenialReason::NotAuthenticated);
        assert_eq!(denial.redirect_to, "/login?redirect=%2Fprojects%2Fa%20b");
    }

    #[tokio::test]
    async fn test_role_checked_before_permissions() {
        let guard = RouteGuard::default();
        let config = RouteProtectionConfig::authenticated()
            .roles([UserRole::Admin])
            .permissions([Permission::AdminSettings], PermissionMode::All);
        let outcome = guard
            .evaluate(
                &snapshot_for(Some(user(UserRole::Freelancer)), AuthPhase::Ready),
                &config,
                &RouteContext::new("/admin"),
            )
            .await;
        assert_eq!(
            outcome.denial().unwrap().reason,
            DenialReason::InsufficientRole
        );
    }

    #[tokio::test]
    async fn test_permission_modes() {
        let guard = RouteGuard::default();
        let member = snapshot_for(Some(user(UserRole::TeamMember)), AuthPhase::Ready);
        let perms = [Permission::ViewTasks, Permission::ViewReports];

        let all = RouteProtectionConfig::authenticated().permissions(perms, PermissionMode::All);
        let outcome = guard
            .evaluate(&member, &all, &RouteContext::new("/reports"))
            .await;
        assert_eq!(
            outcome.denial().unwrap().reason,
            DenialReason::MissingPermissions
        );
        assert_eq!(outcome.denial().unwrap().redirect_to, "/unauthorized");

        let any = RouteProtectionConfig::authenticated().permissions(perms, PermissionMode::Any);
        assert!(
            guard
                .evaluate(&member, &any, &RouteContext::new("/reports"))
                .await
                .is_allowed()
        );
    }

    #[tokio::test]
    async fn test_client_users_stay_in_their_portal() {
        let guard = RouteGuard::default();
        let mut client = user(UserRole::Client);
        let assigned = Uuid::new_v4();
        client.client_portal.assigned_project_ids.insert(assigned);
        let snapshot = snapshot_for(Some(client), AuthPhase::Ready);

        let internal = guard
            .evaluate(
                &snapshot,
                &RouteProtectionConfig::authenticated(),
                &RouteContext::new("/dashboard"),
            )
            .await;
        let denial = internal.denial().unwrap();
        assert_eq!(denial.reason, DenialReason::ClientPortalUser);
        assert_eq!(denial.redirect_to, "/client-portal");

        let portal = RouteProtectionConfig::authenticated().client_portal();
        assert!(
            guard
                .evaluate(
                    &snapshot,
                    &portal,
                    &RouteContext::new("/client-portal").with_project(assigned)
                )
                .await
                .is_allowed()
        );
        let other = guard
            .evaluate(
                &snapshot,
                &portal,
                &RouteContext::new("/client-portal").with_project(Uuid::new_v4()),
            )
            .await;
        assert_eq!(
            other.denial().unwrap().reason,
            DenialReason::ClientPortalUser
        );
    }

    #[tokio::test]
    async fn test_degraded_session() {
        let guard = RouteGuard::default();
        let snapshot = snapshot_for(Some(user(UserRole::Freelancer)), AuthPhase::Degraded);

        let strict = guard
            .evaluate(
                &snapshot,
                &RouteProtectionConfig::authenticated(),
                &RouteContext::new("/reports"),
            )
            .await;
        assert_eq!(strict, GuardOutcome::Recover);

        let lenient = guard
            .evaluate(
                &snapshot,
                &RouteProtectionConfig::authenticated().degraded_ok(),
                &RouteContext::new("/dashboard"),
            )
            .await;
        assert_eq!(
            lenient,
            GuardOutcome::Allow {
                mode: AccessMode::Reduced
            }
        );
    }

    #[tokio::test]
    async fn test_custom_validator_runs_last_and_overrides_message() {
        let guard = RouteGuard::default();
        let config = RouteProtectionConfig::authenticated().validator(
            FnValidator::new(|user: &AuthUser, _: &RouteContext| user.email.ends_with("@corp.io"))
                .with_message("Only corporate accounts"),
        );
        let outcome = guard
            .evaluate(
                &snapshot_for(Some(user(UserRole::Freelancer)), AuthPhase::Ready),
                &config,
                &RouteContext::new("/billing"),
            )
            .await;
        let denial = outcome.denial().unwrap();
        assert_eq!(denial.reason, DenialReason::CustomValidationFailed);
        assert_eq!(denial.message, "Only corporate accounts");
    }

    #[tokio::test]
    async fn test_redirect_override_wins() {
        let guard = RouteGuard::default();
        let config = RouteProtectionConfig::authenticated()
            .roles([UserRole::Admin])
            .redirect("/dashboard");
        let outcome = guard
            .evaluate(
                &snapshot_for(Some(user(UserRole::TeamMember)), AuthPhase::Ready),
                &config,
                &RouteContext::new("/admin"),
            )
            .await;
        assert_eq!(outcome.denial().unwrap().redirect_to, "/dashboard");
    }

    #[test]
    fn test_outcome_wire_shape() {
        let json = serde_json::to_value(GuardOutcome::Allow {
            mode: AccessMode::Reduced,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "outcome": "allow", "mode": "reduced" })
        );
    }
}
