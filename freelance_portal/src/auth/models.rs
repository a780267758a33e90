//! Authentication data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, str::FromStr};
use uuid::Uuid;

/// User ID type
pub type UserId = Uuid;

/// Project ID type
pub type ProjectId = Uuid;

/// Application role resolved from the profile record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Freelancer,
    TeamMember,
    Client,
}

impl UserRole {
    /// Permissions every user with this role holds
    pub fn default_permissions(self) -> BTreeSet<Permission> {
        use Permission::*;
        let granted: &[Permission] = match self {
            UserRole::Admin => &[
                ViewProjects,
                EditProjects,
                ViewTasks,
                ManageTasks,
                CreateProposals,
                ApproveProposals,
                ManageClients,
                ViewReports,
                ManageBilling,
                AdminSettings,
            ],
            UserRole::Freelancer => &[
                ViewProjects,
                EditProjects,
                ViewTasks,
                ManageTasks,
                CreateProposals,
                ManageClients,
                ViewReports,
                ManageBilling,
            ],
            UserRole::TeamMember => &[ViewProjects, ViewTasks, ManageTasks],
            UserRole::Client => &[ViewProjects, ViewTasks, ApproveProposals],
        };
        granted.iter().copied().collect()
    }

    /// Route a user of this role lands on after authentication
    pub fn default_route(self) -> &'static str {
        match self {
            UserRole::Admin => "/admin",
            UserRole::Freelancer | UserRole::TeamMember => "/dashboard",
            UserRole::Client => "/client-portal",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Freelancer => "freelancer",
            UserRole::TeamMember => "team_member",
            UserRole::Client => "client",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "freelancer" => Ok(UserRole::Freelancer),
            "team_member" | "member" => Ok(UserRole::TeamMember),
            "client" => Ok(UserRole::Client),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Fine-grained capability checked by route guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewProjects,
    EditProjects,
    ViewTasks,
    ManageTasks,
    CreateProposals,
    ApproveProposals,
    ManageClients,
    ViewReports,
    ManageBilling,
    AdminSettings,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::ViewProjects => "view_projects",
            Permission::EditProjects => "edit_projects",
            Permission::ViewTasks => "view_tasks",
            Permission::ManageTasks => "manage_tasks",
            Permission::CreateProposals => "create_proposals",
            Permission::ApproveProposals => "approve_proposals",
            Permission::ManageClients => "manage_clients",
            Permission::ViewReports => "view_reports",
            Permission::ManageBilling => "manage_billing",
            Permission::AdminSettings => "admin_settings",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let permission = match s.trim() {
            "view_projects" => Permission::ViewProjects,
            "edit_projects" => Permission::EditProjects,
            "view_tasks" => Permission::ViewTasks,
            "manage_tasks" => Permission::ManageTasks,
            "create_proposals" => Permission::CreateProposals,
            "approve_proposals" => Permission::ApproveProposals,
            "manage_clients" => Permission::ManageClients,
            "view_reports" => Permission::ViewReports,
            "manage_billing" => Permission::ManageBilling,
            "admin_settings" => Permission::AdminSettings,
            other => return Err(format!("unknown permission: {other}")),
        };
        Ok(permission)
    }
}

/// Extended profile attributes loaded during enhancement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub company: Option<String>,
}

/// Client-portal scoping for restricted users
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPortalAccess {
    pub is_client: bool,
    pub assigned_project_ids: BTreeSet<ProjectId>,
}

impl ClientPortalAccess {
    pub fn can_access_project(&self, project_id: &ProjectId) -> bool {
        !self.is_client || self.assigned_project_ids.contains(project_id)
    }
}

/// Application user resolved from an authentication event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub role: UserRole,
    pub profile: Option<UserProfile>,
    pub permissions: BTreeSet<Permission>,
    pub client_portal: ClientPortalAccess,
}

impl AuthUser {
    /// Minimal user synthesized when the profile could not be loaded
    pub fn basic(id: UserId, email: impl Into<String>, role: UserRole) -> Self {
        Self {
            id,
            email: email.into(),
            role,
            profile: None,
            permissions: role.default_permissions(),
            client_portal: ClientPortalAccess {
                is_client: role == UserRole::Client,
                assigned_project_ids: BTreeSet::new(),
            },
        }
    }

    /// Build the enriched user from the identity and its profile record
    pub fn enriched(identity: &ProviderUser, record: ProfileRecord) -> Self {
        let role = record.role.parse().unwrap_or_else(|e| {
            log::warn!("Profile {} has {e}; falling back to client role", record.id);
            UserRole::Client
        });

        let mut permissions = role.default_permissions();
        for raw in &record.permissions {
            match raw.parse::<Permission>() {
                Ok(permission) => {
                    permissions.insert(permission);
                }
                Err(e) => log::warn!("Ignoring {e} on profile {}", record.id),
            }
        }

        Self {
            id: identity.id,
            email: record.email.unwrap_or_else(|| identity.email.clone()),
            role,
            profile: Some(UserProfile {
                full_name: record.full_name,
                avatar_url: record.avatar_url,
                company: record.company,
            }),
            permissions,
            client_portal: ClientPortalAccess {
                is_client: record.is_client || role == UserRole::Client,
                assigned_project_ids: record.assigned_project_ids.into_iter().collect(),
            },
        }
    }

    /// True for the fallback user built without a profile
    pub fn is_basic(&self) -> bool {
        self.profile.is_none()
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn display_name(&self) -> &str {
        self.profile
            .as_ref()
            .and_then(|p| p.full_name.as_deref())
            .unwrap_or(&self.email)
    }
}

/// Session tokens issued by the auth provider
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Resolved user plus the provider's tokens
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: AuthUser,
    pub tokens: SessionTokens,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Identity as reported by the auth provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub email_confirmed: bool,
}

/// Session as reported by the auth provider, before enhancement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSession {
    pub user: ProviderUser,
    pub tokens: SessionTokens,
    pub expires_at: DateTime<Utc>,
}

/// Row of the backend's `profiles` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: UserId,
    pub email: Option<String>,
    pub role: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub company: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub is_client: bool,
    #[serde(default)]
    pub assigned_project_ids: Vec<ProjectId>,
}

/// Email/password sign-in request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Account registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub company: Option<String>,
    pub role: UserRole,
}

/// Result of a sign-up call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignUpOutcome {
    /// Provider returned a live session immediately
    SignedIn,
    /// Provider sent a confirmation email first
    ConfirmationRequired,
}

/// Authentication state change pushed by the provider
#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(ProviderSession),
    TokenRefreshed(ProviderSession),
    UserUpdated,
    SignedOut,
}

/// Result of a sign-out; local state is always cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SignOutOutcome {
    /// Whether the remote provider confirmed the sign-out
    pub remote_confirmed: bool,
}
