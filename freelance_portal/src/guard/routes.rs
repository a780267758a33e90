//! Path to protection-rule mapping.

use super::{PermissionMode, RouteProtectionConfig};
use crate::auth::{Permission, UserRole};

/// Longest-prefix table of route protection rules
///
/// A prefix matches a path when they are equal or the path continues with a
/// `/` after the prefix, so `/projects` covers `/projects/42` but not
/// `/projectsarchive`. Paths matching nothing require authentication.
#[derive(Debug, Clone)]
pub struct RouteTable {
    entries: Vec<(String, RouteProtectionConfig)>,
    fallback: RouteProtectionConfig,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(RouteProtectionConfig::authenticated())
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return path == "/";
    }
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/') || rest.starts_with('?'))
}

impl RouteTable {
    pub fn new(fallback: RouteProtectionConfig) -> Self {
        Self {
            entries: Vec::new(),
            fallback,
        }
    }

    /// Add or replace the rules for a prefix
    pub fn insert(&mut self, prefix: impl Into<String>, config: RouteProtectionConfig) {
        let prefix = prefix.into();
        let prefix = match prefix.trim_end_matches('/') {
            "" => "/".to_string(),
            trimmed => trimmed.to_string(),
        };
        match self.entries.iter_mut().find(|(p, _)| *p == prefix) {
            Some(entry) => entry.1 = config,
            None => self.entries.push((prefix, config)),
        }
    }

    pub fn with(mut self, prefix: impl Into<String>, config: RouteProtectionConfig) -> Self {
        self.insert(prefix, config);
        self
    }

    /// Rules for `path`, from the longest matching prefix
    pub fn lookup(&self, path: &str) -> &RouteProtectionConfig {
        self.entries
            .iter()
            .filter(|(prefix, _)| prefix_matches(prefix, path))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, config)| config)
            .unwrap_or(&self.fallback)
    }

    /// The portal's page routes
    pub fn portal_defaults() -> Self {
        let internal = [UserRole::Admin, UserRole::Freelancer, UserRole::TeamMember];

        Self::default()
            .with("/", RouteProtectionConfig::public())
            .with("/login", RouteProtectionConfig::public())
            .with("/signup", RouteProtectionConfig::public())
            .with("/reset-password", RouteProtectionConfig::public())
            .with("/unauthorized", RouteProtectionConfig::public())
            .with(
                "/dashboard",
                RouteProtectionConfig::authenticated()
                    .roles(internal)
                    .degraded_ok(),
            )
            .with(
                "/projects",
                RouteProtectionConfig::authenticated()
                    .permissions([Permission::ViewProjects], PermissionMode::All)
                    .degraded_ok(),
            )
            .with(
                "/tasks",
                RouteProtectionConfig::authenticated()
                    .permissions([Permission::ViewTasks], PermissionMode::All)
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
            .with(
                "/reports",
                RouteProtectionConfig::authenticated()
                    .roles([UserRole::Admin, UserRole::Freelancer])
                    .permissions([Permission::ViewReports], PermissionMode::All),
            )
            .with(
                "/admin",
                RouteProtectionConfig::authenticated()
                    .roles([UserRole::Admin])
                    .permissions([Permission::AdminSettings], PermissionMode::All),
            )
            .with(
                "/client-portal",
                RouteProtectionConfig::authenticated()
                    .roles([UserRole::Client, UserRole::Admin])
                    .client_portal()
                    .degraded_ok(),
            )
    }
}
