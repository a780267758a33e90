//! Portal configuration.
//!
//! Provides configuration structures for the session manager, the backend
//! client and the guard's redirect targets.

use crate::auth::UserRole;
use crate::guard::GuardRoutes;
use std::{env, str::FromStr, time::Duration};

/// Session manager behaviour
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Fall back to a basic user when the profile cannot be loaded
    pub allow_basic_fallback: bool,

    /// Role given to the basic fallback user
    pub default_role: UserRole,

    /// Profile fetch attempts per enhancement, including the first
    pub enhancement_attempts: u32,

    /// Delay before the second attempt; doubles for each further attempt
    pub retry_base_delay: Duration,

    /// Upper bound for a single backoff delay (before jitter)
    pub retry_max_delay: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            allow_basic_fallback: true,
            default_role: UserRole::Freelancer,
            enhancement_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(4),
        }
    }
}

/// Hosted platform connection settings
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Project URL of the hosted platform
    pub url: String,

    /// Public (anon) API key sent with every request
    pub anon_key: String,

    /// Transport-level timeout for a single HTTP request
    pub request_timeout: Duration,

    /// Signing secret for tokens issued by the in-memory backend
    pub jwt_secret: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".to_string(),
            anon_key: String::new(),
            request_timeout: Duration::from_secs(30),
            jwt_secret: "development-only-jwt-secret".to_string(),
        }
    }
}

/// Complete library configuration
#[derive(Debug, Clone, Default)]
pub struct PortalConfig {
    pub auth: AuthConfig,
    pub backend: BackendConfig,
    pub routes: GuardRoutes,
}

/// Read and parse an environment variable, keeping `default` when it is
/// unset or malformed
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Ignoring invalid value {raw:?} for {key}");
            default
        }),
        Err(_) => default,
    }
}

fn env_bool_or(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                log::warn!("Ignoring invalid value {raw:?} for {key}");
                default
            }
        },
        Err(_) => default,
    }
}

impl PortalConfig {
    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `PORTAL_BACKEND_URL`: Hosted platform URL (default: `http://localhost:54321`)
    /// - `PORTAL_ANON_KEY`: Public API key (default: empty)
    /// - `PORTAL_REQUEST_TIMEOUT_SECS`: HTTP request timeout (default: 30)
    /// - `PORTAL_JWT_SECRET`: Token secret for the in-memory backend
    /// - `PORTAL_ALLOW_BASIC_FALLBACK`: Degrade instead of failing (default: true)
    /// - `PORTAL_DEFAULT_ROLE`: Role of the fallback user (default: freelancer)
    /// - `PORTAL_ENHANCEMENT_ATTEMPTS`: Profile fetch attempts (default: 3)
    /// - `PORTAL_RETRY_BASE_DELAY_MS`: First backoff delay (default: 500)
    /// - `PORTAL_LOGIN_ROUTE`: Login page (default: `/login`)
    /// - `PORTAL_UNAUTHORIZED_ROUTE`: Access-denied page (default: `/unauthorized`)
    /// - `PORTAL_CLIENT_PORTAL_ROUTE`: Client landing page (default: `/client-portal`)
    ///
    /// Malformed values are logged and replaced by their defaults.
    ///
    /// # Returns
    ///
    /// * `PortalConfig` - Configuration from environment
    pub fn from_env() -> Self {
        let defaults = Self::development();

        let auth = AuthConfig {
            allow_basic_fallback: env_bool_or(
                "PORTAL_ALLOW_BASIC_FALLBACK",
                defaults.auth.allow_basic_fallback,
            ),
            default_role: env_or("PORTAL_DEFAULT_ROLE", defaults.auth.default_role),
            enhancement_attempts: env_or(
                "PORTAL_ENHANCEMENT_ATTEMPTS",
                defaults.auth.enhancement_attempts,
            )
            .max(1),
            retry_base_delay: Duration::from_millis(env_or(
                "PORTAL_RETRY_BASE_DELAY_MS",
                defaults.auth.retry_base_delay.as_millis() as u64,
            )),
            retry_max_delay: defaults.auth.retry_max_delay,
        };

        let backend = BackendConfig {
            url: env::var("PORTAL_BACKEND_URL").unwrap_or(defaults.backend.url),
            anon_key: env::var("PORTAL_ANON_KEY").unwrap_or(defaults.backend.anon_key),
            request_timeout: Duration::from_secs(env_or(
                "PORTAL_REQUEST_TIMEOUT_SECS",
                defaults.backend.request_timeout.as_secs(),
            )),
            jwt_secret: env::var("PORTAL_JWT_SECRET").unwrap_or(defaults.backend.jwt_secret),
        };

        let routes = GuardRoutes {
            login: env::var("PORTAL_LOGIN_ROUTE").unwrap_or(defaults.routes.login),
            unauthorized: env::var("PORTAL_UNAUTHORIZED_ROUTE")
                .unwrap_or(defaults.routes.unauthorized),
            client_portal: env::var("PORTAL_CLIENT_PORTAL_ROUTE")
                .unwrap_or(defaults.routes.client_portal),
            ..defaults.routes
        };

        Self {
            auth,
            backend,
            routes,
        }
    }

    /// Create a default configuration for development
    ///
    /// Points at a locally running platform stack with fallback enabled.
    pub fn development() -> Self {
        Self {
            auth: AuthConfig::default(),
            backend: BackendConfig::default(),
            routes: GuardRoutes::default(),
        }
    }
}
