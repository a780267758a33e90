//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use freelance_portal::PortalConfig;
use std::net::SocketAddr;
use std::time::Duration;

/// Minimum length of a token secret outside development
const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Where session data comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// Hosted platform over HTTP
    Rest,
    /// In-process tables seeded with demo accounts
    InMemory,
}

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Prometheus scrape address; no exporter when `None`
    pub metrics_bind: Option<SocketAddr>,
    pub backend_mode: BackendMode,
    /// Session, backend and redirect configuration of the portal core
    pub portal: PortalConfig,
    /// Browser sessions idle this long are dropped
    pub session_idle_timeout: Duration,
    /// Upper bound on live browser sessions
    pub max_sessions: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `backend_url_override` - Optional backend URL override (from CLI args)
    /// * `in_memory` - Use the in-memory backend (from CLI args)
    /// * `metrics_override` - Optional metrics bind override (from CLI args)
    ///
    /// # Returns
    ///
    /// * `Result<ServerConfig, ConfigError>` - Loaded configuration or error
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        backend_url_override: Option<String>,
        in_memory: bool,
        metrics_override: Option<SocketAddr>,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(bind) => bind,
            None => parse_env_addr("SERVER_BIND")?.unwrap_or_else(default_bind),
        };

        let metrics_bind = match metrics_override {
            Some(addr) => Some(addr),
            None => parse_env_addr("METRICS_BIND")?,
        };

        let backend_mode = if in_memory || parse_env_or("PORTAL_IN_MEMORY", false) {
            BackendMode::InMemory
        } else {
            BackendMode::Rest
        };

        let mut portal = PortalConfig::from_env();
        if let Some(url) = backend_url_override {
            portal.backend.url = url;
        }

        if backend_mode == BackendMode::Rest && portal.backend.anon_key.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                var: "PORTAL_ANON_KEY".to_string(),
                hint: "Copy the anon key from the platform dashboard, or run with --in-memory"
                    .to_string(),
            });
        }

        Ok(ServerConfig {
            bind,
            metrics_bind,
            backend_mode,
            portal,
            session_idle_timeout: Duration::from_secs(parse_env_or(
                "SESSION_IDLE_TIMEOUT_SECS",
                1800,
            )),
            max_sessions: parse_env_or("MAX_SESSIONS", 10_000),
        })
    }

    /// Validate configuration after loading
    ///
    /// # Returns
    ///
    /// * `Result<(), ConfigError>` - Success or validation error
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.portal.backend.url;
        if self.backend_mode == BackendMode::Rest
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(ConfigError::Invalid {
                var: "PORTAL_BACKEND_URL".to_string(),
                reason: format!("Must be an http(s) URL, got '{url}'"),
            });
        }

        if self.backend_mode == BackendMode::InMemory
            && self.bind.ip().is_unspecified()
            && self.portal.backend.jwt_secret.len() < MIN_JWT_SECRET_LENGTH
        {
            return Err(ConfigError::Invalid {
                var: "PORTAL_JWT_SECRET".to_string(),
                reason: format!(
                    "Must be at least {MIN_JWT_SECRET_LENGTH} characters when listening on all interfaces"
                ),
            });
        }

        if self.max_sessions == 0 {
            return Err(ConfigError::Invalid {
                var: "MAX_SESSIONS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.session_idle_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "SESSION_IDLE_TIMEOUT_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.metrics_bind == Some(self.bind) {
            return Err(ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: format!("Must differ from the server bind address ({})", self.bind),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Helper to parse an optional socket address; malformed values are errors
fn parse_env_addr(key: &str) -> Result<Option<SocketAddr>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map(Some).map_err(|_| ConfigError::Invalid {
            var: key.to_string(),
            reason: format!("'{raw}' is not an IP:PORT address"),
        }),
        Err(_) => Ok(None),
    }
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
