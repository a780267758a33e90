//! Progressive authentication and session management.
//!
//! Signing in is split into phases so the interface can react to each one:
//! - `authenticating`: credentials are exchanged with the auth provider
//! - `enhancing`: the extended profile (role, permissions, client-portal
//!   scope) is fetched, with retries and an adaptive timeout
//! - `ready`: the enriched user is available
//! - `degraded`: the profile could not be loaded and a basic user with role
//!   defaults stands in until a retry succeeds or the user accepts it
//! - `error`: authentication failed, or enhancement failed with fallback off
//!
//! ## Example
//!
//! ```no_run
//! use freelance_portal::auth::{Credentials, SessionManager};
//! use freelance_portal::backend::MemoryBackend;
//! use freelance_portal::config::AuthConfig;
//! use freelance_portal::network::NetworkMonitor;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(MemoryBackend::with_demo_data("secret").await);
//!     let sessions = SessionManager::new(
//!         backend.clone(),
//!         backend,
//!         Arc::new(NetworkMonitor::new()),
//!         AuthConfig::default(),
//!     );
//!
//!     let snapshot = sessions
//!         .sign_in(Credentials {
//!             email: "freelancer@portal.local".to_string(),
//!             password: "freelancer-password".to_string(),
//!         })
//!         .await?;
//!     println!("Signed in, phase {}", snapshot.phase);
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod models;
pub mod state;

pub use errors::{AuthError, AuthResult};
pub use manager::{MIN_PASSWORD_LENGTH, SessionManager};
pub use models::{
    AuthEvent, AuthSession, AuthUser, ClientPortalAccess, Credentials, Permission, ProfileRecord,
    ProjectId, ProviderSession, ProviderUser, SessionTokens, SignOutOutcome, SignUpOutcome,
    SignUpRequest, UserId, UserProfile, UserRole,
};
pub use state::{AuthPhase, SessionSnapshot};

pub use crate::config::AuthConfig;
