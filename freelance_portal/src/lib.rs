//! # Freelance Portal
//!
//! Session, access-control and workspace core of a client-facing project and
//! task management portal backed by a hosted database platform.
//!
//! ## Architecture
//!
//! Signing in is a progressive state machine. Credentials are exchanged first,
//! then the extended profile is loaded; when that second step fails the user
//! continues in a degraded mode with role defaults instead of being locked
//! out:
//!
//! - **Idle**: nobody signed in
//! - **Authenticating**: credentials sent to the auth provider
//! - **Enhancing**: profile, role and permissions being loaded
//! - **Ready**: full user available
//! - **Degraded**: basic user, retry or continue offered
//! - **Error**: authentication failed
//!
//! ## Core Modules
//!
//! - [`auth`]: session state machine and user models
//! - [`guard`]: route protection rules and their evaluation
//! - [`loading`]: progress and recovery actions for the loading screen
//! - [`network`]: connection quality and adaptive timeouts
//! - [`backend`]: platform client traits with REST and in-memory backends
//! - [`workspace`]: optimistic task/project stores and proposals
//! - [`config`]: configuration from the environment

pub mod auth;
pub mod backend;
pub mod config;
pub mod guard;
pub mod loading;
pub mod network;
pub mod workspace;

pub use auth::{AuthPhase, AuthUser, SessionManager, SessionSnapshot};
pub use config::PortalConfig;
pub use guard::{GuardOutcome, RouteGuard, RouteProtectionConfig, RouteTable};
pub use loading::LoadingCoordinator;
pub use network::NetworkMonitor;
