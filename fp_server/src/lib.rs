//! HTTP gateway for the freelance client portal.
//!
//! Each browser session gets its own session state machine, task and project
//! stores, keyed by the `x-portal-session` header.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
