//! Route-specific access checks beyond roles and permissions.

use super::RouteContext;
use crate::auth::AuthUser;
use async_trait::async_trait;
use std::fmt;

/// Custom check run after the built-in guard checks pass
#[async_trait]
pub trait AccessValidator: Send + Sync {
    /// Whether `user` may enter the route described by `context`
    async fn validate(&self, user: &AuthUser, context: &RouteContext) -> bool;

    /// Message shown when the check fails
    fn denial_message(&self) -> Option<String> {
        None
    }
}

/// Synchronous validator built from a closure
pub struct FnValidator<F> {
    check: F,
    message: Option<String>,
}

impl<F> FnValidator<F>
where
    F: Fn(&AuthUser, &RouteContext) -> bool + Send + Sync,
{
    pub fn new(check: F) -> Self {
        Self {
            check,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<F> fmt::Debug for FnValidator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnValidator")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> AccessValidator for FnValidator<F>
where
    F: Fn(&AuthUser, &RouteContext) -> bool + Send + Sync,
{
    async fn validate(&self, user: &AuthUser, context: &RouteContext) -> bool {
        (self.check)(user, context)
    }

    fn denial_message(&self) -> Option<String> {
        self.message.clone()
    }
}
