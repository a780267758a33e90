//! Remote backend boundary.
//!
//! The hosted platform is consumed through a small set of traits so the
//! session manager and the workspace stores never depend on a concrete
//! transport. Two implementations ship with the crate:
//!
//! - [`RestBackend`]: talks to the platform's auth (`/auth/v1`) and table
//!   (`/rest/v1`) endpoints over HTTP
//! - [`MemoryBackend`]: in-process tables for local development and tests
//!
//! Table and column names are a contract with the backend.

pub mod errors;
pub mod memory;
pub mod rest;

pub use errors::{BackendError, BackendResult};
pub use memory::MemoryBackend;
pub use rest::RestBackend;

use async_trait::async_trait;

use crate::auth::{ProfileRecord, ProjectId, ProviderSession, SignUpOutcome, SignUpRequest, UserId};
use crate::workspace::{
    NewProject, NewProposal, NewTask, Project, ProjectPatch, ProposalId, ProposalStatus, Task,
    TaskFilter, TaskId, TaskPatch, TaskProposal, TaskWithContext,
};

/// Auth sub-API of the hosted platform
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Exchange email and password for a session
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> BackendResult<ProviderSession>;

    /// Register a new account
    async fn sign_up(&self, request: &SignUpRequest) -> BackendResult<SignUpOutcome>;

    /// Send a password-reset email
    async fn reset_password_for_email(&self, email: &str) -> BackendResult<()>;

    /// Session the provider already holds, if any
    async fn get_session(&self) -> BackendResult<Option<ProviderSession>>;

    /// Exchange a refresh token for new tokens
    async fn refresh_session(&self, refresh_token: &str) -> BackendResult<ProviderSession>;

    /// Revoke the session remotely
    async fn sign_out(&self, access_token: &str) -> BackendResult<()>;
}

/// Extended profile records
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Fetch the profile row for a user
    async fn fetch_profile(&self, user_id: UserId) -> BackendResult<ProfileRecord>;
}

/// Task table operations
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Select tasks matching a filter
    async fn list_tasks(&self, filter: &TaskFilter) -> BackendResult<Vec<Task>>;

    /// Tasks joined with project/client/assignee names (server-side function)
    async fn tasks_with_context(
        &self,
        project_id: Option<ProjectId>,
    ) -> BackendResult<Vec<TaskWithContext>>;

    /// Insert a task and return the canonical row
    async fn insert_task(&self, task: &NewTask) -> BackendResult<Task>;

    /// Update a task and return the canonical row
    async fn update_task(&self, task_id: TaskId, patch: &TaskPatch) -> BackendResult<Task>;

    /// Delete a task
    async fn delete_task(&self, task_id: TaskId) -> BackendResult<()>;
}

/// Project table operations
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn list_projects(&self) -> BackendResult<Vec<Project>>;

    async fn insert_project(&self, project: &NewProject) -> BackendResult<Project>;

    async fn update_project(
        &self,
        project_id: ProjectId,
        patch: &ProjectPatch,
    ) -> BackendResult<Project>;
}

/// Task-proposal table operations
#[async_trait]
pub trait ProposalRepository: Send + Sync {
    async fn insert_proposal(&self, proposal: &NewProposal) -> BackendResult<TaskProposal>;

    async fn set_proposal_status(
        &self,
        proposal_id: ProposalId,
        status: ProposalStatus,
    ) -> BackendResult<TaskProposal>;
}

/// Everything a portal session needs from the platform
pub trait Backend:
    AuthProvider + ProfileRepository + TaskRepository + ProjectRepository + ProposalRepository
{
}

impl<T> Backend for T where
    T: AuthProvider + ProfileRepository + TaskRepository + ProjectRepository + ProposalRepository
{
}
