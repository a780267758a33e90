//! Tasks, projects and proposals as seen by one signed-in session.
//!
//! Writes are optimistic: the local list changes immediately and is rolled
//! back to its exact previous state when the backend rejects the write.

pub mod errors;
pub mod models;
pub mod optimistic;
pub mod proposals;
pub mod store;
pub mod validation;

pub use errors::{WorkspaceError, WorkspaceResult};
pub use models::{
    NewProject, NewProposal, NewTask, Project, ProjectPatch, ProjectStatus, ProposalDecision,
    ProposalForm, ProposalId, ProposalStatus, Task, TaskFilter, TaskId, TaskPatch, TaskPriority,
    TaskProposal, TaskStatus, TaskWithContext,
};
pub use optimistic::OptimisticCell;
pub use proposals::ProposalService;
pub use store::{ProjectStore, TaskStore};
pub use validation::{ValidationErrors, validate_proposal};
