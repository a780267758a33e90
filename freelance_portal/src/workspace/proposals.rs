//! Task-proposal submission and client decisions.

use super::errors::{WorkspaceError, WorkspaceResult};
use super::models::{ProposalDecision, ProposalForm, ProposalId, TaskProposal};
use super::validation::validate_proposal;
use crate::auth::{AuthUser, Permission};
use crate::backend::ProposalRepository;
use chrono::Utc;
use std::sync::Arc;

/// Submits proposals and records client decisions
pub struct ProposalService {
    repo: Arc<dyn ProposalRepository>,
}

impl ProposalService {
    pub fn new(repo: Arc<dyn ProposalRepository>) -> Self {
        Self { repo }
    }

    /// Validate and submit a proposal
    ///
    /// An invalid form is rejected locally and never reaches the backend.
    ///
    /// # Errors
    ///
    /// * `WorkspaceError::PermissionDenied` - Author cannot create proposals
    /// * `WorkspaceError::Validation` - Field problems, keyed by field
    /// * `WorkspaceError::Backend` - Insert failed
    pub async fn submit(
        &self,
        author: &AuthUser,
        form: &ProposalForm,
    ) -> WorkspaceResult<TaskProposal> {
        if !author.has_permission(Permission::CreateProposals) {
            return Err(WorkspaceError::PermissionDenied(Permission::CreateProposals));
        }

        let proposal = validate_proposal(form, author.id, Utc::now().date_naive())?;
        let created = self.repo.insert_proposal(&proposal).await?;
        log::info!(
            "Proposal {} submitted for project {}",
            created.id,
            created.project_id
        );
        Ok(created)
    }

    /// Accept, reject or send back a proposal
    pub async fn respond(
        &self,
        reviewer: &AuthUser,
        proposal_id: ProposalId,
        decision: ProposalDecision,
    ) -> WorkspaceResult<TaskProposal> {
        if !reviewer.has_permission(Permission::ApproveProposals) {
            return Err(WorkspaceError::PermissionDenied(
                Permission::ApproveProposals,
            ));
        }

        let updated = self
            .repo
            .set_proposal_status(proposal_id, decision.resulting_status())
            .await?;
        log::info!("Proposal {} is now {:?}", proposal_id, updated.status);
        Ok(updated)
    }
}
