//! Task-proposal endpoints.
//!
//! Forms are validated before anything is sent; an invalid form answers
//! `422 Unprocessable Entity` with one message per offending field.

use axum::{Extension, Json, extract::Path, http::StatusCode};
use freelance_portal::{
    AuthUser,
    workspace::{ProposalDecision, ProposalForm, ProposalId, TaskProposal},
};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, PortalSession, workspace_error};

#[derive(Debug, Deserialize)]
pub struct DecisionPayload {
    pub decision: ProposalDecision,
}

/// Submit a proposal for a project.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/v1/proposals \
///   -H "x-portal-session: <id>" -H "Content-Type: application/json" \
///   -d '{"project_id": "<uuid>", "title": "Checkout flow", "description": "...", "estimated_hours": 12}'
/// ```
///
/// # Errors
///
/// - `403 Forbidden`: Caller cannot create proposals
/// - `422 Unprocessable Entity`: Field problems in `fields`
pub async fn submit_proposal(
    Extension(session): Extension<Arc<PortalSession>>,
    Extension(user): Extension<AuthUser>,
    Json(form): Json<ProposalForm>,
) -> Result<(StatusCode, Json<TaskProposal>), ApiError> {
    let proposal = session
        .proposals
        .submit(&user, &form)
        .await
        .map_err(workspace_error)?;
    Ok((StatusCode::CREATED, Json(proposal)))
}

/// Accept, reject or request a revision of a proposal.
pub async fn respond_to_proposal(
    Extension(session): Extension<Arc<PortalSession>>,
    Extension(user): Extension<AuthUser>,
    Path(proposal_id): Path<ProposalId>,
    Json(payload): Json<DecisionPayload>,
) -> Result<Json<TaskProposal>, ApiError> {
    let proposal = session
        .proposals
        .respond(&user, proposal_id, payload.decision)
        .await
        .map_err(workspace_error)?;
    Ok(Json(proposal))
}
