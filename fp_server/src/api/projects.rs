//! Project endpoints.

use axum::{Extension, Json, extract::Path, http::StatusCode};
use freelance_portal::{
    AuthUser,
    auth::{Permission, ProjectId, UserId},
    workspace::{NewProject, Project, ProjectPatch, ValidationErrors, WorkspaceError},
};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, PortalSession, workspace_error};
use crate::metrics;

/// Body of a project creation; the caller becomes the owner
#[derive(Debug, Deserialize)]
pub struct NewProjectPayload {
    pub name: String,
    pub description: Option<String>,
    pub client_id: Option<UserId>,
}

fn require_edit(user: &AuthUser) -> Result<(), ApiError> {
    if user.has_permission(Permission::EditProjects) {
        Ok(())
    } else {
        Err(workspace_error(WorkspaceError::PermissionDenied(
            Permission::EditProjects,
        )))
    }
}

fn write_error(err: WorkspaceError) -> ApiError {
    if matches!(err, WorkspaceError::Backend(_)) {
        metrics::optimistic_reverts_total("project");
    }
    workspace_error(err)
}

async fn ensure_loaded(session: &PortalSession, project_id: ProjectId) -> Result<(), ApiError> {
    let known = session
        .projects
        .projects()
        .await
        .iter()
        .any(|p| p.id == project_id);
    if !known {
        session.projects.load().await.map_err(workspace_error)?;
    }
    Ok(())
}

/// List the projects visible to the caller.
///
/// Client-portal users only get their assigned projects.
pub async fn list_projects(
    Extension(session): Extension<Arc<PortalSession>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Project>>, ApiError> {
    let projects = session.projects.load().await.map_err(workspace_error)?;
    let visible = projects
        .into_iter()
        .filter(|p| user.client_portal.can_access_project(&p.id))
        .collect();
    Ok(Json(visible))
}

/// Create a project owned by the caller; `201 Created` on success.
pub async fn create_project(
    Extension(session): Extension<Arc<PortalSession>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<NewProjectPayload>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    require_edit(&user)?;
    let name = payload.name.trim();
    if name.is_empty() {
        let mut errors = ValidationErrors::default();
        errors.add("name", "Project name is required");
        return Err(workspace_error(errors.into()));
    }

    let project = NewProject {
        name: name.to_string(),
        description: payload.description,
        client_id: payload.client_id,
        owner_id: user.id,
    };
    let created = session
        .projects
        .create_project(project)
        .await
        .map_err(write_error)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_project(
    Extension(session): Extension<Arc<PortalSession>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<ProjectId>,
    Json(patch): Json<ProjectPatch>,
) -> Result<Json<Project>, ApiError> {
    require_edit(&user)?;
    ensure_loaded(&session, project_id).await?;
    let updated = session
        .projects
        .update_project(project_id, patch)
        .await
        .map_err(write_error)?;
    Ok(Json(updated))
}

pub async fn archive_project(
    Extension(session): Extension<Arc<PortalSession>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<ProjectId>,
) -> Result<Json<Project>, ApiError> {
    require_edit(&user)?;
    ensure_loaded(&session, project_id).await?;
    let archived = session
        .projects
        .archive_project(project_id)
        .await
        .map_err(write_error)?;
    Ok(Json(archived))
}
