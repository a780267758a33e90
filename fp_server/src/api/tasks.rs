//! Task endpoints.
//!
//! Writes go through the session's optimistic task store. A rejected write
//! leaves the store exactly as it was and answers with the backend error.

use axum::{
    Extension, Json,
    extract::{Path, Query},
    http::StatusCode,
};
use freelance_portal::{
    AuthUser,
    auth::{Permission, ProjectId, UserId},
    workspace::{
        NewTask, Task, TaskFilter, TaskId, TaskPatch, TaskStatus, TaskWithContext,
        ValidationErrors, WorkspaceError,
    },
};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, PortalSession, workspace_error};
use crate::metrics;

#[derive(Debug, Default, Deserialize)]
pub struct TaskQuery {
    pub project_id: Option<ProjectId>,
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<UserId>,
}

impl From<TaskQuery> for TaskFilter {
    fn from(query: TaskQuery) -> Self {
        TaskFilter {
            project_id: query.project_id,
            assignee_id: query.assignee_id,
            status: query.status,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ContextQuery {
    pub project_id: Option<ProjectId>,
}

fn require(user: &AuthUser, permission: Permission) -> Result<(), ApiError> {
    if user.has_permission(permission) {
        Ok(())
    } else {
        Err(workspace_error(WorkspaceError::PermissionDenied(permission)))
    }
}

/// Client-portal users only see their assigned projects
fn require_project_access(user: &AuthUser, project_id: Option<ProjectId>) -> Result<(), ApiError> {
    match project_id {
        Some(id) if !user.client_portal.can_access_project(&id) => {
            Err(workspace_error(WorkspaceError::NotFound {
                entity: "Project",
                id: id.to_string(),
            }))
        }
        _ => Ok(()),
    }
}

fn write_error(err: WorkspaceError) -> ApiError {
    if matches!(err, WorkspaceError::Backend(_)) {
        metrics::optimistic_reverts_total("task");
    }
    workspace_error(err)
}

/// Make sure the task is in the session's store before a write
async fn ensure_loaded(session: &PortalSession, task_id: TaskId) -> Result<(), ApiError> {
    if session.tasks.get(task_id).await.is_none() {
        session
            .tasks
            .load(&TaskFilter::default())
            .await
            .map_err(workspace_error)?;
    }
    Ok(())
}

/// List tasks matching the query filters.
///
/// # Example
///
/// ```bash
/// curl "http://localhost:8080/api/v1/tasks?status=in_progress" \
///   -H "x-portal-session: <id>"
/// ```
pub async fn list_tasks(
    Extension(session): Extension<Arc<PortalSession>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TaskQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    require_project_access(&user, query.project_id)?;
    let tasks = session
        .tasks
        .load(&query.into())
        .await
        .map_err(workspace_error)?;
    Ok(Json(tasks))
}

/// Tasks joined with project, client and assignee names.
pub async fn tasks_with_context(
    Extension(session): Extension<Arc<PortalSession>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ContextQuery>,
) -> Result<Json<Vec<TaskWithContext>>, ApiError> {
    require_project_access(&user, query.project_id)?;
    let rows = session
        .tasks
        .load_with_context(query.project_id)
        .await
        .map_err(workspace_error)?;
    Ok(Json(rows))
}

/// Create a task.
///
/// # Response
///
/// `201 Created` with the row the backend stored.
pub async fn create_task(
    Extension(session): Extension<Arc<PortalSession>>,
    Extension(user): Extension<AuthUser>,
    Json(task): Json<NewTask>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    require(&user, Permission::ManageTasks)?;
    require_project_access(&user, Some(task.project_id))?;
    if task.title.trim().is_empty() {
        let mut errors = ValidationErrors::default();
        errors.add("title", "Title is required");
        return Err(workspace_error(errors.into()));
    }

    let created = session.tasks.create_task(task).await.map_err(write_error)?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Apply a partial update, such as moving the task to another column.
pub async fn update_task(
    Extension(session): Extension<Arc<PortalSession>>,
    Extension(user): Extension<AuthUser>,
    Path(task_id): Path<TaskId>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<Task>, ApiError> {
    require(&user, Permission::ManageTasks)?;
    ensure_loaded(&session, task_id).await?;
    if patch.is_empty() {
        return session
            .tasks
            .get(task_id)
            .await
            .map(Json)
            .ok_or_else(|| {
                workspace_error(WorkspaceError::NotFound {
                    entity: "Task",
                    id: task_id.to_string(),
                })
            });
    }

    let updated = session
        .tasks
        .update_task(task_id, patch)
        .await
        .map_err(write_error)?;
    Ok(Json(updated))
}

/// Delete a task; `204 No Content` on success.
pub async fn delete_task(
    Extension(session): Extension<Arc<PortalSession>>,
    Extension(user): Extension<AuthUser>,
    Path(task_id): Path<TaskId>,
) -> Result<StatusCode, ApiError> {
    require(&user, Permission::ManageTasks)?;
    ensure_loaded(&session, task_id).await?;
    session
        .tasks
        .delete_task(task_id)
        .await
        .map_err(write_error)?;
    Ok(StatusCode::NO_CONTENT)
}
