//! Task and project stores backed by optimistic cells.

use super::errors::{WorkspaceError, WorkspaceResult};
use super::models::{
    NewProject, NewTask, Project, ProjectPatch, ProjectStatus, Task, TaskFilter, TaskId,
    TaskPatch, TaskStatus, TaskWithContext,
};
use super::optimistic::OptimisticCell;
use crate::auth::ProjectId;
use crate::backend::{ProjectRepository, TaskRepository};
use std::sync::Arc;
use uuid::Uuid;

/// Locally visible task list for one session
pub struct TaskStore {
    repo: Arc<dyn TaskRepository>,
    tasks: OptimisticCell<Vec<Task>>,
}

impl TaskStore {
    pub fn new(repo: Arc<dyn TaskRepository>) -> Self {
        Self {
            repo,
            tasks: OptimisticCell::new(Vec::new()),
        }
    }

    /// Visible tasks, including optimistic changes in flight
    pub async fn tasks(&self) -> Vec<Task> {
        self.tasks.get().await
    }

    pub async fn get(&self, task_id: TaskId) -> Option<Task> {
        self.tasks
            .with(|tasks| tasks.iter().find(|t| t.id == task_id).cloned())
            .await
    }

    pub fn revert_count(&self) -> u64 {
        self.tasks.revert_count()
    }

    /// Replace the list with the backend's rows matching `filter`
    pub async fn load(&self, filter: &TaskFilter) -> WorkspaceResult<Vec<Task>> {
        let tasks = self.repo.list_tasks(filter).await?;
        self.tasks.replace(tasks.clone()).await;
        Ok(tasks)
    }

    /// Load tasks joined with project, client and assignee names
    pub async fn load_with_context(
        &self,
        project_id: Option<ProjectId>,
    ) -> WorkspaceResult<Vec<TaskWithContext>> {
        let rows = self.repo.tasks_with_context(project_id).await?;
        self.tasks
            .replace(rows.iter().map(|r| r.task.clone()).collect())
            .await;
        Ok(rows)
    }

    /// Insert a task, showing a placeholder until the backend answers
    pub async fn create_task(&self, task: NewTask) -> WorkspaceResult<Task> {
        let temp_id = Uuid::new_v4();
        let placeholder = task.placeholder(temp_id);

        self.tasks
            .mutate(
                |tasks| tasks.push(placeholder),
                self.repo.insert_task(&task),
                |tasks, canonical: &Task| {
                    if let Some(slot) = tasks.iter_mut().find(|t| t.id == temp_id) {
                        *slot = canonical.clone();
                    }
                },
            )
            .await
            .inspect_err(|e| log::warn!("Reverted task creation: {}", e))
            .map_err(WorkspaceError::from)
    }

    pub async fn update_task(&self, task_id: TaskId, patch: TaskPatch) -> WorkspaceResult<Task> {
        if self.get(task_id).await.is_none() {
            return Err(WorkspaceError::NotFound {
                entity: "Task",
                id: task_id.to_string(),
            });
        }

        self.tasks
            .mutate(
                |tasks| {
                    if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
                        patch.apply_to(task);
                    }
                },
                self.repo.update_task(task_id, &patch),
                |tasks, canonical: &Task| {
                    if let Some(slot) = tasks.iter_mut().find(|t| t.id == task_id) {
                        *slot = canonical.clone();
                    }
                },
            )
            .await
            .inspect_err(|e| log::warn!("Reverted update of task {}: {}", task_id, e))
            .map_err(WorkspaceError::from)
    }

    /// Move a task to another column of the board
    pub async fn set_status(&self, task_id: TaskId, status: TaskStatus) -> WorkspaceResult<Task> {
        self.update_task(task_id, TaskPatch::status(status)).await
    }

    pub async fn delete_task(&self, task_id: TaskId) -> WorkspaceResult<()> {
        if self.get(task_id).await.is_none() {
            return Err(WorkspaceError::NotFound {
                entity: "Task",
                id: task_id.to_string(),
            });
        }

        self.tasks
            .mutate(
                |tasks| tasks.retain(|t| t.id != task_id),
                self.repo.delete_task(task_id),
                |_, _| {},
            )
            .await
            .inspect_err(|e| log::warn!("Reverted deletion of task {}: {}", task_id, e))
            .map_err(WorkspaceError::from)
    }
}

/// Locally visible project list for one session
pub struct ProjectStore {
    repo: Arc<dyn ProjectRepository>,
    projects: OptimisticCell<Vec<Project>>,
}

impl ProjectStore {
    pub fn new(repo: Arc<dyn ProjectRepository>) -> Self {
        Self {
            repo,
            projects: OptimisticCell::new(Vec::new()),
        }
    }

    pub async fn projects(&self) -> Vec<Project> {
        self.projects.get().await
    }

    pub fn revert_count(&self) -> u64 {
        self.projects.revert_count()
    }

    pub async fn load(&self) -> WorkspaceResult<Vec<Project>> {
        let projects = self.repo.list_projects().await?;
        self.projects.replace(projects.clone()).await;
        Ok(projects)
    }

    pub async fn create_project(&self, project: NewProject) -> WorkspaceResult<Project> {
        let temp_id = Uuid::new_v4();
        let placeholder = project.placeholder(temp_id);

        self.projects
            .mutate(
                |projects| projects.insert(0, placeholder),
                self.repo.insert_project(&project),
                |projects, canonical: &Project| {
                    if let Some(slot) = projects.iter_mut().find(|p| p.id == temp_id) {
                        *slot = canonical.clone();
                    }
                },
            )
            .await
            .inspect_err(|e| log::warn!("Reverted project creation: {}", e))
            .map_err(WorkspaceError::from)
    }

    pub async fn update_project(
        &self,
        project_id: ProjectId,
        patch: ProjectPatch,
    ) -> WorkspaceResult<Project> {
        let known = self
            .projects
            .with(|projects| projects.iter().any(|p| p.id == project_id))
            .await;
        if !known {
            return Err(WorkspaceError::NotFound {
                entity: "Project",
                id: project_id.to_string(),
            });
        }

        self.projects
            .mutate(
                |projects| {
                    if let Some(project) = projects.iter_mut().find(|p| p.id == project_id) {
                        patch.apply_to(project);
                    }
                },
                self.repo.update_project(project_id, &patch),
                |projects, canonical: &Project| {
                    if let Some(slot) = projects.iter_mut().find(|p| p.id == project_id) {
                        *slot = canonical.clone();
                    }
                },
            )
            .await
            .inspect_err(|e| log::warn!("Reverted update of project {}: {}", project_id, e))
            .map_err(WorkspaceError::from)
    }

    pub async fn archive_project(&self, project_id: ProjectId) -> WorkspaceResult<Project> {
        self.update_project(
            project_id,
            ProjectPatch {
                status: Some(ProjectStatus::Archived),
                ..ProjectPatch::default()
            },
        )
        .await
    }
}
