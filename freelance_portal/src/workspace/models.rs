//! Task, project and proposal records.
//!
//! Field names match the backend's tables; they are a contract with the
//! backend rather than a local design choice.

use crate::auth::{ProjectId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task ID type
pub type TaskId = Uuid;

/// Proposal ID type
pub type ProposalId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    InReview,
    Done,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assignee_id: Option<UserId>,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert shape for a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub project_id: ProjectId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assignee_id: Option<UserId>,
    pub due_date: Option<NaiveDate>,
}

impl NewTask {
    /// Local placeholder shown until the backend returns the canonical row
    pub fn placeholder(&self, temp_id: TaskId) -> Task {
        let now = Utc::now();
        Task {
            id: temp_id,
            project_id: self.project_id,
            title: self.title.clone(),
            description: self.description.clone(),
            status: self.status,
            priority: self.priority,
            assignee_id: self.assignee_id,
            due_date: self.due_date,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; `None` leaves the column untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the patch to a local copy
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = Some(description.clone());
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(assignee) = self.assignee_id {
            task.assignee_id = Some(assignee);
        }
        if let Some(due) = self.due_date {
            task.due_date = Some(due);
        }
        task.updated_at = Utc::now();
    }
}

/// Filters chained onto a task select
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    pub project_id: Option<ProjectId>,
    pub assignee_id: Option<UserId>,
    pub status: Option<TaskStatus>,
}

impl TaskFilter {
    pub fn project(project_id: ProjectId) -> Self {
        Self {
            project_id: Some(project_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.project_id.is_none_or(|p| p == task.project_id)
            && self.assignee_id.is_none_or(|a| task.assignee_id == Some(a))
            && self.status.is_none_or(|s| s == task.status)
    }
}

/// Row returned by the tasks-with-context RPC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskWithContext {
    #[serde(flatten)]
    pub task: Task,
    pub project_name: String,
    pub client_name: Option<String>,
    pub assignee_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Planning,
    Active,
    OnHold,
    Completed,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub description: Option<String>,
    pub client_id: Option<UserId>,
    pub owner_id: UserId,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub client_id: Option<UserId>,
    pub owner_id: UserId,
}

impl NewProject {
    pub fn placeholder(&self, temp_id: ProjectId) -> Project {
        let now = Utc::now();
        Project {
            id: temp_id,
            name: self.name.clone(),
            description: self.description.clone(),
            client_id: self.client_id,
            owner_id: self.owner_id,
            status: ProjectStatus::Planning,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
}

impl ProjectPatch {
    pub fn apply_to(&self, project: &mut Project) {
        if let Some(name) = &self.name {
            project.name = name.clone();
        }
        if let Some(description) = &self.description {
            project.description = Some(description.clone());
        }
        if let Some(status) = self.status {
            project.status = status;
        }
        project.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Submitted,
    Accepted,
    Rejected,
    RevisionRequested,
}

/// Client's answer to a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalDecision {
    Accept,
    Reject,
    RequestRevision,
}

impl ProposalDecision {
    pub fn resulting_status(self) -> ProposalStatus {
        match self {
            ProposalDecision::Accept => ProposalStatus::Accepted,
            ProposalDecision::Reject => ProposalStatus::Rejected,
            ProposalDecision::RequestRevision => ProposalStatus::RevisionRequested,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProposal {
    pub id: ProposalId,
    pub project_id: ProjectId,
    pub author_id: UserId,
    pub title: String,
    pub description: String,
    pub estimated_hours: f64,
    pub budget: Option<f64>,
    pub due_date: Option<NaiveDate>,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
}

/// Raw proposal form as submitted by the user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProposalForm {
    pub project_id: Option<ProjectId>,
    pub title: String,
    pub description: String,
    pub estimated_hours: Option<f64>,
    pub budget: Option<f64>,
    pub due_date: Option<NaiveDate>,
}

/// Proposal that passed local validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProposal {
    pub project_id: ProjectId,
    pub author_id: UserId,
    pub title: String,
    pub description: String,
    pub estimated_hours: f64,
    pub budget: Option<f64>,
    pub due_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(project_id: ProjectId) -> Task {
        NewTask {
            project_id,
            title: "Wireframes".to_string(),
            description: None,
            status: TaskStatus::Todo,
            priority: TaskPriority::Medium,
            assignee_id: None,
            due_date: None,
        }
        .placeholder(Uuid::new_v4())
    }

    #[test]
    fn test_patch_applies_only_set_fields() {
        let mut t = task(Uuid::new_v4());
        let before = t.clone();
        TaskPatch::status(TaskStatus::Done).apply_to(&mut t);

        assert_eq!(t.status, TaskStatus::Done);
        assert_eq!(t.title, before.title);
        assert_eq!(t.priority, before.priority);
    }

    #[test]
    fn test_empty_patch() {
        assert!(TaskPatch::default().is_empty());
        assert!(!TaskPatch::status(TaskStatus::Blocked).is_empty());
    }

    #[test]
    fn test_filter_matches() {
        let project = Uuid::new_v4();
        let t = task(project);
        assert!(TaskFilter::default().matches(&t));
        assert!(TaskFilter::project(project).matches(&t));
        assert!(!TaskFilter::project(Uuid::new_v4()).matches(&t));

        let by_status = TaskFilter {
            status: Some(TaskStatus::Done),
            ..TaskFilter::default()
        };
        assert!(!by_status.matches(&t));
    }

    #[test]
    fn test_patch_serializes_sparse() {
        let json = serde_json::to_value(TaskPatch::status(TaskStatus::InReview)).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "in_review" }));
    }

    #[test]
    fn test_decision_status() {
        assert_eq!(
            ProposalDecision::RequestRevision.resulting_status(),
            ProposalStatus::RevisionRequested
        );
    }
}
