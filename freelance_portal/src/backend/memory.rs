//! In-process backend for local development and tests.
//!
//! Tables live behind async locks and are shared by every client forked with
//! [`MemoryBackend::fresh_session`]. Access tokens are real HS256 JWTs and
//! every table call verifies the caller's token, so a client that never
//! signed in sees the same `Unauthorized` answer the hosted platform gives.

use super::{
    AuthProvider, BackendError, BackendResult, ProfileRepository, ProjectRepository,
    ProposalRepository, TaskRepository,
};
use crate::auth::{
    ProfileRecord, ProjectId, ProviderSession, ProviderUser, SessionTokens, SignUpOutcome,
    SignUpRequest, UserId, UserRole,
};
use crate::workspace::{
    NewProject, NewProposal, NewTask, Project, ProjectPatch, ProjectStatus, ProposalId,
    ProposalStatus, Task, TaskFilter, TaskId, TaskPatch, TaskProposal, TaskWithContext,
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::sync::RwLock;
use uuid::Uuid;

/// JWT claims for memory-issued access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: UserId,
    pub email: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone)]
struct Account {
    id: UserId,
    email: String,
    password: String,
    email_confirmed: bool,
}

/// Failures and delays injected into backend calls
#[derive(Debug, Default)]
struct Faults {
    profile_latency: Option<Duration>,
    profile_failures_remaining: u32,
    fail_writes: bool,
    sign_out_latency: Option<Duration>,
}

#[derive(Debug)]
struct Tables {
    jwt_secret: String,
    access_token_duration: ChronoDuration,
    auto_confirm: bool,
    accounts: RwLock<HashMap<String, Account>>,
    refresh_tokens: RwLock<HashMap<String, UserId>>,
    profiles: RwLock<HashMap<UserId, ProfileRecord>>,
    projects: RwLock<Vec<Project>>,
    tasks: RwLock<Vec<Task>>,
    proposals: RwLock<HashMap<ProposalId, TaskProposal>>,
    faults: RwLock<Faults>,
    requests: AtomicU64,
}

/// In-memory implementation of every backend trait
pub struct MemoryBackend {
    tables: Arc<Tables>,
    session: Arc<RwLock<Option<ProviderSession>>>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn unavailable() -> BackendError {
    BackendError::Status {
        status: 503,
        message: "Service temporarily unavailable".to_string(),
    }
}

impl MemoryBackend {
    /// Create an empty backend
    ///
    /// # Arguments
    ///
    /// * `jwt_secret` - Secret used to sign and verify access tokens
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            tables: Arc::new(Tables {
                jwt_secret: jwt_secret.into(),
                access_token_duration: ChronoDuration::hours(1),
                auto_confirm: true,
                accounts: RwLock::new(HashMap::new()),
                refresh_tokens: RwLock::new(HashMap::new()),
                profiles: RwLock::new(HashMap::new()),
                projects: RwLock::new(Vec::new()),
                tasks: RwLock::new(Vec::new()),
                proposals: RwLock::new(HashMap::new()),
                faults: RwLock::new(Faults::default()),
                requests: AtomicU64::new(0),
            }),
            session: Arc::new(RwLock::new(None)),
        }
    }

    /// Backend whose sign-ups wait for email confirmation
    pub fn requiring_confirmation(jwt_secret: impl Into<String>) -> Self {
        let mut backend = Self::new(jwt_secret);
        if let Some(tables) = Arc::get_mut(&mut backend.tables) {
            tables.auto_confirm = false;
        }
        backend
    }

    /// A client sharing this one's tables but holding its own session
    pub fn fresh_session(&self) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
            session: Arc::new(RwLock::new(None)),
        }
    }

    /// Backend seeded with one account per role and a sample project
    pub async fn with_demo_data(jwt_secret: impl Into<String>) -> Self {
        let backend = Self::new(jwt_secret);
        let admin = backend
            .seed_user("admin@portal.local", "admin-password", UserRole::Admin, "Portal Admin")
            .await;
        let freelancer = backend
            .seed_user(
                "freelancer@portal.local",
                "freelancer-password",
                UserRole::Freelancer,
                "Frankie Lancer",
            )
            .await;
        backend
            .seed_user("member@portal.local", "member-password", UserRole::TeamMember, "Tam Member")
            .await;
        let client = backend
            .seed_user("client@portal.local", "client-password", UserRole::Client, "Cleo Client")
            .await;

        let project = backend
            .seed_project(freelancer, "Website redesign", Some(client))
            .await;
        backend.assign_project(client, project).await;
        backend.seed_project(admin, "Internal tooling", None).await;
        log::info!("Seeded in-memory backend with demo accounts");
        backend
    }

    /// Create a confirmed account with a profile row
    pub async fn seed_user(
        &self,
        email: &str,
        password: &str,
        role: UserRole,
        full_name: &str,
    ) -> UserId {
        let id = Uuid::new_v4();
        let email = normalize_email(email);
        self.tables.accounts.write().await.insert(
            email.clone(),
            Account {
                id,
                email: email.clone(),
                password: password.to_string(),
                email_confirmed: true,
            },
        );
        self.tables.profiles.write().await.insert(
            id,
            ProfileRecord {
                id,
                email: Some(email),
                role: role.as_str().to_string(),
                full_name: Some(full_name.to_string()),
                avatar_url: None,
                company: None,
                permissions: Vec::new(),
                is_client: role == UserRole::Client,
                assigned_project_ids: Vec::new(),
            },
        );
        id
    }

    pub async fn seed_project(
        &self,
        owner_id: UserId,
        name: &str,
        client_id: Option<UserId>,
    ) -> ProjectId {
        let mut project = NewProject {
            name: name.to_string(),
            description: None,
            client_id,
            owner_id,
        }
        .placeholder(Uuid::new_v4());
        project.status = ProjectStatus::Active;
        let id = project.id;
        self.tables.projects.write().await.push(project);
        id
    }

    pub async fn seed_task(&self, project_id: ProjectId, title: &str) -> TaskId {
        let task = NewTask {
            project_id,
            title: title.to_string(),
            description: None,
            status: crate::workspace::TaskStatus::Todo,
            priority: crate::workspace::TaskPriority::Medium,
            assignee_id: None,
            due_date: None,
        }
        .placeholder(Uuid::new_v4());
        let id = task.id;
        self.tables.tasks.write().await.push(task);
        id
    }

    /// Add a project to a client's assigned set
    pub async fn assign_project(&self, user_id: UserId, project_id: ProjectId) {
        if let Some(profile) = self.tables.profiles.write().await.get_mut(&user_id) {
            if !profile.assigned_project_ids.contains(&project_id) {
                profile.assigned_project_ids.push(project_id);
            }
        }
    }

    /// Replace a stored profile row
    pub async fn put_profile(&self, record: ProfileRecord) {
        self.tables.profiles.write().await.insert(record.id, record);
    }

    /// Delete a profile row so enhancement cannot find it
    pub async fn remove_profile(&self, user_id: UserId) {
        self.tables.profiles.write().await.remove(&user_id);
    }

    pub async fn confirm_email(&self, email: &str) {
        if let Some(account) = self
            .tables
            .accounts
            .write()
            .await
            .get_mut(&normalize_email(email))
        {
            account.email_confirmed = true;
        }
    }

    /// Delay every profile fetch by `latency`
    pub async fn set_profile_latency(&self, latency: Option<Duration>) {
        self.tables.faults.write().await.profile_latency = latency;
    }

    /// Fail the next `count` profile fetches with a retryable 503
    pub async fn fail_profile_fetches(&self, count: u32) {
        self.tables.faults.write().await.profile_failures_remaining = count;
    }

    /// Make every insert/update/delete fail with a retryable 503
    pub async fn fail_writes(&self, fail: bool) {
        self.tables.faults.write().await.fail_writes = fail;
    }

    /// Delay the remote half of sign-out
    pub async fn set_sign_out_latency(&self, latency: Option<Duration>) {
        self.tables.faults.write().await.sign_out_latency = latency;
    }

    /// Number of backend calls received across all forked clients
    pub fn request_count(&self) -> u64 {
        self.tables.requests.load(Ordering::SeqCst)
    }

    pub async fn task_rows(&self) -> Vec<Task> {
        self.tables.tasks.read().await.clone()
    }

    fn count_request(&self) {
        self.tables.requests.fetch_add(1, Ordering::SeqCst);
    }

    fn generate_access_token(&self, account: &Account) -> BackendResult<(String, i64)> {
        let now = Utc::now();
        let exp = (now + self.tables.access_token_duration).timestamp();
        let claims = AccessTokenClaims {
            sub: account.id,
            email: account.email.clone(),
            role: "authenticated".to_string(),
            exp,
            iat: now.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.tables.jwt_secret.as_bytes()),
        )
        .map_err(|e| BackendError::Status {
            status: 500,
            message: format!("Token signing failed: {e}"),
        })?;
        Ok((token, exp))
    }

    /// Verify an access token
    pub fn verify_access_token(&self, token: &str) -> BackendResult<AccessTokenClaims> {
        decode::<AccessTokenClaims>(
            token,
            &DecodingKey::from_secret(self.tables.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|_| BackendError::Unauthorized)
    }

    async fn issue_session(&self, account: &Account) -> BackendResult<ProviderSession> {
        let (access_token, exp) = self.generate_access_token(account)?;
        let refresh_token = Uuid::new_v4().to_string();
        self.tables
            .refresh_tokens
            .write()
            .await
            .insert(refresh_token.clone(), account.id);

        let session = ProviderSession {
            user: ProviderUser {
                id: account.id,
                email: account.email.clone(),
                email_confirmed: account.email_confirmed,
            },
            tokens: SessionTokens {
                access_token,
                refresh_token,
            },
            expires_at: chrono::DateTime::from_timestamp(exp, 0).unwrap_or_else(Utc::now),
        };
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    /// Resolve the caller from the held access token
    async fn caller(&self) -> BackendResult<AccessTokenClaims> {
        let token = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.tokens.access_token.clone())
            .ok_or(BackendError::Unauthorized)?;
        self.verify_access_token(&token)
    }

    /// Projects the caller may see; `None` means unrestricted
    async fn visible_projects(&self, user_id: UserId) -> Option<Vec<ProjectId>> {
        let profiles = self.tables.profiles.read().await;
        match profiles.get(&user_id) {
            Some(profile) if profile.is_client || profile.role == UserRole::Client.as_str() => {
                Some(profile.assigned_project_ids.clone())
            }
            _ => None,
        }
    }

    async fn check_write(&self) -> BackendResult<AccessTokenClaims> {
        let claims = self.caller().await?;
        if self.tables.faults.read().await.fail_writes {
            return Err(unavailable());
        }
        Ok(claims)
    }

    async fn display_name(&self, user_id: Option<UserId>) -> Option<String> {
        let user_id = user_id?;
        self.tables
            .profiles
            .read()
            .await
            .get(&user_id)
            .and_then(|p| p.full_name.clone().or_else(|| p.email.clone()))
    }
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> BackendResult<ProviderSession> {
        self.count_request();
        let account = self
            .tables
            .accounts
            .read()
            .await
            .get(&normalize_email(email))
            .cloned()
            .ok_or(BackendError::InvalidCredentials)?;

        if account.password != password {
            return Err(BackendError::InvalidCredentials);
        }
        if !account.email_confirmed {
            return Err(BackendError::EmailNotConfirmed);
        }

        self.issue_session(&account).await
    }

    async fn sign_up(&self, request: &SignUpRequest) -> BackendResult<SignUpOutcome> {
        self.count_request();
        let email = normalize_email(&request.email);
        let account = {
            let mut accounts = self.tables.accounts.write().await;
            if accounts.contains_key(&email) {
                return Err(BackendError::Status {
                    status: 422,
                    message: "User already registered".to_string(),
                });
            }
            let account = Account {
                id: Uuid::new_v4(),
                email: email.clone(),
                password: request.password.clone(),
                email_confirmed: self.tables.auto_confirm,
            };
            accounts.insert(email.clone(), account.clone());
            account
        };

        self.tables.profiles.write().await.insert(
            account.id,
            ProfileRecord {
                id: account.id,
                email: Some(email),
                role: request.role.as_str().to_string(),
                full_name: Some(request.full_name.clone()),
                avatar_url: None,
                company: request.company.clone(),
                permissions: Vec::new(),
                is_client: request.role == UserRole::Client,
                assigned_project_ids: Vec::new(),
            },
        );

        if account.email_confirmed {
            self.issue_session(&account).await?;
            Ok(SignUpOutcome::SignedIn)
        } else {
            Ok(SignUpOutcome::ConfirmationRequired)
        }
    }

    async fn reset_password_for_email(&self, email: &str) -> BackendResult<()> {
        self.count_request();
        // Unknown addresses succeed too so accounts cannot be enumerated
        log::debug!("Password reset requested for {}", normalize_email(email));
        Ok(())
    }

    async fn get_session(&self) -> BackendResult<Option<ProviderSession>> {
        self.count_request();
        Ok(self.session.read().await.clone())
    }

    async fn refresh_session(&self, refresh_token: &str) -> BackendResult<ProviderSession> {
        self.count_request();
        let user_id = self
            .tables
            .refresh_tokens
            .write()
            .await
            .remove(refresh_token)
            .ok_or(BackendError::Unauthorized)?;

        let account = self
            .tables
            .accounts
            .read()
            .await
            .values()
            .find(|a| a.id == user_id)
            .cloned()
            .ok_or(BackendError::Unauthorized)?;

        self.issue_session(&account).await
    }

    async fn sign_out(&self, access_token: &str) -> BackendResult<()> {
        self.count_request();
        let latency = self.tables.faults.read().await.sign_out_latency;
        let held = self.session.write().await.take();

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let claims = self.verify_access_token(access_token)?;
        if let Some(held) = held {
            self.tables
                .refresh_tokens
                .write()
                .await
                .remove(&held.tokens.refresh_token);
        }
        log::debug!("Revoked session for user {}", claims.sub);
        Ok(())
    }
}

#[async_trait]
impl ProfileRepository for MemoryBackend {
    async fn fetch_profile(&self, user_id: UserId) -> BackendResult<ProfileRecord> {
        self.count_request();
        self.caller().await?;

        let latency = {
            let mut faults = self.tables.faults.write().await;
            if faults.profile_failures_remaining > 0 {
                faults.profile_failures_remaining -= 1;
                return Err(unavailable());
            }
            faults.profile_latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        self.tables
            .profiles
            .read()
            .await
            .get(&user_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound {
                entity: "Profile",
                id: user_id.to_string(),
            })
    }
}

#[async_trait]
impl TaskRepository for MemoryBackend {
    async fn list_tasks(&self, filter: &TaskFilter) -> BackendResult<Vec<Task>> {
        self.count_request();
        let claims = self.caller().await?;
        let visible = self.visible_projects(claims.sub).await;

        Ok(self
            .tables
            .tasks
            .read()
            .await
            .iter()
            .filter(|t| filter.matches(t))
            .filter(|t| visible.as_ref().is_none_or(|v| v.contains(&t.project_id)))
            .cloned()
            .collect())
    }

    async fn tasks_with_context(
        &self,
        project_id: Option<ProjectId>,
    ) -> BackendResult<Vec<TaskWithContext>> {
        let filter = TaskFilter {
            project_id,
            ..TaskFilter::default()
        };
        let tasks = self.list_tasks(&filter).await?;
        let projects = self.tables.projects.read().await.clone();

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let project = projects.iter().find(|p| p.id == task.project_id);
            rows.push(TaskWithContext {
                project_name: project.map(|p| p.name.clone()).unwrap_or_default(),
                client_name: self.display_name(project.and_then(|p| p.client_id)).await,
                assignee_name: self.display_name(task.assignee_id).await,
                task,
            });
        }
        Ok(rows)
    }

    async fn insert_task(&self, task: &NewTask) -> BackendResult<Task> {
        self.count_request();
        self.check_write().await?;

        let exists = self
            .tables
            .projects
            .read()
            .await
            .iter()
            .any(|p| p.id == task.project_id);
        if !exists {
            return Err(BackendError::NotFound {
                entity: "Project",
                id: task.project_id.to_string(),
            });
        }

        let row = task.placeholder(Uuid::new_v4());
        self.tables.tasks.write().await.push(row.clone());
        Ok(row)
    }

    async fn update_task(&self, task_id: TaskId, patch: &TaskPatch) -> BackendResult<Task> {
        self.count_request();
        self.check_write().await?;

        let mut tasks = self.tables.tasks.write().await;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| BackendError::NotFound {
                entity: "Task",
                id: task_id.to_string(),
            })?;
        patch.apply_to(task);
        Ok(task.clone())
    }

    async fn delete_task(&self, task_id: TaskId) -> BackendResult<()> {
        self.count_request();
        self.check_write().await?;

        let mut tasks = self.tables.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|t| t.id != task_id);
        if tasks.len() == before {
            return Err(BackendError::NotFound {
                entity: "Task",
                id: task_id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectRepository for MemoryBackend {
    async fn list_projects(&self) -> BackendResult<Vec<Project>> {
        self.count_request();
        let claims = self.caller().await?;
        let visible = self.visible_projects(claims.sub).await;

        let mut projects: Vec<Project> = self
            .tables
            .projects
            .read()
            .await
            .iter()
            .filter(|p| visible.as_ref().is_none_or(|v| v.contains(&p.id)))
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn insert_project(&self, project: &NewProject) -> BackendResult<Project> {
        self.count_request();
        self.check_write().await?;

        let row = project.placeholder(Uuid::new_v4());
        self.tables.projects.write().await.push(row.clone());
        Ok(row)
    }

    async fn update_project(
        &self,
        project_id: ProjectId,
        patch: &ProjectPatch,
    ) -> BackendResult<Project> {
        self.count_request();
        self.check_write().await?;

        let mut projects = self.tables.projects.write().await;
        let project = projects
            .iter_mut()
            .find(|p| p.id == project_id)
            .ok_or_else(|| BackendError::NotFound {
                entity: "Project",
                id: project_id.to_string(),
            })?;
        patch.apply_to(project);
        Ok(project.clone())
    }
}

#[async_trait]
impl ProposalRepository for MemoryBackend {
    async fn insert_proposal(&self, proposal: &NewProposal) -> BackendResult<TaskProposal> {
        self.count_request();
        self.check_write().await?;

        let row = TaskProposal {
            id: Uuid::new_v4(),
            project_id: proposal.project_id,
            author_id: proposal.author_id,
            title: proposal.title.clone(),
            description: proposal.description.clone(),
            estimated_hours: proposal.estimated_hours,
            budget: proposal.budget,
            due_date: proposal.due_date,
            status: ProposalStatus::Submitted,
            created_at: Utc::now(),
        };
        self.tables
            .proposals
            .write()
            .await
            .insert(row.id, row.clone());
        Ok(row)
    }

    async fn set_proposal_status(
        &self,
        proposal_id: ProposalId,
        status: ProposalStatus,
    ) -> BackendResult<TaskProposal> {
        self.count_request();
        self.check_write().await?;

        let mut proposals = self.tables.proposals.write().await;
        let proposal = proposals
            .get_mut(&proposal_id)
            .ok_or_else(|| BackendError::NotFound {
                entity: "Proposal",
                id: proposal_id.to_string(),
            })?;
        proposal.status = status;
        Ok(proposal.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend_with_user() -> (MemoryBackend, UserId) {
        let backend = MemoryBackend::new("test-secret");
        let id = backend
            .seed_user("ana@studio.dev", "hunter22", UserRole::Freelancer, "Ana")
            .await;
        (backend, id)
    }

    #[tokio::test]
    async fn test_sign_in_issues_verifiable_token() {
        let (backend, id) = backend_with_user().await;
        let session = backend
            .sign_in_with_password("ANA@studio.dev", "hunter22")
            .await
            .unwrap();

        let claims = backend
            .verify_access_token(&session.tokens.access_token)
            .unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(session.user.id, id);
    }

    #[tokio::test]
    async fn test_wrong_password_is_invalid_credentials() {
        let (backend, _) = backend_with_user().await;
        let err = backend
            .sign_in_with_password("ana@studio.dev", "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_unconfirmed_sign_up_cannot_sign_in_until_confirmed() {
        let backend = MemoryBackend::requiring_confirmation("test-secret");
        let outcome = backend
            .sign_up(&SignUpRequest {
                email: "new@client.io".to_string(),
                password: "long-enough".to_string(),
                full_name: "New Client".to_string(),
                company: None,
                role: UserRole::Client,
            })
            .await
            .unwrap();
        assert_eq!(outcome, SignUpOutcome::ConfirmationRequired);

        let err = backend
            .sign_in_with_password("new@client.io", "long-enough")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::EmailNotConfirmed));

        backend.confirm_email("new@client.io").await;
        assert!(
            backend
                .sign_in_with_password("new@client.io", "long-enough")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_table_calls_require_a_session() {
        let (backend, _) = backend_with_user().await;
        let err = backend.list_projects().await.unwrap_err();
        assert!(matches!(err, BackendError::Unauthorized));
    }

    #[tokio::test]
    async fn test_clients_only_see_assigned_projects() {
        let (backend, freelancer) = backend_with_user().await;
        let client = backend
            .seed_user("c@acme.io", "client-pass", UserRole::Client, "Cleo")
            .await;
        let assigned = backend.seed_project(freelancer, "Assigned", Some(client)).await;
        backend.seed_project(freelancer, "Other", None).await;
        backend.assign_project(client, assigned).await;

        let client_session = backend.fresh_session();
        client_session
            .sign_in_with_password("c@acme.io", "client-pass")
            .await
            .unwrap();
        let projects = client_session.list_projects().await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id, assigned);
    }

    #[tokio::test]
    async fn test_refresh_rotates_tokens() {
        let (backend, _) = backend_with_user().await;
        let first = backend
            .sign_in_with_password("ana@studio.dev", "hunter22")
            .await
            .unwrap();
        let second = backend
            .refresh_session(&first.tokens.refresh_token)
            .await
            .unwrap();
        assert_ne!(first.tokens.refresh_token, second.tokens.refresh_token);

        let reused = backend.refresh_session(&first.tokens.refresh_token).await;
        assert!(matches!(reused, Err(BackendError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_injected_profile_failures_are_consumed() {
        let (backend, id) = backend_with_user().await;
        backend
            .sign_in_with_password("ana@studio.dev", "hunter22")
            .await
            .unwrap();
        backend.fail_profile_fetches(1).await;

        let first = backend.fetch_profile(id).await.unwrap_err();
        assert!(first.is_retryable());
        assert!(backend.fetch_profile(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_writes_leaves_rows_untouched() {
        let (backend, id) = backend_with_user().await;
        backend
            .sign_in_with_password("ana@studio.dev", "hunter22")
            .await
            .unwrap();
        let project = backend.seed_project(id, "P", None).await;
        let task = backend.seed_task(project, "T").await;

        backend.fail_writes(true).await;
        let err = backend
            .update_task(task, &TaskPatch::status(crate::workspace::TaskStatus::Done))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(
            backend.task_rows().await[0].status,
            crate::workspace::TaskStatus::Todo
        );
    }
}
