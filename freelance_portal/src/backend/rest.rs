//! HTTP client for the hosted platform's auth and table APIs.

use super::{
    AuthProvider, BackendError, BackendResult, ProfileRepository, ProjectRepository,
    ProposalRepository, TaskRepository,
};
use crate::auth::{
    ProfileRecord, ProjectId, ProviderSession, ProviderUser, SessionTokens, SignUpOutcome,
    SignUpRequest, UserId,
};
use crate::config::BackendConfig;
use crate::workspace::{
    NewProject, NewProposal, NewTask, Project, ProjectPatch, ProposalId, ProposalStatus, Task,
    TaskFilter, TaskId, TaskPatch, TaskProposal, TaskWithContext,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{RequestBuilder, Response, StatusCode, header};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Media type asking PostgREST for a single object instead of an array
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Server-side function backing [`TaskRepository::tasks_with_context`]
const TASKS_WITH_CONTEXT_RPC: &str = "get_tasks_with_context";

/// REST client for the hosted platform
///
/// Like the platform's own SDK, the client holds the session returned by
/// sign-in and attaches its access token to every table request.
pub struct RestBackend {
    base_url: String,
    anon_key: String,
    client: reqwest::Client,
    session: Arc<RwLock<Option<ProviderSession>>>,
}

#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: Uuid,
    email: Option<String>,
    email_confirmed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct WireSession {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    expires_at: Option<i64>,
    user: WireUser,
}

#[derive(Debug, Default, Deserialize)]
struct WireError {
    error: Option<String>,
    error_description: Option<String>,
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl WireError {
    fn text(&self) -> String {
        self.error_description
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.message.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_default()
    }
}

impl From<WireSession> for ProviderSession {
    fn from(wire: WireSession) -> Self {
        let expires_at = wire
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(|| Utc::now() + Duration::seconds(wire.expires_in));
        ProviderSession {
            user: ProviderUser {
                id: wire.user.id,
                email: wire.user.email.unwrap_or_default(),
                email_confirmed: wire.user.email_confirmed_at.is_some(),
            },
            tokens: SessionTokens {
                access_token: wire.access_token,
                refresh_token: wire.refresh_token,
            },
            expires_at,
        }
    }
}

/// Map a non-success response body to a backend error
fn error_from_body(status: StatusCode, body: &str) -> BackendError {
    let wire: WireError = serde_json::from_str(body).unwrap_or_default();
    let text = wire.text();
    let lowered = text.to_ascii_lowercase();

    if wire.error_code.as_deref() == Some("email_not_confirmed")
        || lowered.contains("email not confirmed")
    {
        return BackendError::EmailNotConfirmed;
    }
    if wire.error_code.as_deref() == Some("invalid_credentials")
        || lowered.contains("invalid login credentials")
        || wire.error.as_deref() == Some("invalid_grant")
    {
        return BackendError::InvalidCredentials;
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return BackendError::Unauthorized;
    }

    BackendError::Status {
        status: status.as_u16(),
        message: if text.is_empty() { body.to_string() } else { text },
    }
}

async fn check(response: Response) -> BackendResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("Failed to read error response: {}", e));
    Err(error_from_body(status, &body))
}

async fn decode<T: DeserializeOwned>(response: Response) -> BackendResult<T> {
    let bytes = check(response).await?.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// PostgREST answers 406 when a single-object request matched no row
fn not_found(entity: &'static str, id: impl ToString) -> impl FnOnce(BackendError) -> BackendError {
    let id = id.to_string();
    move |err| match err {
        BackendError::Status { status: 406, .. } => BackendError::NotFound { entity, id },
        other => other,
    }
}

impl RestBackend {
    /// Create a new REST backend client
    ///
    /// # Arguments
    ///
    /// * `config` - Platform URL, public API key and request timeout
    pub fn new(config: &BackendConfig) -> BackendResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            client,
            session: Arc::new(RwLock::new(None)),
        })
    }

    /// A client sharing this one's connection pool but holding its own session
    pub fn fresh_session(&self) -> Self {
        Self {
            base_url: self.base_url.clone(),
            anon_key: self.anon_key.clone(),
            client: self.client.clone(),
            session: Arc::new(RwLock::new(None)),
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Attach the API key and, when signed in, the user's bearer token
    async fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let token = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.tokens.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone());
        builder
            .header("apikey", &self.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
    }

    async fn store_session(&self, session: &ProviderSession) {
        *self.session.write().await = Some(session.clone());
    }

    async fn single<T: DeserializeOwned>(&self, builder: RequestBuilder) -> BackendResult<T> {
        let response = self
            .authorize(builder.header(header::ACCEPT, SINGLE_OBJECT))
            .await
            .send()
            .await?;
        decode(response).await
    }

    async fn write_returning<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> BackendResult<T> {
        self.single(builder.header("Prefer", "return=representation"))
            .await
    }
}

#[async_trait]
impl AuthProvider for RestBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> BackendResult<ProviderSession> {
        let response = self
            .client
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&PasswordGrant { email, password })
            .send()
            .await?;

        let session: ProviderSession = decode::<WireSession>(response).await?.into();
        self.store_session(&session).await;
        Ok(session)
    }

    async fn sign_up(&self, request: &SignUpRequest) -> BackendResult<SignUpOutcome> {
        let body = json!({
            "email": request.email,
            "password": request.password,
            "data": {
                "full_name": request.full_name,
                "company": request.company,
                "role": request.role,
            },
        });
        let response = self
            .client
            .post(self.auth_url("signup"))
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;

        let value: serde_json::Value = decode(response).await?;
        if value.get("access_token").is_some() {
            let session: ProviderSession = serde_json::from_value::<WireSession>(value)?.into();
            self.store_session(&session).await;
            Ok(SignUpOutcome::SignedIn)
        } else {
            Ok(SignUpOutcome::ConfirmationRequired)
        }
    }

    async fn reset_password_for_email(&self, email: &str) -> BackendResult<()> {
        let response = self
            .client
            .post(self.auth_url("recover"))
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn get_session(&self) -> BackendResult<Option<ProviderSession>> {
        Ok(self.session.read().await.clone())
    }

    async fn refresh_session(&self, refresh_token: &str) -> BackendResult<ProviderSession> {
        let response = self
            .client
            .post(self.auth_url("token"))
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", &self.anon_key)
            .json(&RefreshGrant { refresh_token })
            .send()
            .await?;

        let session: ProviderSession = decode::<WireSession>(response).await?.into();
        self.store_session(&session).await;
        Ok(session)
    }

    async fn sign_out(&self, access_token: &str) -> BackendResult<()> {
        // Forget the local copy first; the remote call may never return
        self.session.write().await.take();

        let response = self
            .client
            .post(self.auth_url("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileRepository for RestBackend {
    async fn fetch_profile(&self, user_id: UserId) -> BackendResult<ProfileRecord> {
        let builder = self
            .client
            .get(self.table_url("profiles"))
            .query(&[("select", "*".to_string()), ("id", format!("eq.{user_id}"))]);
        self.single(builder)
            .await
            .map_err(not_found("Profile", user_id))
    }
}

#[async_trait]
impl TaskRepository for RestBackend {
    async fn list_tasks(&self, filter: &TaskFilter) -> BackendResult<Vec<Task>> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("order", "created_at.asc".to_string()),
        ];
        if let Some(project_id) = filter.project_id {
            query.push(("project_id", format!("eq.{project_id}")));
        }
        if let Some(assignee_id) = filter.assignee_id {
            query.push(("assignee_id", format!("eq.{assignee_id}")));
        }
        if let Some(status) = filter.status {
            let status = serde_json::to_value(status)?;
            query.push((
                "status",
                format!("eq.{}", status.as_str().unwrap_or_default()),
            ));
        }

        let builder = self.client.get(self.table_url("tasks")).query(&query);
        let response = self.authorize(builder).await.send().await?;
        decode(response).await
    }

    async fn tasks_with_context(
        &self,
        project_id: Option<ProjectId>,
    ) -> BackendResult<Vec<TaskWithContext>> {
        let builder = self
            .client
            .post(self.table_url(&format!("rpc/{TASKS_WITH_CONTEXT_RPC}")))
            .json(&json!({ "p_project_id": project_id }));
        let response = self.authorize(builder).await.send().await?;
        decode(response).await
    }

    async fn insert_task(&self, task: &NewTask) -> BackendResult<Task> {
        let builder = self.client.post(self.table_url("tasks")).json(task);
        self.write_returning(builder).await
    }

    async fn update_task(&self, task_id: TaskId, patch: &TaskPatch) -> BackendResult<Task> {
        let builder = self
            .client
            .patch(self.table_url("tasks"))
            .query(&[("id", format!("eq.{task_id}"))])
            .json(patch);
        self.write_returning(builder)
            .await
            .map_err(not_found("Task", task_id))
    }

    async fn delete_task(&self, task_id: TaskId) -> BackendResult<()> {
        let builder = self
            .client
            .delete(self.table_url("tasks"))
            .query(&[("id", format!("eq.{task_id}"))]);
        let response = self.authorize(builder).await.send().await?;
        check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ProjectRepository for RestBackend {
    async fn list_projects(&self) -> BackendResult<Vec<Project>> {
        let builder = self
            .client
            .get(self.table_url("projects"))
            .query(&[("select", "*"), ("order", "created_at.desc")]);
        let response = self.authorize(builder).await.send().await?;
        decode(response).await
    }

    async fn insert_project(&self, project: &NewProject) -> BackendResult<Project> {
        let builder = self.client.post(self.table_url("projects")).json(project);
        self.write_returning(builder).await
    }

    async fn update_project(
        &self,
        project_id: ProjectId,
        patch: &ProjectPatch,
    ) -> BackendResult<Project> {
        let builder = self
            .client
            .patch(self.table_url("projects"))
            .query(&[("id", format!("eq.{project_id}"))])
            .json(patch);
        self.write_returning(builder)
            .await
            .map_err(not_found("Project", project_id))
    }
}

#[async_trait]
impl ProposalRepository for RestBackend {
    async fn insert_proposal(&self, proposal: &NewProposal) -> BackendResult<TaskProposal> {
        let builder = self
            .client
            .post(self.table_url("task_proposals"))
            .json(proposal);
        self.write_returning(builder).await
    }

    async fn set_proposal_status(
        &self,
        proposal_id: ProposalId,
        status: ProposalStatus,
    ) -> BackendResult<TaskProposal> {
        let builder = self
            .client
            .patch(self.table_url("task_proposals"))
            .query(&[("id", format!("eq.{proposal_id}"))])
            .json(&json!({ "status": status }));
        self.write_returning(builder)
            .await
            .map_err(not_found("Proposal", proposal_id))
    }
}
