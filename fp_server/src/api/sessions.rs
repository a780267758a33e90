//! Browser-session registry.
//!
//! Every browser session owns its own session manager and workspace stores.
//! All sessions share one backend (connection pool or in-memory tables) but
//! hold separate provider sessions.

use freelance_portal::{
    NetworkMonitor, SessionManager, SessionSnapshot,
    auth::AuthConfig,
    backend::Backend,
    workspace::{ProjectStore, ProposalService, TaskStore},
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex, RwLock},
    time::Instant,
};
use uuid::Uuid;

/// Header carrying the browser-session id
pub const SESSION_HEADER: &str = "x-portal-session";

/// Everything one browser session owns
pub struct PortalSession {
    pub id: Uuid,
    pub manager: SessionManager,
    pub tasks: TaskStore,
    pub projects: ProjectStore,
    pub proposals: ProposalService,
    last_seen: Mutex<Instant>,
}

impl PortalSession {
    async fn touch(&self) {
        *self.last_seen.lock().await = Instant::now();
    }

    async fn idle_for(&self) -> Duration {
        self.last_seen.lock().await.elapsed()
    }
}

type SessionFactory = Box<dyn Fn(Uuid) -> PortalSession + Send + Sync>;

/// Live browser sessions by id
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<PortalSession>>>,
    factory: SessionFactory,
    idle_timeout: Duration,
    max_sessions: usize,
}

impl SessionRegistry {
    /// Create a registry
    ///
    /// # Arguments
    ///
    /// * `make_backend` - Builds the backend client of a new session
    /// * `auth` - Session manager configuration shared by all sessions
    /// * `idle_timeout` - Sessions idle longer than this are evicted
    /// * `max_sessions` - Live sessions kept before the stalest is evicted
    pub fn new<B, F>(
        make_backend: F,
        auth: AuthConfig,
        idle_timeout: Duration,
        max_sessions: usize,
    ) -> Self
    where
        B: Backend + 'static,
        F: Fn() -> B + Send + Sync + 'static,
    {
        let factory = move |id: Uuid| {
            let backend = Arc::new(make_backend());
            PortalSession {
                id,
                manager: SessionManager::new(
                    backend.clone(),
                    backend.clone(),
                    Arc::new(NetworkMonitor::new()),
                    auth.clone(),
                ),
                tasks: TaskStore::new(backend.clone()),
                projects: ProjectStore::new(backend.clone()),
                proposals: ProposalService::new(backend),
                last_seen: Mutex::new(Instant::now()),
            }
        };

        Self {
            sessions: RwLock::new(HashMap::new()),
            factory: Box::new(factory),
            idle_timeout,
            max_sessions: max_sessions.max(1),
        }
    }

    /// Register a new browser session
    pub async fn create(&self) -> Arc<PortalSession> {
        self.evict_idle().await;

        let session = Arc::new((self.factory)(Uuid::new_v4()));
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            let mut stalest: Option<(Uuid, Duration)> = None;
            for (id, candidate) in sessions.iter() {
                let idle = candidate.idle_for().await;
                if stalest.is_none_or(|(_, longest)| idle > longest) {
                    stalest = Some((*id, idle));
                }
            }
            if let Some((id, _)) = stalest {
                sessions.remove(&id);
                tracing::info!(session_id = %id, "Evicted stalest session at capacity");
            }
        }
        sessions.insert(session.id, Arc::clone(&session));
        crate::metrics::active_sessions(sessions.len());
        session
    }

    /// Session that is not registered, for one-off calls such as password resets
    pub fn detached(&self) -> PortalSession {
        (self.factory)(Uuid::new_v4())
    }

    /// Look up a session and mark it used
    pub async fn get(&self, id: Uuid) -> Option<Arc<PortalSession>> {
        let session = self.sessions.read().await.get(&id).cloned()?;
        session.touch().await;
        Some(session)
    }

    /// Look up the session named by a raw header value
    pub async fn resolve(&self, header: Option<&str>) -> Option<Arc<PortalSession>> {
        let id = Uuid::parse_str(header?.trim()).ok()?;
        self.get(id).await
    }

    pub async fn remove(&self, id: Uuid) -> Option<Arc<PortalSession>> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(&id);
        crate::metrics::active_sessions(sessions.len());
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop sessions idle past the timeout
    ///
    /// # Returns
    ///
    /// * `usize` - Number of sessions removed
    pub async fn evict_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();
        for (id, session) in sessions.iter() {
            if session.idle_for().await >= self.idle_timeout {
                expired.push(*id);
            }
        }
        for id in &expired {
            sessions.remove(id);
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Evicted idle sessions");
        }
        crate::metrics::active_sessions(sessions.len());
        expired.len()
    }
}

/// Snapshot of a visitor without a browser session: settled and signed out
pub fn signed_out_snapshot() -> SessionSnapshot {
    SessionSnapshot {
        initialized: true,
        ..SessionSnapshot::uninitialized()
    }
}
