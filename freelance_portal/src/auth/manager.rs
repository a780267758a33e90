//! Session manager implementation.

use super::{
    errors::{AuthError, AuthResult},
    models::{
        AuthEvent, AuthSession, AuthUser, Credentials, ProfileRecord, ProviderSession,
        SignOutOutcome, SignUpOutcome, SignUpRequest,
    },
    state::{AuthPhase, SessionSnapshot, SessionState},
};
use crate::backend::{AuthProvider, BackendError, ProfileRepository};
use crate::config::AuthConfig;
use crate::network::{NetworkMonitor, SIGN_OUT_TIMEOUT, with_timeout};
use rand::Rng;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{Notify, RwLock, watch};

/// Minimum password length accepted at sign-up
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Progressive authentication state machine
///
/// Owns the session for one browser session. Every change is published as a
/// fresh [`SessionSnapshot`] on a watch channel; published snapshots are
/// never mutated.
pub struct SessionManager {
    state: RwLock<SessionState>,
    publisher: watch::Sender<Arc<SessionSnapshot>>,
    auth: Arc<dyn AuthProvider>,
    profiles: Arc<dyn ProfileRepository>,
    network: Arc<NetworkMonitor>,
    config: AuthConfig,
    cancel: Notify,
}

/// Check an email address has a plausible `local@domain.tld` shape
fn validate_email(email: &str) -> AuthResult<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::Validation("Email is required".to_string()));
    }

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if !valid {
        return Err(AuthError::Validation(
            "Please enter a valid email address".to_string(),
        ));
    }
    Ok(())
}

fn validate_credentials(credentials: &Credentials) -> AuthResult<()> {
    validate_email(&credentials.email)?;
    if credentials.password.is_empty() {
        return Err(AuthError::Validation("Password is required".to_string()));
    }
    Ok(())
}

fn validate_sign_up(request: &SignUpRequest) -> AuthResult<()> {
    validate_email(&request.email)?;
    if request.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if request.full_name.trim().is_empty() {
        return Err(AuthError::Validation("Full name is required".to_string()));
    }
    Ok(())
}

/// Move to `next`, rejecting edges the phase graph does not allow
fn transition(state: &mut SessionState, next: AuthPhase) -> AuthResult<()> {
    if !state.phase.can_transition_to(next) {
        return Err(AuthError::InvalidTransition {
            from: state.phase,
            to: next,
        });
    }
    log::debug!("Session phase {} -> {}", state.phase, next);
    state.phase = next;
    state.phase_entered_at = Instant::now();
    Ok(())
}

impl SessionManager {
    /// Create a new session manager
    ///
    /// # Arguments
    ///
    /// * `auth` - Auth sub-API of the platform
    /// * `profiles` - Profile table access
    /// * `network` - Shared round-trip monitor used for timeout budgets
    /// * `config` - Fallback and retry behaviour
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        profiles: Arc<dyn ProfileRepository>,
        network: Arc<NetworkMonitor>,
        config: AuthConfig,
    ) -> Self {
        let (publisher, _) = watch::channel(Arc::new(SessionSnapshot::uninitialized()));
        Self {
            state: RwLock::new(SessionState::new()),
            publisher,
            auth,
            profiles,
            network,
            config,
            cancel: Notify::new(),
        }
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.publisher.borrow().clone()
    }

    /// Receive every snapshot published from now on
    pub fn subscribe(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.publisher.subscribe()
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    /// Access token of the held provider session
    pub async fn access_token(&self) -> Option<String> {
        self.state
            .read()
            .await
            .identity
            .as_ref()
            .map(|s| s.tokens.access_token.clone())
    }

    fn publish(&self, state: &SessionState) -> Arc<SessionSnapshot> {
        let snapshot = Arc::new(state.snapshot());
        self.publisher.send_replace(Arc::clone(&snapshot));
        snapshot
    }

    /// Sign in with email and password
    ///
    /// Credentials are checked locally before any request is sent.
    ///
    /// # Returns
    ///
    /// * `AuthResult<Arc<SessionSnapshot>>` - Snapshot in `Ready` or `Degraded`
    ///
    /// # Errors
    ///
    /// * `AuthError::Validation` - Malformed email or empty password
    /// * `AuthError::InvalidCredentials` - Email/password rejected
    /// * `AuthError::EmailNotConfirmed` - Account not confirmed yet
    /// * `AuthError::EnhancementFailed` - Profile unavailable and fallback disabled
    pub async fn sign_in(&self, credentials: Credentials) -> AuthResult<Arc<SessionSnapshot>> {
        validate_credentials(&credentials)?;
        let attempt = self.begin_attempt().await?;

        let budget = self.network.budget();
        let result = self
            .network
            .observe(with_timeout(
                budget.auth_request,
                self.auth
                    .sign_in_with_password(credentials.email.trim(), &credentials.password),
            ))
            .await;

        match result {
            Ok(session) => self.resolve(attempt, session).await,
            Err(e) => {
                let err = AuthError::from(e);
                log::warn!("Sign-in failed: {}", err);
                self.fail_attempt(attempt, &err).await?;
                Err(err)
            }
        }
    }

    /// Register a new account
    ///
    /// When the provider returns a live session it is resolved like a
    /// sign-in; otherwise the caller must wait for email confirmation.
    pub async fn sign_up(&self, request: SignUpRequest) -> AuthResult<SignUpOutcome> {
        validate_sign_up(&request)?;

        let budget = self.network.budget();
        let outcome = self
            .network
            .observe(with_timeout(budget.auth_request, self.auth.sign_up(&request)))
            .await?;

        if outcome == SignUpOutcome::SignedIn {
            if let Some(session) = self.auth.get_session().await? {
                self.handle_auth_event(AuthEvent::SignedIn(session)).await?;
            }
        }
        Ok(outcome)
    }

    /// Request a password-reset email
    pub async fn reset_password(&self, email: &str) -> AuthResult<()> {
        validate_email(email)?;
        let budget = self.network.budget();
        self.network
            .observe(with_timeout(
                budget.auth_request,
                self.auth.reset_password_for_email(email.trim()),
            ))
            .await?;
        Ok(())
    }

    /// Resolve a session the provider already holds
    ///
    /// Marks the manager initialized whatever the outcome, so guards stop
    /// reporting loading once start-up has settled.
    pub async fn restore_session(&self) -> AuthResult<Arc<SessionSnapshot>> {
        let budget = self.network.budget();
        let stored = self
            .network
            .observe(with_timeout(budget.auth_request, self.auth.get_session()))
            .await;

        let stored = match stored {
            Ok(stored) => stored,
            Err(e) => {
                log::warn!("Could not read stored session: {}", e);
                let mut state = self.state.write().await;
                state.initialized = true;
                self.publish(&state);
                return Err(e.into());
            }
        };

        let Some(session) = stored else {
            let mut state = self.state.write().await;
            state.initialized = true;
            return Ok(self.publish(&state));
        };

        let session = if session.expires_at <= chrono::Utc::now() {
            log::debug!("Stored session expired; refreshing");
            match self
                .network
                .observe(with_timeout(
                    budget.auth_request,
                    self.auth.refresh_session(&session.tokens.refresh_token),
                ))
                .await
            {
                Ok(refreshed) => refreshed,
                Err(e) => {
                    log::info!("Stored session could not be refreshed: {}", e);
                    let mut state = self.state.write().await;
                    state.initialized = true;
                    return Ok(self.publish(&state));
                }
            }
        } else {
            session
        };

        self.handle_auth_event(AuthEvent::SignedIn(session)).await
    }

    /// Apply an authentication event pushed by the provider
    pub async fn handle_auth_event(&self, event: AuthEvent) -> AuthResult<Arc<SessionSnapshot>> {
        match event {
            AuthEvent::SignedIn(session) => {
                {
                    let mut state = self.state.write().await;
                    let same_user = state
                        .identity
                        .as_ref()
                        .is_some_and(|held| held.user.id == session.user.id);
                    if same_user && matches!(state.phase, AuthPhase::Ready | AuthPhase::Degraded)
                    {
                        // Provider re-announced the session we already resolved
                        Self::replace_tokens(&mut state, session);
                        return Ok(self.publish(&state));
                    }
                    if !matches!(state.phase, AuthPhase::Idle | AuthPhase::Error) {
                        log::info!(
                            "Provider signed in {}; discarding the {} session",
                            session.user.id,
                            state.phase
                        );
                        state.clear();
                        self.cancel.notify_waiters();
                    }
                }
                let attempt = self.begin_attempt().await?;
                self.resolve(attempt, session).await
            }
            AuthEvent::TokenRefreshed(session) => {
                let mut state = self.state.write().await;
                let same_user = state
                    .identity
                    .as_ref()
                    .is_some_and(|held| held.user.id == session.user.id);
                if !same_user {
                    log::warn!("Ignoring token refresh for a user that is not signed in");
                    return Err(AuthError::NoSession);
                }
                Self::replace_tokens(&mut state, session);
                Ok(self.publish(&state))
            }
            AuthEvent::UserUpdated => {
                if self.snapshot().phase == AuthPhase::Ready {
                    self.refresh_profile().await
                } else {
                    Ok(self.snapshot())
                }
            }
            AuthEvent::SignedOut => {
                let mut state = self.state.write().await;
                state.clear();
                let snapshot = self.publish(&state);
                drop(state);
                self.cancel.notify_waiters();
                log::info!("Session ended by provider");
                Ok(snapshot)
            }
        }
    }

    fn replace_tokens(state: &mut SessionState, session: ProviderSession) {
        if let Some(current) = state.session.as_mut() {
            current.tokens = session.tokens.clone();
            current.expires_at = session.expires_at;
        }
        state.identity = Some(session);
    }

    /// Start a new attempt in `Authenticating`
    async fn begin_attempt(&self) -> AuthResult<u64> {
        let mut state = self.state.write().await;
        transition(&mut state, AuthPhase::Authenticating)?;
        state.attempt += 1;
        state.initialized = true;
        state.last_error = None;
        state.profile_enhancement_failed = false;
        state.basic_mode_accepted = false;
        self.publish(&state);
        Ok(state.attempt)
    }

    /// Settle an attempt whose authentication step failed
    async fn fail_attempt(&self, attempt: u64, err: &AuthError) -> AuthResult<()> {
        let mut state = self.state.write().await;
        if state.attempt != attempt {
            return Err(AuthError::Superseded);
        }
        transition(&mut state, AuthPhase::Error)?;
        state.last_error = Some(err.client_message());
        self.publish(&state);
        Ok(())
    }

    /// Hold the provider session and enhance it into an application user
    async fn resolve(
        &self,
        attempt: u64,
        session: ProviderSession,
    ) -> AuthResult<Arc<SessionSnapshot>> {
        {
            let mut state = self.state.write().await;
            if state.attempt != attempt {
                return Err(AuthError::Superseded);
            }
            transition(&mut state, AuthPhase::Enhancing)?;
            state.identity = Some(session.clone());
            self.publish(&state);
        }
        log::info!("Authenticated user {}; loading profile", session.user.id);
        self.enhance(attempt, session).await
    }

    /// Backoff before retry number `retry` (1-based), with random jitter
    fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let base = self
            .config
            .retry_base_delay
            .saturating_mul(1 << exponent)
            .min(self.config.retry_max_delay);
        let jitter_cap = (self.config.retry_base_delay.as_millis() as u64 / 2).max(1);
        let jitter = rand::rng().random_range(0..=jitter_cap);
        base + Duration::from_millis(jitter)
    }

    /// Fetch the profile with retries and settle the attempt
    async fn enhance(
        &self,
        attempt: u64,
        identity: ProviderSession,
    ) -> AuthResult<Arc<SessionSnapshot>> {
        let attempts = self.config.enhancement_attempts.max(1);
        let mut last_error = BackendError::Cancelled;

        for n in 0..attempts {
            let cancelled = self.cancel.notified();
            tokio::pin!(cancelled);
            // Register before the first await so a cancel cannot slip between
            cancelled.as_mut().enable();

            if n > 0 {
                let delay = self.backoff_delay(n);
                log::debug!("Retrying profile fetch in {:?} (attempt {})", delay, n + 1);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = &mut cancelled => {
                        last_error = BackendError::Cancelled;
                        break;
                    }
                }
            }

            let budget = self.network.budget();
            let fetch = self.network.observe(with_timeout(
                budget.profile_fetch,
                self.profiles.fetch_profile(identity.user.id),
            ));
            let result = tokio::select! {
                r = fetch => r,
                _ = &mut cancelled => Err(BackendError::Cancelled),
            };

            if self.state.read().await.attempt != attempt {
                return Err(AuthError::Superseded);
            }

            match result {
                Ok(record) => return self.settle_ready(attempt, &identity, record).await,
                Err(e) => {
                    log::warn!(
                        "Profile fetch {}/{} for {} failed: {}",
                        n + 1,
                        attempts,
                        identity.user.id,
                        e
                    );
                    let retry = e.is_retryable();
                    last_error = e;
                    if !retry {
                        break;
                    }
                }
            }
        }

        self.settle_failed(attempt, &identity, last_error).await
    }

    async fn settle_ready(
        &self,
        attempt: u64,
        identity: &ProviderSession,
        record: ProfileRecord,
    ) -> AuthResult<Arc<SessionSnapshot>> {
        let mut state = self.state.write().await;
        if state.attempt != attempt {
            return Err(AuthError::Superseded);
        }

        transition(&mut state, AuthPhase::Ready)?;
        let user = AuthUser::enriched(&identity.user, record);
        log::info!("Session ready for {} ({})", user.id, user.role);
        state.session = Some(AuthSession {
            user,
            tokens: identity.tokens.clone(),
            expires_at: identity.expires_at,
        });
        state.profile_enhancement_failed = false;
        state.basic_mode_accepted = false;
        state.last_error = None;
        Ok(self.publish(&state))
    }

    async fn settle_failed(
        &self,
        attempt: u64,
        identity: &ProviderSession,
        cause: BackendError,
    ) -> AuthResult<Arc<SessionSnapshot>> {
        let mut state = self.state.write().await;
        if state.attempt != attempt {
            return Err(AuthError::Superseded);
        }

        let fallback = self.config.allow_basic_fallback;
        transition(
            &mut state,
            if fallback {
                AuthPhase::Degraded
            } else {
                AuthPhase::Error
            },
        )?;

        let err = AuthError::EnhancementFailed(cause.to_string());
        state.profile_enhancement_failed = true;
        state.basic_mode_accepted = false;
        state.last_error = Some(err.client_message());

        if fallback {
            let user = AuthUser::basic(
                identity.user.id,
                identity.user.email.clone(),
                self.config.default_role,
            );
            log::warn!(
                "Profile enhancement failed for {}; continuing degraded as {}",
                user.id,
                user.role
            );
            state.session = Some(AuthSession {
                user,
                tokens: identity.tokens.clone(),
                expires_at: identity.expires_at,
            });
            Ok(self.publish(&state))
        } else {
            log::warn!(
                "Profile enhancement failed for {} and fallback is disabled",
                identity.user.id
            );
            state.session = None;
            self.publish(&state);
            Err(err)
        }
    }

    /// Abort an in-flight enhancement
    ///
    /// The attempt settles immediately as an enhancement failure; whatever
    /// the aborted fetch returns later is discarded.
    pub async fn cancel_enhancement(&self) -> AuthResult<Arc<SessionSnapshot>> {
        let (attempt, identity) = {
            let mut state = self.state.write().await;
            if state.phase != AuthPhase::Enhancing {
                return Ok(Arc::new(state.snapshot()));
            }
            let identity = state.identity.clone().ok_or(AuthError::NoSession)?;
            state.attempt += 1;
            (state.attempt, identity)
        };
        self.cancel.notify_waiters();
        log::info!("Profile enhancement cancelled for {}", identity.user.id);

        match self
            .settle_failed(attempt, &identity, BackendError::Cancelled)
            .await
        {
            Err(AuthError::EnhancementFailed(_)) => Ok(self.snapshot()),
            other => other,
        }
    }

    /// Re-run profile enhancement for the held session
    ///
    /// From `Enhancing` the in-flight fetch is abandoned and a fresh one
    /// started; its caller gets `AuthError::Superseded`.
    ///
    /// # Errors
    ///
    /// * `AuthError::NoSession` - No provider session is held
    /// * `AuthError::InvalidTransition` - Not in `Enhancing`, `Degraded` or `Error`
    pub async fn retry_profile_enhancement(&self) -> AuthResult<Arc<SessionSnapshot>> {
        let (attempt, identity) = {
            let mut state = self.state.write().await;
            let identity = state.identity.clone().ok_or(AuthError::NoSession)?;
            if state.phase == AuthPhase::Enhancing {
                self.cancel.notify_waiters();
                state.phase_entered_at = Instant::now();
            } else {
                transition(&mut state, AuthPhase::Enhancing)?;
            }
            state.attempt += 1;
            state.last_error = None;
            state.basic_mode_accepted = false;
            self.publish(&state);
            (state.attempt, identity)
        };
        log::info!("Retrying profile enhancement for {}", identity.user.id);
        self.enhance(attempt, identity).await
    }

    /// Accept the basic user and proceed
    ///
    /// From `Enhancing` the in-flight fetch is abandoned; its caller gets
    /// `AuthError::Superseded`.
    ///
    /// # Returns
    ///
    /// * `AuthResult<&'static str>` - Default route for the user's role
    ///
    /// # Errors
    ///
    /// * `AuthError::NoSession` - No provider session is held
    /// * `AuthError::FallbackDisabled` - No user is resolved and a basic one
    ///   may not be synthesized
    pub async fn continue_with_basic_auth(&self) -> AuthResult<&'static str> {
        let mut state = self.state.write().await;
        let identity = state.identity.clone().ok_or(AuthError::NoSession)?;

        if state.phase == AuthPhase::Ready && state.basic_mode_accepted {
            if let Some(session) = &state.session {
                return Ok(session.user.role.default_route());
            }
        }

        if state.session.is_none() && !self.config.allow_basic_fallback {
            log::info!(
                "Basic access refused for {}; fallback is disabled",
                identity.user.id
            );
            return Err(AuthError::FallbackDisabled);
        }

        let was_enhancing = state.phase == AuthPhase::Enhancing;
        transition(&mut state, AuthPhase::Ready)?;
        if was_enhancing {
            state.attempt += 1;
            state.profile_enhancement_failed = true;
            self.cancel.notify_waiters();
        }
        let session = state.session.get_or_insert_with(|| AuthSession {
            user: AuthUser::basic(
                identity.user.id,
                identity.user.email.clone(),
                self.config.default_role,
            ),
            tokens: identity.tokens.clone(),
            expires_at: identity.expires_at,
        });
        let route = session.user.role.default_route();
        state.basic_mode_accepted = true;
        state.last_error = None;
        log::info!("User {} continued with basic access", identity.user.id);
        self.publish(&state);
        Ok(route)
    }

    /// Reload the profile of a ready session and replace the user wholesale
    ///
    /// On failure the current user is kept.
    pub async fn refresh_profile(&self) -> AuthResult<Arc<SessionSnapshot>> {
        let (attempt, identity) = {
            let state = self.state.read().await;
            if state.phase != AuthPhase::Ready || state.session.is_none() {
                return Err(AuthError::NotAuthenticated);
            }
            let identity = state.identity.clone().ok_or(AuthError::NoSession)?;
            (state.attempt, identity)
        };

        let budget = self.network.budget();
        let record = self
            .network
            .observe(with_timeout(
                budget.profile_fetch,
                self.profiles.fetch_profile(identity.user.id),
            ))
            .await
            .inspect_err(|e| log::warn!("Profile refresh failed: {}", e))?;

        let mut state = self.state.write().await;
        if state.attempt != attempt || state.phase != AuthPhase::Ready {
            return Err(AuthError::Superseded);
        }
        let user = AuthUser::enriched(&identity.user, record);
        if let Some(session) = state.session.as_mut() {
            session.user = user;
        }
        state.profile_enhancement_failed = false;
        state.basic_mode_accepted = false;
        Ok(self.publish(&state))
    }

    /// Exchange the refresh token for new tokens
    pub async fn refresh_session(&self) -> AuthResult<Arc<SessionSnapshot>> {
        let refresh_token = self
            .state
            .read()
            .await
            .identity
            .as_ref()
            .map(|s| s.tokens.refresh_token.clone())
            .ok_or(AuthError::NoSession)?;

        let budget = self.network.budget();
        let session = self
            .network
            .observe(with_timeout(
                budget.auth_request,
                self.auth.refresh_session(&refresh_token),
            ))
            .await
            .inspect_err(|e| log::warn!("Token refresh failed: {}", e))?;

        self.handle_auth_event(AuthEvent::TokenRefreshed(session))
            .await
    }

    /// Sign out
    ///
    /// Local state is cleared and published before the remote call, which
    /// is bounded by [`SIGN_OUT_TIMEOUT`]. A remote failure is logged and
    /// reported in the outcome, never returned as an error.
    pub async fn sign_out(&self) -> SignOutOutcome {
        let access_token = {
            let mut state = self.state.write().await;
            let token = state
                .identity
                .as_ref()
                .map(|s| s.tokens.access_token.clone());
            state.clear();
            self.publish(&state);
            token
        };
        self.cancel.notify_waiters();

        let Some(access_token) = access_token else {
            return SignOutOutcome {
                remote_confirmed: false,
            };
        };

        match with_timeout(SIGN_OUT_TIMEOUT, self.auth.sign_out(&access_token)).await {
            Ok(()) => {
                log::info!("Signed out");
                SignOutOutcome {
                    remote_confirmed: true,
                }
            }
            Err(e) => {
                log::warn!("Remote sign-out failed; local session already cleared: {}", e);
                SignOutOutcome {
                    remote_confirmed: false,
                }
            }
        }
    }

    /// Time spent in the current phase
    pub fn time_in_phase(&self) -> Duration {
        self.snapshot().phase_entered_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserRole;
    use crate::backend::MemoryBackend;

    async fn manager_with(config: AuthConfig) -> (SessionManager, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new("unit-secret"));
        backend
            .seed_user("ana@studio.dev", "hunter22", UserRole::Admin, "Ana")
            .await;
        let manager = SessionManager::new(
            backend.clone(),
            backend.clone(),
            Arc::new(NetworkMonitor::new()),
            config,
        );
        (manager, backend)
    }

    fn fast_retries() -> AuthConfig {
        AuthConfig {
            retry_base_delay: Duration::from_millis(1),
            retry_max_delay: Duration::from_millis(4),
            ..AuthConfig::default()
        }
    }

    fn creds(email: &str, password: &str) -> Credentials {
        Credentials {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ana@studio.dev").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("ana").is_err());
        assert!(validate_email("ana@studio").is_err());
        assert!(validate_email("@studio.dev").is_err());
        assert!(validate_email("a@b@c.dev").is_err());
        assert!(validate_email("an a@studio.dev").is_err());
    }

    #[tokio::test]
    async fn test_invalid_credentials_send_no_request() {
        let (manager, backend) = manager_with(fast_retries()).await;
        let err = manager.sign_in(creds("not-an-email", "x")).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        assert_eq!(backend.request_count(), 0);
        assert_eq!(manager.snapshot().phase, AuthPhase::Idle);
    }

    #[tokio::test]
    async fn test_sign_in_reaches_ready() {
        let (manager, _) = manager_with(fast_retries()).await;
        let snapshot = manager
            .sign_in(creds("ana@studio.dev", "hunter22"))
            .await
            .unwrap();
        assert_eq!(snapshot.phase, AuthPhase::Ready);
        let user = snapshot.user.as_ref().unwrap();
        assert_eq!(user.role, UserRole::Admin);
        assert!(!user.is_basic());
        assert!(snapshot.is_authenticated());
    }

    #[tokio::test]
    async fn test_wrong_password_lands_in_error() {
        let (manager, _) = manager_with(fast_retries()).await;
        let err = manager
            .sign_in(creds("ana@studio.dev", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.phase, AuthPhase::Error);
        assert!(snapshot.user.is_none());
        assert!(snapshot.last_error.is_some());
    }

    #[tokio::test]
    async fn test_transient_profile_failure_is_retried() {
        let (manager, backend) = manager_with(fast_retries()).await;
        backend.fail_profile_fetches(2).await;

        let snapshot = manager
            .sign_in(creds("ana@studio.dev", "hunter22"))
            .await
            .unwrap();
        assert_eq!(snapshot.phase, AuthPhase::Ready);
        assert!(!snapshot.profile_enhancement_failed);
    }

    #[tokio::test]
    async fn test_exhausted_retries_degrade() {
        let (manager, backend) = manager_with(fast_retries()).await;
        backend.fail_profile_fetches(10).await;

        let snapshot = manager
            .sign_in(creds("ana@studio.dev", "hunter22"))
            .await
            .unwrap();
        assert_eq!(snapshot.phase, AuthPhase::Degraded);
        assert!(snapshot.profile_enhancement_failed);
        let user = snapshot.user.as_ref().unwrap();
        assert!(user.is_basic());
        assert_eq!(user.role, AuthConfig::default().default_role);
    }

    #[tokio::test]
    async fn test_sign_in_from_ready_is_rejected() {
        let (manager, _) = manager_with(fast_retries()).await;
        manager
            .sign_in(creds("ana@studio.dev", "hunter22"))
            .await
            .unwrap();
        let err = manager
            .sign_in(creds("ana@studio.dev", "hunter22"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidTransition { .. }));
    }

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let backend = Arc::new(MemoryBackend::new("unit-secret"));
        let manager = SessionManager::new(
            backend.clone(),
            backend,
            Arc::new(NetworkMonitor::new()),
            AuthConfig {
                retry_base_delay: Duration::from_millis(100),
                retry_max_delay: Duration::from_millis(300),
                ..AuthConfig::default()
            },
        );

        let first = manager.backoff_delay(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(150));
        let second = manager.backoff_delay(2);
        assert!(second >= Duration::from_millis(200) && second <= Duration::from_millis(250));
        let capped = manager.backoff_delay(10);
        assert!(capped <= Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_refresh_session_keeps_user() {
        let (manager, _) = manager_with(fast_retries()).await;
        let before = manager
            .sign_in(creds("ana@studio.dev", "hunter22"))
            .await
            .unwrap();
        let expires_before = before.session_expires_at;

        let after = manager.refresh_session().await.unwrap();
        assert_eq!(after.phase, AuthPhase::Ready);
        assert_eq!(after.user, before.user);
        assert!(after.session_expires_at >= expires_before);
    }
}
