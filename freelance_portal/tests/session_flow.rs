//! Integration tests for the progressive authentication flow.
//!
//! Tests sign-in, degraded fallback, retry/continue recovery, cancellation,
//! sign-out and session restore against the in-memory backend.

use freelance_portal::auth::{
    AuthError, AuthEvent, AuthPhase, Credentials, SessionManager, SignUpOutcome, SignUpRequest,
    UserRole,
};
use freelance_portal::backend::{AuthProvider, MemoryBackend};
use freelance_portal::config::AuthConfig;
use freelance_portal::network::{NetworkMonitor, SIGN_OUT_TIMEOUT};
use std::sync::Arc;
use std::time::Duration;

const EMAIL: &str = "freelancer@portal.local";
const PASSWORD: &str = "freelancer-password";

fn quick_config() -> AuthConfig {
    AuthConfig {
        retry_base_delay: Duration::from_millis(1),
        retry_max_delay: Duration::from_millis(5),
        ..AuthConfig::default()
    }
}

/// Helper to create a manager over a demo backend
async fn setup(config: AuthConfig) -> (Arc<SessionManager>, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::with_demo_data("flow-secret").await);
    let manager = Arc::new(SessionManager::new(
        backend.clone(),
        backend.clone(),
        Arc::new(NetworkMonitor::new()),
        config,
    ));
    (manager, backend)
}

fn credentials() -> Credentials {
    Credentials {
        email: EMAIL.to_string(),
        password: PASSWORD.to_string(),
    }
}

#[tokio::test]
async fn test_sign_in_publishes_every_phase() {
    let (manager, _) = setup(quick_config()).await;
    let mut rx = manager.subscribe();

    let seen = tokio::spawn(async move {
        let mut phases = Vec::new();
        while rx.changed().await.is_ok() {
            let phase = rx.borrow_and_update().phase;
            phases.push(phase);
            if phase == AuthPhase::Ready {
                break;
            }
        }
        phases
    });

    let snapshot = manager.sign_in(credentials()).await.unwrap();
    assert_eq!(snapshot.phase, AuthPhase::Ready);

    let phases = seen.await.unwrap();
    assert_eq!(phases.last(), Some(&AuthPhase::Ready));
    // Every observed step is a legal edge
    for pair in phases.windows(2) {
        assert!(
            pair[0] == pair[1] || pair[0].can_transition_to(pair[1]),
            "{} -> {}",
            pair[0],
            pair[1]
        );
    }
}

#[tokio::test]
async fn test_enhancement_failure_with_fallback_degrades() {
    let (manager, backend) = setup(quick_config()).await;
    backend.fail_profile_fetches(u32::MAX).await;

    let snapshot = manager.sign_in(credentials()).await.unwrap();
    assert_eq!(snapshot.phase, AuthPhase::Degraded);
    assert!(snapshot.profile_enhancement_failed);

    let user = snapshot.user.as_ref().expect("degraded session keeps a user");
    assert!(user.is_basic());
    assert_eq!(user.email, EMAIL);
    assert!(snapshot.is_authenticated());
    assert_ne!(manager.snapshot().phase, AuthPhase::Enhancing);
}

#[tokio::test]
async fn test_enhancement_failure_without_fallback_errors() {
    let config = AuthConfig {
        allow_basic_fallback: false,
        ..quick_config()
    };
    let (manager, backend) = setup(config).await;
    backend.fail_profile_fetches(u32::MAX).await;

    let err = manager.sign_in(credentials()).await.unwrap_err();
    assert!(matches!(err, AuthError::EnhancementFailed(_)));

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.phase, AuthPhase::Error);
    assert!(snapshot.user.is_none());
    assert!(snapshot.has_identity);
    assert!(!snapshot.is_authenticated());
}

#[tokio::test]
async fn test_missing_profile_is_not_retried() {
    let (manager, backend) = setup(quick_config()).await;
    let session = backend
        .fresh_session()
        .sign_in_with_password(EMAIL, PASSWORD)
        .await
        .unwrap();
    backend.remove_profile(session.user.id).await;
    let before = backend.request_count();

    let snapshot = manager.sign_in(credentials()).await.unwrap();
    assert_eq!(snapshot.phase, AuthPhase::Degraded);
    // One sign-in plus a single profile fetch
    assert_eq!(backend.request_count() - before, 2);
}

#[tokio::test]
async fn test_retry_after_degraded_recovers_full_profile() {
    let (manager, backend) = setup(quick_config()).await;
    backend.fail_profile_fetches(u32::MAX).await;
    manager.sign_in(credentials()).await.unwrap();

    backend.fail_profile_fetches(0).await;
    let snapshot = manager.retry_profile_enhancement().await.unwrap();
    assert_eq!(snapshot.phase, AuthPhase::Ready);
    assert!(!snapshot.profile_enhancement_failed);
    assert!(!snapshot.user.as_ref().unwrap().is_basic());
}

#[tokio::test]
async fn test_retry_requires_held_session() {
    let (manager, _) = setup(quick_config()).await;
    let err = manager.retry_profile_enhancement().await.unwrap_err();
    assert!(matches!(err, AuthError::NoSession));
}

#[tokio::test]
async fn test_retry_from_ready_is_rejected() {
    let (manager, _) = setup(quick_config()).await;
    manager.sign_in(credentials()).await.unwrap();
    let err = manager.retry_profile_enhancement().await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_continue_with_basic_auth() {
    let (manager, backend) = setup(quick_config()).await;
    backend.fail_profile_fetches(u32::MAX).await;
    manager.sign_in(credentials()).await.unwrap();

    let route = manager.continue_with_basic_auth().await.unwrap();
    assert_eq!(route, UserRole::Freelancer.default_route());

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.phase, AuthPhase::Ready);
    assert!(snapshot.basic_mode_accepted);
    assert!(snapshot.profile_enhancement_failed);

    // Accepting twice is harmless
    assert_eq!(manager.continue_with_basic_auth().await.unwrap(), route);
}

#[tokio::test]
async fn test_continue_from_error_refused_without_fallback() {
    let config = AuthConfig {
        allow_basic_fallback: false,
        ..quick_config()
    };
    let (manager, backend) = setup(config).await;
    backend.fail_profile_fetches(u32::MAX).await;
    let err = manager.sign_in(credentials()).await.unwrap_err();
    assert!(matches!(err, AuthError::EnhancementFailed(_)));
    let before = manager.snapshot();

    let err = manager.continue_with_basic_auth().await.unwrap_err();
    assert!(matches!(err, AuthError::FallbackDisabled));

    let after = manager.snapshot();
    assert_eq!(after.phase, AuthPhase::Error);
    assert!(after.user.is_none());
    assert!(!after.is_authenticated());
    assert_eq!(after.attempt, before.attempt);
}

#[tokio::test(start_paused = true)]
async fn test_continue_while_enhancing_supersedes_pending_fetch() {
    let (manager, backend) = setup(quick_config()).await;
    backend
        .set_profile_latency(Some(Duration::from_secs(60)))
        .await;

    let signing_in = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.sign_in(credentials()).await })
    };

    let mut rx = manager.subscribe();
    while rx.borrow_and_update().phase != AuthPhase::Enhancing {
        rx.changed().await.unwrap();
    }

    let route = manager.continue_with_basic_auth().await.unwrap();

    let result = signing_in.await.unwrap();
    assert!(matches!(result, Err(AuthError::Superseded)));

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.phase, AuthPhase::Ready);
    assert!(snapshot.basic_mode_accepted);
    assert!(snapshot.profile_enhancement_failed);
    let user = snapshot.user.as_ref().unwrap();
    assert!(user.is_basic());
    assert_eq!(route, user.role.default_route());

    // The abandoned fetch never lands
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(manager.snapshot().user.as_ref().unwrap().is_basic());
}

#[tokio::test(start_paused = true)]
async fn test_continue_while_enhancing_refused_without_fallback() {
    let config = AuthConfig {
        allow_basic_fallback: false,
        ..quick_config()
    };
    let (manager, backend) = setup(config).await;
    backend
        .set_profile_latency(Some(Duration::from_secs(2)))
        .await;

    let signing_in = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.sign_in(credentials()).await })
    };

    let mut rx = manager.subscribe();
    while rx.borrow_and_update().phase != AuthPhase::Enhancing {
        rx.changed().await.unwrap();
    }

    let err = manager.continue_with_basic_auth().await.unwrap_err();
    assert!(matches!(err, AuthError::FallbackDisabled));
    assert_eq!(manager.snapshot().phase, AuthPhase::Enhancing);

    // The pending sign-in is left to finish on its own
    let snapshot = signing_in.await.unwrap().unwrap();
    assert_eq!(snapshot.phase, AuthPhase::Ready);
    assert!(!snapshot.user.as_ref().unwrap().is_basic());
}

#[tokio::test(start_paused = true)]
async fn test_retry_while_enhancing_restarts_fetch() {
    let (manager, backend) = setup(quick_config()).await;
    backend
        .set_profile_latency(Some(Duration::from_secs(60)))
        .await;

    let signing_in = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.sign_in(credentials()).await })
    };

    let mut rx = manager.subscribe();
    while rx.borrow_and_update().phase != AuthPhase::Enhancing {
        rx.changed().await.unwrap();
    }
    let stalled_attempt = manager.snapshot().attempt;

    backend.set_profile_latency(None).await;
    let snapshot = manager.retry_profile_enhancement().await.unwrap();
    assert_eq!(snapshot.phase, AuthPhase::Ready);
    assert!(snapshot.attempt > stalled_attempt);
    assert!(!snapshot.user.as_ref().unwrap().is_basic());

    let result = signing_in.await.unwrap();
    assert!(matches!(result, Err(AuthError::Superseded)));
    assert_eq!(manager.snapshot().phase, AuthPhase::Ready);
}

#[tokio::test]
async fn test_provider_sign_in_replaces_degraded_session() {
    let (manager, backend) = setup(quick_config()).await;
    backend.fail_profile_fetches(u32::MAX).await;
    let snapshot = manager.sign_in(credentials()).await.unwrap();
    assert_eq!(snapshot.phase, AuthPhase::Degraded);

    backend.fail_profile_fetches(0).await;
    let other = backend
        .sign_in_with_password("client@portal.local", "client-password")
        .await
        .unwrap();
    let other_id = other.user.id;

    let snapshot = manager
        .handle_auth_event(AuthEvent::SignedIn(other))
        .await
        .unwrap();
    assert_eq!(snapshot.phase, AuthPhase::Ready);
    assert!(!snapshot.profile_enhancement_failed);
    let user = snapshot.user.as_ref().unwrap();
    assert_eq!(user.id, other_id);
    assert_eq!(user.role, UserRole::Client);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_enhancement_degrades_and_discards_late_result() {
    let (manager, backend) = setup(quick_config()).await;
    backend
        .set_profile_latency(Some(Duration::from_secs(60)))
        .await;

    let signing_in = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.sign_in(credentials()).await })
    };

    let mut rx = manager.subscribe();
    while rx.borrow_and_update().phase != AuthPhase::Enhancing {
        rx.changed().await.unwrap();
    }

    let snapshot = manager.cancel_enhancement().await.unwrap();
    assert_eq!(snapshot.phase, AuthPhase::Degraded);

    let result = signing_in.await.unwrap();
    assert!(matches!(result, Err(AuthError::Superseded)));
    assert_eq!(manager.snapshot().phase, AuthPhase::Degraded);
}

#[tokio::test]
async fn test_wrong_password_then_success() {
    let (manager, _) = setup(quick_config()).await;
    let err = manager
        .sign_in(Credentials {
            email: EMAIL.to_string(),
            password: "wrong".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
    assert_eq!(manager.snapshot().phase, AuthPhase::Error);

    let snapshot = manager.sign_in(credentials()).await.unwrap();
    assert_eq!(snapshot.phase, AuthPhase::Ready);
    assert!(snapshot.last_error.is_none());
}

#[tokio::test]
async fn test_sign_out_clears_local_state() {
    let (manager, _) = setup(quick_config()).await;
    manager.sign_in(credentials()).await.unwrap();

    let outcome = manager.sign_out().await;
    assert!(outcome.remote_confirmed);

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.phase, AuthPhase::Idle);
    assert!(snapshot.user.is_none());
    assert!(!snapshot.has_identity);
    assert!(manager.access_token().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_is_bounded_when_remote_hangs() {
    let (manager, backend) = setup(quick_config()).await;
    manager.sign_in(credentials()).await.unwrap();
    backend
        .set_sign_out_latency(Some(Duration::from_secs(30)))
        .await;

    let mut rx = manager.subscribe();
    let signing_out = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.sign_out().await })
    };

    // Local state is gone before the remote call settles
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow().phase, AuthPhase::Idle);
    assert!(rx.borrow().user.is_none());

    let started = tokio::time::Instant::now();
    let outcome = signing_out.await.unwrap();
    assert!(!outcome.remote_confirmed);
    assert!(started.elapsed() <= SIGN_OUT_TIMEOUT);
}

#[tokio::test]
async fn test_restore_session_without_stored_session() {
    let (manager, _) = setup(quick_config()).await;
    assert!(manager.snapshot().is_loading());

    let snapshot = manager.restore_session().await.unwrap();
    assert!(snapshot.initialized);
    assert_eq!(snapshot.phase, AuthPhase::Idle);
    assert!(!snapshot.is_loading());
}

#[tokio::test]
async fn test_restore_session_resolves_stored_session() {
    let backend = Arc::new(MemoryBackend::with_demo_data("flow-secret").await);
    backend
        .sign_in_with_password(EMAIL, PASSWORD)
        .await
        .unwrap();

    let manager = SessionManager::new(
        backend.clone(),
        backend,
        Arc::new(NetworkMonitor::new()),
        quick_config(),
    );
    let snapshot = manager.restore_session().await.unwrap();
    assert_eq!(snapshot.phase, AuthPhase::Ready);
    assert_eq!(snapshot.user.as_ref().unwrap().email, EMAIL);
}

#[tokio::test]
async fn test_provider_sign_out_event_clears_state() {
    let (manager, _) = setup(quick_config()).await;
    manager.sign_in(credentials()).await.unwrap();

    let snapshot = manager.handle_auth_event(AuthEvent::SignedOut).await.unwrap();
    assert_eq!(snapshot.phase, AuthPhase::Idle);
    assert!(snapshot.user.is_none());
}

#[tokio::test]
async fn test_profile_refresh_replaces_user() {
    let (manager, backend) = setup(quick_config()).await;
    let snapshot = manager.sign_in(credentials()).await.unwrap();
    let user = snapshot.user.clone().unwrap();

    let mut record = freelance_portal::auth::ProfileRecord {
        id: user.id,
        email: Some(EMAIL.to_string()),
        role: "admin".to_string(),
        full_name: Some("Promoted".to_string()),
        avatar_url: None,
        company: None,
        permissions: Vec::new(),
        is_client: false,
        assigned_project_ids: Vec::new(),
    };
    backend.put_profile(record.clone()).await;

    let refreshed = manager.handle_auth_event(AuthEvent::UserUpdated).await.unwrap();
    let refreshed_user = refreshed.user.as_ref().unwrap();
    assert_eq!(refreshed_user.role, UserRole::Admin);
    assert_eq!(refreshed_user.display_name(), "Promoted");

    // A failed refresh keeps the current user
    backend.fail_profile_fetches(1).await;
    record.full_name = Some("Never seen".to_string());
    backend.put_profile(record).await;
    assert!(manager.refresh_profile().await.is_err());
    assert_eq!(
        manager.snapshot().user.as_ref().unwrap().display_name(),
        "Promoted"
    );
}

#[tokio::test]
async fn test_sign_up_signs_in_when_confirmation_not_needed() {
    let (manager, _) = setup(quick_config()).await;
    let outcome = manager
        .sign_up(SignUpRequest {
            email: "new@client.io".to_string(),
            password: "long-enough".to_string(),
            full_name: "New Client".to_string(),
            company: Some("Acme".to_string()),
            role: UserRole::Client,
        })
        .await
        .unwrap();
    assert_eq!(outcome, SignUpOutcome::SignedIn);

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.phase, AuthPhase::Ready);
    assert!(snapshot.user.as_ref().unwrap().client_portal.is_client);
}

#[tokio::test]
async fn test_sign_up_rejects_short_password_locally() {
    let (manager, backend) = setup(quick_config()).await;
    let before = backend.request_count();
    let err = manager
        .sign_up(SignUpRequest {
            email: "new@client.io".to_string(),
            password: "123".to_string(),
            full_name: "New Client".to_string(),
            company: None,
            role: UserRole::Client,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));
    assert_eq!(backend.request_count(), before);
}

#[tokio::test]
async fn test_reset_password_validates_email() {
    let (manager, _) = setup(quick_config()).await;
    assert!(manager.reset_password("nobody@portal.local").await.is_ok());
    assert!(matches!(
        manager.reset_password("nobody").await,
        Err(AuthError::Validation(_))
    ));
}
