//! HTTP gateway for the freelance client portal.
//!
//! Each browser session gets its own session state machine and workspace
//! stores; the backend is either the hosted platform or in-memory tables.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Error;
use fp_server::{
    api::{self, AppState, SessionRegistry},
    config::{BackendMode, ServerConfig},
    logging, metrics,
};
use freelance_portal::backend::{MemoryBackend, RestBackend};
use log::info;
use pico_args::Arguments;

const HELP: &str = "\
Run the freelance client portal gateway

USAGE:
  fp_server [OPTIONS]

OPTIONS:
  --bind          IP:PORT   Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --backend-url   URL       Hosted platform URL         [default: env PORTAL_BACKEND_URL]
  --metrics-bind  IP:PORT   Prometheus exporter address [default: env METRICS_BIND, disabled if unset]

FLAGS:
  --in-memory               Serve demo data from in-memory tables
  -h, --help                Print help information

ENVIRONMENT:
  SERVER_BIND               Server bind address (e.g., 0.0.0.0:8080)
  PORTAL_BACKEND_URL        Hosted platform URL
  PORTAL_ANON_KEY           Platform anon key (required unless in-memory)
  PORTAL_JWT_SECRET         Token signing secret of the in-memory backend
  SESSION_IDLE_TIMEOUT_SECS Idle browser sessions are dropped after this
  RUST_LOG                  Log filter (e.g., info,fp_server=debug)
  (See .env.example for all configuration options)
";

struct Args {
    bind: Option<SocketAddr>,
    backend_url: Option<String>,
    metrics_bind: Option<SocketAddr>,
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        in_memory: pargs.contains("--in-memory"),
        bind: pargs.opt_value_from_str("--bind")?,
        backend_url: pargs.opt_value_from_str("--backend-url")?,
        metrics_bind: pargs.opt_value_from_str("--metrics-bind")?,
    };

    logging::init();

    let config = ServerConfig::from_env(
        args.bind,
        args.backend_url,
        args.in_memory,
        args.metrics_bind,
    )?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr)
            .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter: {}", e))?;
    }

    let sessions = match config.backend_mode {
        BackendMode::InMemory => {
            info!("Using in-memory backend with demo accounts");
            let backend = MemoryBackend::with_demo_data(config.portal.backend.jwt_secret.clone())
                .await;
            SessionRegistry::new(
                move || backend.fresh_session(),
                config.portal.auth.clone(),
                config.session_idle_timeout,
                config.max_sessions,
            )
        }
        BackendMode::Rest => {
            info!("Using hosted backend at {}", config.portal.backend.url);
            let backend = RestBackend::new(&config.portal.backend)
                .map_err(|e| anyhow::anyhow!("Failed to build backend client: {}", e))?;
            SessionRegistry::new(
                move || backend.fresh_session(),
                config.portal.auth.clone(),
                config.session_idle_timeout,
                config.max_sessions,
            )
        }
    };

    let state = AppState::new(sessions, config.portal.routes.clone());
    spawn_session_sweeper(Arc::clone(&state.sessions), config.session_idle_timeout);

    let app = api::create_router(state);

    info!("Starting HTTP server on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Shutting down server...");

    Ok(())
}

/// Periodically drop idle browser sessions
fn spawn_session_sweeper(sessions: Arc<SessionRegistry>, idle_timeout: Duration) {
    let period = (idle_timeout / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let evicted = sessions.evict_idle().await;
            if evicted > 0 {
                log::debug!("Evicted {} idle session(s)", evicted);
            }
        }
    });
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
