//! HTTP server.
//!
//! This module provides:
//! - Shared application state (config, storage, services, clock)
//! - The axum router with open CORS
//! - Serving with graceful shutdown on Ctrl+C / SIGTERM

mod handlers;

pub use handlers::*;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method,
    },
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::ballot::BallotService;
use crate::config::Config;
use crate::profile::ProfileService;
use crate::reactions::ReactionService;
use crate::stats::StatsEngine;
use crate::storage::SqliteStorage;

/// Source of "now" for request handling.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// SQLite storage backend.
    pub storage: SqliteStorage,
    /// Displayed statistics.
    pub stats: StatsEngine<SqliteStorage>,
    /// Case voting.
    pub ballots: BallotService<SqliteStorage>,
    /// Visitor profiles.
    pub profiles: ProfileService<SqliteStorage>,
    /// Argument and testimony reactions.
    pub reactions: ReactionService<SqliteStorage>,
    clock: Clock,
}

impl AppState {
    /// Create new application state reading the system clock
    pub fn new(config: Config, storage: SqliteStorage) -> Self {
        Self::with_clock(config, storage, Arc::new(Utc::now))
    }

    /// Create application state with an injected clock
    pub fn with_clock(config: Config, storage: SqliteStorage, clock: Clock) -> Self {
        let offset = config.tribunal.visit_offset();

        tracing::info!(
            default_stats_mode = %config.tribunal.default_stats_mode,
            reaction_vote_policy = %config.tribunal.reaction_vote_policy,
            visit_utc_offset_hours = config.tribunal.visit_utc_offset_hours,
            "AppState initializing"
        );

        Self {
            stats: StatsEngine::new(storage.clone()),
            ballots: BallotService::new(storage.clone(), offset),
            profiles: ProfileService::new(storage.clone(), offset),
            reactions: ReactionService::new(storage.clone(), config.tribunal.reaction_vote_policy),
            storage,
            config,
            clock,
        }
    }

    /// Current time according to the state's clock.
    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;

/// Build the router with every endpoint and open CORS.
pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("apikey"),
            HeaderName::from_static("x-client-info"),
        ])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/healthz", get(healthz).fallback(method_not_allowed))
        .route("/current-case", get(current_case).fallback(method_not_allowed))
        .route("/list-cases", get(list_cases).fallback(method_not_allowed))
        .route("/stats", get(stats).fallback(method_not_allowed))
        .route("/ai-council", get(ai_council).fallback(method_not_allowed))
        .route("/profile", get(profile).fallback(method_not_allowed))
        .route("/vote", post(vote).fallback(method_not_allowed))
        .route("/list-arguments", get(list_arguments).fallback(method_not_allowed))
        .route("/vote-argument", post(vote_argument).fallback(method_not_allowed))
        .route("/list-testimonies", get(list_testimonies).fallback(method_not_allowed))
        .route("/submit-testimony", post(submit_testimony).fallback(method_not_allowed))
        .route("/vote-testimony", post(vote_testimony).fallback(method_not_allowed))
        .fallback(not_found)
        .layer(cors)
        .with_state(state)
}

/// Bind to `listener` and serve until `shutdown` resolves.
pub async fn serve_with_shutdown<F>(
    state: SharedState,
    listener: TcpListener,
    shutdown: F,
) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = router(state);

    if let Ok(address) = listener.local_addr() {
        info!(%address, "Server listening");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Bind the configured address and serve until Ctrl+C or SIGTERM.
pub async fn serve(state: SharedState) -> std::io::Result<()> {
    let address = state.config.server.bind_address;
    info!(%address, "Binding");

    let listener = TcpListener::bind(address).await?;
    serve_with_shutdown(state, listener, shutdown_signal()).await?;

    info!("Server shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
