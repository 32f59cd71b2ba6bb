//! HTTP server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::upstream::UpstreamClient;
use super::{admin, handlers, middleware};
use crate::config::Config;
use crate::limiter::{spawn_sweeper, RateLimiter};
use crate::pool::CredentialPool;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<CredentialPool>,
    pub limiter: Arc<RateLimiter>,
    pub upstream: UpstreamClient,
    pub config: Arc<Config>,
}

impl AppState {
    /// Build state from config around an already-loaded pool.
    pub fn new(config: Config, pool: Arc<CredentialPool>) -> crate::Result<Self> {
        let upstream = UpstreamClient::new(&config.upstream)?;
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.policy()));
        Ok(Self {
            pool,
            limiter,
            upstream,
            config: Arc::new(config),
        })
    }
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    // OpenAI-compatible endpoints
    let openai = Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/images/generations", post(handlers::image_generations))
        .route("/v1/models", get(handlers::list_models))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::require_api_key,
        ));

    // Credential administration
    let admin = Router::new()
        .route("/:password/token/list", get(admin::list_tokens))
        .route("/:password/token/append", post(admin::append_token))
        .route("/:password/token/clear", post(admin::clear_tokens));

    Router::new()
        .merge(openai)
        .merge(admin)
        .route("/health", get(handlers::health))
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit))
        .layer(from_fn(middleware::request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server until ctrl-c.
pub async fn run_server(config: Config, pool: Arc<CredentialPool>) -> anyhow::Result<()> {
    let listen_addr = config.server.listen.clone();
    let sweep_interval = config.rate_limit.sweep_interval();

    let state = AppState::new(config, pool)?;
    let sweeper = spawn_sweeper(state.limiter.clone(), sweep_interval);

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "Starting credgate server");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    sweeper.abort();
    served?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
