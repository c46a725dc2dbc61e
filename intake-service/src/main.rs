use axum::{
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

mod auth;
mod config;
mod connector;
mod handlers;
mod models;
mod relay;

use auth::BotAuthenticator;
use config::Config;
use connector::BotConnectorClient;
use relay::{IntakeFlow, ReportPoller};
use shared::observability::{init_logging, LogConfig};
use shared::storage::{BlobClient, SharedStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub flow: Arc<IntakeFlow>,
    pub store: SharedStore,
    /// `None` when no app id is configured
    pub auth: Option<Arc<BotAuthenticator>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    init_logging(LogConfig::from_env("intake-service")?)?;
    tracing::info!("Starting Intake Service...");

    // Initialize blob storage
    let store: SharedStore = Arc::new(BlobClient::new(config.storage.clone())?);
    store.ensure_container().await?;
    tracing::info!("Blob storage ready: container={}", config.storage.container);

    let connector = Arc::new(BotConnectorClient::new(config.bot.clone())?);
    let auth = BotAuthenticator::new(&config.bot)?.map(Arc::new);
    if auth.is_none() {
        tracing::warn!("BOT_APP_ID not set, inbound activities and replies are unauthenticated");
    } else {
        tracing::info!(
            "Bot authentication enabled, trusted service hosts: {:?}",
            config.bot.trusted_service_hosts
        );
    }

    let poller = ReportPoller::new(
        store.clone(),
        config.poll.max_attempts,
        config.poll.interval(),
    );
    let flow = IntakeFlow::new(
        store.clone(),
        connector,
        poller,
        config.attachments.max_size_bytes(),
        Duration::from_secs(config.attachments.download_timeout_seconds),
    )?;

    // Create app state
    let state = AppState {
        flow: Arc::new(flow),
        store,
        auth,
    };

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build our application with routes
    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/messages", post(handlers::messages::receive_activity))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Intake Service listening on {}", addr);

    // Run the server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
