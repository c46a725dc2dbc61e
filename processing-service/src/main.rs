use axum::{
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

mod analyzers;
mod config;
mod handlers;
mod models;
mod ocr;
mod pipeline;
mod queue;

use analyzers::LlmAnalyzer;
use config::Config;
use ocr::ReadApiClient;
use pipeline::Pipeline;
use queue::StoreConsumer;
use shared::observability::{init_logging, LogConfig};
use shared::storage::{BlobClient, SharedStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub store: SharedStore,
    pub watcher_enabled: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    init_logging(LogConfig::from_env("processing-service")?)?;
    tracing::info!("Starting Processing Service...");

    // Initialize blob storage
    let store: SharedStore = Arc::new(BlobClient::new(config.storage.clone())?);
    store.ensure_container().await?;
    tracing::info!("Blob storage ready: container={}", config.storage.container);

    let recognizer = Arc::new(ReadApiClient::new(&config.ocr)?);
    let analyzer = Arc::new(LlmAnalyzer::new(&config.llm)?);
    tracing::info!(
        "Analysis clients ready: ocr={}, llm deployment={}",
        config.ocr.endpoint,
        config.llm.deployment
    );

    let pipeline = Arc::new(Pipeline::new(store.clone(), recognizer, analyzer));

    // Start the store consumer in the background
    if config.watcher.enabled {
        let consumer = Arc::new(StoreConsumer::new(
            store.clone(),
            pipeline.clone(),
            config.watcher.interval(),
            config.watcher.max_concurrent,
        ));
        tokio::spawn(consumer.run());
    } else {
        tracing::info!("Store watcher disabled, relying on POST /process triggers");
    }

    let state = AppState {
        pipeline,
        store,
        watcher_enabled: config.watcher.enabled,
    };

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/process", post(handlers::process::trigger_processing))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Processing Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
