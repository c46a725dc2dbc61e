use axum::{extract::State, http::StatusCode, Json};

use crate::models::HealthResponse;
use crate::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let storage_reachable = match state.store.exists(".health").await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!("Storage health check failed: {}", e);
            false
        }
    };

    let code = if storage_reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(HealthResponse {
            status: if storage_reachable { "healthy" } else { "degraded" }.to_string(),
            service: "processing-service".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            storage_reachable,
            watcher_enabled: state.watcher_enabled,
        }),
    )
}
