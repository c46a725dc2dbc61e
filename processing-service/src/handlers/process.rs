use axum::{extract::State, http::StatusCode, Json};
use shared::{image_id_from_key, report_key_for};
use tracing::{error, info};

use crate::models::ProcessRequest;
use crate::models::ProcessResponse;
use crate::AppState;

/// Queue a stored image for processing
///
/// Returns immediately; the report shows up under `reports/` once the
/// pipeline finishes.
pub async fn trigger_processing(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> Result<(StatusCode, Json<ProcessResponse>), StatusCode> {
    if image_id_from_key(&request.blob_name).is_none() {
        error!("Rejected trigger for non-image key: {}", request.blob_name);
        return Err(StatusCode::BAD_REQUEST);
    }

    info!("Processing triggered for {}", request.blob_name);

    let pipeline = state.pipeline.clone();
    let blob_name = request.blob_name.clone();
    tokio::spawn(async move {
        if let Err(e) = pipeline.process(&blob_name).await {
            error!("Failed to process {}: {}", blob_name, e);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(ProcessResponse {
            report_name: report_key_for(&request.blob_name),
            blob_name: request.blob_name,
            status: "accepted".to_string(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::MockSecurityAnalyzer;
    use crate::ocr::MockTextRecognizer;
    use crate::pipeline::Pipeline;
    use pretty_assertions::assert_eq;
    use shared::storage::{MemoryStore, ObjectStore, SharedStore};
    use std::sync::Arc;
    use std::time::Duration;

    fn state(store: SharedStore) -> AppState {
        let mut recognizer = MockTextRecognizer::new();
        recognizer
            .expect_recognize()
            .returning(|_| Ok("db password: s3cret".to_string()));
        let mut analyzer = MockSecurityAnalyzer::new();
        analyzer
            .expect_analyze()
            .returning(|_| Ok("sensitive".to_string()));

        AppState {
            pipeline: Arc::new(Pipeline::new(
                store.clone(),
                Arc::new(recognizer),
                Arc::new(analyzer),
            )),
            store,
            watcher_enabled: false,
        }
    }

    #[tokio::test]
    async fn test_trigger_writes_report_in_background() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        store
            .put_object("images/abc", b"img".to_vec(), "image/png")
            .await
            .unwrap();

        let (status, Json(response)) = trigger_processing(
            State(state(store.clone())),
            Json(ProcessRequest {
                blob_name: "images/abc".to_string(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(response.report_name, "reports/abc.json");

        let mut written = false;
        for _ in 0..50 {
            if store.exists("reports/abc.json").await.unwrap() {
                written = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(written);
    }

    #[tokio::test]
    async fn test_trigger_rejects_non_image_keys() {
        let store: SharedStore = Arc::new(MemoryStore::new());

        let result = trigger_processing(
            State(state(store)),
            Json(ProcessRequest {
                blob_name: "reports/abc.json".to_string(),
            }),
        )
        .await;

        assert_eq!(result.unwrap_err(), StatusCode::BAD_REQUEST);
    }
}
