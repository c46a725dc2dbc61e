use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use serde::Deserialize;
use shared::retry::Backoff;
use shared::ServiceError;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{OcrError, OcrResult, TextRecognizer};
use crate::config::OcrConfig;

const ANALYZE_PATH: &str = "vision/v3.2/read/analyze";
const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const OPERATION_LOCATION_HEADER: &str = "Operation-Location";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadOperation {
    status: OperationStatus,
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResult {
    #[serde(default)]
    read_results: Vec<ReadPage>,
}

#[derive(Debug, Deserialize)]
struct ReadPage {
    #[serde(default)]
    lines: Vec<ReadLine>,
}

#[derive(Debug, Deserialize)]
struct ReadLine {
    text: String,
}

impl ReadOperation {
    /// Every recognized line across every page, joined with newlines.
    fn text(&self) -> String {
        self.analyze_result
            .iter()
            .flat_map(|result| result.read_results.iter())
            .flat_map(|page| page.lines.iter())
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Client for the asynchronous Read OCR API
///
/// Submission returns an operation URL; the client then polls it on a
/// capped exponential schedule until the operation reaches a terminal state
/// or the attempt ceiling is hit.
pub struct ReadApiClient {
    http_client: Client,
    endpoint: String,
    subscription_key: String,
    backoff: Backoff,
}

impl ReadApiClient {
    pub fn new(config: &OcrConfig) -> Result<Self, ServiceError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| ServiceError::Config(format!("Failed to build OCR client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            subscription_key: config.subscription_key.clone(),
            backoff: config.backoff(),
        })
    }

    /// Submit image bytes and return the operation URL to poll.
    pub async fn submit(&self, image: &[u8]) -> OcrResult<String> {
        let url = format!("{}/{}", self.endpoint, ANALYZE_PATH);

        let response = self
            .http_client
            .post(&url)
            .header(SUBSCRIPTION_KEY_HEADER, &self.subscription_key)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(ServiceError::from)?;

        let status = response.status();
        if status != StatusCode::ACCEPTED && !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(
                status,
                format!("Read submission rejected: {}", body),
            )
            .into());
        }

        let location = response
            .headers()
            .get(OPERATION_LOCATION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::MalformedResponse(
                    "Read submission response has no Operation-Location header".to_string(),
                )
            })?;

        debug!("Read operation submitted: {}", location);
        Ok(location)
    }

    async fn fetch_operation(&self, location: &str) -> OcrResult<ReadOperation> {
        let response = self
            .http_client
            .get(location)
            .header(SUBSCRIPTION_KEY_HEADER, &self.subscription_key)
            .send()
            .await
            .map_err(ServiceError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(
                status,
                format!("Read status check failed: {}", body),
            )
            .into());
        }

        let body = response.bytes().await.map_err(ServiceError::from)?;
        let operation = serde_json::from_slice(&body).map_err(ServiceError::from)?;
        Ok(operation)
    }

    /// Poll the operation until it succeeds, fails, or the attempt ceiling is reached.
    pub async fn wait_for_text(&self, location: &str) -> OcrResult<String> {
        for (attempt, delay) in self.backoff.delays().enumerate() {
            tokio::time::sleep(delay).await;

            let operation = match self.fetch_operation(location).await {
                Ok(operation) => operation,
                Err(OcrError::Service(e)) if e.is_retryable() => {
                    warn!("Read status check {} failed, retrying: {}", attempt + 1, e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            debug!("Read status check {}: {:?}", attempt + 1, operation.status);

            match operation.status {
                OperationStatus::Succeeded => return Ok(operation.text()),
                OperationStatus::Failed => {
                    return Err(OcrError::OperationFailed(location.to_string()))
                }
                OperationStatus::NotStarted | OperationStatus::Running => {}
            }
        }

        Err(OcrError::Timeout {
            attempts: self.backoff.max_attempts,
        })
    }
}

#[async_trait]
impl TextRecognizer for ReadApiClient {
    async fn recognize(&self, image: &[u8]) -> OcrResult<String> {
        let location = self.submit(image).await?;
        let text = self.wait_for_text(&location).await?;
        info!("Read operation finished with {} characters", text.len());
        Ok(text)
    }
}
