use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use shared::storage::{detect_content_type, SharedStore};
use shared::{image_key_for, ServiceError};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::poller::{PollOutcome, ReportPoller};
use super::{ACK_MESSAGE, ERROR_MESSAGE, NO_IMAGE_MESSAGE, TIMEOUT_MESSAGE};
use crate::connector::{ChatConnector, ConnectorError};
use crate::handlers::validation::{select_image_attachment, validate_attachment_size, validate_url};
use crate::models::{Activity, Attachment};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Attachment rejected: {0}")]
    InvalidAttachment(String),

    #[error("Attachment download failed: {0}")]
    Download(ServiceError),

    #[error("Failed to store image: {0}")]
    Storage(ServiceError),

    #[error("Failed to poll for report: {0}")]
    Poll(ServiceError),

    #[error("Failed to reply: {0}")]
    Connector(#[from] ConnectorError),
}

/// Everything that happens after a message with an image arrives
pub struct IntakeFlow {
    store: SharedStore,
    connector: Arc<dyn ChatConnector>,
    http_client: Client,
    poller: ReportPoller,
    max_attachment_bytes: usize,
}

impl IntakeFlow {
    pub fn new(
        store: SharedStore,
        connector: Arc<dyn ChatConnector>,
        poller: ReportPoller,
        max_attachment_bytes: usize,
        download_timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let http_client = Client::builder()
            .timeout(download_timeout)
            .build()
            .map_err(|e| ServiceError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            store,
            connector,
            http_client,
            poller,
            max_attachment_bytes,
        })
    }

    /// Runs to completion on a detached task; failures end up as chat replies.
    pub async fn handle_message(&self, activity: Activity) {
        let Some(attachment) = select_image_attachment(&activity).cloned() else {
            info!(conversation = ?activity.conversation_id(), "Message without an image attachment");
            self.reply(&activity, NO_IMAGE_MESSAGE).await;
            return;
        };

        match self.process_attachment(&activity, &attachment).await {
            Ok(text) => self.reply(&activity, &text).await,
            Err(IntakeError::InvalidAttachment(reason)) => {
                warn!("Rejected attachment: {}", reason);
                self.reply(&activity, &format!("Sorry, that image can't be analyzed: {}", reason))
                    .await;
            }
            Err(IntakeError::Connector(e)) => {
                error!("Could not reach the conversation: {}", e);
            }
            Err(e) => {
                error!("Intake failed: {}", e);
                self.reply(&activity, ERROR_MESSAGE).await;
            }
        }
    }

    /// Download, store, acknowledge, then wait for the report.
    /// Returns the text to relay to the user.
    pub async fn process_attachment(
        &self,
        activity: &Activity,
        attachment: &Attachment,
    ) -> Result<String, IntakeError> {
        let url = attachment
            .download_url()
            .ok_or_else(|| IntakeError::InvalidAttachment("no download URL".to_string()))?;
        validate_url(url).map_err(IntakeError::InvalidAttachment)?;

        let data = self.download(url).await?;
        validate_attachment_size(data.len(), self.max_attachment_bytes)
            .map_err(IntakeError::InvalidAttachment)?;

        let image_key = image_key_for(&Uuid::new_v4().to_string());
        let content_type = attachment
            .image_media_type()
            .unwrap_or_else(|| detect_content_type(&data))
            .to_string();
        let size = data.len();

        self.store
            .put_object(&image_key, data, &content_type)
            .await
            .map_err(IntakeError::Storage)?;
        info!(image_key = %image_key, size, content_type = %content_type, "Image stored");

        self.connector.send_text(activity, ACK_MESSAGE).await?;

        match self
            .poller
            .wait_for_report(&image_key)
            .await
            .map_err(IntakeError::Poll)?
        {
            PollOutcome::Ready(report) => Ok(report.security_analysis),
            PollOutcome::Exhausted { attempts } => {
                warn!(image_key = %image_key, attempts, "No report before poll limit");
                Ok(TIMEOUT_MESSAGE.to_string())
            }
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, IntakeError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| IntakeError::Download(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IntakeError::Download(ServiceError::from_status(
                status,
                format!("download {}", url),
            )));
        }

        if let Some(length) = response.content_length() {
            if length as usize > self.max_attachment_bytes {
                return Err(IntakeError::InvalidAttachment(format!(
                    "attachment is {} bytes, maximum is {} MB",
                    length,
                    self.max_attachment_bytes / (1024 * 1024)
                )));
            }
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| IntakeError::Download(e.into()))?;
        Ok(data.to_vec())
    }

    async fn reply(&self, activity: &Activity, text: &str) {
        if let Err(e) = self.connector.send_text(activity, text).await {
            error!("Failed to send reply: {}", e);
        }
    }
}
