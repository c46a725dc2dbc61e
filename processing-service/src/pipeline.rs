use shared::storage::SharedStore;
use shared::{image_id_from_key, report_key_for, Report, ServiceError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::analyzers::{AnalyzerError, SecurityAnalyzer};
use crate::ocr::{OcrError, TextRecognizer};

const REPORT_CONTENT_TYPE: &str = "application/json";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Not an image key: {0}")]
    InvalidKey(String),

    #[error("Storage error: {0}")]
    Storage(#[source] ServiceError),

    #[error("Text recognition failed: {0}")]
    Ocr(#[from] OcrError),

    #[error("Security analysis failed: {0}")]
    Analysis(#[from] AnalyzerError),

    #[error("Report serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug)]
pub enum ProcessOutcome {
    Written(Report),
    AlreadyProcessed,
}

/// Image to report: fetch, recognize, analyze, persist.
pub struct Pipeline {
    store: SharedStore,
    recognizer: Arc<dyn TextRecognizer>,
    analyzer: Arc<dyn SecurityAnalyzer>,
}

impl Pipeline {
    pub fn new(
        store: SharedStore,
        recognizer: Arc<dyn TextRecognizer>,
        analyzer: Arc<dyn SecurityAnalyzer>,
    ) -> Self {
        Self {
            store,
            recognizer,
            analyzer,
        }
    }

    /// Process a single stored image.
    ///
    /// Nothing is written unless every stage succeeds, so a failed image
    /// leaves no report behind.
    pub async fn process(&self, image_key: &str) -> Result<ProcessOutcome, PipelineError> {
        if image_id_from_key(image_key).is_none() {
            return Err(PipelineError::InvalidKey(image_key.to_string()));
        }

        let report_key = report_key_for(image_key);
        if self
            .store
            .exists(&report_key)
            .await
            .map_err(PipelineError::Storage)?
        {
            info!(image_key = %image_key, "Report already exists, skipping");
            return Ok(ProcessOutcome::AlreadyProcessed);
        }

        let image = self
            .store
            .get_object(image_key)
            .await
            .map_err(PipelineError::Storage)?;
        info!(image_key = %image_key, bytes = image.len(), "Processing image");

        let ocr_text = self.recognizer.recognize(&image).await?;
        let security_analysis = self.analyzer.analyze(&ocr_text).await?;

        let report = Report::new(image_key, ocr_text, security_analysis);
        match self
            .store
            .create_object(&report_key, report.to_bytes()?, REPORT_CONTENT_TYPE)
            .await
        {
            Ok(()) => {
                info!(image_key = %image_key, report_key = %report_key, "Report written");
                Ok(ProcessOutcome::Written(report))
            }
            Err(ServiceError::AlreadyExists(_)) => {
                warn!("Report {} was written concurrently, keeping existing", report_key);
                Ok(ProcessOutcome::AlreadyProcessed)
            }
            Err(e) => Err(PipelineError::Storage(e)),
        }
    }
}
