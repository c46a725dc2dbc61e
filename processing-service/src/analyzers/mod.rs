use async_trait::async_trait;
use shared::ServiceError;
use thiserror::Error;

pub mod llm_analyzer;
pub mod prompt;

pub use llm_analyzer::LlmAnalyzer;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Model returned no choices")]
    EmptyResponse,

    #[error(transparent)]
    Service(#[from] ServiceError),
}

pub type AnalyzerResult<T> = Result<T, AnalyzerError>;

/// Produces a free-text security determination for recognized text.
///
/// The returned string is stored as-is; no structure is enforced on it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecurityAnalyzer: Send + Sync {
    async fn analyze(&self, ocr_text: &str) -> AnalyzerResult<String>;
}
