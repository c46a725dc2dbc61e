//! Text recognition for stored images

use async_trait::async_trait;
use shared::ServiceError;
use thiserror::Error;

pub mod read_client;

pub use read_client::ReadApiClient;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Recognition operation failed: {0}")]
    OperationFailed(String),

    #[error("Recognition did not finish after {attempts} status checks")]
    Timeout { attempts: u32 },

    #[error(transparent)]
    Service(#[from] ServiceError),
}

pub type OcrResult<T> = Result<T, OcrError>;

/// Extracts plain text from raw image bytes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> OcrResult<String>;
}
