//! Shared utilities and types for the image screening services

// Re-export common dependencies
pub use anyhow;
pub use serde;
pub use serde_json;
pub use thiserror;
pub use tracing;

pub mod observability;
pub mod retry;
pub mod storage;
pub mod types;

pub use types::error::{ServiceError, ServiceResult};
pub use types::report::{image_id_from_key, image_key_for, report_key_for, Report};
