/// Object storage shared by the intake and processing services
///
/// This module provides:
/// - The `ObjectStore` trait both services program against
/// - A blob REST client authenticated with a SAS token
/// - An in-memory store for local runs and tests

pub mod blob_client;
pub mod memory;

pub use blob_client::{BlobClient, BlobConfig};
pub use memory::MemoryStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::types::error::ServiceResult;

pub type SharedStore = Arc<dyn ObjectStore>;

/// Key-addressed durable byte storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create the backing container if it does not exist yet.
    async fn ensure_container(&self) -> ServiceResult<()>;

    /// Write an object, replacing any previous content.
    async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> ServiceResult<()>;

    /// Write an object only if the key is free. Fails with `AlreadyExists` otherwise.
    async fn create_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> ServiceResult<()>;

    /// Fails with `NotFound` when the key is absent.
    async fn get_object(&self, key: &str) -> ServiceResult<Vec<u8>>;

    async fn exists(&self, key: &str) -> ServiceResult<bool>;

    async fn list_keys(&self, prefix: &str) -> ServiceResult<Vec<String>>;
}

/// Detect content type from file data
pub fn detect_content_type(data: &[u8]) -> &'static str {
    match data {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'B', b'M', ..] => "image/bmp",
        [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => "image/tiff",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        [b'%', b'P', b'D', b'F', ..] => "application/pdf",
        _ => "application/octet-stream",
    }
}
