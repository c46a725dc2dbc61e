//! In-memory object store for local runs and tests

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::ObjectStore;
use crate::types::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|obj| obj.content_type.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn ensure_container(&self) -> ServiceResult<()> {
        Ok(())
    }

    async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> ServiceResult<()> {
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn create_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> ServiceResult<()> {
        let mut objects = self.objects.write().await;
        if objects.contains_key(key) {
            return Err(ServiceError::AlreadyExists(key.to_string()));
        }
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get_object(&self, key: &str) -> ServiceResult<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|obj| obj.data.clone())
            .ok_or_else(|| ServiceError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> ServiceResult<bool> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn list_keys(&self, prefix: &str) -> ServiceResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
