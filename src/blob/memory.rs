use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::blob::{join_uri, BlobStore};
use crate::error::{RaceError, Result};

#[derive(Debug, Clone)]
struct Blob {
    data: Vec<u8>,
    content_type: String,
}

/// In-process blob store, used by tests and dry runs.
#[derive(Debug)]
pub struct MemoryBlobStore {
    base_uri: String,
    blobs: RwLock<BTreeMap<String, Blob>>,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("mem://")
    }
}

impl MemoryBlobStore {
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
            blobs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Content type recorded for `key`, if the blob exists.
    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.blobs
            .read()
            .await
            .get(key)
            .map(|b| b.content_type.clone())
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(key)
            .map(|b| b.data.clone())
            .ok_or_else(|| RaceError::BlobNotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        self.blobs.write().await.insert(
            key.to_string(),
            Blob {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .blobs
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn uri(&self, key: &str) -> String {
        join_uri(&self.base_uri, key)
    }
}
