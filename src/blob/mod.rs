//! Blob store collaborator.
//!
//! Solver packages, block inputs and job outputs all live in a blob store
//! addressed by slash-separated keys. The executor reads and writes it by
//! URI; the engine reads it by key.

pub mod local;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read the blob stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Store `data` under `key`, replacing any previous blob.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()>;

    /// Keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Address of `key` as the executor sees it.
    fn uri(&self, key: &str) -> String;
}

/// Read a blob as UTF-8 text with surrounding whitespace removed.
pub async fn read_trimmed(store: &dyn BlobStore, key: &str) -> Result<String> {
    let bytes = store.get(key).await?;
    Ok(String::from_utf8_lossy(&bytes).trim().to_string())
}

pub(crate) fn join_uri(base: &str, key: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        key.trim_start_matches('/')
    )
}
