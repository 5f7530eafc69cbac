use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::SourceError;

/// Abstraction over the storage holding source files (S3, local disk, ...)
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Keys of every object whose key starts with `prefix`
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>>;

    /// Full content of the object stored under `key`
    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;
}

/// Prefix to list when the caller did not configure one: the key's "directory"
pub fn default_prefix(key: &str) -> &str {
    match key.rfind('/') {
        Some(pos) => &key[..=pos],
        None => "",
    }
}

/// Locate `key` under `prefix` and download it.
///
/// The object must be listed under the prefix and match the key exactly.
pub async fn fetch_source_object(
    store: &dyn ObjectStore,
    prefix: &str,
    key: &str,
) -> Result<Vec<u8>, SourceError> {
    let keys = store
        .list_objects(prefix)
        .await
        .map_err(SourceError::Fetch)?;
    debug!(prefix, objects = keys.len(), "listed source objects");

    if !keys.iter().any(|k| k == key) {
        return Err(SourceError::NotFound {
            key: key.to_string(),
            prefix: prefix.to_string(),
        });
    }

    let bytes = store.get_object(key).await.map_err(SourceError::Fetch)?;
    info!(key, bytes = bytes.len(), "fetched source object");

    Ok(bytes)
}
