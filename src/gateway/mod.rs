//! Byte storage behind the artifact registry.
//!
//! Keys are `/`-separated relative paths such as
//! `nyc_airbnb/artifacts/clean_sample.csv/v0/manifest.json`.

use crate::config::{store_key, StoreConfig};
use crate::error::{ArtifactServiceError, ConfigError};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;

pub mod fs_store;
pub mod http_store;

pub use fs_store::FsBlobStore;
pub use http_store::HttpBlobStore;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the bytes stored under `key`, `None` if nothing is there
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ArtifactServiceError>;

    /// Store `bytes` under `key`, replacing any previous content
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ArtifactServiceError>;

    /// Human-readable location, used in logs
    fn describe(&self) -> String;
}

/// Build the configured store. `root_override` replaces the filesystem root,
/// and forces a filesystem store when the config names an HTTP one.
pub fn open_store(
    config: &StoreConfig,
    root_override: Option<&Path>,
) -> Result<Arc<dyn BlobStore>, ConfigError> {
    if let Some(root) = root_override {
        return Ok(Arc::new(FsBlobStore::new(root)));
    }
    match config {
        StoreConfig::Fs { root } => Ok(Arc::new(FsBlobStore::new(root.clone()))),
        StoreConfig::Http {
            base_url,
            bucket,
            prefix,
        } => {
            let key = store_key()?;
            Ok(Arc::new(HttpBlobStore::new(
                base_url,
                bucket,
                prefix.as_deref(),
                key,
            )))
        }
    }
}

/// Hex-encoded sha256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Reject keys that could escape the store root
pub(crate) fn check_key(key: &str) -> Result<(), ArtifactServiceError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(ArtifactServiceError::InvalidReference {
            reference: key.to_string(),
            reason: "not a valid storage key".to_string(),
        });
    }
    Ok(())
}
