//! Run-scoped schema caches.
//!
//! Two layers, mirroring where schemas live during a run:
//! - [`SchemaCache`]: in-memory memoization of compiled schemas, keyed
//!   by the resource signature triple. Unbounded, no eviction; entries
//!   live for the duration of one validation run.
//! - [`DiskCache`]: persistent raw schema bytes keyed by resolved URL,
//!   used by the HTTP registry when a cache folder is configured so
//!   downloads survive across runs.

use std::path::PathBuf;
use std::sync::Arc;

use moka::sync::Cache;

use crate::error::{Result, ValidationError};

/// Canonical cache key for a schema variant. Used identically by every
/// reader and writer so logically equal lookups never miss.
///
/// Strict mode is fixed for the lifetime of a run (it selects which
/// registry variant is constructed), so it is deliberately not part of
/// the key.
pub fn schema_key(kind: &str, api_version: &str, target_version: &str) -> String {
    format!("{}-{}-{}", kind, api_version, target_version)
}

/// Concurrency-safe memoization of compiled schemas.
///
/// Many workers read simultaneously; writes publish atomically, so a
/// reader never observes a partially-written entry. The cache owns the
/// stored values; callers receive shared handles.
pub struct SchemaCache<V> {
    inner: Cache<String, Arc<V>>,
}

impl<V: Send + Sync + 'static> SchemaCache<V> {
    pub fn new() -> Self {
        Self {
            inner: Cache::builder().build(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        self.inner.get(key)
    }

    pub fn set(&self, key: String, value: Arc<V>) {
        self.inner.insert(key, value);
    }
}

impl<V: Send + Sync + 'static> Default for SchemaCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Persistent cache of downloaded schema bytes, content-addressed on
/// disk under the configured folder.
pub struct DiskCache {
    folder: PathBuf,
}

impl DiskCache {
    pub fn new(folder: PathBuf) -> Self {
        Self { folder }
    }

    /// Retrieve cached schema bytes for a resolved URL
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match cacache::read(&self.folder, key).await {
            Ok(data) => Ok(Some(data)),
            Err(cacache::Error::EntryNotFound(_, _)) => Ok(None),
            Err(e) => Err(ValidationError::Cache(format!(
                "failed reading schema from disk cache: {}",
                e
            ))),
        }
    }

    /// Store schema bytes for a resolved URL
    pub async fn set(&self, key: &str, data: &[u8]) -> Result<()> {
        cacache::write(&self.folder, key, data)
            .await
            .map_err(|e| {
                ValidationError::Cache(format!("failed writing schema to disk cache: {}", e))
            })?;
        Ok(())
    }
}
