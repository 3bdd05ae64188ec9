//! In-memory artifact store using `DashMap`.
//!
//! Data is lost on process restart; use [`super::FsArtifactStore`] for
//! anything that must outlive the process.

use super::{ArtifactStore, ArtifactUri};
use crate::Result;
use dashmap::DashMap;

/// In-memory artifact store backed by a lock-free concurrent hashmap.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryArtifactStore {
    /// Create a new in-memory artifact store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    async fn get(&self, uri: &str) -> Result<Option<Vec<u8>>> {
        ArtifactUri::parse(uri)?;
        Ok(self.blobs.get(uri).map(|v| v.value().clone()))
    }

    async fn put(&self, uri: &str, bytes: Vec<u8>) -> Result<()> {
        ArtifactUri::parse(uri)?;
        self.blobs.insert(uri.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, uri: &str) -> Result<()> {
        self.blobs.remove(uri);
        Ok(())
    }

    async fn exists(&self, uri: &str) -> Result<bool> {
        Ok(self.blobs.contains_key(uri))
    }
}
