//! Artifact storage for fitted models
//!
//! Artifacts are opaque byte blobs addressed by run-scoped URIs of the form
//! `runs:/<run_id>/<key>`. Two backends:
//! - [`MemoryArtifactStore`]: `DashMap`, lost on restart (tests, single process)
//! - [`FsArtifactStore`]: one file per artifact under a root directory
//!
//! # Example
//!
//! ```rust,no_run
//! use churnline::artifact::{run_artifact_uri, ArtifactStore, MemoryArtifactStore};
//!
//! # async fn example() -> churnline::Result<()> {
//! let store = MemoryArtifactStore::new();
//! let uri = run_artifact_uri("0f3c", "model");
//!
//! store.put(&uri, b"{}".to_vec()).await?;
//! assert_eq!(store.get(&uri).await?, Some(b"{}".to_vec()));
//!
//! store.delete(&uri).await?;
//! assert!(!store.exists(&uri).await?);
//! # Ok(())
//! # }
//! ```

mod fs;
mod memory;

pub use fs::FsArtifactStore;
pub use memory::MemoryArtifactStore;

use crate::{Error, Result};
use std::future::Future;
use std::path::{Path, PathBuf};

const RUNS_SCHEME: &str = "runs:/";

/// Artifact store trait used by trainers (write), the promoter and the
/// registry-backed model loader (read).
pub trait ArtifactStore: Send + Sync {
    /// Get an artifact by URI.
    ///
    /// Returns `None` if nothing is stored under the URI.
    fn get(&self, uri: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Store an artifact. Overwrites any existing bytes.
    fn put(&self, uri: &str, bytes: Vec<u8>) -> impl Future<Output = Result<()>> + Send;

    /// Delete an artifact.
    ///
    /// No-op if the artifact doesn't exist.
    fn delete(&self, uri: &str) -> impl Future<Output = Result<()>> + Send;

    /// Check if an artifact exists.
    fn exists(&self, uri: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Get an artifact that must exist.
    fn fetch(&self, uri: &str) -> impl Future<Output = Result<Vec<u8>>> + Send {
        async move {
            self.get(uri)
                .await?
                .ok_or_else(|| Error::not_found("artifact", uri))
        }
    }
}

/// Unique sibling of `path` to write into before renaming over it.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    path.with_file_name(name)
}

/// Build the URI of artifact `key` owned by `run_id`.
#[must_use]
pub fn run_artifact_uri(run_id: &str, key: &str) -> String {
    format!("{RUNS_SCHEME}{run_id}/{key}")
}

/// A parsed, validated `runs:/` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactUri<'a> {
    /// Owning run
    pub run_id: &'a str,
    /// Path-like key inside the run, `/`-separated
    pub key: &'a str,
}

impl<'a> ArtifactUri<'a> {
    /// Parse and validate an artifact URI.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for other schemes, empty segments, or `.`/`..`
    /// segments.
    pub fn parse(uri: &'a str) -> Result<Self> {
        let rest = uri.strip_prefix(RUNS_SCHEME).ok_or_else(|| {
            Error::InvalidInput(format!("artifact URI must start with '{RUNS_SCHEME}': {uri}"))
        })?;
        let (run_id, key) = rest
            .split_once('/')
            .ok_or_else(|| Error::InvalidInput(format!("artifact URI has no key: {uri}")))?;

        let bad_segment = |s: &str| s.is_empty() || s == "." || s == ".." || s.contains('\\');
        if bad_segment(run_id) || key.split('/').any(bad_segment) {
            return Err(Error::InvalidInput(format!("invalid artifact URI: {uri}")));
        }
        Ok(Self { run_id, key })
    }
}
