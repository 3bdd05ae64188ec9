//! Artifact Record - reference to a run's fitted model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::artifact::run_artifact_uri;

/// Artifact Record points at a blob stored by a run.
///
/// The `cas_hash` identifies the artifact content and follows the format
/// `algorithm:hex_digest`, e.g.
/// `sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRecord {
    run_id: String,
    key: String,
    uri: String,
    cas_hash: String,
    size_bytes: u64,
    created_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// Create an artifact record for `bytes` stored under `runs:/<run_id>/<key>`.
    #[must_use]
    pub fn from_bytes(run_id: impl Into<String>, key: impl Into<String>, bytes: &[u8]) -> Self {
        let run_id = run_id.into();
        let key = key.into();
        Self {
            uri: run_artifact_uri(&run_id, &key),
            cas_hash: sha256_hash(bytes),
            size_bytes: bytes.len() as u64,
            run_id,
            key,
            created_at: Utc::now(),
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the artifact key/name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the artifact-store URI.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Get the content-addressable hash.
    #[must_use]
    pub fn cas_hash(&self) -> &str {
        &self.cas_hash
    }

    /// Get the artifact size in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether `bytes` match the recorded content hash.
    #[must_use]
    pub fn verify(&self, bytes: &[u8]) -> bool {
        self.cas_hash == sha256_hash(bytes)
    }
}

fn sha256_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("sha256:{hex}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_record_from_bytes() {
        let artifact = ArtifactRecord::from_bytes("run-1", "model", b"weights");
        assert_eq!(artifact.run_id(), "run-1");
        assert_eq!(artifact.key(), "model");
        assert_eq!(artifact.uri(), "runs:/run-1/model");
        assert_eq!(artifact.size_bytes(), 7);
    }

    #[test]
    fn test_artifact_cas_hash_format() {
        let artifact = ArtifactRecord::from_bytes("run-1", "model", b"");
        assert_eq!(
            artifact.cas_hash(),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_artifact_verify() {
        let artifact = ArtifactRecord::from_bytes("run-1", "model", b"weights");
        assert!(artifact.verify(b"weights"));
        assert!(!artifact.verify(b"tampered"));
    }
}
