//! Model Registry - versioned catalog of deployable models
//!
//! Versions are assigned by the registry, start at 1, increase by one per
//! registration under the same name, and are never reused. Registry calls
//! are blocking; async callers go through [`crate::db::blocking`].

mod local;

pub use local::LocalModelRegistry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// One registered version of a logical model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelVersion {
    name: String,
    version: u64,
    source_run_id: String,
    artifact_uri: String,
    created_at: DateTime<Utc>,
}

impl ModelVersion {
    /// Logical model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry-assigned version number.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Run the artifact came from.
    #[must_use]
    pub fn source_run_id(&self) -> &str {
        &self.source_run_id
    }

    /// Artifact-store URI of the registered model.
    #[must_use]
    pub fn artifact_uri(&self) -> &str {
        &self.artifact_uri
    }

    /// Registration timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Registry operations consumed by the promoter and the serving layer.
pub trait ModelRegistry: Send + Sync + 'static {
    /// Register `artifact_uri` under `name`; the registry picks the version.
    fn register_model(&self, artifact_uri: &str, name: &str) -> Result<ModelVersion>;

    /// Fetch one version. `NotFound` if absent.
    fn get_version(&self, name: &str, version: u64) -> Result<ModelVersion>;

    /// Highest version registered under `name`, if any.
    fn latest_version(&self, name: &str) -> Result<Option<ModelVersion>>;

    /// All versions under `name`, oldest first.
    fn list_versions(&self, name: &str) -> Result<Vec<ModelVersion>>;
}
