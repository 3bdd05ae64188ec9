//! Experiment Record - named group of comparable runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named experiment; runs reference it by `experiment_id`.
///
/// Names are unique within a registry and are what selection is addressed
/// by.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentRecord {
    experiment_id: String,
    name: String,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl ExperimentRecord {
    /// Experiment created now, without a description.
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            name: name.into(),
            created_at: Utc::now(),
            description: None,
        }
    }

    pub(crate) fn restore(
        experiment_id: String,
        name: String,
        created_at: DateTime<Utc>,
        description: Option<String>,
    ) -> Self {
        Self {
            experiment_id,
            name,
            created_at,
            description,
        }
    }

    /// Attach a free-form description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Registry-assigned ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Unique name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// When the experiment was created.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Description, if one was given.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}
