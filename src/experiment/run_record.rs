//! Run Record - one recorded training attempt

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ArtifactRecord;
use crate::{Error, Result};

/// Tag key the selector writes on the winning run.
pub const BEST_MODEL_TAG: &str = "best_model";

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run is created but not yet started.
    Pending,
    /// Run is currently executing.
    Running,
    /// Run completed successfully.
    Success,
    /// Run failed with an error.
    Failed,
    /// Run was cancelled by user or system.
    Cancelled,
}

impl RunStatus {
    /// Whether the run has reached a final state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    /// Stable lowercase name, as stored by the registry.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(Error::InvalidInput(format!("unknown run status '{other}'"))),
        }
    }
}

/// Run Record represents a single training attempt inside an experiment.
///
/// Params, metrics and the artifact reference are frozen once the run reaches
/// a terminal status. Tags stay mutable for the whole lifetime of the run so
/// that post-hoc designations (such as [`BEST_MODEL_TAG`]) can be applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    run_id: String,
    experiment_id: String,
    run_name: String,
    sequence: u64,
    status: RunStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    params: BTreeMap<String, String>,
    metrics: BTreeMap<String, f64>,
    tags: BTreeMap<String, String>,
    artifact: Option<ArtifactRecord>,
}

impl RunRecord {
    /// Pending run with the given registry-assigned `sequence`.
    #[must_use]
    pub fn new(run_id: impl Into<String>, experiment_id: impl Into<String>, sequence: u64) -> Self {
        Self::builder(run_id, experiment_id).sequence(sequence).build()
    }

    /// Create a builder for constructing a run record with optional fields.
    #[must_use]
    pub fn builder(
        run_id: impl Into<String>,
        experiment_id: impl Into<String>,
    ) -> RunRecordBuilder {
        RunRecordBuilder::new(run_id, experiment_id)
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the parent experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the human-readable run name.
    #[must_use]
    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Get the registry-assigned creation sequence number.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Get the current run status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Whether the run finished successfully.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the start timestamp, if the run has started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Get the end timestamp, if the run has finished.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Logged parameters.
    #[must_use]
    pub const fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Latest value of every logged metric.
    #[must_use]
    pub const fn metrics(&self) -> &BTreeMap<String, f64> {
        &self.metrics
    }

    /// Latest value of one metric.
    #[must_use]
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }

    /// Current tags.
    #[must_use]
    pub const fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Value of one tag.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// The fitted-model artifact, once recorded.
    #[must_use]
    pub const fn artifact(&self) -> Option<&ArtifactRecord> {
        self.artifact.as_ref()
    }

    /// Start the run, transitioning from Pending to Running.
    pub fn start(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Finish the run with a terminal status.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRun` if the run already finished or `status` is not terminal.
    pub fn finish(&mut self, status: RunStatus) -> Result<()> {
        if !status.is_terminal() {
            return Err(Error::invalid_run(
                &self.run_id,
                format!("{status:?} is not a terminal status"),
            ));
        }
        self.ensure_open()?;
        self.status = status;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Record a parameter value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRun` if the run already finished.
    pub fn log_param(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        self.params.insert(key.into(), value.into());
        Ok(())
    }

    /// Record the latest value of a metric.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRun` if the run already finished, `InvalidInput` for
    /// non-finite values.
    pub fn record_metric(&mut self, key: impl Into<String>, value: f64) -> Result<()> {
        self.ensure_open()?;
        if !value.is_finite() {
            return Err(Error::InvalidInput(format!(
                "metric value must be finite, got {value}"
            )));
        }
        self.metrics.insert(key.into(), value);
        Ok(())
    }

    /// Attach the fitted-model artifact. Write-once.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRun` if an artifact is already attached or the run finished.
    pub fn attach_artifact(&mut self, artifact: ArtifactRecord) -> Result<()> {
        self.ensure_open()?;
        if self.artifact.is_some() {
            return Err(Error::invalid_run(&self.run_id, "artifact already recorded"));
        }
        self.artifact = Some(artifact);
        Ok(())
    }

    /// Set a tag. Overwrites any previous value for the same key.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    /// Remove a tag, returning its previous value.
    pub fn remove_tag(&mut self, key: &str) -> Option<String> {
        self.tags.remove(key)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::invalid_run(
                &self.run_id,
                format!("run already finished with status {:?}", self.status),
            ));
        }
        Ok(())
    }
}

/// Lifecycle state of a stored run, reassembled by the registry.
#[derive(Debug)]
pub(crate) struct StoredState {
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, String>,
    pub artifact: Option<ArtifactRecord>,
}

/// Builder for `RunRecord`.
#[derive(Debug)]
#[allow(clippy::struct_field_names)]
pub struct RunRecordBuilder {
    run_id: String,
    experiment_id: String,
    run_name: Option<String>,
    sequence: u64,
    created_at: DateTime<Utc>,
}

impl RunRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(run_id: impl Into<String>, experiment_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            experiment_id: experiment_id.into(),
            run_name: None,
            sequence: 0,
            created_at: Utc::now(),
        }
    }

    /// Set the run name. Defaults to the run ID.
    #[must_use]
    pub fn run_name(mut self, name: impl Into<String>) -> Self {
        self.run_name = Some(name.into());
        self
    }

    /// Set the creation sequence number.
    #[must_use]
    pub const fn sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Set a custom creation timestamp (useful for deserialization/testing).
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Build the `RunRecord`.
    #[must_use]
    pub fn build(self) -> RunRecord {
        self.restore(StoredState {
            status: RunStatus::Pending,
            started_at: None,
            ended_at: None,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            tags: BTreeMap::new(),
            artifact: None,
        })
    }

    pub(crate) fn restore(self, state: StoredState) -> RunRecord {
        let run_name = self.run_name.unwrap_or_else(|| self.run_id.clone());
        RunRecord {
            run_id: self.run_id,
            experiment_id: self.experiment_id,
            run_name,
            sequence: self.sequence,
            status: state.status,
            created_at: self.created_at,
            started_at: state.started_at,
            ended_at: state.ended_at,
            params: state.params,
            metrics: state.metrics,
            tags: state.tags,
            artifact: state.artifact,
        }
    }
}
