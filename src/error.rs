//! Error types for churnline
//!
//! Each variant maps to a distinct operator remediation: fix configuration
//! (`NotFound`), wait for training (`EmptyResult`), retrain (`InvalidRun`),
//! or reconcile a half-finished promotion (`PartialPromotion`).

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// churnline error types
#[derive(Error, Debug)]
pub enum Error {
    /// Referenced experiment, run, or model version does not exist
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind ("experiment", "run", "model version", "artifact")
        kind: &'static str,
        /// Identifier that failed to resolve
        id: String,
    },

    /// Experiment exists but has no completed runs to choose from
    #[error("No completed runs found in experiment '{experiment}'\nWait for training to finish before selecting")]
    EmptyResult {
        /// Experiment name
        experiment: String,
    },

    /// Run exists but cannot be used (incomplete, missing artifact, already finished)
    #[error("Invalid run {run_id}: {reason}")]
    InvalidRun {
        /// Offending run
        run_id: String,
        /// Why the run was rejected
        reason: String,
    },

    /// Registry write succeeded but the deployable copy was not written
    #[error("Partial promotion: {name} v{version} registered from run {run_id}, but deploy copy failed: {reason}\nRun `churnline reconcile --version {version}` instead of re-registering")]
    PartialPromotion {
        /// Registered model name
        name: String,
        /// Version the registry assigned
        version: u64,
        /// Source run
        run_id: String,
        /// Underlying failure
        reason: String,
    },

    /// Caller supplied invalid input (bad query, malformed record, zero limit)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serving layer could not load a model
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// A lock guarding shared state was poisoned by a panicking writer
    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Registry database error, including `SQLITE_BUSY` after the busy timeout
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for [`Error::NotFound`].
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Shorthand for [`Error::InvalidRun`].
    pub fn invalid_run(run_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRun {
            run_id: run_id.into(),
            reason: reason.into(),
        }
    }
}
