//! Experiment tracking: the run registry
//!
//! Runs, params, latest metrics, metric history and tags are rows in one
//! SQLite database; see [`LocalRunRegistry`].
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentRecord (1) ──< RunRecord (N)
//!                              │
//!                              ├── params / latest metrics / tags
//!                              ├──< MetricRecord (N) [per-step history]
//!                              └── ArtifactRecord (0..1) [write-once]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use churnline::experiment::{LocalRunRegistry, OrderBy, RunRegistry, RunStatus, SearchQuery};
//!
//! # fn main() -> churnline::Result<()> {
//! let registry = LocalRunRegistry::in_memory()?;
//! let experiment = registry.create_experiment("telecom-churn")?;
//!
//! let run = registry.create_run(experiment.experiment_id(), "sample_logreg_run")?;
//! registry.log_param(run.run_id(), "dataset", "sample")?;
//! registry.log_metric(run.run_id(), "auc", 0, 0.87)?;
//! registry.finish_run(run.run_id(), RunStatus::Success)?;
//!
//! let query = SearchQuery::new(experiment.experiment_id(), OrderBy::parse("metrics.auc DESC")?, 5);
//! assert_eq!(registry.search_runs(&query)?.len(), 1);
//! # Ok(())
//! # }
//! ```

mod artifact_record;
mod experiment_record;
mod metric_record;
mod registry;
mod run_record;
mod search;

pub use artifact_record::ArtifactRecord;
pub use experiment_record::ExperimentRecord;
pub use metric_record::MetricRecord;
pub use registry::{LocalRunRegistry, RunRegistry};
pub use run_record::{RunRecord, RunRecordBuilder, RunStatus, BEST_MODEL_TAG};
pub use search::{OrderBy, SearchQuery};
