//! # churnline: best-run selection, promotion and serving for churn models
//!
//! **Version**: 0.1.0
//!
//! churnline trains a churn classifier on several datasets, records every
//! attempt as a run, picks the best completed run by a metric, promotes it
//! into a versioned model registry plus a deployable file, and serves
//! predictions over HTTP.
//!
//! ## Protocol Guarantees
//!
//! - **Deterministic selection**: ties on the metric go to the earliest
//!   created run, so repeated selection over the same runs is stable
//! - **Idempotent tagging**: the winner carries `best_model=true` exactly once
//! - **Registry-owned versions**: versions start at 1 and are never reused
//! - **Visible partial failure**: a registered model whose deploy copy failed
//!   is reported as [`Error::PartialPromotion`] and can be reconciled
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use churnline::artifact::MemoryArtifactStore;
//! use churnline::experiment::LocalRunRegistry;
//! use churnline::promoter::{PromotionConfig, Promoter};
//! use churnline::registry::LocalModelRegistry;
//! use churnline::selector::{ModelSelector, SelectionConfig};
//! use churnline::trainer::{LogisticTrainer, Trainer, TrainingJob};
//!
//! # async fn example() -> churnline::Result<()> {
//! let runs = Arc::new(LocalRunRegistry::in_memory()?);
//! let models = Arc::new(LocalModelRegistry::in_memory()?);
//! let artifacts = Arc::new(MemoryArtifactStore::new());
//!
//! let trainer = LogisticTrainer::new(runs.clone(), artifacts.clone(), "telecom-churn");
//! trainer.train(&TrainingJob::new("sample", "data/sample.json")).await?;
//! trainer.train(&TrainingJob::new("full", "data/full.json")).await?;
//!
//! let selector = ModelSelector::new(runs.clone(), SelectionConfig::default());
//! let best = selector.select_best("telecom-churn", "auc", 5)?;
//!
//! let promoter = Promoter::new(runs, models, artifacts, PromotionConfig::default());
//! let version = promoter.promote(&best).await?;
//! println!("deployed {} v{}", version.name(), version.version());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod artifact;
pub mod config;
pub mod db;
pub mod error;
pub mod experiment;
pub mod model;
pub mod pipeline;
pub mod promoter;
pub mod registry;
pub mod selector;
pub mod serving;
pub mod telemetry;
pub mod topk;
pub mod trainer;

pub use error::{Error, Result};
