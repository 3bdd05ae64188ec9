//! Training pipeline: train every dataset, then select and promote once.
//!
//! Jobs run concurrently on a [`JoinSet`]; each job gets `retries` extra
//! attempts separated by a fixed delay. Selection waits for every job to
//! finish. By default a job that exhausts its retries stops the pipeline
//! before selection, so a round never promotes from an incomplete set.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::artifact::ArtifactStore;
use crate::experiment::RunRegistry;
use crate::promoter::Promoter;
use crate::registry::{ModelRegistry, ModelVersion};
use crate::selector::ModelSelector;
use crate::trainer::{Trainer, TrainingJob};
use crate::{db, Error, Result};

/// Pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// One training job per dataset
    pub jobs: Vec<TrainingJob>,
    /// Extra attempts per job after the first failure
    pub retries: u32,
    /// Pause between attempts, in seconds
    pub retry_delay_secs: u64,
    /// Select among the successful jobs even if some failed
    pub allow_partial: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            jobs: Vec::new(),
            retries: 1,
            retry_delay_secs: 120,
            allow_partial: false,
        }
    }
}

impl PipelineConfig {
    /// Pause between attempts.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// A job that produced a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainedRun {
    /// Dataset name from the job
    pub dataset: String,
    /// Resulting run
    pub run_id: String,
    /// Attempts used, including the successful one
    pub attempts: u32,
}

/// A job that exhausted its retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    /// Dataset name from the job
    pub dataset: String,
    /// Last error, rendered
    pub error: String,
}

/// Outcome of one pipeline round.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Successful jobs
    pub trained: Vec<TrainedRun>,
    /// Failed jobs; non-empty only with `allow_partial`
    pub failed: Vec<JobFailure>,
    /// Selected run
    pub best_run_id: String,
    /// Registered version of the selected run
    pub model: ModelVersion,
}

/// Train → barrier → select → promote.
pub struct Pipeline<T, R, M, A> {
    trainer: Arc<T>,
    selector: ModelSelector<R>,
    promoter: Promoter<R, M, A>,
    experiment: String,
    config: PipelineConfig,
}

impl<T, R, M, A> Pipeline<T, R, M, A>
where
    T: Trainer + 'static,
    R: RunRegistry,
    M: ModelRegistry,
    A: ArtifactStore,
{
    /// Assemble a pipeline selecting within `experiment`.
    pub fn new(
        trainer: Arc<T>,
        selector: ModelSelector<R>,
        promoter: Promoter<R, M, A>,
        experiment: impl Into<String>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            trainer,
            selector,
            promoter,
            experiment: experiment.into(),
            config,
        }
    }

    /// Run one round over the configured jobs.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::run_jobs`].
    pub async fn run(&self) -> Result<PipelineReport> {
        self.run_jobs(&self.config.jobs).await
    }

    /// Run one round over `jobs`.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if `jobs` is empty
    /// - `Other` if a job exhausted its retries (unless `allow_partial`)
    /// - any selection or promotion error
    pub async fn run_jobs(&self, jobs: &[TrainingJob]) -> Result<PipelineReport> {
        if jobs.is_empty() {
            return Err(Error::InvalidInput("pipeline has no training jobs".to_string()));
        }

        let (trained, failed) = self.train_all(jobs).await;
        info!(
            trained = trained.len(),
            failed = failed.len(),
            "training round finished"
        );

        if !failed.is_empty() && (trained.is_empty() || !self.config.allow_partial) {
            let summary = failed
                .iter()
                .map(|f| format!("{}: {}", f.dataset, f.error))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::Other(format!(
                "{} of {} training jobs failed, selection skipped ({summary})",
                failed.len(),
                jobs.len()
            )));
        }

        let best_run_id = {
            let selector = self.selector.clone();
            let experiment = self.experiment.clone();
            db::blocking(move || selector.select_default(&experiment)).await?
        };
        let model = self.promoter.promote(&best_run_id).await?;

        Ok(PipelineReport {
            trained,
            failed,
            best_run_id,
            model,
        })
    }

    async fn train_all(&self, jobs: &[TrainingJob]) -> (Vec<TrainedRun>, Vec<JobFailure>) {
        let mut set = JoinSet::new();
        for job in jobs.iter().cloned() {
            let trainer = Arc::clone(&self.trainer);
            let retries = self.config.retries;
            let delay = self.config.retry_delay();
            set.spawn(async move {
                let outcome = train_with_retries(trainer.as_ref(), &job, retries, delay).await;
                (job.dataset, outcome)
            });
        }

        let mut trained = Vec::new();
        let mut failed = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((dataset, Ok((run_id, attempts)))) => trained.push(TrainedRun {
                    dataset,
                    run_id,
                    attempts,
                }),
                Ok((dataset, Err(e))) => failed.push(JobFailure {
                    dataset,
                    error: e.to_string(),
                }),
                Err(e) => failed.push(JobFailure {
                    dataset: "<unknown>".to_string(),
                    error: format!("training task aborted: {e}"),
                }),
            }
        }
        trained.sort_by(|a, b| a.dataset.cmp(&b.dataset));
        failed.sort_by(|a, b| a.dataset.cmp(&b.dataset));
        (trained, failed)
    }
}

async fn train_with_retries<T: Trainer>(
    trainer: &T,
    job: &TrainingJob,
    retries: u32,
    delay: Duration,
) -> Result<(String, u32)> {
    let mut attempt = 1;
    loop {
        match trainer.train(job).await {
            Ok(run_id) => return Ok((run_id, attempt)),
            Err(e) if attempt <= retries => {
                warn!(
                    dataset = %job.dataset,
                    attempt,
                    error = %e,
                    retry_in_secs = delay.as_secs(),
                    "training attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(dataset = %job.dataset, attempt, error = %e, "training job exhausted retries");
                return Err(e);
            }
        }
    }
}
