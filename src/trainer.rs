//! Trainers turn a dataset into a completed run with a stored model artifact.
//!
//! A trainer owns the full run lifecycle: create, log params, fit, log
//! metrics, store the artifact, and finish. A failed attempt still leaves a
//! run behind, finished as `Failed`, so it is visible but never selectable.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::artifact::{run_artifact_uri, ArtifactStore};
use crate::experiment::{ArtifactRecord, RunRegistry, RunStatus};
use crate::model::{accuracy, roc_auc, ChurnModel, Dataset, FitParams};
use crate::{db, Error, Result};

/// Artifact key of the fitted model inside a run.
pub const MODEL_ARTIFACT_KEY: &str = "model";

/// One unit of training work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJob {
    /// Short dataset name; also used in the run name
    pub dataset: String,
    /// JSON array of records
    pub path: PathBuf,
    /// Train on a seeded random subset of this many rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_size: Option<usize>,
    /// Gradient-descent settings
    #[serde(default)]
    pub params: FitParams,
    /// Seed for sampling and the train/test split
    #[serde(default = "default_seed")]
    pub seed: u64,
}

const fn default_seed() -> u64 {
    42
}

impl TrainingJob {
    /// Job with default hyperparameters and seed.
    pub fn new(dataset: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            dataset: dataset.into(),
            path: path.into(),
            sample_size: None,
            params: FitParams::default(),
            seed: default_seed(),
        }
    }

    /// Run name recorded in the registry.
    #[must_use]
    pub fn run_name(&self) -> String {
        format!("{}_logreg_run", self.dataset)
    }
}

/// Produces completed runs in the run registry.
pub trait Trainer: Send + Sync {
    /// Train on `job` and return the new run's ID.
    fn train(&self, job: &TrainingJob) -> impl Future<Output = Result<String>> + Send;
}

/// Logistic-regression trainer.
#[derive(Debug)]
pub struct LogisticTrainer<R, A> {
    runs: Arc<R>,
    artifacts: Arc<A>,
    experiment: String,
    target: String,
    test_fraction: f64,
}

impl<R: RunRegistry, A: ArtifactStore> LogisticTrainer<R, A> {
    /// Trainer writing runs into `experiment`, labelling on `churn`.
    pub fn new(runs: Arc<R>, artifacts: Arc<A>, experiment: impl Into<String>) -> Self {
        Self {
            runs,
            artifacts,
            experiment: experiment.into(),
            target: "churn".to_string(),
            test_fraction: 0.2,
        }
    }

    /// Use a different label column.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Fraction of rows held out for evaluation.
    #[must_use]
    pub const fn with_test_fraction(mut self, test_fraction: f64) -> Self {
        self.test_fraction = test_fraction;
        self
    }

    /// Run a registry call off the async workers.
    async fn with_runs<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&R) -> Result<T> + Send + 'static,
    {
        let runs = Arc::clone(&self.runs);
        db::blocking(move || f(&runs)).await
    }

    async fn finish(&self, run_id: &str, status: RunStatus) -> Result<()> {
        let id = run_id.to_string();
        self.with_runs(move |runs| runs.finish_run(&id, status)).await
    }

    async fn run_job(&self, run_id: &str, job: &TrainingJob) -> Result<()> {
        let params = [
            ("dataset", job.dataset.clone()),
            ("iterations", job.params.iterations.to_string()),
            ("learning_rate", job.params.learning_rate.to_string()),
            ("l2", job.params.l2.to_string()),
        ];
        let id = run_id.to_string();
        self.with_runs(move |runs| {
            params
                .iter()
                .try_for_each(|(key, value)| runs.log_param(&id, key, value))
        })
        .await?;

        let fitted = {
            let job = job.clone();
            let target = self.target.clone();
            let test_fraction = self.test_fraction;
            tokio::task::spawn_blocking(move || fit_and_evaluate(&job, &target, test_fraction))
                .await
                .map_err(|e| Error::Other(format!("training task failed: {e}")))??
        };

        let (id, accuracy, auc) = (run_id.to_string(), fitted.accuracy, fitted.auc);
        self.with_runs(move |runs| {
            runs.log_metric(&id, "accuracy", 0, accuracy)?;
            auc.map_or(Ok(()), |auc| runs.log_metric(&id, "auc", 0, auc))
        })
        .await?;
        if auc.is_none() {
            warn!(run_id, dataset = %job.dataset, "test split holds one class, auc not logged");
        }

        let bytes = fitted.model.to_bytes()?;
        let artifact = ArtifactRecord::from_bytes(run_id, MODEL_ARTIFACT_KEY, &bytes);
        self.artifacts.put(artifact.uri(), bytes).await?;
        let id = run_id.to_string();
        self.with_runs(move |runs| runs.set_artifact(&id, artifact))
            .await?;

        info!(
            run_id,
            dataset = %job.dataset,
            accuracy = fitted.accuracy,
            auc = ?fitted.auc,
            "training complete"
        );
        Ok(())
    }
}

impl<R: RunRegistry, A: ArtifactStore> Trainer for LogisticTrainer<R, A> {
    #[instrument(skip(self, job), fields(dataset = %job.dataset))]
    async fn train(&self, job: &TrainingJob) -> Result<String> {
        let experiment = self.experiment.clone();
        let run_name = job.run_name();
        let run_id = self
            .with_runs(move |runs| {
                let experiment = runs.create_experiment(&experiment)?;
                let run = runs.create_run(experiment.experiment_id(), &run_name)?;
                Ok(run.run_id().to_string())
            })
            .await?;

        match self.run_job(&run_id, job).await {
            Ok(()) => {
                self.finish(&run_id, RunStatus::Success).await?;
                Ok(run_id)
            }
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "training failed");
                if let Err(finish_err) = self.finish(&run_id, RunStatus::Failed).await {
                    warn!(run_id = %run_id, error = %finish_err, "could not mark run failed");
                }
                Err(e)
            }
        }
    }
}

struct Fitted {
    model: ChurnModel,
    accuracy: f64,
    auc: Option<f64>,
}

fn fit_and_evaluate(job: &TrainingJob, target: &str, test_fraction: f64) -> Result<Fitted> {
    let mut dataset = Dataset::load_json(&job.path, target)?;
    if let Some(n) = job.sample_size {
        dataset = dataset.sample(n, job.seed);
    }
    let (train, test) = dataset.train_test_split(test_fraction, job.seed)?;
    let model = ChurnModel::fit(&train, &job.params)?;

    let scores = model.predict_rows(test.rows());
    let predictions: Vec<u8> = scores.iter().map(|&p| u8::from(p >= 0.5)).collect();
    Ok(Fitted {
        accuracy: accuracy(test.labels(), &predictions),
        auc: roc_auc(test.labels(), &scores),
        model,
    })
}

/// The model artifact URI a [`LogisticTrainer`] writes for `run_id`.
#[must_use]
pub fn model_artifact_uri(run_id: &str) -> String {
    run_artifact_uri(run_id, MODEL_ARTIFACT_KEY)
}
