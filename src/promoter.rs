//! Promoter - turn a selected run into a registered, deployable model
//!
//! Promotion has two side effects that are not atomic together:
//!
//! 1. register the run's artifact in the model registry (assigns a version)
//! 2. write a self-contained copy to `<deploy_dir>/best_model_<run_id>.json`
//!
//! If step 2 fails after step 1 succeeded the caller gets
//! [`Error::PartialPromotion`] carrying the assigned version, and
//! [`Promoter::reconcile`] finishes the job without registering again.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::artifact::{temp_path, ArtifactStore};
use crate::experiment::{RunRecord, RunRegistry};
use crate::model::ChurnModel;
use crate::registry::{ModelRegistry, ModelVersion};
use crate::{db, Error, Result};

/// Promotion settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionConfig {
    /// Registered model name
    pub model_name: String,
    /// Directory receiving deployable copies
    pub deploy_dir: PathBuf,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            model_name: "telecom_churn_model".to_string(),
            deploy_dir: PathBuf::from("models"),
        }
    }
}

/// Path of the deployable copy for `run_id` under `deploy_dir`.
#[must_use]
pub fn deployed_path(deploy_dir: &Path, run_id: &str) -> PathBuf {
    deploy_dir.join(format!("best_model_{run_id}.json"))
}

/// Registers selected runs and writes their deployable copies.
#[derive(Debug)]
pub struct Promoter<R, M, A> {
    runs: Arc<R>,
    models: Arc<M>,
    artifacts: Arc<A>,
    config: PromotionConfig,
}

impl<R, M, A> Promoter<R, M, A>
where
    R: RunRegistry,
    M: ModelRegistry,
    A: ArtifactStore,
{
    /// Create a promoter.
    pub const fn new(
        runs: Arc<R>,
        models: Arc<M>,
        artifacts: Arc<A>,
        config: PromotionConfig,
    ) -> Self {
        Self {
            runs,
            models,
            artifacts,
            config,
        }
    }

    /// Promotion settings.
    #[must_use]
    pub const fn config(&self) -> &PromotionConfig {
        &self.config
    }

    /// Where the deployable copy for `run_id` lives.
    #[must_use]
    pub fn deployed_path(&self, run_id: &str) -> PathBuf {
        deployed_path(&self.config.deploy_dir, run_id)
    }

    /// Register `run_id`'s model and write its deployable copy.
    ///
    /// # Errors
    ///
    /// - `InvalidRun` if the run is absent, not completed, or has no artifact
    /// - any registry error from step 1, unchanged
    /// - `PartialPromotion` if the deploy copy fails after registration
    pub async fn promote(&self, run_id: &str) -> Result<ModelVersion> {
        let run = self.fetch_run(run_id).await.map_err(|e| match e {
            Error::NotFound { .. } => Error::invalid_run(run_id, "run does not exist"),
            other => other,
        })?;
        if !run.is_completed() {
            return Err(Error::invalid_run(
                run_id,
                format!("run status is {:?}, expected Success", run.status()),
            ));
        }
        let artifact = run
            .artifact()
            .ok_or_else(|| Error::invalid_run(run_id, "run has no model artifact"))?;

        let version = {
            let models = Arc::clone(&self.models);
            let uri = artifact.uri().to_string();
            let name = self.config.model_name.clone();
            db::blocking(move || models.register_model(&uri, &name)).await?
        };

        match self.deploy(&version).await {
            Ok(path) => {
                info!(
                    model = version.name(),
                    version = version.version(),
                    run_id,
                    path = %path.display(),
                    "promoted model"
                );
                Ok(version)
            }
            Err(e) => {
                error!(
                    model = version.name(),
                    version = version.version(),
                    run_id,
                    error = %e,
                    "model registered but deploy copy failed"
                );
                Err(Error::PartialPromotion {
                    name: version.name().to_string(),
                    version: version.version(),
                    run_id: run_id.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Write the deployable copy for an already registered version.
    ///
    /// Does nothing if the copy already exists. Never registers.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown version, or the error from reading
    /// the artifact or writing the copy.
    pub async fn reconcile(&self, name: &str, version: u64) -> Result<PathBuf> {
        let registered = {
            let models = Arc::clone(&self.models);
            let name = name.to_string();
            db::blocking(move || models.get_version(&name, version)).await?
        };
        let path = self.deployed_path(registered.source_run_id());
        if tokio::fs::try_exists(&path).await? {
            info!(model = name, version, path = %path.display(), "deploy copy already present");
            return Ok(path);
        }
        let path = self.deploy(&registered).await?;
        info!(model = name, version, path = %path.display(), "reconciled deploy copy");
        Ok(path)
    }

    async fn fetch_run(&self, run_id: &str) -> Result<RunRecord> {
        let runs = Arc::clone(&self.runs);
        let run_id = run_id.to_string();
        db::blocking(move || runs.get_run(&run_id)).await
    }

    async fn deploy(&self, version: &ModelVersion) -> Result<PathBuf> {
        let bytes = self.artifacts.fetch(version.artifact_uri()).await?;

        let run = self.fetch_run(version.source_run_id()).await?;
        if let Some(record) = run.artifact() {
            if !record.verify(&bytes) {
                return Err(Error::invalid_run(
                    version.source_run_id(),
                    format!("artifact content does not match {}", record.cas_hash()),
                ));
            }
        }
        ChurnModel::from_bytes(&bytes)?;

        let path = self.deployed_path(version.source_run_id());
        tokio::fs::create_dir_all(&self.config.deploy_dir).await?;
        let tmp = temp_path(&path);
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(path)
    }
}
