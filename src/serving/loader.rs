//! Model loaders: where the serving layer gets its current model.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::info;

use crate::artifact::ArtifactStore;
use crate::model::ChurnModel;
use crate::registry::ModelRegistry;
use crate::{db, Error, Result};

/// Capability the prediction endpoint depends on.
///
/// Any error returned here is reported to clients as "model unavailable".
pub trait ModelLoader: Send + Sync {
    /// The model requests should be answered with right now.
    fn load_current_model(&self) -> impl Future<Output = Result<Arc<ChurnModel>>> + Send;
}

/// Reads a deploy copy from disk on every call.
#[derive(Debug, Clone)]
pub struct FileLoader {
    path: PathBuf,
}

impl FileLoader {
    /// Loader for the deploy copy at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File being served.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ModelLoader for FileLoader {
    async fn load_current_model(&self) -> Result<Arc<ChurnModel>> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            Error::ModelUnavailable(format!("cannot read {}: {e}", self.path.display()))
        })?;
        Ok(Arc::new(ChurnModel::from_bytes(&bytes)?))
    }
}

/// A fixed, already decoded model.
#[derive(Debug, Clone)]
pub struct StaticLoader {
    model: Arc<ChurnModel>,
}

impl StaticLoader {
    /// Serve `model` forever.
    #[must_use]
    pub fn new(model: ChurnModel) -> Self {
        Self {
            model: Arc::new(model),
        }
    }
}

impl ModelLoader for StaticLoader {
    async fn load_current_model(&self) -> Result<Arc<ChurnModel>> {
        Ok(Arc::clone(&self.model))
    }
}

#[derive(Debug)]
struct Cached {
    version: u64,
    model: Arc<ChurnModel>,
}

/// Serves the latest registered version of a model.
///
/// The decoded model is cached per version. Each call asks the registry for
/// its latest version and swaps in the new model when it changes, so a
/// promotion made by another process reaches the server without a restart.
#[derive(Debug)]
pub struct RegistryLoader<M, A> {
    models: Arc<M>,
    artifacts: Arc<A>,
    name: String,
    cache: ArcSwapOption<Cached>,
}

impl<M: ModelRegistry, A: ArtifactStore> RegistryLoader<M, A> {
    /// Loader for registered model `name`.
    pub fn new(models: Arc<M>, artifacts: Arc<A>, name: impl Into<String>) -> Self {
        Self {
            models,
            artifacts,
            name: name.into(),
            cache: ArcSwapOption::empty(),
        }
    }

    /// Version currently cached, if any.
    #[must_use]
    pub fn cached_version(&self) -> Option<u64> {
        self.cache.load().as_ref().map(|c| c.version)
    }
}

impl<M: ModelRegistry, A: ArtifactStore> ModelLoader for RegistryLoader<M, A> {
    async fn load_current_model(&self) -> Result<Arc<ChurnModel>> {
        let latest = {
            let models = Arc::clone(&self.models);
            let name = self.name.clone();
            db::blocking(move || models.latest_version(&name)).await?
        }
        .ok_or_else(|| {
            Error::ModelUnavailable(format!("no version of '{}' is registered", self.name))
        })?;

        if let Some(cached) = self.cache.load_full() {
            if cached.version == latest.version() {
                return Ok(Arc::clone(&cached.model));
            }
        }

        let bytes = self.artifacts.fetch(latest.artifact_uri()).await?;
        let model = Arc::new(ChurnModel::from_bytes(&bytes)?);
        self.cache.store(Some(Arc::new(Cached {
            version: latest.version(),
            model: Arc::clone(&model),
        })));
        info!(
            model = %self.name,
            version = latest.version(),
            run_id = latest.source_run_id(),
            "loaded model version"
        );
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::MemoryArtifactStore;
    use crate::model::{Dataset, FitParams, Record};
    use crate::registry::LocalModelRegistry;
    use serde_json::json;

    fn model(flip: bool) -> ChurnModel {
        let (a, b) = if flip { (1, 0) } else { (0, 1) };
        let records: Vec<Record> = [json!({"f": 0, "churn": a}), json!({"f": 1, "churn": b})]
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect();
        ChurnModel::fit(
            &Dataset::from_records(&records, "churn").unwrap(),
            &FitParams::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_file_loader_missing_file() {
        let loader = FileLoader::new("/no/such/best_model.json");
        assert!(matches!(
            loader.load_current_model().await,
            Err(Error::ModelUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_file_loader_reads_deploy_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("best_model_abc.json");
        std::fs::write(&path, model(false).to_bytes().unwrap()).unwrap();
        let loaded = FileLoader::new(&path).load_current_model().await.unwrap();
        assert_eq!(*loaded, model(false));
    }

    #[tokio::test]
    async fn test_registry_loader_hot_swaps_on_new_version() {
        let models = Arc::new(LocalModelRegistry::in_memory().unwrap());
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let loader = RegistryLoader::new(
            Arc::clone(&models),
            Arc::clone(&artifacts),
            "telecom_churn_model",
        );

        assert!(loader.load_current_model().await.is_err());

        artifacts
            .put("runs:/r1/model", model(false).to_bytes().unwrap())
            .await
            .unwrap();
        models
            .register_model("runs:/r1/model", "telecom_churn_model")
            .unwrap();
        let first = loader.load_current_model().await.unwrap();
        assert_eq!(loader.cached_version(), Some(1));

        let again = loader.load_current_model().await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        artifacts
            .put("runs:/r2/model", model(true).to_bytes().unwrap())
            .await
            .unwrap();
        models
            .register_model("runs:/r2/model", "telecom_churn_model")
            .unwrap();
        let swapped = loader.load_current_model().await.unwrap();
        assert_eq!(loader.cached_version(), Some(2));
        assert_eq!(*swapped, model(true));
    }

    #[tokio::test]
    async fn test_registry_loader_sees_versions_registered_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.db");
        let artifacts = Arc::new(MemoryArtifactStore::new());
        for (uri, flip) in [("runs:/r1/model", false), ("runs:/r2/model", true)] {
            artifacts.put(uri, model(flip).to_bytes().unwrap()).await.unwrap();
        }

        let promoting = LocalModelRegistry::open(&path).unwrap();
        promoting
            .register_model("runs:/r1/model", "telecom_churn_model")
            .unwrap();

        let serving = Arc::new(LocalModelRegistry::open(&path).unwrap());
        let loader = RegistryLoader::new(serving, Arc::clone(&artifacts), "telecom_churn_model");
        assert_eq!(*loader.load_current_model().await.unwrap(), model(false));
        assert_eq!(loader.cached_version(), Some(1));

        promoting
            .register_model("runs:/r2/model", "telecom_churn_model")
            .unwrap();
        let swapped = loader.load_current_model().await.unwrap();
        assert_eq!(loader.cached_version(), Some(2));
        assert_eq!(*swapped, model(true));
    }
}
