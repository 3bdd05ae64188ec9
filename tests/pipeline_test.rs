//! End-to-end pipeline rounds over persisted stores.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use churnline::artifact::FsArtifactStore;
use churnline::config::Config;
use churnline::experiment::{LocalRunRegistry, RunRegistry, RunStatus, BEST_MODEL_TAG};
use churnline::pipeline::{Pipeline, PipelineConfig};
use churnline::promoter::{deployed_path, Promoter};
use churnline::registry::{LocalModelRegistry, ModelRegistry};
use churnline::selector::ModelSelector;
use churnline::serving::{ModelLoader, RegistryLoader};
use churnline::trainer::{LogisticTrainer, TrainingJob};
use churnline::Error;
use serde_json::json;

type TestPipeline =
    Pipeline<LogisticTrainer<LocalRunRegistry, FsArtifactStore>, LocalRunRegistry, LocalModelRegistry, FsArtifactStore>;

fn write_dataset(dir: &Path, rows: usize) -> PathBuf {
    let records: Vec<_> = (0..rows)
        .map(|i| {
            let churn = i % 2;
            json!({
                "tenure": 40 - 30 * churn + i % 7,
                "monthly_charges": 30 + 45 * churn + i % 11,
                "contract_months": 12 * (1 + (i % 3)),
                "churn": churn,
            })
        })
        .collect();
    let path = dir.join("telco.json");
    std::fs::write(&path, serde_json::to_vec(&records).unwrap()).unwrap();
    path
}

fn config_for(root: &Path, dataset: &Path) -> Config {
    let toml = format!(
        r#"
[tracking]
experiment = "telecom-churn"
state_dir = "{state}"

[promotion]
deploy_dir = "{deploy}"

[pipeline]
retries = 1
retry_delay_secs = 0

[[pipeline.jobs]]
dataset = "sample"
path = "{data}"
sample_size = 60

[[pipeline.jobs]]
dataset = "full"
path = "{data}"
"#,
        state = root.join("state").display(),
        deploy = root.join("deploy").display(),
        data = dataset.display(),
    );
    Config::from_toml(&toml).unwrap()
}

fn build(config: &Config) -> (TestPipeline, Arc<LocalRunRegistry>, Arc<LocalModelRegistry>, Arc<FsArtifactStore>) {
    let runs = Arc::new(LocalRunRegistry::open(config.tracking.runs_path()).unwrap());
    let models = Arc::new(LocalModelRegistry::open(config.tracking.models_path()).unwrap());
    let artifacts = Arc::new(FsArtifactStore::new(config.tracking.artifacts_dir()));

    let pipeline = Pipeline::new(
        Arc::new(LogisticTrainer::new(
            Arc::clone(&runs),
            Arc::clone(&artifacts),
            config.tracking.experiment.clone(),
        )),
        ModelSelector::new(Arc::clone(&runs), config.tracking.selection()),
        Promoter::new(
            Arc::clone(&runs),
            Arc::clone(&models),
            Arc::clone(&artifacts),
            config.promotion.clone(),
        ),
        config.tracking.experiment.clone(),
        config.pipeline.clone(),
    );
    (pipeline, runs, models, artifacts)
}

#[tokio::test]
async fn test_round_trains_selects_and_promotes() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(dir.path(), 200);
    let config = config_for(dir.path(), &data);
    let (pipeline, runs, models, _) = build(&config);

    let report = pipeline.run().await.unwrap();

    let datasets: Vec<&str> = report.trained.iter().map(|t| t.dataset.as_str()).collect();
    assert_eq!(datasets, vec!["full", "sample"]);
    assert!(report.failed.is_empty());
    assert!(report.trained.iter().all(|t| t.attempts == 1));

    assert!(report
        .trained
        .iter()
        .any(|t| t.run_id == report.best_run_id));
    let best = runs.get_run(&report.best_run_id).unwrap();
    assert_eq!(best.status(), RunStatus::Success);
    assert_eq!(best.tag(BEST_MODEL_TAG), Some("true"));
    assert!(best.metric("accuracy").is_some());

    assert_eq!(report.model.version(), 1);
    assert_eq!(report.model.source_run_id(), report.best_run_id);
    assert!(deployed_path(&config.promotion.deploy_dir, &report.best_run_id).exists());
    assert_eq!(
        models
            .latest_version(&config.promotion.model_name)
            .unwrap()
            .unwrap()
            .version(),
        1
    );
}

#[tokio::test]
async fn test_state_survives_restart_and_serves_latest() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(dir.path(), 200);
    let config = config_for(dir.path(), &data);

    let first = {
        let (pipeline, ..) = build(&config);
        pipeline.run().await.unwrap()
    };

    // Fresh handles over the same state directory.
    let (pipeline, runs, models, artifacts) = build(&config);
    assert!(runs.get_run(&first.best_run_id).is_ok());
    let second = pipeline.run().await.unwrap();
    assert_eq!(second.model.version(), 2);

    let exp = runs.get_experiment_by_name("telecom-churn").unwrap().unwrap();
    let completed = runs
        .search_runs(&churnline::experiment::SearchQuery::new(
            exp.experiment_id(),
            churnline::experiment::OrderBy::metric_desc("auc"),
            usize::MAX,
        ))
        .unwrap();
    assert_eq!(completed.len(), 4);

    let loader = RegistryLoader::new(models, artifacts, config.promotion.model_name.clone());
    loader.load_current_model().await.unwrap();
    assert_eq!(loader.cached_version(), Some(2));
}

#[tokio::test]
async fn test_failed_job_blocks_selection_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(dir.path(), 200);
    let config = config_for(dir.path(), &data);
    let (pipeline, runs, models, _) = build(&config);

    let jobs = vec![
        TrainingJob::new("full", &data),
        TrainingJob::new("broken", dir.path().join("missing.json")),
    ];
    let err = pipeline.run_jobs(&jobs).await.unwrap_err();
    assert!(matches!(err, Error::Other(_)));
    assert!(err.to_string().contains("broken"));

    assert!(models
        .list_versions(&config.promotion.model_name)
        .unwrap()
        .is_empty());

    // Each failed attempt leaves a Failed run behind, never tagged.
    let exp = runs.get_experiment_by_name("telecom-churn").unwrap().unwrap();
    let failed = runs
        .search_runs(
            &churnline::experiment::SearchQuery::new(
                exp.experiment_id(),
                churnline::experiment::OrderBy::metric_desc("auc"),
                usize::MAX,
            )
            .with_status(RunStatus::Failed),
        )
        .unwrap();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|r| r.tag(BEST_MODEL_TAG).is_none()));
}

#[tokio::test]
async fn test_allow_partial_promotes_from_survivors() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(dir.path(), 200);
    let mut config = config_for(dir.path(), &data);
    config.pipeline = PipelineConfig {
        allow_partial: true,
        retries: 0,
        ..config.pipeline
    };
    let (pipeline, ..) = build(&config);

    let jobs = vec![
        TrainingJob::new("full", &data),
        TrainingJob::new("broken", dir.path().join("missing.json")),
    ];
    let report = pipeline.run_jobs(&jobs).await.unwrap();
    assert_eq!(report.trained.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].dataset, "broken");
    assert_eq!(report.best_run_id, report.trained[0].run_id);
}

#[tokio::test]
async fn test_empty_round_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(dir.path(), 50);
    let config = config_for(dir.path(), &data);
    let (pipeline, ..) = build(&config);

    assert!(matches!(
        pipeline.run_jobs(&[]).await,
        Err(Error::InvalidInput(_))
    ));
}
