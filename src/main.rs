//! churnline CLI - train, select, promote and serve churn models

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use churnline::artifact::FsArtifactStore;
use churnline::config::Config;
use churnline::db;
use churnline::experiment::LocalRunRegistry;
use churnline::pipeline::Pipeline;
use churnline::promoter::Promoter;
use churnline::registry::LocalModelRegistry;
use churnline::selector::ModelSelector;
use churnline::serving::{self, FileLoader, RegistryLoader};
use churnline::telemetry;
use churnline::trainer::{LogisticTrainer, Trainer, TrainingJob};

#[derive(Parser)]
#[command(name = "churnline")]
#[command(version)]
#[command(about = "Churn model training runs, best-run promotion and prediction serving", long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long, global = true, env = "CHURNLINE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train one dataset and record the run
    Train {
        /// Dataset name (a `pipeline.jobs` entry, or any name with --path)
        #[arg(short, long)]
        dataset: String,

        /// JSON records file; overrides the configured path
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Pick the best completed run and tag it
    Select {
        /// Metric to rank by (higher is better)
        #[arg(short, long)]
        metric: Option<String>,

        /// Number of top runs to consider
        #[arg(long)]
        max_candidates: Option<usize>,
    },

    /// Register a run's model and write its deploy copy
    Promote {
        /// Run to promote
        #[arg(long)]
        run_id: String,
    },

    /// Write the missing deploy copy of a registered version
    Reconcile {
        /// Registered version
        #[arg(long)]
        version: u64,
    },

    /// Train every configured dataset, then select and promote
    Pipeline,

    /// Serve predictions over HTTP
    Serve {
        /// Serve this deploy copy instead of the latest registered version
        #[arg(long)]
        model_path: Option<PathBuf>,

        /// Server port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print a configuration file with every default filled in
    Config,
}

struct Stores {
    runs: Arc<LocalRunRegistry>,
    models: Arc<LocalModelRegistry>,
    artifacts: Arc<FsArtifactStore>,
}

impl Stores {
    fn open(config: &Config) -> Result<Self> {
        let tracking = &config.tracking;
        Ok(Self {
            runs: Arc::new(
                LocalRunRegistry::open_with_timeout(tracking.runs_path(), tracking.busy_timeout())
                    .context("failed to open run registry")?,
            ),
            models: Arc::new(
                LocalModelRegistry::open_with_timeout(
                    tracking.models_path(),
                    tracking.busy_timeout(),
                )
                    .context("failed to open model registry")?,
            ),
            artifacts: Arc::new(FsArtifactStore::new(tracking.artifacts_dir())),
        })
    }

    fn trainer(&self, config: &Config) -> LogisticTrainer<LocalRunRegistry, FsArtifactStore> {
        LogisticTrainer::new(
            Arc::clone(&self.runs),
            Arc::clone(&self.artifacts),
            &config.tracking.experiment,
        )
    }

    fn selector(&self, config: &Config) -> ModelSelector<LocalRunRegistry> {
        ModelSelector::new(Arc::clone(&self.runs), config.tracking.selection())
    }

    fn promoter(
        &self,
        config: &Config,
    ) -> Promoter<LocalRunRegistry, LocalModelRegistry, FsArtifactStore> {
        Promoter::new(
            Arc::clone(&self.runs),
            Arc::clone(&self.models),
            Arc::clone(&self.artifacts),
            config.promotion.clone(),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())?;
    telemetry::init_tracing(&config.logging)?;

    match cli.command {
        Commands::Train { dataset, path } => {
            let job = training_job(&config, &dataset, path)?;
            let stores = Stores::open(&config)?;
            let run_id = stores.trainer(&config).train(&job).await?;
            println!("{run_id}");
        }

        Commands::Select {
            metric,
            max_candidates,
        } => {
            let stores = Stores::open(&config)?;
            let selector = stores.selector(&config);
            let metric = metric.unwrap_or_else(|| selector.config().metric.clone());
            let max_candidates = max_candidates.unwrap_or(selector.config().max_candidates);
            let experiment = config.tracking.experiment.clone();
            let run_id = db::blocking(move || {
                selector.select_best(&experiment, &metric, max_candidates)
            })
            .await?;
            println!("{run_id}");
        }

        Commands::Promote { run_id } => {
            let stores = Stores::open(&config)?;
            let promoter = stores.promoter(&config);
            let version = promoter.promote(&run_id).await?;
            println!(
                "{} v{} -> {}",
                version.name(),
                version.version(),
                promoter.deployed_path(&run_id).display()
            );
        }

        Commands::Reconcile { version } => {
            let stores = Stores::open(&config)?;
            let path = stores
                .promoter(&config)
                .reconcile(&config.promotion.model_name, version)
                .await?;
            println!("{}", path.display());
        }

        Commands::Pipeline => {
            let stores = Stores::open(&config)?;
            let pipeline = Pipeline::new(
                Arc::new(stores.trainer(&config)),
                stores.selector(&config),
                stores.promoter(&config),
                &config.tracking.experiment,
                config.pipeline.clone(),
            );
            let report = pipeline.run().await?;
            for trained in &report.trained {
                info!(
                    dataset = %trained.dataset,
                    run_id = %trained.run_id,
                    attempts = trained.attempts,
                    "trained"
                );
            }
            println!(
                "best run {} registered as {} v{}",
                report.best_run_id,
                report.model.name(),
                report.model.version()
            );
        }

        Commands::Serve { model_path, port } => {
            let mut server = config.server.clone();
            if let Some(port) = port {
                server.port = port;
            }
            let addr = server.addr();

            match model_path.or(server.model_path) {
                Some(path) => {
                    info!(path = %path.display(), "serving deploy copy");
                    serving::serve(&addr, serving::router(Arc::new(FileLoader::new(path))))
                        .await?;
                }
                None => {
                    let stores = Stores::open(&config)?;
                    info!(model = %config.promotion.model_name, "serving latest registered version");
                    let loader = RegistryLoader::new(
                        stores.models,
                        stores.artifacts,
                        &config.promotion.model_name,
                    );
                    serving::serve(&addr, serving::router(Arc::new(loader))).await?;
                }
            }
        }

        Commands::Config => {
            print!("{}", Config::example_toml());
        }
    }

    Ok(())
}

fn training_job(config: &Config, dataset: &str, path: Option<PathBuf>) -> Result<TrainingJob> {
    let configured = config
        .pipeline
        .jobs
        .iter()
        .find(|job| job.dataset == dataset)
        .cloned();
    match (configured, path) {
        (Some(mut job), Some(path)) => {
            job.path = path;
            Ok(job)
        }
        (Some(job), None) => Ok(job),
        (None, Some(path)) => Ok(TrainingJob::new(dataset, path)),
        (None, None) => bail!("dataset '{dataset}' is not configured; pass --path"),
    }
}
