//! Configuration file support
//!
//! Every section has defaults, so an empty file (or no file) is a valid
//! configuration.
//!
//! # Example TOML configuration:
//! ```toml
//! [tracking]
//! experiment = "telecom-churn"
//! metric = "auc"
//! max_candidates = 5
//! best_tag_policy = "historical"
//! state_dir = ".churnline"
//! busy_timeout_ms = 5000
//!
//! [promotion]
//! model_name = "telecom_churn_model"
//! deploy_dir = "models"
//!
//! [pipeline]
//! retries = 1
//! retry_delay_secs = 120
//!
//! [[pipeline.jobs]]
//! dataset = "sample"
//! path = "data/sample.json"
//! sample_size = 200
//!
//! [server]
//! bind = "0.0.0.0"
//! port = 8000
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::PipelineConfig;
use crate::promoter::PromotionConfig;
use crate::selector::{BestTagPolicy, SelectionConfig};
use crate::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Run tracking and selection
    pub tracking: TrackingConfig,

    /// Model registration and deploy copies
    pub promotion: PromotionConfig,

    /// Training round
    pub pipeline: PipelineConfig,

    /// Prediction server
    pub server: ServerConfig,

    /// Logging
    pub logging: LoggingConfig,
}

/// Run tracking configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Experiment that trainers write to and the selector reads from
    pub experiment: String,

    /// Selection metric; higher is better
    pub metric: String,

    /// Candidate cap for selection
    pub max_candidates: usize,

    /// Handling of earlier `best_model` tags
    pub best_tag_policy: BestTagPolicy,

    /// Directory holding the registry databases and artifacts
    pub state_dir: PathBuf,

    /// How long a registry write waits for another writer, in milliseconds
    pub busy_timeout_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            experiment: "telecom-churn".to_string(),
            metric: "auc".to_string(),
            max_candidates: 5,
            best_tag_policy: BestTagPolicy::Historical,
            state_dir: PathBuf::from(".churnline"),
            busy_timeout_ms: 5_000,
        }
    }
}

impl TrackingConfig {
    /// Selector settings from this section.
    #[must_use]
    pub fn selection(&self) -> SelectionConfig {
        SelectionConfig {
            metric: self.metric.clone(),
            max_candidates: self.max_candidates,
            best_tag_policy: self.best_tag_policy,
        }
    }

    /// Run registry database.
    #[must_use]
    pub fn runs_path(&self) -> PathBuf {
        self.state_dir.join("runs.db")
    }

    /// Model registry database.
    #[must_use]
    pub fn models_path(&self) -> PathBuf {
        self.state_dir.join("models.db")
    }

    /// Writer wait for both registries.
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Artifact store root.
    #[must_use]
    pub fn artifacts_dir(&self) -> PathBuf {
        self.state_dir.join("artifacts")
    }
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub bind: String,

    /// Server port
    pub port: u16,

    /// Serve this deploy copy instead of the registry's latest version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
            model_path: None,
        }
    }
}

impl ServerConfig {
    /// `bind:port`
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error); `RUST_LOG` wins
    pub level: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Load `path` if given, defaults otherwise.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `Config` on malformed TOML or invalid values.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no component can run with.
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.tracking.max_candidates == 0 {
            return Err(Error::Config(
                "tracking.max_candidates must be at least 1".to_string(),
            ));
        }
        if self.tracking.experiment.trim().is_empty() {
            return Err(Error::Config("tracking.experiment is empty".to_string()));
        }
        if self.promotion.model_name.trim().is_empty() {
            return Err(Error::Config("promotion.model_name is empty".to_string()));
        }
        Ok(())
    }

    /// Generate example TOML configuration
    #[must_use]
    pub fn example_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}
