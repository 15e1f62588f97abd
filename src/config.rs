use std::path::{Path, PathBuf};
use std::str::FromStr;

use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::Level;

use crate::common::FileLayout;
use crate::error::AppError;
use crate::pipeline::factory::PipelineConfiguration;
use crate::pipeline::services::InferenceAccess;

const DEFAULT_CONFIG_NAME: &str = "candid";
const ENV_PREFIX: &str = "CANDID";

/// Worker settings. Values come from built-in defaults, then an optional
/// `candid.toml`, then `CANDID_*` environment variables (nested keys use
/// `__`, e.g. `CANDID_WORKER__CONCURRENCY=2`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub log_level: String,
    pub layout: FileLayout,
    pub worker: WorkerConfiguration,
    pub pipeline: PipelineConfiguration,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            layout: FileLayout::default(),
            worker: WorkerConfiguration::default(),
            pipeline: PipelineConfiguration::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfiguration {
    /// Root of the directory-backed `photo_processing` queue.
    pub spool_dir: PathBuf,
    /// Where terminal photo records are written.
    pub outcome_dir: PathBuf,
    /// Jobs processed at once by this process.
    pub concurrency: usize,
    pub inference_access: InferenceAccess,
    pub poll_interval_ms: u64,
    /// Unacknowledged claims older than this are handed out again.
    pub visibility_timeout_secs: u64,
    /// Temporary artifacts older than this are swept at startup.
    pub stale_temp_after_secs: u64,
}

impl Default for WorkerConfiguration {
    fn default() -> Self {
        Self {
            spool_dir: PathBuf::from("spool/photo_processing"),
            outcome_dir: PathBuf::from("spool/outcomes"),
            concurrency: 1,
            inference_access: InferenceAccess::Serialized,
            poll_interval_ms: 500,
            visibility_timeout_secs: 600,
            stale_temp_after_secs: 3600,
        }
    }
}

impl Configuration {
    /// Loads the layered configuration. An explicit `path` must exist; the
    /// default `candid.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };
        let configuration: Configuration = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        configuration
            .validate()
            .map_err(AppError::InvalidConfiguration)?;
        Ok(configuration)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.worker.concurrency == 0 {
            return Err("Worker concurrency must be greater than 0".to_string());
        }
        if self.worker.visibility_timeout_secs == 0 {
            return Err("Visibility timeout must be greater than 0".to_string());
        }
        Level::from_str(&self.log_level)
            .map_err(|_| format!("Unknown log level '{}'", self.log_level))?;
        self.pipeline.validate()
    }

    pub fn log_level(&self) -> Level {
        Level::from_str(&self.log_level).unwrap_or(Level::INFO)
    }
}
