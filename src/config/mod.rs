mod file_config;
mod notifier;
mod watcher;

pub use file_config::{
    CentralConfig, CloudWorkerConfig, FileConfig, JobConfig, JobsConfig, RuntimeConfig,
};
pub(crate) use notifier::next_change;
pub use notifier::{topic, ConfigChange, ConfigNotifier, ConfigSubtree, TOPIC_PREFIX};
pub use watcher::ConfigWatcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub const DEFAULT_CONFIG_SCAN_PERIOD_MS: u64 = 5_000;
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "vmcentral";
pub const MAX_POOL_SIZE: usize = 1_024;

/// CLI arguments that can be used for config resolution.
/// TOML values override these where present.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub in_memory: bool,
    pub config_scan_period_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Period of the worker health check. Zero disables it.
    pub health_check_period_ms: u64,
    pub config_scan_period_ms: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            health_check_period_ms: 30_000,
            config_scan_period_ms: DEFAULT_CONFIG_SCAN_PERIOD_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralSettings {
    /// `None` selects the in-memory store.
    pub db_path: Option<PathBuf>,
    pub admin_username: String,
    pub admin_password: String,
}

impl Default for CentralSettings {
    fn default() -> Self {
        Self {
            db_path: None,
            admin_username: DEFAULT_ADMIN_USERNAME.to_string(),
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudWorkerSettings {
    pub disabled: bool,
    /// Maximum number of provisioning requests handled concurrently.
    pub pool_size: usize,
    pub provisioning_latency_ms: u64,
    /// Upper bound on a delegation request/reply round trip.
    pub request_timeout_ms: u64,
}

impl Default for CloudWorkerSettings {
    fn default() -> Self {
        Self {
            disabled: false,
            pool_size: 4,
            provisioning_latency_ms: 3_000,
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    pub disabled: bool,
    pub period_millis: u64,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            disabled: false,
            period_millis: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobsSettings {
    pub vm_update_status: JobSettings,
}

/// Fully resolved configuration. Subtrees are shared snapshots and are never
/// mutated after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppConfig {
    pub runtime: Arc<RuntimeSettings>,
    pub central: Arc<CentralSettings>,
    pub cloud_worker: Arc<CloudWorkerSettings>,
    pub jobs: Arc<JobsSettings>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self, ConfigError> {
        let file = file_config.unwrap_or_default();

        let runtime_file = file.runtime.unwrap_or_default();
        let runtime_defaults = RuntimeSettings::default();
        let runtime = RuntimeSettings {
            health_check_period_ms: runtime_file
                .health_check_period_ms
                .unwrap_or(runtime_defaults.health_check_period_ms),
            config_scan_period_ms: runtime_file
                .config_scan_period_ms
                .or(cli.config_scan_period_ms)
                .unwrap_or(runtime_defaults.config_scan_period_ms),
        };
        if runtime.config_scan_period_ms == 0 {
            return Err(ConfigError::Invalid(
                "config_scan_period_ms must be greater than 0".to_string(),
            ));
        }

        let central_file = file.central.unwrap_or_default();
        let in_memory = central_file.in_memory.unwrap_or(cli.in_memory);
        let db_path = if in_memory {
            None
        } else {
            let path = central_file
                .db_path
                .map(PathBuf::from)
                .or_else(|| cli.db_path.clone())
                .ok_or_else(|| {
                    ConfigError::Invalid(
                        "db_path must be specified via --db-path or in config file, or use --in-memory"
                            .to_string(),
                    )
                })?;
            if path.is_dir() {
                return Err(ConfigError::Invalid(format!(
                    "db_path is a directory: {:?}",
                    path
                )));
            }
            Some(path)
        };
        let central = CentralSettings {
            db_path,
            admin_username: central_file
                .admin_username
                .unwrap_or_else(|| DEFAULT_ADMIN_USERNAME.to_string()),
            admin_password: central_file
                .admin_password
                .unwrap_or_else(|| DEFAULT_ADMIN_PASSWORD.to_string()),
        };
        if central.admin_username.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "admin_username must not be empty".to_string(),
            ));
        }

        let worker_file = file.cloud_worker.unwrap_or_default();
        let worker_defaults = CloudWorkerSettings::default();
        let cloud_worker = CloudWorkerSettings {
            disabled: worker_file.disabled.unwrap_or(worker_defaults.disabled),
            pool_size: worker_file.pool_size.unwrap_or(worker_defaults.pool_size),
            provisioning_latency_ms: worker_file
                .provisioning_latency_ms
                .unwrap_or(worker_defaults.provisioning_latency_ms),
            request_timeout_ms: worker_file
                .request_timeout_ms
                .unwrap_or(worker_defaults.request_timeout_ms),
        };
        if cloud_worker.pool_size == 0 || cloud_worker.pool_size > MAX_POOL_SIZE {
            return Err(ConfigError::Invalid(format!(
                "cloud_worker.pool_size must be between 1 and {}",
                MAX_POOL_SIZE
            )));
        }
        if cloud_worker.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "cloud_worker.request_timeout_ms must be greater than 0".to_string(),
            ));
        }

        let jobs_file = file.jobs.unwrap_or_default();
        let job_file = jobs_file.vm_update_status.unwrap_or_default();
        let job_defaults = JobSettings::default();
        let vm_update_status = JobSettings {
            disabled: job_file.disabled.unwrap_or(job_defaults.disabled),
            period_millis: job_file.period_millis.unwrap_or(job_defaults.period_millis),
        };
        if !vm_update_status.disabled && vm_update_status.period_millis == 0 {
            return Err(ConfigError::Invalid(
                "jobs.vm_update_status.period_millis must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            runtime: Arc::new(runtime),
            central: Arc::new(central),
            cloud_worker: Arc::new(cloud_worker),
            jobs: Arc::new(JobsSettings { vm_update_status }),
        })
    }

    /// Reads the config file, if any, and resolves it against the CLI values.
    pub fn load(cli: &CliConfig, config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let file_config = config_path.map(FileConfig::load).transpose()?;
        Self::resolve(cli, file_config)
    }
}
