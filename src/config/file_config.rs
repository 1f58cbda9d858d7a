use super::ConfigError;
use serde::Deserialize;
use std::path::Path;

/// Shape of the optional TOML config file. Every field is optional; anything left
/// out falls back to the CLI value or the built-in default.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct FileConfig {
    pub runtime: Option<RuntimeConfig>,
    pub central: Option<CentralConfig>,
    pub cloud_worker: Option<CloudWorkerConfig>,
    pub jobs: Option<JobsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
    pub health_check_period_ms: Option<u64>,
    pub config_scan_period_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CentralConfig {
    pub db_path: Option<String>,
    pub in_memory: Option<bool>,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CloudWorkerConfig {
    pub disabled: Option<bool>,
    pub pool_size: Option<usize>,
    pub provisioning_latency_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct JobsConfig {
    pub vm_update_status: Option<JobConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct JobConfig {
    pub disabled: Option<bool>,
    pub period_millis: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
