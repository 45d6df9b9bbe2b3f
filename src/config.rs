//! Harvest configuration loading

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::model::ProtocolGeneration;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub harvest: SweepConfig,
    #[serde(default)]
    pub manifest: ManifestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Record URL template, `{id}` is replaced by the source ID
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Per-request timeout enforced by the HTTP client
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            user_agent: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// First source ID to try (inclusive)
    #[serde(default)]
    pub first_id: u32,
    /// Last source ID to try (inclusive)
    #[serde(default = "default_last_id")]
    pub last_id: u32,
    /// Maximum number of in-flight fetch/synthesize/persist pipelines
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Only keep records whose frequency tag matches, e.g. "Europe"
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_index_file")]
    pub index_file: String,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            first_id: 0,
            last_id: default_last_id(),
            concurrency: default_concurrency(),
            region: None,
            output_dir: default_output_dir(),
            index_file: default_index_file(),
        }
    }
}

impl SweepConfig {
    pub fn id_range(&self) -> RangeInclusive<u32> {
        self.first_id..=self.last_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Driver class written into harvested manifests
    #[serde(default = "default_driver_class")]
    pub driver_class: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub generation: ProtocolGeneration,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            driver_class: default_driver_class(),
            capabilities: Vec::new(),
            generation: ProtocolGeneration::default(),
        }
    }
}

fn default_endpoint() -> String {
    "https://products.z-wavealliance.org/Products/{id}/JSON".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_last_id() -> u32 {
    2499 // ten blocks of 250 IDs
}

fn default_concurrency() -> usize {
    25
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("products")
}

fn default_index_file() -> String {
    "configSummary.json".to_string()
}

fn default_driver_class() -> String {
    "other".to_string()
}

impl HarvestConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.harvest.concurrency == 0 {
            return Err(ConfigError::Invalid("harvest.concurrency must be at least 1".into()));
        }
        if self.harvest.first_id > self.harvest.last_id {
            return Err(ConfigError::Invalid(format!(
                "harvest.first_id ({}) is after harvest.last_id ({})",
                self.harvest.first_id, self.harvest.last_id
            )));
        }
        if self.harvest.index_file.trim().is_empty() {
            return Err(ConfigError::Invalid("harvest.index_file is empty".into()));
        }
        Ok(())
    }
}
