//! TOML configuration with environment overrides.
//!
//! ```toml
//! [model]
//! weights_path = "models/damage-probe.json"
//!
//! [input]
//! accepted_formats = ["jpeg", "png", "bmp", "gif", "tiff", "webp"]
//!
//! [severity]
//! detection_threshold = 0.5
//! high_threshold = 0.8
//!
//! [cost.high]
//! labor = 500.0
//! parts = 700.0
//! paint = 300.0
//! itemize = true
//!
//! [storage]
//! blob_dir = "uploads"
//! database_url = "surrealkv://data/analyses"
//! ```
//!
//! Every section is optional; missing values fall back to the reference
//! defaults. Tensor size is never configured here, it comes from the model.

use std::path::{Path, PathBuf};

use image::ImageFormat;
use serde::{Deserialize, Serialize};

use crate::domain::{ConfigError, CostTable, SeverityRule};
use crate::preprocess::{parse_format, DEFAULT_MAX_INPUT_BYTES};

pub const ENV_CONFIG: &str = "DAMAGE_CONFIG";
pub const ENV_MODEL_PATH: &str = "DAMAGE_MODEL_PATH";
pub const ENV_BLOB_DIR: &str = "DAMAGE_BLOB_DIR";
pub const ENV_DATABASE_URL: &str = "DAMAGE_DATABASE_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub weights_path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights_path: PathBuf::from("models/damage-probe.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    pub accepted_formats: Vec<String>,
    pub max_input_bytes: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            accepted_formats: ["jpeg", "png", "bmp", "gif", "tiff", "webp"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
        }
    }
}

impl InputConfig {
    pub fn formats(&self) -> Result<Vec<ImageFormat>, ConfigError> {
        if self.accepted_formats.is_empty() {
            return Err(ConfigError::invalid(
                "input.accepted_formats",
                "at least one format is required",
            ));
        }
        self.accepted_formats
            .iter()
            .map(|name| parse_format(name))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Root directory for uploaded images.
    pub blob_dir: PathBuf,
    /// SurrealDB endpoint (`mem://`, `surrealkv://path`, `ws://host`). When
    /// unset the `SURREALDB_*` environment chain decides.
    pub database_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blob_dir: PathBuf::from("uploads"),
            database_url: None,
        }
    }
}

/// Top-level configuration for the analyzer and its collaborators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyzerConfig {
    pub model: ModelConfig,
    pub input: InputConfig,
    pub severity: SeverityRule,
    pub cost: CostTable,
    pub storage: StorageConfig,
}

impl AnalyzerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Load `path` (or `$DAMAGE_CONFIG`, or defaults) and apply the
    /// `DAMAGE_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(ENV_CONFIG).map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_MODEL_PATH) {
            self.model.weights_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup(ENV_BLOB_DIR) {
            self.storage.blob_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup(ENV_DATABASE_URL) {
            self.storage.database_url = Some(url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.severity.validate()?;
        self.cost.validate()?;
        self.input.formats()?;
        if self.input.max_input_bytes == 0 {
            return Err(ConfigError::invalid(
                "input.max_input_bytes",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}
