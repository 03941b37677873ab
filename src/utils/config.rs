//! Configuration management
//!
//! This module handles loading and managing configuration.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::features::DEFAULT_TARGET;
use crate::inference::ComputeBackend;
use crate::model::ModelConfig;
use crate::training::TrainingConfig;

/// Data configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub sequence_length: usize,
    pub forecast_horizon: usize,
    pub train_split: f64,
    pub target_column: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            sequence_length: 8,
            forecast_horizon: 8,
            train_split: 0.8,
            target_column: DEFAULT_TARGET.to_string(),
        }
    }
}

/// Architecture configuration; the input size comes from the data
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchitectureConfig {
    pub hidden_size: usize,
    pub num_layers: usize,
    pub dropout: f64,
}

impl Default for ArchitectureConfig {
    fn default() -> Self {
        Self {
            hidden_size: 64,
            num_layers: 2,
            dropout: 0.2,
        }
    }
}

impl ArchitectureConfig {
    pub fn model_config(&self, input_size: usize) -> ModelConfig {
        ModelConfig::new(input_size)
            .with_hidden_size(self.hidden_size)
            .with_num_layers(self.num_layers)
            .with_dropout(self.dropout)
    }
}

/// File locations shared by the pipeline stages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Processed observation table (CSV)
    pub table: PathBuf,
    /// Directory of saved sequences and the scaler
    pub sequences: PathBuf,
    /// Best-model checkpoint directory
    pub checkpoint: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            table: PathBuf::from("data/processed/atlanta_timeseries.csv"),
            sequences: PathBuf::from("data/processed/sequences"),
            checkpoint: PathBuf::from("models/checkpoints/best_model"),
        }
    }
}

/// Inference configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Backends to try, in order
    pub backends: Vec<ComputeBackend>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backends: ComputeBackend::DEFAULT_ORDER.to_vec(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub location_name: String,
    /// Exclusive latitude bounds of the supported area
    pub lat_range: [f64; 2],
    /// Exclusive longitude bounds of the supported area
    pub lon_range: [f64; 2],
    pub default_lat: f64,
    pub default_lon: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            location_name: "Atlanta, GA".to_string(),
            lat_range: [33.0, 34.5],
            lon_range: [-85.0, -83.5],
            default_lat: 33.749,
            default_lon: -84.388,
        }
    }
}

impl ServerConfig {
    pub fn supports(&self, lat: f64, lon: f64) -> bool {
        self.lat_range[0] < lat
            && lat < self.lat_range[1]
            && self.lon_range[0] < lon
            && lon < self.lon_range[1]
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub model: ArchitectureConfig,
    pub training: TrainingConfig,
    pub paths: PathsConfig,
    pub inference: InferenceConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, or use defaults when there is no file
    ///
    /// A file that exists but does not parse or validate is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values no stage could run with
    pub fn validate(&self) -> Result<()> {
        if self.data.sequence_length == 0 || self.data.forecast_horizon == 0 {
            bail!("sequence_length and forecast_horizon must be positive");
        }
        if !(self.data.train_split > 0.0 && self.data.train_split < 1.0) {
            bail!("train_split must be in (0, 1), got {}", self.data.train_split);
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            bail!("dropout must be in [0, 1), got {}", self.model.dropout);
        }
        if self.model.hidden_size < 2 || self.model.num_layers == 0 {
            bail!("hidden_size must be at least 2 and num_layers positive");
        }
        if self.training.batch_size == 0 || self.training.epochs == 0 {
            bail!("batch_size and epochs must be positive");
        }
        if self.training.patience == 0 {
            bail!("patience must be positive");
        }
        if self.training.learning_rate <= 0.0 {
            bail!("learning_rate must be positive");
        }
        if self.inference.backends.is_empty() {
            bail!("at least one inference backend is required");
        }
        Ok(())
    }

    /// Scaler file inside the sequences directory
    pub fn scaler_path(&self) -> PathBuf {
        self.paths.sequences.join(crate::features::SCALER_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.data.sequence_length, 8);
        assert_eq!(config.data.forecast_horizon, 8);
        assert_eq!(config.model.hidden_size, 64);
        assert_eq!(config.training.epochs, 100);
        assert_eq!(config.inference.backends, ComputeBackend::DEFAULT_ORDER.to_vec());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.data.target_column, config.data.target_column);
        assert_eq!(parsed.server.lat_range, config.server.lat_range);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [data]
            sequence_length = 4

            [inference]
            backends = ["cpu"]
            "#,
        )
        .unwrap();
        assert_eq!(parsed.data.sequence_length, 4);
        assert_eq!(parsed.data.forecast_horizon, 8);
        assert_eq!(parsed.inference.backends, vec![ComputeBackend::Cpu]);
    }

    #[test]
    fn test_validate_rejects_bad_split() {
        let mut config = Config::default();
        config.data.train_split = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_supported_area_is_exclusive() {
        let server = ServerConfig::default();
        assert!(server.supports(33.749, -84.388));
        assert!(!server.supports(33.0, -84.0));
        assert!(!server.supports(40.7, -74.0));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.training.seed = Some(42);
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.training.seed, Some(42));
    }

    #[test]
    fn test_load_or_default() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Config::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(missing.data.sequence_length, 8);

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[data]\ntrain_split = 2.0\n").unwrap();
        assert!(Config::load_or_default(&bad).is_err());
    }
}
