//! Configuration management for the acquisition/training/prediction pipeline
//!
//! This module provides runtime configuration loading from JSON files so the
//! serial link, export naming, training split and model location can be
//! adjusted without recompilation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default location of the JSON config file on desktop installs
pub const DEFAULT_CONFIG_PATH: &str = "config/mindtv.json";

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub prediction: PredictionConfig,
}

/// Serial link parameters for the wearable sensor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Fixed baud rate of the sensor firmware
    pub baud_rate: u32,
    /// Upper bound on a single blocking read; keeps the duration check live
    /// on a silent line
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            read_timeout_ms: 250,
        }
    }
}

/// Dataset export parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Directory exports are written to
    pub export_dir: PathBuf,
    /// File stem for exports (`<stem>.csv`, `<stem>(1).csv`, ...)
    pub base_filename: String,
    /// Name of the constant label column (`Content` or `Emotion`)
    pub label_column: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("."),
            base_filename: "collected_data".to_string(),
            label_column: "Content".to_string(),
        }
    }
}

/// Training split and forest parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Fraction of rows held out for accuracy reporting
    pub test_ratio: f64,
    /// Seed shared by the split and the forest
    pub seed: u64,
    /// Number of trees in the forest
    pub n_trees: usize,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum rows required to split a node
    pub min_samples_split: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_ratio: 0.2,
            seed: 42,
            n_trees: 100,
            max_depth: 16,
            min_samples_split: 2,
        }
    }
}

/// Model repository location and retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub repository_dir: PathBuf,
    /// Trained artifacts kept on disk, newest first
    #[serde(default = "default_retain_models")]
    pub retain_models: usize,
}

fn default_retain_models() -> usize {
    3
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            repository_dir: PathBuf::from("models"),
            retain_models: default_retain_models(),
        }
    }
}

/// Prediction output parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// Name of the appended predicted-label column
    pub output_column: String,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            output_column: "Prediction".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The loaded configuration, or the defaults if the file doesn't exist or
    /// the JSON is invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default location
    pub fn load() -> Self {
        Self::load_from_file(DEFAULT_CONFIG_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.training.n_trees, 100);
        assert!((config.training.test_ratio - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.dataset.label_column, "Content");
        assert_eq!(config.prediction.output_column, "Prediction");
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.serial.baud_rate, config.serial.baud_rate);
        assert_eq!(parsed.dataset.base_filename, config.dataset.base_filename);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"dataset": {"export_dir": "out", "base_filename": "coleta", "label_column": "Emotion"}}"#)
                .unwrap();
        assert_eq!(parsed.dataset.label_column, "Emotion");
        assert_eq!(parsed.training.seed, 42);
    }

    #[test]
    fn test_model_section_without_retention_uses_default() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"model": {"repository_dir": "trained"}}"#).unwrap();
        assert_eq!(parsed.model.repository_dir, PathBuf::from("trained"));
        assert_eq!(parsed.model.retain_models, 3);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_file("definitely/not/here.json");
        assert_eq!(config.serial.baud_rate, 115_200);
    }
}
