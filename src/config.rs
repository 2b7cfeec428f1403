use crate::error::{PricerError, Result};
use crate::model::boosting::BoostingParams;
use crate::model::forest::ForestParams;
use crate::model::linear::LinearParams;
use crate::model::{ModelFamily, ModelSettings};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_PATH_ENV: &str = "PRICER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub training: TrainingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub history_path: PathBuf,
    pub artifact_path: PathBuf,
    pub ingest_log_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_path: PathBuf::from("data/history.csv"),
            artifact_path: PathBuf::from("data/model.json"),
            ingest_log_path: PathBuf::from("data/ingest_log.ndjson"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Largest accepted `/train` request body
    pub max_upload_bytes: usize,
}

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
        }
    }
}

/// Production model family and the parameters every family starts from
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub family: ModelFamily,
    pub linear: LinearParams,
    pub random_forest: ForestParams,
    pub gradient_boosting: BoostingParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            family: ModelFamily::GradientBoosting,
            linear: LinearParams::default(),
            random_forest: ForestParams::default(),
            gradient_boosting: BoostingParams::default(),
        }
    }
}

impl TrainingConfig {
    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            linear: self.linear.clone(),
            random_forest: self.random_forest.clone(),
            gradient_boosting: self.gradient_boosting.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load `.env`, then the TOML file named by `PRICER_CONFIG` (default
    /// `config.toml`, optional), then apply `PRICER_*` environment overrides.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            Self::from_file(Path::new(&path))?
        } else {
            debug!(path = %path, "No config file, using defaults");
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PricerError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment-style overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PRICER_HISTORY_PATH") {
            self.storage.history_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("PRICER_ARTIFACT_PATH") {
            self.storage.artifact_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("PRICER_INGEST_LOG_PATH") {
            self.storage.ingest_log_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("PRICER_LOG_DIR") {
            self.logging.dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("PRICER_PORT") {
            self.server.port = v
                .trim()
                .parse()
                .map_err(|_| PricerError::Config(format!("PRICER_PORT is not a port: '{}'", v)))?;
        }
        if let Some(v) = lookup("PRICER_MAX_UPLOAD_BYTES") {
            self.server.max_upload_bytes = v.trim().parse().map_err(|_| {
                PricerError::Config(format!("PRICER_MAX_UPLOAD_BYTES is not a size: '{}'", v))
            })?;
        }
        if let Some(v) = lookup("PRICER_MODEL_FAMILY") {
            self.training.family = v.parse()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tree::MaxFeatures;
    use std::collections::HashMap;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.training.family, ModelFamily::GradientBoosting);
        assert_eq!(config.training.gradient_boosting.max_depth, 6);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [storage]
            history_path = "/tmp/h.csv"

            [training]
            family = "RFR"

            [training.random_forest]
            n_estimators = 50
            max_features = "sqrt"
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.history_path, PathBuf::from("/tmp/h.csv"));
        assert_eq!(config.storage.artifact_path, PathBuf::from("data/model.json"));
        assert_eq!(config.training.family, ModelFamily::RandomForest);
        let settings = config.training.model_settings();
        assert_eq!(settings.random_forest.n_estimators, 50);
        assert_eq!(settings.random_forest.max_features, MaxFeatures::Sqrt);
        assert_eq!(settings.random_forest.min_samples_split, 2);
    }

    #[test]
    fn test_overrides_win_over_file() {
        let env: HashMap<&str, &str> = [
            ("PRICER_PORT", "9100"),
            ("PRICER_ARTIFACT_PATH", "/srv/model.json"),
            ("PRICER_MAX_UPLOAD_BYTES", "1048576"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.max_upload_bytes, 1_048_576);
        assert_eq!(config.storage.artifact_path, PathBuf::from("/srv/model.json"));
    }

    #[test]
    fn test_bad_values_are_config_errors() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|k| (k == "PRICER_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert_eq!(err.kind(), "config_error");
        let err = Config::from_toml_str("[server]\nport = \"x\"").unwrap_err();
        assert_eq!(err.kind(), "config_error");
    }
}
