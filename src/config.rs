//! Configuration management for the training and serving binaries

use crate::models::selector::SelectionOptions;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub artifacts: ArtifactsConfig,
    pub training: TrainingConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Where artifacts are written and read
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub models_dir: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            models_dir: "models".to_string(),
        }
    }
}

/// Model selection switches
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Target column; the last dataset column when unset
    pub target_column: Option<String>,
    pub use_cv: bool,
    pub tune_hyperparams: bool,
    pub cv_folds: usize,
    pub test_size: f64,
    pub random_state: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            target_column: None,
            use_cv: true,
            tune_hyperparams: false,
            cv_folds: 5,
            test_size: 0.2,
            random_state: 42,
        }
    }
}

impl From<&TrainingConfig> for SelectionOptions {
    fn from(config: &TrainingConfig) -> Self {
        SelectionOptions {
            use_cv: config.use_cv,
            tune_hyperparams: config.tune_hyperparams,
            cv_folds: config.cv_folds,
            test_size: config.test_size,
            random_state: config.random_state,
            ..SelectionOptions::default()
        }
    }
}

/// Serving metrics reporting
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between summaries, 0 disables periodic reporting
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Install the global subscriber. `RUST_LOG` directives take precedence
    /// over the configured crate level.
    pub fn init(&self) -> Result<()> {
        let filter = tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(format!("patient_report_pipeline={}", self.level).parse()?);
        let installed = if self.format == "json" {
            tracing_subscriber::fmt().json().with_env_filter(filter).try_init()
        } else {
            tracing_subscriber::fmt().with_env_filter(filter).try_init()
        };
        installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
    }
}

impl AppConfig {
    /// Load `.env`, then `config/config.toml` if present, then `PRP__*` variables
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path; the file is optional
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Environment::with_prefix("PRP").separator("__"))
            .set_override_option("artifacts.models_dir", std::env::var("MODEL_DIR").ok())
            .context("Failed to apply MODEL_DIR")?
            .set_override_option("server.port", std::env::var("ML_SERVICE_PORT").ok())
            .context("Failed to apply ML_SERVICE_PORT")?
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    pub fn selection_options(&self) -> SelectionOptions {
        SelectionOptions::from(&self.training)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5001);
        assert_eq!(config.server.bind_addr(), "0.0.0.0:5001");
        assert_eq!(config.artifacts.models_dir, "models");
        assert!(config.training.use_cv);
        assert!(!config.training.tune_hyperparams);
        assert_eq!(config.training.cv_folds, 5);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[training]\ncv_folds = 3\ntarget_column = \"diagnosis\"").unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.training.cv_folds, 3);
        assert_eq!(config.training.target_column.as_deref(), Some("diagnosis"));
        assert_eq!(config.training.random_state, 42);
        assert_eq!(config.metrics.report_interval_secs, 60);
    }

    #[test]
    fn test_selection_options_from_training_config() {
        let training = TrainingConfig {
            use_cv: false,
            tune_hyperparams: true,
            cv_folds: 4,
            ..TrainingConfig::default()
        };
        let options = SelectionOptions::from(&training);
        assert!(!options.use_cv);
        assert!(options.tune_hyperparams);
        assert_eq!(options.cv_folds, 4);
        assert_eq!(options.default_params.n_estimators, 200);
    }
}
