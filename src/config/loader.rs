//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered in order,
//! later ones winning:
//!
//! 1. built-in defaults
//! 2. `{config_dir}/orderflow.toml`
//! 3. `{config_dir}/orderflow.{environment}.toml`
//! 4. `ORDERFLOW__SECTION__FIELD` environment variables
//!
//! Missing files are skipped; malformed files and invalid values are errors.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::error::{ConfigResult, ConfigurationError};
use super::OrderflowConfig;

const BASE_FILE_STEM: &str = "orderflow";
const ENV_PREFIX: &str = "ORDERFLOW";
const ENV_SEPARATOR: &str = "__";

/// Loaded configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: OrderflowConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    ///
    /// Useful for testing without modifying global environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = %environment,
            config_directory = %config_directory.display(),
            "Loading configuration"
        );

        let config = Self::load_layers(&config_directory, environment)?;
        config.validate()?;

        tracing::info!(
            environment = %environment,
            concurrency = config.worker.concurrency,
            critical_weight = config.worker.queue_weights.critical,
            default_weight = config.worker.queue_weights.default,
            low_weight = config.worker.queue_weights.low,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &OrderflowConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect environment from environment variables
    pub fn detect_environment() -> String {
        crate::logging::get_environment()
    }

    fn default_config_directory() -> PathBuf {
        std::env::var("ORDERFLOW_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn load_layers(config_directory: &Path, environment: &str) -> ConfigResult<OrderflowConfig> {
        let base_path = config_directory.join(format!("{BASE_FILE_STEM}.toml"));
        let env_path = config_directory.join(format!("{BASE_FILE_STEM}.{environment}.toml"));

        for path in [&base_path, &env_path] {
            if path.exists() {
                debug!(path = %path.display(), "Applying configuration file");
            }
        }

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&OrderflowConfig::default())?)
            .add_source(config::File::from(base_path.clone()).required(false))
            .add_source(config::File::from(env_path.clone()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                let file = if env_path.exists() {
                    env_path.display().to_string()
                } else {
                    base_path.display().to_string()
                };
                ConfigurationError::invalid_toml(file, e)
            })?;

        Ok(settings.try_deserialize()?)
    }
}
