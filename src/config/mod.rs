//! # Orderflow Configuration System
//!
//! Layered, validated configuration for the order service and task workers.
//!
//! ## Architecture
//!
//! - **Defaults First**: every field has a built-in default matching the production policy table
//! - **Environment Awareness**: `config/orderflow.{env}.toml` overrides the base file
//! - **Environment Variables**: `ORDERFLOW__SECTION__FIELD` overrides any file value
//! - **Explicit Validation**: invalid values abort startup instead of being coerced
//!
//! ## Usage
//!
//! ```rust,no_run
//! use orderflow_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let concurrency = manager.config().worker.concurrency;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::system;
use crate::messaging::QueueClass;
use crate::tasks::TaskPolicies;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `config/orderflow.toml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OrderflowConfig {
    /// Worker pool sizing and dispatch
    pub worker: WorkerConfig,

    /// Broker lease settings
    pub broker: BrokerConfig,

    /// Retry backoff schedule
    pub backoff: BackoffConfig,

    /// Scheduling policy per task type
    pub tasks: TaskPolicies,

    /// Order use-case settings
    pub orders: OrdersConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum handlers running at once
    pub concurrency: usize,
    pub queue_weights: QueueWeights,
    /// Fallback poll interval when no wake-up hint is available
    pub poll_interval_ms: u64,
    /// Upper bound on a single idle wait
    pub max_idle_wait_ms: u64,
    /// How long shutdown waits for in-flight handlers before aborting them
    pub shutdown_grace_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: system::DEFAULT_WORKER_CONCURRENCY,
            queue_weights: QueueWeights::default(),
            poll_interval_ms: 1_000,
            max_idle_wait_ms: 5_000,
            shutdown_grace_seconds: 30,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_idle_wait(&self) -> Duration {
        Duration::from_millis(self.max_idle_wait_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

/// Relative worker attention per queue class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueWeights {
    pub critical: u32,
    pub default: u32,
    pub low: u32,
}

impl Default for QueueWeights {
    fn default() -> Self {
        let (critical, default, low) = system::DEFAULT_QUEUE_WEIGHTS;
        Self {
            critical,
            default,
            low,
        }
    }
}

impl QueueWeights {
    pub fn weight(&self, queue: QueueClass) -> u32 {
        match queue {
            QueueClass::Critical => self.critical,
            QueueClass::Default => self.default,
            QueueClass::Low => self.low,
        }
    }

    pub fn total(&self) -> u64 {
        QueueClass::ALL
            .into_iter()
            .map(|queue| u64::from(self.weight(queue)))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Extra lease time beyond a task's timeout before it is redelivered
    pub lease_grace_seconds: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            lease_grace_seconds: 5,
        }
    }
}

impl BrokerConfig {
    pub fn lease_grace(&self) -> Duration {
        Duration::from_secs(self.lease_grace_seconds)
    }
}

/// Configuration for backoff calculation behavior
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Base delay in seconds for exponential backoff
    pub base_delay_seconds: f64,
    /// Maximum delay cap in seconds
    pub max_delay_seconds: f64,
    /// Exponential multiplier
    pub multiplier: f64,
    /// Whether to add jitter to prevent thundering herd
    pub jitter_enabled: bool,
    /// Maximum jitter percentage (0.0 to 1.0)
    pub max_jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_seconds: 1.0,
            max_delay_seconds: 300.0, // 5 minutes
            multiplier: 2.0,
            jitter_enabled: true,
            max_jitter: 0.1, // 10% jitter
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct OrdersConfig {
    /// Brand prefix of generated voice numbers
    pub voice_number_prefix: String,
    /// Regeneration attempts when a voice number collides
    pub max_voice_number_attempts: u32,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            voice_number_prefix: system::DEFAULT_VOICE_NUMBER_PREFIX.to_string(),
            max_voice_number_attempts: 5,
        }
    }
}

impl OrderflowConfig {
    /// Parse a TOML document layered over the defaults, then validate
    pub fn from_toml_str(toml: &str) -> ConfigResult<Self> {
        let config: Self = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .map_err(|e| ConfigurationError::invalid_toml("<inline>", e))?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the worker and services cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.worker.concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.concurrency",
                self.worker.concurrency,
                "must be at least 1",
            ));
        }
        for queue in QueueClass::ALL {
            let weight = self.worker.queue_weights.weight(queue);
            if weight == 0 {
                return Err(ConfigurationError::invalid_value(
                    format!("worker.queue_weights.{queue}"),
                    weight,
                    "every queue class needs a positive weight or it would starve",
                ));
            }
        }
        if self.worker.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.poll_interval_ms",
                self.worker.poll_interval_ms,
                "must be greater than zero",
            ));
        }
        if self.worker.max_idle_wait_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.max_idle_wait_ms",
                self.worker.max_idle_wait_ms,
                "must be greater than zero",
            ));
        }

        let backoff = &self.backoff;
        if !(backoff.base_delay_seconds.is_finite() && backoff.base_delay_seconds > 0.0) {
            return Err(ConfigurationError::invalid_value(
                "backoff.base_delay_seconds",
                backoff.base_delay_seconds,
                "must be a positive number",
            ));
        }
        if !(backoff.max_delay_seconds.is_finite()
            && backoff.max_delay_seconds >= backoff.base_delay_seconds)
        {
            return Err(ConfigurationError::invalid_value(
                "backoff.max_delay_seconds",
                backoff.max_delay_seconds,
                "must be at least backoff.base_delay_seconds",
            ));
        }
        if backoff.max_delay_seconds > system::MAX_BACKOFF_DELAY_SECONDS {
            return Err(ConfigurationError::invalid_value(
                "backoff.max_delay_seconds",
                backoff.max_delay_seconds,
                format!("must not exceed {}", system::MAX_BACKOFF_DELAY_SECONDS),
            ));
        }
        if !(backoff.multiplier.is_finite() && backoff.multiplier >= 1.0) {
            return Err(ConfigurationError::invalid_value(
                "backoff.multiplier",
                backoff.multiplier,
                "must be at least 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&backoff.max_jitter) {
            return Err(ConfigurationError::invalid_value(
                "backoff.max_jitter",
                backoff.max_jitter,
                "must be between 0.0 and 1.0",
            ));
        }

        if self.broker.lease_grace_seconds > system::MAX_TASK_TIMEOUT_SECONDS {
            return Err(ConfigurationError::invalid_value(
                "broker.lease_grace_seconds",
                self.broker.lease_grace_seconds,
                format!("must not exceed {}", system::MAX_TASK_TIMEOUT_SECONDS),
            ));
        }

        self.tasks.validate()?;

        if self.orders.voice_number_prefix.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "orders.voice_number_prefix",
                &self.orders.voice_number_prefix,
                "must not be empty",
            ));
        }
        if self.orders.max_voice_number_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "orders.max_voice_number_attempts",
                self.orders.max_voice_number_attempts,
                "must be at least 1",
            ));
        }

        Ok(())
    }
}
