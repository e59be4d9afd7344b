//! Layered configuration loading from a config directory

use std::fs;
use std::path::Path;

use parking_lot::{const_mutex, Mutex};
use tempfile::TempDir;

use orderflow_core::config::{ConfigManager, ConfigurationError, OrderflowConfig};
use orderflow_core::QueueClass;

const BASE: &str = r#"
[worker]
concurrency = 8
poll_interval_ms = 500

[worker.queue_weights]
critical = 6
default = 3
low = 1

[tasks.auto_confirm_orders]
delay_seconds = 86400
timeout_seconds = 10
max_retries = 20
queue = "critical"

[orders]
voice_number_prefix = "APTK"
"#;

/// Serializes tests that set or compare against `ORDERFLOW__*` variables
static ENV_LOCK: Mutex<()> = const_mutex(());

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

#[test]
fn test_base_file_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "orderflow.toml", BASE);

    let manager =
        ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "production")
            .unwrap();
    let config = manager.config();

    assert_eq!(config.worker.concurrency, 8);
    assert_eq!(config.worker.poll_interval_ms, 500);
    assert_eq!(config.orders.voice_number_prefix, "APTK");
    assert_eq!(config.tasks.auto_confirm_orders.delay_seconds, 86_400);
    assert_eq!(config.tasks.auto_confirm_orders.queue, QueueClass::Critical);
    // Untouched sections keep their defaults
    assert_eq!(config.broker, OrderflowConfig::default().broker);
    assert_eq!(config.tasks.verification_email.max_retries, 10);
}

#[test]
fn test_environment_file_layers_over_base() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "orderflow.toml", BASE);
    write(
        dir.path(),
        "orderflow.test.toml",
        r#"
[worker]
concurrency = 2

[backoff]
jitter_enabled = false
"#,
    );

    let manager =
        ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
            .unwrap();
    let config = manager.config();

    assert_eq!(manager.environment(), "test");
    assert_eq!(manager.config_directory(), dir.path());
    assert_eq!(config.worker.concurrency, 2);
    assert_eq!(config.worker.poll_interval_ms, 500);
    assert!(!config.backoff.jitter_enabled);
    assert_eq!(config.orders.voice_number_prefix, "APTK");
}

#[test]
fn test_environment_variable_wins_over_files() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "orderflow.toml", BASE);
    let _env = ENV_LOCK.lock();
    std::env::set_var("ORDERFLOW__ORDERS__MAX_VOICE_NUMBER_ATTEMPTS", "9");

    let result =
        ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "staging");
    std::env::remove_var("ORDERFLOW__ORDERS__MAX_VOICE_NUMBER_ATTEMPTS");

    let manager = result.unwrap();
    assert_eq!(manager.config().orders.max_voice_number_attempts, 9);
    assert_eq!(manager.config().orders.voice_number_prefix, "APTK");
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "orderflow.toml", "[worker\nconcurrency = ");

    let result =
        ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
    assert!(matches!(result, Err(ConfigurationError::InvalidToml { .. })));
}

#[test]
fn test_starving_weight_is_rejected() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "orderflow.toml",
        r#"
[worker.queue_weights]
critical = 6
default = 3
low = 0
"#,
    );

    let result =
        ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
    let error = result.unwrap_err();
    assert!(error.to_string().contains("worker.queue_weights.low"), "{error}");
}

#[test]
fn test_shipped_base_file_matches_defaults() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
    let _env = ENV_LOCK.lock();

    let manager = ConfigManager::load_from_directory_with_env(Some(dir), "production").unwrap();
    assert_eq!(manager.config(), &OrderflowConfig::default());
}
