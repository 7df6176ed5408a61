//! Configuration file loader for `paws.toml`.

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use paws_protocol::config_models::SupervisorConfig;
use std::path::Path;

/// Conventional name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "paws.toml";

/// Loads supervisor settings from a TOML file.
///
/// # Arguments
///
/// * `path` - Path to the configuration file
///
/// # Returns
///
/// The parsed and validated configuration. A missing file yields
/// [`SupervisorConfig::default`] rather than an error.
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - The file exists but cannot be read
/// - The file is not valid TOML or has wrongly typed keys
/// - A value is out of range (see [`validate_config`])
///
/// # Example
///
/// ```rust,no_run
/// use paws_core::config::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("paws.toml")).await?;
/// println!("Default deadline: {}s", config.default_deadline_secs);
/// # Ok(())
/// # }
/// ```
pub async fn load_config(path: &Path) -> ConfigResult<SupervisorConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        return Ok(SupervisorConfig::default());
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let config: SupervisorConfig =
        toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
            path: path.to_path_buf(),
            source,
        })?;

    validate_config(&config).map_err(|reason| ConfigError::InvalidConfig {
        path: path.to_path_buf(),
        reason,
    })?;

    tracing::debug!(path = %path.display(), ?config, "loaded config");
    Ok(config)
}

/// Check value ranges.
///
/// # Errors
///
/// Returns a description of the first offending key.
pub fn validate_config(config: &SupervisorConfig) -> Result<(), String> {
    if !(config.default_deadline_secs.is_finite() && config.default_deadline_secs > 0.0) {
        return Err(format!(
            "default_deadline_secs must be a positive number, got {}",
            config.default_deadline_secs
        ));
    }
    if !(config.timeout_multiplier.is_finite() && config.timeout_multiplier > 0.0) {
        return Err(format!(
            "timeout_multiplier must be a positive number, got {}",
            config.timeout_multiplier
        ));
    }
    if !(config.initial_stall_secs.is_finite() && config.initial_stall_secs >= 0.0) {
        return Err(format!(
            "initial_stall_secs must be zero or positive, got {}",
            config.initial_stall_secs
        ));
    }
    if config.status_fd < 3 {
        return Err(format!(
            "status_fd must not replace stdin, stdout or stderr, got {}",
            config.status_fd
        ));
    }
    if config.shell.trim().is_empty() {
        return Err("shell must not be empty".to_string());
    }
    Ok(())
}
