//! Configuration loading.
//!
//! This module loads the supervisor settings from `paws.toml`.

pub mod error;
pub mod loader;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, validate_config, CONFIG_FILE_NAME};
