//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk, overlaying
//! environment variables, and validating the result. The returned [`Config`]
//! is built once at startup and shared by reference with every request
//! handler.
//!
//! # Configuration Sources
//!
//! In order of increasing precedence:
//!
//! 1. Built-in defaults
//! 2. The configuration file:
//!    - Path specified on the command line, or
//!    - **Linux/macOS:** `~/.openrouter-image-mcp/config.json`
//!    - **Windows:** `%USERPROFILE%\.openrouter-image-mcp\config.json`
//! 3. Environment variables (`OPENROUTER_API_KEY`, `OUTPUT_DIR`, ...)

mod settings;

pub use settings::{Config, HttpConfig, LoggingConfig, OpenRouterConfig};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.openrouter-image-mcp/`
/// - **Windows:** `%USERPROFILE%\.openrouter-image-mcp\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".openrouter-image-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads the configuration using the real process environment.
///
/// If `path` is `None`, the default location is used when it exists and
/// built-in defaults otherwise.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed
/// - Any field fails validation
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Loads the configuration with an injectable environment lookup.
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_with_env<F>(path: Option<&Path>, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound {
                    path: p.to_path_buf(),
                });
            }
            Some(p.to_path_buf())
        }
        None => default_config_path().filter(|p| p.exists()),
    };

    let mut config = match config_path {
        Some(config_path) => read_config_file(&config_path)?,
        None => Config::default(),
    };

    config.apply_env(lookup);
    config.validate()?;

    Ok(config)
}

fn read_config_file(config_path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.to_path_buf(),
        source: e,
    })
}
