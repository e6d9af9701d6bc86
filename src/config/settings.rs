//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ConfigError;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Root directory for every tool-visible path.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Model used when a tool call does not name one.
    #[serde(default)]
    pub default_model: Option<String>,

    /// OpenRouter backend settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// HTTP transport settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            _schema: None,
            _comment: None,
            output_dir: default_output_dir(),
            default_model: None,
            openrouter: OpenRouterConfig::default(),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Overlays values from the process environment.
    ///
    /// `lookup` returns the value of an environment variable; empty values
    /// are treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get("OPENROUTER_IMAGE_MODEL") {
            self.default_model = Some(v);
        }
        if let Some(v) = get("OPENROUTER_API_KEY") {
            self.openrouter.api_key = Some(v);
        }
        if let Some(v) = get("OPENROUTER_BASE_URL") {
            self.openrouter.base_url = v;
        }
        if let Some(v) = get("OPENROUTER_SITE_URL") {
            self.openrouter.site_url = Some(v);
        }
        if let Some(v) = get("OPENROUTER_APP_NAME") {
            self.openrouter.app_name = Some(v);
        }
        if let Some(v) = get("OPENROUTER_MODELS_API") {
            self.openrouter.models_api = v;
        }
        if let Some(v) = get("AUTH_TOKEN") {
            self.http.auth_token = Some(v);
        }
        if let Some(port) = get("PORT").and_then(|v| v.trim().parse::<u16>().ok()) {
            let host = self
                .http
                .bind
                .rsplit_once(':')
                .map_or("0.0.0.0", |(host, _)| host)
                .to_string();
            self.http.bind = format!("{host}:{port}");
        }
    }

    /// The configured default model, if non-blank.
    #[must_use]
    pub fn default_model(&self) -> Option<&str> {
        self.default_model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }

    /// Parses the HTTP bind address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not a valid socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.http
            .bind
            .parse()
            .map_err(|_| ConfigError::ValidationError {
                message: format!("Invalid http.bind address '{}'", self.http.bind),
            })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "output_dir cannot be empty".to_string(),
            });
        }

        for (name, url) in [
            ("openrouter.base_url", &self.openrouter.base_url),
            ("openrouter.models_api", &self.openrouter.models_api),
        ] {
            if reqwest::Url::parse(url).is_err() {
                return Err(ConfigError::ValidationError {
                    message: format!("Invalid URL for {name}: '{url}'"),
                });
            }
        }

        if self.openrouter.request_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationError {
                message: "openrouter.request_timeout_secs must be greater than zero".to_string(),
            });
        }

        if self.http.max_body_bytes == 0 {
            return Err(ConfigError::ValidationError {
                message: "http.max_body_bytes must be greater than zero".to_string(),
            });
        }

        self.bind_addr()?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                ),
            });
        }

        Ok(())
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("/data")
}

/// OpenRouter backend configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenRouterConfig {
    /// API key sent as a bearer token.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the Responses API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Sent as `HTTP-Referer` when set.
    #[serde(default)]
    pub site_url: Option<String>,

    /// Sent as `X-Title` when set.
    #[serde(default = "default_app_name")]
    pub app_name: Option<String>,

    /// Endpoint listing image-capable models.
    #[serde(default = "default_models_api")]
    pub models_api: String,

    /// Per-request timeout. Absent means requests may wait indefinitely.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            site_url: None,
            app_name: default_app_name(),
            models_api: default_models_api(),
            request_timeout_secs: None,
        }
    }
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

#[allow(clippy::unnecessary_wraps)] // serde default for an Option field
fn default_app_name() -> Option<String> {
    Some("openrouter-image-mcp".to_string())
}

fn default_models_api() -> String {
    "https://openrouter.ai/api/frontend/models/find".to_string()
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Listen address.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Static bearer token required on `/mcp`.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Maximum accepted request body size.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            auth_token: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

const fn default_max_body_bytes() -> usize {
    25 * 1024 * 1024
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
