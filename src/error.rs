//! Error types for openrouter-image-mcp.
//!
//! # Security Note
//!
//! Error messages are carefully crafted to NEVER include credentials.
//! Sandbox violations are reported with generic descriptions so that a caller
//! cannot probe the filesystem layout outside the output directory.

use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

use crate::backend::BackendError;
use crate::indexer::IndexError;
use crate::sandbox::SandboxError;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Failures of a single tool invocation.
///
/// Every variant is caught at the dispatch boundary and converted into a
/// JSON-RPC error envelope; none of them escape to a transport.
#[derive(Error, Debug)]
pub enum ToolError {
    /// A required argument is missing or has the wrong shape.
    #[error("Invalid params")]
    InvalidParams {
        /// Name of the offending argument.
        field: &'static str,
        /// Optional hint for the caller.
        hint: Option<&'static str>,
    },

    /// A sandbox rule was violated.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// The generation backend failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Listing the output directory failed.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// A filesystem operation on a sandboxed path failed.
    #[error("{action} {path}: {source}")]
    Io {
        /// What was being attempted ("failed to read", ...).
        action: &'static str,
        /// Caller-relative path.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Catch-all for unexpected failures.
    #[error("{0}")]
    Internal(String),
}

impl ToolError {
    /// Creates an invalid-params error for `field`.
    #[must_use]
    pub const fn invalid(field: &'static str) -> Self {
        Self::InvalidParams { field, hint: None }
    }

    /// Structured `data` attached to the JSON-RPC error, if any.
    #[must_use]
    pub fn data(&self) -> Option<Value> {
        match self {
            Self::InvalidParams { field, hint } => {
                let mut data = serde_json::json!({ "field": field });
                if let Some(hint) = hint {
                    data["message"] = Value::String((*hint).to_string());
                }
                Some(data)
            }
            Self::Backend(BackendError::NoImageData { summary }) => {
                Some(serde_json::json!({ "openRouterResponse": summary }))
            }
            _ => None,
        }
    }
}
