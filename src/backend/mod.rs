//! Image generation backend.
//!
//! The dispatcher only sees the [`ImageBackend`] trait. The production
//! implementation is [`OpenRouterBackend`]; tests substitute their own.
//!
//! Calls are made once: there is no retry or backoff, and a failure is
//! surfaced to the caller verbatim.

pub mod models;
pub mod openrouter;
pub mod response;

pub use models::{estimate_cost, render_models_table, CostEstimate};
pub use openrouter::OpenRouterBackend;
pub use response::{extract_image_base64, summarize_response};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// A single generation or edit request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Model identifier.
    pub model: String,
    /// Trimmed, non-empty prompt.
    pub prompt: String,
    /// Provider-specific options passed through unchanged.
    pub image_config: Option<Value>,
    /// Input image as a `data:` URL (edits only).
    pub input_image_data_url: Option<String>,
}

/// Errors from the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// No API key configured.
    #[error("OPENROUTER_API_KEY is not set")]
    MissingApiKey,

    /// A configured value cannot be sent as an HTTP header.
    #[error("invalid {0} header value")]
    InvalidHeader(&'static str),

    /// Transport-level failure.
    #[error("OpenRouter request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("OpenRouter error {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// The response could not be interpreted.
    #[error("Invalid response from OpenRouter: {0}")]
    InvalidResponse(String),

    /// The response carried no image.
    #[error("No image data returned from OpenRouter")]
    NoImageData {
        /// Summary of the response for diagnostics.
        summary: Value,
    },
}

/// The remote image-generation collaborator.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Sends a generation request and returns the raw response document.
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, BackendError>;

    /// Fetches the image-capable model catalogue.
    async fn list_models(&self) -> Result<Vec<Value>, BackendError>;
}
