//! OpenRouter Responses API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use super::{BackendError, GenerationRequest, ImageBackend};
use crate::config::OpenRouterConfig;

/// [`ImageBackend`] backed by the OpenRouter HTTP API.
#[derive(Debug, Clone)]
pub struct OpenRouterBackend {
    client: reqwest::Client,
    config: OpenRouterConfig,
}

impl OpenRouterBackend {
    /// Builds a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: OpenRouterConfig) -> Result<Self, BackendError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;
        Ok(Self { client, config })
    }

    fn responses_url(&self) -> String {
        format!("{}/responses", self.config.base_url.trim_end_matches('/'))
    }

    fn headers(&self, api_key: &str) -> Result<HeaderMap, BackendError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|_| BackendError::InvalidHeader("Authorization"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(site) = self.config.site_url.as_deref().filter(|s| !s.is_empty()) {
            headers.insert(
                "http-referer",
                HeaderValue::from_str(site).map_err(|_| BackendError::InvalidHeader("HTTP-Referer"))?,
            );
        }
        if let Some(app) = self.config.app_name.as_deref().filter(|s| !s.is_empty()) {
            headers.insert(
                "x-title",
                HeaderValue::from_str(app).map_err(|_| BackendError::InvalidHeader("X-Title"))?,
            );
        }
        Ok(headers)
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}

/// Builds the JSON body for `POST /responses`.
#[must_use]
pub fn build_request_body(request: &GenerationRequest) -> Value {
    let mut content = vec![json!({ "type": "input_text", "text": request.prompt })];
    if let Some(url) = request
        .input_image_data_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
    {
        content.push(json!({ "type": "input_image", "image_url": url }));
    }

    let mut body = json!({
        "model": request.model,
        "modalities": ["image"],
        "input": [{ "role": "user", "content": content }],
    });

    if let Some(config) = request.image_config.as_ref().filter(|c| c.is_object()) {
        body["image_config"] = config.clone();
    }

    body
}

#[async_trait]
impl ImageBackend for OpenRouterBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, BackendError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(BackendError::MissingApiKey)?;

        tracing::info!(model = %request.model, edit = request.input_image_data_url.is_some(), "Calling OpenRouter");

        let response = self
            .client
            .post(self.responses_url())
            .headers(self.headers(api_key)?)
            .json(&build_request_body(request))
            .send()
            .await?;

        Self::read_json(response).await
    }

    async fn list_models(&self) -> Result<Vec<Value>, BackendError> {
        let response = self
            .client
            .get(&self.config.models_api)
            .query(&[("fmt", "cards"), ("output_modalities", "image")])
            .send()
            .await?;

        let document = Self::read_json(response).await?;
        Ok(document
            .pointer("/data/models")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}
