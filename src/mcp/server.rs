//! MCP request dispatcher for the image tools.
//!
//! The server is stateless between calls: every envelope is decoded,
//! routed, executed and answered on its own. Transports (stdio, HTTP) feed
//! it raw lines or decoded JSON values and write back whatever reply it
//! produces.
//!
//! Failures never escape [`McpServer::handle_value`]; each one is turned into
//! a JSON-RPC error envelope keyed to the request's `id`.

use std::future::Future;
use std::io;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::backend::{
    extract_image_base64, render_models_table, summarize_response, BackendError,
    GenerationRequest, ImageBackend,
};
use crate::error::ToolError;
use crate::image::{
    decode_base64, normalize, strip_data_url_prefix, ImageKind, ImagePayload, DEFAULT_MIME_TYPE,
};
use crate::indexer::{self, ListOptions};
use crate::mcp::protocol::{
    decode_line, parse_envelope, Envelope, ErrorCode, JsonRpcError, JsonRpcErrorData,
    JsonRpcReply, JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::tools::{tool_definitions, ImageArgs, ReadArgs, ToolCall};
use crate::mcp::transport::StdioTransport;
use crate::sandbox::{assert_not_symlink, OutputRoot};

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: &'static str,
    /// Server version.
    pub version: &'static str,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Content item in a tool call response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
    /// Base64 image content.
    Image {
        /// Standard base64 of the image bytes.
        data: String,
        /// Reported MIME type.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates a text summary optionally followed by an image block.
    #[must_use]
    pub fn with_image(text: String, image: Option<(String, String)>) -> Self {
        let mut result = Self::text(text);
        if let Some((data, mime_type)) = image {
            result.content.push(ToolContent::Image { data, mime_type });
        }
        result
    }
}

/// The MCP server for OpenRouter image tools.
#[derive(Clone)]
pub struct McpServer {
    /// Sandbox root for every tool-visible path.
    root: OutputRoot,
    /// Process-wide model fallback.
    default_model: Option<String>,
    /// Generation backend.
    backend: Arc<dyn ImageBackend>,
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("root", &self.root)
            .field("default_model", &self.default_model)
            .finish_non_exhaustive()
    }
}

impl McpServer {
    /// Creates a new server over `root` using `backend` for generation.
    #[must_use]
    pub fn new(
        root: OutputRoot,
        default_model: Option<String>,
        backend: Arc<dyn ImageBackend>,
    ) -> Self {
        Self {
            root,
            default_model,
            backend,
        }
    }

    /// The sandbox root.
    #[must_use]
    pub const fn root(&self) -> &OutputRoot {
        &self.root
    }

    /// Runs the stdio loop until the stream closes or `shutdown` resolves.
    ///
    /// Dispatch of a line that has already been read always completes before
    /// shutdown is observed.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve<R, W, S>(
        &self,
        transport: &mut StdioTransport<R, W>,
        shutdown: S,
    ) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    return Ok(());
                }

                line = transport.read_line() => {
                    let Some(line) = line? else {
                        tracing::info!("Input stream closed");
                        return Ok(());
                    };

                    if line.trim().is_empty() {
                        continue;
                    }

                    if let Some(reply) = self.handle_line(&line).await {
                        transport.write_reply(&reply).await?;
                    }
                }
            }
        }
    }

    /// Handles one line of stdio input.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcReply> {
        match decode_line(line) {
            Ok(value) => self.handle_value(value).await,
            Err(error) => {
                tracing::warn!(error = ?error.error.data, "Failed to parse message");
                Some(error.into())
            }
        }
    }

    /// Handles one decoded envelope. Returns `None` for notifications.
    pub async fn handle_value(&self, value: Value) -> Option<JsonRpcReply> {
        match parse_envelope(value) {
            Ok(envelope) => self.dispatch(envelope).await,
            Err(error) => Some(error.into()),
        }
    }

    async fn dispatch(&self, envelope: Envelope) -> Option<JsonRpcReply> {
        let Envelope { id, method, params } = envelope;
        tracing::debug!(method = %method, id = ?id, "Dispatching request");

        let reply: JsonRpcReply = match method.as_str() {
            "initialize" => Self::handle_initialize(id, params.as_ref()).into(),
            "tools/list" => Self::handle_tools_list(id).into(),
            "tools/call" => self.handle_tools_call(id, params.as_ref()).await,
            "notifications/initialized" => return None,
            _ => JsonRpcError::method_not_found(id).into(),
        };
        Some(reply)
    }

    /// Handles the initialize request.
    fn handle_initialize(id: Option<RequestId>, params: Option<&Value>) -> JsonRpcResponse {
        let protocol_version = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or(MCP_PROTOCOL_VERSION);

        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": protocol_version,
                "serverInfo": ServerInfo::default(),
                "capabilities": { "tools": {} },
            }),
        )
    }

    /// Handles the tools/list request.
    fn handle_tools_list(id: Option<RequestId>) -> JsonRpcResponse {
        JsonRpcResponse::success(id, json!({ "tools": tool_definitions() }))
    }

    /// Handles the tools/call request.
    async fn handle_tools_call(&self, id: Option<RequestId>, params: Option<&Value>) -> JsonRpcReply {
        let Some(name) = params.and_then(|p| p.get("name")).and_then(Value::as_str) else {
            return JsonRpcError::invalid_params(id, json!({ "field": "name" })).into();
        };

        let empty = Value::Object(Map::new());
        let arguments = params
            .and_then(|p| p.get("arguments"))
            .filter(|a| a.is_object())
            .unwrap_or(&empty);

        let call = match ToolCall::parse(name, arguments, self.default_model.as_deref()) {
            None => return JsonRpcError::method_not_found(id).into(),
            Some(Err(e)) => return tool_error_reply(id, name, &e),
            Some(Ok(call)) => call,
        };

        tracing::debug!(tool = call.name(), "Calling tool");

        match self.execute(call).await {
            Ok(result) => match serde_json::to_value(&result) {
                Ok(value) => JsonRpcResponse::success(id, value).into(),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialise tool call result");
                    JsonRpcError::new(
                        id,
                        JsonRpcErrorData::with_message(
                            ErrorCode::InternalError,
                            "Internal error: failed to serialise result",
                        ),
                    )
                    .into()
                }
            },
            Err(e) => tool_error_reply(id, name, &e),
        }
    }

    async fn execute(&self, call: ToolCall) -> Result<ToolCallResult, ToolError> {
        match call {
            ToolCall::GenerateImage(image) => self.call_generate_image(None, image).await,
            ToolCall::EditImage {
                input_image_path,
                image,
            } => self.call_generate_image(Some(input_image_path), image).await,
            ToolCall::ListImageModels => self.call_list_image_models().await,
            ToolCall::ListOutputImages(options) => self.call_list_output_images(options).await,
            ToolCall::ReadOutputImage(args) => self.call_read_output_image(args).await,
        }
    }

    /// Reads a file under the root, refusing symlinks on the way.
    async fn read_sandboxed(&self, relative: &str) -> Result<(String, Vec<u8>), ToolError> {
        let target = self.root.resolve(relative)?;
        target.ensure_no_symlinks(&self.root)?;
        assert_not_symlink(target.absolute())?;

        let bytes = tokio::fs::read(target.absolute())
            .await
            .map_err(|source| ToolError::Io {
                action: "failed to read",
                path: relative.to_string(),
                source,
            })?;
        Ok((target.absolute().display().to_string(), bytes))
    }

    /// Shared implementation of `generate_image` and `edit_image`.
    async fn call_generate_image(
        &self,
        input_image_path: Option<String>,
        image: ImageArgs,
    ) -> Result<ToolCallResult, ToolError> {
        let tool = if input_image_path.is_some() {
            "edit_image"
        } else {
            "generate_image"
        };

        let input_image_data_url = match input_image_path.as_deref() {
            Some(path) => {
                let (_, bytes) = self.read_sandboxed(path).await?;
                Some(ImagePayload::from_bytes(bytes).to_data_url())
            }
            None => None,
        };

        let request = GenerationRequest {
            model: image.model.clone(),
            prompt: image.prompt.clone(),
            image_config: image.image_config.clone(),
            input_image_data_url,
        };
        let response = self.backend.generate(&request).await?;

        let raw = extract_image_base64(&response).ok_or_else(|| BackendError::NoImageData {
            summary: summarize_response(&response),
        })?;
        let (data_url_mime, body) = strip_data_url_prefix(raw);
        let bytes = decode_base64(body).map_err(|e| {
            BackendError::InvalidResponse(format!("image data is not valid base64: {e}"))
        })?;
        let payload = ImagePayload::from_bytes(bytes);

        let data_url_mime = data_url_mime.map(str::trim).filter(|m| !m.is_empty());
        let detected_kind = payload
            .kind()
            .or_else(|| data_url_mime.and_then(ImageKind::from_mime));
        let detected_mime = payload
            .kind()
            .map(ImageKind::mime_type)
            .or(data_url_mime)
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string();

        let mut lines = vec![format!("tool: {tool}"), format!("model: {}", image.model)];
        if let Some(path) = &input_image_path {
            lines.push(format!("input_image_path: {path}"));
        }

        if let Some(requested) = &image.output_path {
            let fixed = normalize(requested, detected_kind);
            let saved_to = self.write_sandboxed(&fixed.path, payload.bytes()).await?;
            lines.push(format!("output_path: {}", fixed.path));
            if fixed.changed {
                lines.push(format!("output_path_fixed_from: {requested}"));
            }
            lines.push(format!("saved_to: {saved_to}"));
            tracing::info!(tool, path = %fixed.path, bytes = payload.len(), "Saved image");
        } else {
            lines.push("saved_to: (not saved)".to_string());
        }

        let mime_type = image.mime_type.clone().unwrap_or_else(|| detected_mime.clone());
        lines.push(mime_line(&mime_type, &detected_mime));
        lines.push(base64_line(image.return_base64));

        let block = image
            .return_base64
            .then(|| (payload.to_base64(), mime_type));
        Ok(ToolCallResult::with_image(lines.join("\n"), block))
    }

    /// Writes `bytes` to a sandboxed path, creating parent directories.
    async fn write_sandboxed(&self, relative: &str, bytes: &[u8]) -> Result<String, ToolError> {
        let target = self.root.resolve(relative)?;
        target.ensure_no_symlinks(&self.root)?;

        if let Some(parent) = target.absolute().parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ToolError::Io {
                    action: "failed to create directory for",
                    path: relative.to_string(),
                    source,
                })?;
        }

        tokio::fs::write(target.absolute(), bytes)
            .await
            .map_err(|source| ToolError::Io {
                action: "failed to write",
                path: relative.to_string(),
                source,
            })?;
        Ok(target.absolute().display().to_string())
    }

    async fn call_list_image_models(&self) -> Result<ToolCallResult, ToolError> {
        let models = self.backend.list_models().await?;
        tracing::debug!(count = models.len(), "Fetched image models");
        Ok(ToolCallResult::text(render_models_table(&models)))
    }

    async fn call_list_output_images(
        &self,
        options: ListOptions,
    ) -> Result<ToolCallResult, ToolError> {
        let root = self.root.clone();
        let listing = tokio::task::spawn_blocking(move || indexer::list(&root, &options))
            .await
            .map_err(|e| ToolError::Internal(format!("listing task failed: {e}")))??;
        Ok(ToolCallResult::text(listing.render(self.root.path())))
    }

    async fn call_read_output_image(&self, args: ReadArgs) -> Result<ToolCallResult, ToolError> {
        let (abs_path, bytes) = self.read_sandboxed(&args.path).await?;
        let payload = ImagePayload::from_bytes(bytes);
        let detected_mime = payload.detected_mime_type();
        let mime_type = args
            .mime_type
            .unwrap_or_else(|| detected_mime.to_string());

        let lines = [
            format!("path: {}", args.path),
            format!("abs_path: {abs_path}"),
            format!("bytes: {}", payload.len()),
            mime_line(&mime_type, detected_mime),
            base64_line(args.return_base64),
        ];

        let block = args
            .return_base64
            .then(|| (payload.to_base64(), mime_type));
        Ok(ToolCallResult::with_image(lines.join("\n"), block))
    }
}

fn mime_line(mime_type: &str, detected: &str) -> String {
    if mime_type == detected {
        format!("mime_type: {mime_type}")
    } else {
        format!("mime_type: {mime_type} (requested; detected: {detected})")
    }
}

fn base64_line(included: bool) -> String {
    format!("base64_in_response: {}", if included { "yes" } else { "no" })
}

/// Converts a tool failure into an error envelope.
fn tool_error_reply(id: Option<RequestId>, tool: &str, error: &ToolError) -> JsonRpcReply {
    tracing::warn!(tool, error = %error, "Tool call failed");

    let mut reply = match error {
        ToolError::InvalidParams { .. } => JsonRpcError::new(
            id,
            JsonRpcErrorData::with_message(ErrorCode::InvalidParams, error.to_string()),
        ),
        _ => JsonRpcError::operation_failed(id, error.to_string()),
    };
    reply.error.data = error.data();
    reply.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const PNG: [u8; 16] = [
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13, 0x49, 0x48, 0x44, 0x52,
    ];

    struct CannedBackend {
        response: Value,
        calls: Mutex<Vec<GenerationRequest>>,
    }

    #[async_trait]
    impl ImageBackend for CannedBackend {
        async fn generate(&self, request: &GenerationRequest) -> Result<Value, BackendError> {
            self.calls.lock().unwrap().push(request.clone());
            Ok(self.response.clone())
        }

        async fn list_models(&self) -> Result<Vec<Value>, BackendError> {
            Ok(vec![json!({ "slug": "x/y", "name": "Y" })])
        }
    }

    fn server(response: Value) -> (tempfile::TempDir, McpServer, Arc<CannedBackend>) {
        let dir = tempfile::tempdir().unwrap();
        let root = OutputRoot::open(dir.path()).unwrap();
        let backend = Arc::new(CannedBackend {
            response,
            calls: Mutex::new(Vec::new()),
        });
        let server = McpServer::new(root, Some("default/model".into()), backend.clone());
        (dir, server, backend)
    }

    fn png_response() -> Value {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        json!({ "output": [{ "type": "image_generation_call", "result": STANDARD.encode(PNG) }] })
    }

    async fn call(server: &McpServer, name: &str, arguments: Value) -> Value {
        let reply = server
            .handle_value(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": { "name": name, "arguments": arguments }
            }))
            .await
            .unwrap();
        serde_json::to_value(reply).unwrap()
    }

    #[tokio::test]
    async fn initialize_echoes_protocol_version() {
        let (_dir, server, _) = server(json!({}));
        let reply = server
            .handle_value(json!({
                "jsonrpc": "2.0", "id": 1, "method": "initialize",
                "params": { "protocolVersion": "2025-03-26" }
            }))
            .await
            .unwrap();
        let value = serde_json::to_value(reply).unwrap();
        assert_eq!(value["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(value["result"]["serverInfo"]["name"], SERVER_NAME);
        assert_eq!(value["result"]["capabilities"], json!({ "tools": {} }));
    }

    #[tokio::test]
    async fn initialize_defaults_protocol_version() {
        let (_dir, server, _) = server(json!({}));
        let reply = server
            .handle_value(json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize" }))
            .await
            .unwrap();
        let value = serde_json::to_value(reply).unwrap();
        assert_eq!(value["result"]["protocolVersion"], MCP_PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn initialized_notification_is_silent() {
        let (_dir, server, _) = server(json!({}));
        let reply = server
            .handle_value(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn request_without_id_still_answered() {
        let (_dir, server, _) = server(json!({}));
        let reply = server
            .handle_value(json!({ "jsonrpc": "2.0", "method": "tools/list" }))
            .await
            .unwrap();
        let value = serde_json::to_value(reply).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["result"]["tools"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn unknown_method_and_tool() {
        let (_dir, server, _) = server(json!({}));
        let reply = server
            .handle_value(json!({ "jsonrpc": "2.0", "id": 3, "method": "ping" }))
            .await
            .unwrap();
        assert_eq!(reply.error_code(), Some(-32601));

        let value = call(&server, "no_such_tool", json!({})).await;
        assert_eq!(value["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn missing_tool_name_is_invalid_params() {
        let (_dir, server, _) = server(json!({}));
        let reply = server
            .handle_value(json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {} }))
            .await
            .unwrap();
        let value = serde_json::to_value(reply).unwrap();
        assert_eq!(value["error"]["code"], -32602);
        assert_eq!(value["error"]["data"]["field"], "name");
    }

    #[tokio::test]
    async fn generate_without_output_path() {
        let (_dir, server, backend) = server(png_response());
        let value = call(&server, "generate_image", json!({ "prompt": "  fox  " })).await;

        let content = value["result"]["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        let text = content[0]["text"].as_str().unwrap();
        assert!(text.contains("tool: generate_image"));
        assert!(text.contains("model: default/model"));
        assert!(text.contains("saved_to: (not saved)"));
        assert!(text.contains("mime_type: image/png"));
        assert_eq!(content[1]["type"], "image");
        assert_eq!(content[1]["mimeType"], "image/png");
        assert_eq!(value["result"]["isError"], false);

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls[0].prompt, "fox");
        assert!(calls[0].input_image_data_url.is_none());
    }

    #[tokio::test]
    async fn mime_override_is_reported() {
        let (_dir, server, _) = server(png_response());
        let value = call(
            &server,
            "generate_image",
            json!({ "prompt": "fox", "mime_type": "image/webp", "return_base64": false }),
        )
        .await;
        let content = value["result"]["content"].as_array().unwrap();
        assert_eq!(content.len(), 1);
        let text = content[0]["text"].as_str().unwrap();
        assert!(text.contains("mime_type: image/webp (requested; detected: image/png)"));
        assert!(text.contains("base64_in_response: no"));
    }

    #[tokio::test]
    async fn no_image_carries_summary() {
        let (_dir, server, _) = server(json!({ "id": "r1", "status": "failed", "output": [] }));
        let value = call(&server, "generate_image", json!({ "prompt": "fox" })).await;
        assert_eq!(value["error"]["code"], -32000);
        assert_eq!(value["error"]["message"], "No image data returned from OpenRouter");
        assert_eq!(value["error"]["data"]["openRouterResponse"]["id"], "r1");
    }

    #[tokio::test]
    async fn edit_sends_input_as_data_url() {
        let (dir, server, backend) = server(png_response());
        std::fs::write(dir.path().join("in.png"), PNG).unwrap();
        let value = call(
            &server,
            "edit_image",
            json!({ "prompt": "brighter", "input_image_path": "in.png", "output_path": "out/edit.png" }),
        )
        .await;
        let text = value["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("input_image_path: in.png"));
        assert!(text.contains("output_path: out/edit.png"));
        assert!(!text.contains("output_path_fixed_from"));
        assert!(dir.path().join("out/edit.png").is_file());

        let calls = backend.calls.lock().unwrap();
        let url = calls[0].input_image_data_url.as_deref().unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn list_models_renders_table() {
        let (_dir, server, _) = server(json!({}));
        let value = call(&server, "list_image_models", json!({})).await;
        let text = value["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("| x/y | Y |"));
    }

    #[tokio::test]
    async fn list_output_images_renders_listing() {
        let (dir, server, _) = server(json!({}));
        std::fs::write(dir.path().join("a.png"), PNG).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let value = call(&server, "list_output_images", json!({})).await;
        let text = value["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("count: 1"));
        assert!(text.contains("| a.png | 16 |"));
        assert!(!text.contains("notes.txt"));
    }

    #[tokio::test]
    async fn read_missing_file_is_operation_failure() {
        let (_dir, server, _) = server(json!({}));
        let value = call(&server, "read_output_image", json!({ "path": "nope.png" })).await;
        assert_eq!(value["error"]["code"], -32000);
    }
}
