//! Integration tests for MCP protocol handling.
//!
//! These tests drive the server through its public entry points with an
//! in-memory backend, covering envelope handling, tool validation, the
//! output-directory sandbox and content-based file typing.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde_json::{json, Value};

use openrouter_image_mcp::backend::{BackendError, GenerationRequest, ImageBackend};
use openrouter_image_mcp::mcp::{McpServer, StdioTransport};
use openrouter_image_mcp::sandbox::OutputRoot;

const PNG_BYTES: [u8; 24] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01,
];

/// Backend double that records requests and returns a fixed image.
struct RecordingBackend {
    image_base64: String,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl RecordingBackend {
    fn png() -> Arc<Self> {
        Arc::new(Self {
            image_base64: BASE64_STANDARD.encode(PNG_BYTES),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageBackend for RecordingBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, BackendError> {
        self.calls.lock().unwrap().push(request.clone());
        Ok(json!({
            "id": "resp_test",
            "status": "completed",
            "output": [
                { "type": "reasoning" },
                { "type": "image_generation_call", "result": self.image_base64 }
            ]
        }))
    }

    async fn list_models(&self) -> Result<Vec<Value>, BackendError> {
        Ok(Vec::new())
    }
}

fn setup() -> (tempfile::TempDir, McpServer, Arc<RecordingBackend>) {
    let dir = tempfile::tempdir().unwrap();
    let root = OutputRoot::open(dir.path().join("out")).unwrap();
    let backend = RecordingBackend::png();
    let server = McpServer::new(root, None, backend.clone());
    (dir, server, backend)
}

async fn tool_call(server: &McpServer, name: &str, arguments: Value) -> Value {
    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    });
    let reply = server.handle_value(request).await.expect("reply expected");
    serde_json::to_value(reply).unwrap()
}

fn text_of(reply: &Value) -> &str {
    reply["result"]["content"][0]["text"].as_str().unwrap()
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn empty_prompt_is_invalid_params_and_backend_untouched() {
    let (_dir, server, backend) = setup();
    let reply = tool_call(&server, "generate_image", json!({ "prompt": "", "model": "m" })).await;

    assert_eq!(reply["id"], 1);
    assert_eq!(reply["error"]["code"], -32602);
    assert_eq!(reply["error"]["data"]["field"], "prompt");
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn missing_model_without_default_is_invalid_params() {
    let (_dir, server, backend) = setup();
    let reply = tool_call(&server, "generate_image", json!({ "prompt": "a cat" })).await;

    assert_eq!(reply["error"]["code"], -32602);
    assert_eq!(reply["error"]["data"]["field"], "model");
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn wrong_version_is_invalid_request_keyed_to_id() {
    let (_dir, server, _) = setup();
    let reply = server
        .handle_value(json!({ "jsonrpc": "1.0", "id": "req-9", "method": "tools/list" }))
        .await
        .unwrap();
    let reply = serde_json::to_value(reply).unwrap();
    assert_eq!(reply["id"], "req-9");
    assert_eq!(reply["error"]["code"], -32600);
}

#[tokio::test]
async fn fractional_and_large_ids_are_echoed() {
    let (_dir, server, _) = setup();
    for id in [json!(1.5), json!(u64::MAX)] {
        let reply = server
            .handle_value(json!({ "jsonrpc": "2.0", "id": id, "method": "tools/list" }))
            .await
            .unwrap();
        let reply = serde_json::to_value(reply).unwrap();
        assert_eq!(reply["id"], id);
        assert!(reply["result"]["tools"].is_array());
    }
}

#[tokio::test]
async fn malformed_line_is_parse_error() {
    let (_dir, server, _) = setup();
    let reply = server.handle_line("{\"jsonrpc\": ").await.unwrap();
    let reply = serde_json::to_value(reply).unwrap();
    assert_eq!(reply["id"], Value::Null);
    assert_eq!(reply["error"]["code"], -32700);
    assert!(reply["error"]["data"].is_string());
}

// =============================================================================
// Content typing and output paths
// =============================================================================

#[tokio::test]
async fn read_output_image_sniffs_content_not_extension() {
    let (dir, server, _) = setup();
    let assets = dir.path().join("out/assets");
    std::fs::create_dir_all(&assets).unwrap();
    std::fs::write(assets.join("x.bin"), PNG_BYTES).unwrap();

    let reply = tool_call(&server, "read_output_image", json!({ "path": "assets/x.bin" })).await;

    let text = text_of(&reply);
    assert!(text.contains("path: assets/x.bin"));
    assert!(text.contains("bytes: 24"));
    assert!(text.contains("mime_type: image/png"));
    let image = &reply["result"]["content"][1];
    assert_eq!(image["mimeType"], "image/png");
    assert_eq!(image["data"], BASE64_STANDARD.encode(PNG_BYTES));
}

#[tokio::test]
async fn generate_fixes_mismatched_extension() {
    let (dir, server, backend) = setup();
    let reply = tool_call(
        &server,
        "generate_image",
        json!({ "prompt": "a lighthouse", "model": "m", "output_path": "out.jpg" }),
    )
    .await;

    let text = text_of(&reply);
    assert!(text.contains("output_path: out.png"));
    assert!(text.contains("output_path_fixed_from: out.jpg"));
    assert!(text.contains("base64_in_response: yes"));
    assert!(dir.path().join("out/out.png").is_file());
    assert!(!dir.path().join("out/out.jpg").exists());
    assert_eq!(std::fs::read(dir.path().join("out/out.png")).unwrap(), PNG_BYTES);

    let calls = backend.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].model, "m");
}

#[tokio::test]
async fn generate_keeps_non_image_extension() {
    let (dir, server, _) = setup();
    let reply = tool_call(
        &server,
        "generate_image",
        json!({ "prompt": "x", "model": "m", "output_path": "notes/raw.txt", "return_base64": false }),
    )
    .await;

    let text = text_of(&reply);
    assert!(text.contains("output_path: notes/raw.txt"));
    assert!(!text.contains("output_path_fixed_from"));
    assert_eq!(reply["result"]["content"].as_array().unwrap().len(), 1);
    assert!(dir.path().join("out/notes/raw.txt").is_file());
}

// =============================================================================
// Sandbox
// =============================================================================

#[tokio::test]
async fn edit_with_escaping_path_is_generic_failure() {
    let (dir, server, backend) = setup();
    std::fs::write(dir.path().join("secret"), b"top secret").unwrap();

    let reply = tool_call(
        &server,
        "edit_image",
        json!({ "prompt": "x", "model": "m", "input_image_path": "../secret" }),
    )
    .await;

    assert_eq!(reply["error"]["code"], -32000);
    let message = reply["error"]["message"].as_str().unwrap();
    assert!(!message.contains("secret"));
    assert!(!message.contains(&dir.path().display().to_string()));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn output_path_cannot_escape() {
    let (dir, server, _) = setup();
    let reply = tool_call(
        &server,
        "generate_image",
        json!({ "prompt": "x", "model": "m", "output_path": "../../escape.png" }),
    )
    .await;

    assert_eq!(reply["error"]["code"], -32000);
    assert!(!dir.path().join("escape.png").exists());
}

#[tokio::test]
async fn absolute_looking_path_stays_under_root() {
    let (dir, server, _) = setup();
    let reply = tool_call(
        &server,
        "generate_image",
        json!({ "prompt": "x", "model": "m", "output_path": "/abs/pic.png" }),
    )
    .await;

    assert!(text_of(&reply).contains("output_path: /abs/pic.png"));
    assert!(dir.path().join("out/abs/pic.png").is_file());
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_input_is_refused() {
    let (dir, server, _) = setup();
    std::fs::write(dir.path().join("outside.png"), PNG_BYTES).unwrap();
    std::os::unix::fs::symlink(dir.path().join("outside.png"), dir.path().join("out/link.png"))
        .unwrap();

    let reply = tool_call(&server, "read_output_image", json!({ "path": "link.png" })).await;
    assert_eq!(reply["error"]["code"], -32000);
}

// =============================================================================
// Listing
// =============================================================================

#[tokio::test]
async fn list_output_images_after_generation() {
    let (_dir, server, _) = setup();
    tool_call(
        &server,
        "generate_image",
        json!({ "prompt": "x", "model": "m", "output_path": "gallery/one", "return_base64": false }),
    )
    .await;

    let reply = tool_call(&server, "list_output_images", json!({ "prefix": "gallery", "limit": 5000 })).await;
    let text = text_of(&reply);
    assert!(text.starts_with("# Output images"));
    assert!(text.contains("count: 1"));
    assert!(text.contains("| gallery/one.png | 24 |"));
}

// =============================================================================
// stdio end-to-end
// =============================================================================

#[tokio::test]
async fn stdio_session_answers_in_order() {
    let (_dir, server, _) = setup();
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05"}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        "\n\n",
        "garbage\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
    );
    let reader = tokio_test::io::Builder::new()
        .read(&input.as_bytes()[..40])
        .read(&input.as_bytes()[40..])
        .build();
    let mut transport = StdioTransport::with_io(reader, Vec::new());

    server
        .serve(&mut transport, std::future::pending())
        .await
        .unwrap();

    let out = String::from_utf8(transport.into_writer()).unwrap();
    let replies: Vec<Value> = out
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0]["id"], 1);
    assert_eq!(replies[0]["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(replies[1]["error"]["code"], -32700);
    assert_eq!(replies[2]["id"], 2);
    assert_eq!(replies[2]["result"]["tools"].as_array().unwrap().len(), 5);
}
