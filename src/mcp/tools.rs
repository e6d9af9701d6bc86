//! Tool catalogue and typed tool arguments.
//!
//! `tools/call` arguments arrive as loosely-typed JSON. [`ToolCall::parse`]
//! validates them against the tool's required fields and produces one
//! variant per tool; handlers never look at raw JSON.

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::indexer::{ListOptions, SortMode, DEFAULT_LIMIT};

/// Hint attached to a missing-model error.
const MODEL_HINT: &str = "Provide args.model or set OPENROUTER_IMAGE_MODEL";

/// A tool definition for tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Returns the list of available tools.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn tool_definitions() -> Vec<ToolDefinition> {
    let return_base64 = json!({
        "type": "boolean",
        "default": true,
        "description": "If false, do not include the base64 image in the MCP response (prevents huge JSON payloads)."
    });
    let model = json!({
        "type": "string",
        "minLength": 1,
        "description": "OpenRouter model id. Defaults to OPENROUTER_IMAGE_MODEL."
    });
    let image_config = json!({
        "type": "object",
        "description": "Provider-specific image configuration passed through to OpenRouter."
    });

    vec![
        ToolDefinition {
            name: "generate_image",
            description: "Generate an image via OpenRouter (Responses API) and optionally save it under OUTPUT_DIR.",
            input_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "prompt": { "type": "string", "minLength": 1 },
                    "model": model,
                    "image_config": image_config,
                    "output_path": {
                        "type": "string",
                        "description": "Relative path under OUTPUT_DIR to save image (e.g. assets/banner.png). The extension is corrected to match the returned image."
                    },
                    "mime_type": {
                        "type": "string",
                        "description": "MIME type for the returned MCP image content (default detected automatically)."
                    },
                    "return_base64": return_base64
                },
                "required": ["prompt"]
            }),
        },
        ToolDefinition {
            name: "edit_image",
            description: "Edit / transform an existing image under OUTPUT_DIR using OpenRouter (image-to-image via Responses API).",
            input_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "prompt": { "type": "string", "minLength": 1 },
                    "input_image_path": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Relative path under OUTPUT_DIR for the input image."
                    },
                    "model": model,
                    "image_config": image_config,
                    "output_path": {
                        "type": "string",
                        "description": "Relative path under OUTPUT_DIR to save the edited image."
                    },
                    "mime_type": {
                        "type": "string",
                        "description": "MIME type for the returned MCP image content (default detected automatically)."
                    },
                    "return_base64": return_base64
                },
                "required": ["prompt", "input_image_path"]
            }),
        },
        ToolDefinition {
            name: "list_image_models",
            description: "List OpenRouter image generation models with pricing and approximate cost per image. Fetches fresh data from the OpenRouter API.",
            input_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {},
                "required": []
            }),
        },
        ToolDefinition {
            name: "list_output_images",
            description: "List image files currently stored under OUTPUT_DIR.",
            input_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "prefix": {
                        "type": "string",
                        "description": "Optional relative subfolder under OUTPUT_DIR (e.g. tests/)."
                    },
                    "recursive": { "type": "boolean", "default": true },
                    "limit": { "type": "integer", "minimum": 1, "maximum": 1000, "default": DEFAULT_LIMIT },
                    "include_non_images": { "type": "boolean", "default": false },
                    "sort": {
                        "type": "string",
                        "enum": SortMode::NAMES,
                        "default": "mtime_desc"
                    }
                },
                "required": []
            }),
        },
        ToolDefinition {
            name: "read_output_image",
            description: "Read an image from OUTPUT_DIR and return it as MCP image content.",
            input_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "path": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Relative path under OUTPUT_DIR to the image file."
                    },
                    "mime_type": {
                        "type": "string",
                        "description": "Override MIME type for MCP response (default detected automatically)."
                    },
                    "return_base64": {
                        "type": "boolean",
                        "default": true,
                        "description": "If false, do not include the base64 image in the MCP response."
                    }
                },
                "required": ["path"]
            }),
        },
    ]
}

/// Validated arguments shared by `generate_image` and `edit_image`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageArgs {
    /// Trimmed, non-empty prompt.
    pub prompt: String,
    /// Resolved model (argument or process default).
    pub model: String,
    /// Passed through to the backend when it is an object.
    pub image_config: Option<Value>,
    /// Trimmed, non-empty requested output path.
    pub output_path: Option<String>,
    /// Trimmed, non-empty MIME override for the image block.
    pub mime_type: Option<String>,
    /// Include the image block in the result.
    pub return_base64: bool,
}

/// Validated arguments for `read_output_image`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadArgs {
    /// Trimmed, non-empty relative path.
    pub path: String,
    /// Trimmed, non-empty MIME override.
    pub mime_type: Option<String>,
    /// Include the image block in the result.
    pub return_base64: bool,
}

/// A `tools/call` request after validation.
#[derive(Debug, Clone)]
pub enum ToolCall {
    /// `generate_image`
    GenerateImage(ImageArgs),
    /// `edit_image`
    EditImage {
        /// Trimmed, non-empty input path.
        input_image_path: String,
        /// Common generation arguments.
        image: ImageArgs,
    },
    /// `list_image_models`
    ListImageModels,
    /// `list_output_images`
    ListOutputImages(ListOptions),
    /// `read_output_image`
    ReadOutputImage(ReadArgs),
}

impl ToolCall {
    /// Validates `arguments` for tool `name`.
    ///
    /// Returns `None` for an unknown tool name. No I/O is performed.
    ///
    /// # Errors
    ///
    /// The inner result is [`ToolError::InvalidParams`] naming the first
    /// offending field.
    #[must_use]
    pub fn parse(
        name: &str,
        arguments: &Value,
        default_model: Option<&str>,
    ) -> Option<Result<Self, ToolError>> {
        let call = match name {
            "generate_image" => image_args(arguments, default_model).map(Self::GenerateImage),
            "edit_image" => edit_args(arguments, default_model),
            "list_image_models" => Ok(Self::ListImageModels),
            "list_output_images" => Ok(Self::ListOutputImages(list_options(arguments))),
            "read_output_image" => read_args(arguments).map(Self::ReadOutputImage),
            _ => return None,
        };
        Some(call)
    }

    /// The tool name this call was parsed from.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GenerateImage(_) => "generate_image",
            Self::EditImage { .. } => "edit_image",
            Self::ListImageModels => "list_image_models",
            Self::ListOutputImages(_) => "list_output_images",
            Self::ReadOutputImage(_) => "read_output_image",
        }
    }
}

/// A trimmed, non-empty string argument.
fn non_empty_str(arguments: &Value, key: &str) -> Option<String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required_str(arguments: &Value, field: &'static str) -> Result<String, ToolError> {
    non_empty_str(arguments, field).ok_or_else(|| ToolError::invalid(field))
}

/// Booleans default to `default` unless explicitly the opposite literal.
fn flag(arguments: &Value, key: &str, default: bool) -> bool {
    arguments
        .get(key)
        .and_then(Value::as_bool)
        .unwrap_or(default)
}

fn resolve_model(arguments: &Value, default_model: Option<&str>) -> Result<String, ToolError> {
    non_empty_str(arguments, "model")
        .or_else(|| {
            default_model
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
        })
        .ok_or(ToolError::InvalidParams {
            field: "model",
            hint: Some(MODEL_HINT),
        })
}

fn image_args(arguments: &Value, default_model: Option<&str>) -> Result<ImageArgs, ToolError> {
    let prompt = required_str(arguments, "prompt")?;
    let model = resolve_model(arguments, default_model)?;
    Ok(ImageArgs {
        prompt,
        model,
        image_config: arguments
            .get("image_config")
            .filter(|c| c.is_object())
            .cloned(),
        output_path: non_empty_str(arguments, "output_path"),
        mime_type: non_empty_str(arguments, "mime_type"),
        return_base64: flag(arguments, "return_base64", true),
    })
}

fn edit_args(arguments: &Value, default_model: Option<&str>) -> Result<ToolCall, ToolError> {
    // prompt, then input_image_path, then model
    let prompt = required_str(arguments, "prompt")?;
    let input_image_path = required_str(arguments, "input_image_path")?;
    let mut image = image_args(arguments, default_model)?;
    image.prompt = prompt;
    Ok(ToolCall::EditImage {
        input_image_path,
        image,
    })
}

fn read_args(arguments: &Value) -> Result<ReadArgs, ToolError> {
    Ok(ReadArgs {
        path: required_str(arguments, "path")?,
        mime_type: non_empty_str(arguments, "mime_type"),
        return_base64: flag(arguments, "return_base64", true),
    })
}

#[allow(clippy::cast_possible_truncation)] // float-to-int casts saturate
fn list_options(arguments: &Value) -> ListOptions {
    let defaults = ListOptions::default();
    let limit = match arguments.get("limit") {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(DEFAULT_LIMIT),
        _ => DEFAULT_LIMIT,
    };
    let sort = match arguments.get("sort") {
        Some(Value::String(name)) => SortMode::parse(name),
        _ => defaults.sort,
    };
    ListOptions {
        prefix: arguments
            .get("prefix")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        recursive: flag(arguments, "recursive", defaults.recursive),
        limit,
        include_non_images: flag(arguments, "include_non_images", defaults.include_non_images),
        sort,
    }
}
