//! openrouter-image-mcp: MCP server for OpenRouter image generation
//!
//! This library exposes image generation and a sandboxed output directory
//! to AI assistants as MCP tools.
//!
//! # Tools
//!
//! - `generate_image` / `edit_image`: call OpenRouter and optionally save the result
//! - `list_image_models`: image-capable models with approximate pricing
//! - `list_output_images` / `read_output_image`: browse and read stored files
//!
//! Every path a tool touches is resolved under one output directory, and
//! every image is classified by its bytes, never by its filename.
//!
//! # Modules
//!
//! - [`backend`] — Generation backend trait and the OpenRouter client
//! - [`config`] — Configuration loading and validation
//! - [`error`] — Error types
//! - [`image`] — Content sniffing and extension normalization
//! - [`indexer`] — Output directory listing
//! - [`mcp`] — MCP protocol implementation and transports
//! - [`sandbox`] — Output directory path sandbox

pub mod backend;
pub mod config;
pub mod error;
pub mod image;
pub mod indexer;
pub mod mcp;
pub mod sandbox;
