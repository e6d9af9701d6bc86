//! Model Context Protocol (MCP) server implementation.
//!
//! This module exposes the image tools to AI assistants using JSON-RPC 2.0
//! messages, over stdio or HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          MCP Server                          │
//! │                                                              │
//! │   ┌─────────────┐                                            │
//! │   │  Transport  │    ┌─────────────┐    ┌─────────────┐      │
//! │   │   (stdio)   │───▶│   Server    │───▶│   Tools     │      │
//! │   ├─────────────┤    │ (dispatch)  │    │ (typed args)│      │
//! │   │   (http)    │───▶│             │    │             │      │
//! │   └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                             │                                │
//! │                             ▼                                │
//! │        sandbox · image sniffing · indexer · backend          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! The server echoes the client's requested protocol version and falls back
//! to 2024-11-05.

pub mod http;
pub mod protocol;
pub mod server;
pub mod tools;
pub mod transport;

pub use protocol::{JsonRpcError, JsonRpcReply, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use server::McpServer;
pub use transport::{shutdown_signal, LineAccumulator, StdioTransport};
