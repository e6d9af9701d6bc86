//! HTTP transport for MCP server.
//!
//! - `GET /health` answers `{"status":"ok"}` without authentication.
//! - `POST /mcp` takes one envelope or an array of envelopes, guarded by a
//!   static bearer token. Array entries are dispatched one after another in
//!   order and answered as an array of the same order; entries that are
//!   notifications contribute nothing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::mcp::server::McpServer;

/// Shared state for the HTTP handlers.
#[derive(Debug, Clone)]
pub struct HttpState {
    /// The dispatcher.
    pub server: Arc<McpServer>,
    /// Expected bearer token; `None` rejects every `/mcp` request.
    pub auth_token: Option<String>,
}

/// Builds the router.
pub fn router(state: HttpState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/mcp", post(mcp_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves `router` on `addr` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve<S>(addr: SocketAddr, app: Router, shutdown: S) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(bind = %addr, "Starting HTTP transport");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

async fn mcp_handler(State(state): State<HttpState>, headers: HeaderMap, body: Bytes) -> Response {
    let Some(expected) = state.auth_token.as_deref().filter(|t| !t.is_empty()) else {
        tracing::error!("Rejecting request: no auth token configured");
        return failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server misconfigured: AUTH_TOKEN is not set",
        );
    };
    if bearer_token(&headers) != Some(expected) {
        return failure(StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => return failure(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {e}")),
    };

    match payload {
        Value::Array(entries) => {
            tracing::debug!(count = entries.len(), "Dispatching batch");
            let mut replies = Vec::with_capacity(entries.len());
            for entry in entries {
                if let Some(reply) = state.server.handle_value(entry).await {
                    replies.push(reply);
                }
            }
            Json(replies).into_response()
        }
        single => Json(state.server.handle_value(single).await).into_response(),
    }
}
