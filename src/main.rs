//! openrouter-image-mcp: MCP server for OpenRouter image generation
//!
//! Exposes image generation and a sandboxed output directory to AI
//! assistants over stdio or HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use openrouter_image_mcp::backend::OpenRouterBackend;
use openrouter_image_mcp::config::{self, Config};
use openrouter_image_mcp::mcp::http::{self, HttpState};
use openrouter_image_mcp::mcp::{shutdown_signal, McpServer, StdioTransport};
use openrouter_image_mcp::sandbox::OutputRoot;

/// Transport used to talk to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// Line-delimited JSON-RPC on stdin/stdout.
    Stdio,
    /// JSON-RPC over `POST /mcp`.
    Http,
}

/// MCP server for OpenRouter image generation.
///
/// Provides tools to generate and edit images through OpenRouter and to
/// browse the images saved under the output directory.
#[derive(Parser, Debug)]
#[command(name = "openrouter-image-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,

    /// Transport to serve
    #[arg(long, value_enum, default_value_t = Transport::Stdio)]
    transport: Transport,

    /// Listen address for the HTTP transport (overrides configuration)
    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: &Args, cfg: Config, server: McpServer) -> std::io::Result<()> {
    match args.transport {
        Transport::Stdio => {
            info!("MCP server ready on stdio, waiting for client connection...");
            let mut transport = StdioTransport::new();
            server.serve(&mut transport, shutdown_signal()).await
        }
        Transport::Http => {
            let addr = match args.bind {
                Some(addr) => addr,
                None => cfg.bind_addr().map_err(std::io::Error::other)?,
            };
            if cfg.http.auth_token.is_none() {
                tracing::warn!("AUTH_TOKEN is not set; every /mcp request will be rejected");
            }
            let app = http::router(
                HttpState {
                    server: Arc::new(server),
                    auth_token: cfg.http.auth_token,
                },
                cfg.http.max_body_bytes,
            );
            http::serve(addr, app, shutdown_signal()).await
        }
    }
}

/// Entry point for the openrouter-image-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nConfig read from: {}", default_path.display());
                    eprintln!("See config/example-config.json for the format");
                }
            }
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = ?args.transport,
        "Starting openrouter-image-mcp server"
    );

    let root = match OutputRoot::open(&cfg.output_dir) {
        Ok(root) => root,
        Err(e) => {
            error!(path = %cfg.output_dir.display(), error = %e, "Cannot open output directory");
            return ExitCode::FAILURE;
        }
    };
    info!(output_dir = %root.path().display(), "Output directory ready");

    let backend = match OpenRouterBackend::new(cfg.openrouter.clone()) {
        Ok(backend) => backend,
        Err(e) => {
            error!(error = %e, "Cannot build OpenRouter client");
            return ExitCode::FAILURE;
        }
    };
    if cfg.openrouter.api_key.is_none() {
        tracing::warn!("OPENROUTER_API_KEY is not set; image generation will fail");
    }

    let server = McpServer::new(
        root,
        cfg.default_model().map(str::to_string),
        Arc::new(backend),
    );

    // Run the server
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime");

    let result = runtime.block_on(run(&args, cfg, server));

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
