//! MCP server command
//!
//! Starts the Engram MCP server over stdio for AI assistant integration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use rmcp::{transport::stdio, ServiceExt};
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::FmtSubscriber;

use engram_mcp::EngramServer;

use crate::GlobalOptions;

/// Start the MCP server for AI assistant integration
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Log file path (default: stderr)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

/// Execute the serve command
pub async fn execute(args: ServeArgs, global: GlobalOptions) -> Result<()> {
    // Set up logging (must be stderr - stdout is for MCP JSON-RPC protocol)
    let log_level = if args.debug || global.verbose {
        Level::DEBUG
    } else if global.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    // Use try_init() to gracefully handle the case where a global subscriber
    // is already set (e.g., when launched by an MCP host)
    if let Some(ref log_file) = args.log_file {
        let file = std::fs::File::create(log_file)
            .with_context(|| format!("Failed to create log file: {}", log_file.display()))?;
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(file)
            .with_ansi(false)
            .finish();
        if subscriber.try_init().is_err() {
            warn!(
                "Note: Using existing tracing subscriber (--log-file {} ignored)",
                log_file.display()
            );
        }
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .finish();
        let _ = subscriber.try_init();
    }

    let config = super::load_config(&global)?;

    info!("Starting Engram MCP Server");
    info!("  Backend: {}", config.backend.url);
    info!(
        "  Default model: {} (gpu: {})",
        config.models.default_model, config.embedding.gpu_enabled
    );

    let server = EngramServer::connect(&config)
        .await
        .context("Failed to create MCP server")?;

    info!("Server initialized, starting MCP protocol over stdio");

    let service = server
        .serve(stdio())
        .await
        .context("Failed to start MCP service")?;

    // Wait for shutdown or service termination
    tokio::select! {
        result = service.waiting() => {
            if let Err(e) = result {
                info!("Service ended with error: {}", e);
            } else {
                info!("Service ended normally");
            }
        }
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
