//! CLI command implementations

pub mod collections;
pub mod find;
pub mod models;
pub mod serve;
pub mod store;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::FmtSubscriber;

use engram_config::{ConfigLoader, EngramConfig};
use engram_embeddings::{EmbedderPool, ModelRegistry, ModelResolver};
use engram_store::{MemoryService, QdrantBackend, VectorBackend};

use crate::GlobalOptions;

/// Load the merged configuration for the current directory.
pub fn load_config(global: &GlobalOptions) -> Result<EngramConfig> {
    let workspace_root =
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let mut loader = ConfigLoader::new();
    loader
        .load(&workspace_root, Some(&global.to_config_overrides()))
        .context("Failed to load configuration")
}

/// Set up logging to stderr (stdout may carry MCP JSON-RPC or tool output).
///
/// Tolerates an already-installed global subscriber, e.g. when launched by
/// an MCP host that configured its own.
pub fn init_tracing(global: &GlobalOptions) {
    let log_level = if global.verbose {
        Level::DEBUG
    } else if global.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    let _ = subscriber.try_init();
}

/// Assemble the full memory service against the configured Qdrant backend.
pub async fn build_service(global: &GlobalOptions) -> Result<(EngramConfig, Arc<MemoryService>)> {
    let config = load_config(global)?;

    let registry = Arc::new(ModelRegistry::builtin());
    let resolver = Arc::new(
        ModelResolver::from_settings(Arc::clone(&registry), &config.models)
            .context("Invalid model routing configuration")?,
    );

    let backend: Arc<dyn VectorBackend> = Arc::new(
        QdrantBackend::connect(&config.backend)
            .await
            .context("Failed to connect to Qdrant")?,
    );
    let embedders = Arc::new(EmbedderPool::new(config.embedding.gpu_enabled));

    let service = Arc::new(MemoryService::new(backend, embedders, resolver, &config));
    Ok((config, service))
}

/// Pretty-print a serializable value to stdout.
pub fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
