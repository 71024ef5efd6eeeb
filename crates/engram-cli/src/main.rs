//! Engram CLI - collection-aware semantic memory over Qdrant
//!
//! # Usage
//!
//! ```bash
//! # Start the MCP server on stdio
//! engram serve
//!
//! # Store a document
//! engram store "Party A owes Party B $100." --collection legal_notes
//!
//! # Search a collection
//! engram find "file handles" --collection lessons_learned
//!
//! # Inspect collections and model routing
//! engram collections
//! engram models
//! ```

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

mod commands;

/// Engram - collection-aware semantic memory gateway
#[derive(Parser, Debug)]
#[command(name = "engram")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Qdrant server URL
    #[arg(
        long,
        global = true,
        env = "ENGRAM_BACKEND_URL",
        default_value = "http://localhost:6334"
    )]
    backend_url: String,

    /// Qdrant API key
    #[arg(long, global = true, env = "ENGRAM_API_KEY")]
    api_key: Option<String>,

    /// Attempt GPU execution providers before CPU
    #[arg(long, global = true)]
    gpu: bool,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

impl GlobalOptions {
    /// Convert global options to config overrides
    fn to_config_overrides(&self) -> engram_config::ConfigOverrides {
        engram_config::ConfigOverrides {
            backend_url: Some(self.backend_url.clone()),
            backend_api_key: self.api_key.clone(),
            gpu_enabled: self.gpu.then_some(true),
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the MCP server over stdio
    Serve(commands::serve::ServeArgs),

    /// Store a document in a collection
    Store(commands::store::StoreArgs),

    /// Search a collection semantically
    Find(commands::find::FindArgs),

    /// List collections, or show details for one
    Collections(commands::collections::CollectionsArgs),

    /// Show model routing rules and the model registry
    Models(commands::models::ModelsArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => commands::serve::execute(args, cli.global).await,
        Commands::Store(args) => commands::store::execute(args, cli.global).await,
        Commands::Find(args) => commands::find::execute(args, cli.global).await,
        Commands::Collections(args) => commands::collections::execute(args, cli.global).await,
        Commands::Models(args) => commands::models::execute(args, cli.global).await,
    }
}
