//! Find command
//!
//! Semantic search within one collection.

use anyhow::{Context, Result};
use clap::Args;

use crate::GlobalOptions;

/// Search a collection semantically
#[derive(Args, Debug)]
pub struct FindArgs {
    /// Query text
    query: String,

    /// Collection to search (falls back to the configured default collection)
    #[arg(long, short = 'c')]
    collection: Option<String>,

    /// Maximum results
    #[arg(long, short = 'l')]
    limit: Option<u64>,

    /// Minimum similarity score
    #[arg(long, short = 't')]
    score_threshold: Option<f32>,
}

/// Execute the find command
pub async fn execute(args: FindArgs, global: GlobalOptions) -> Result<()> {
    super::init_tracing(&global);

    let (config, service) = super::build_service(&global).await?;

    let collection = args
        .collection
        .or_else(|| config.models.default_collection.clone())
        .context("No collection given and no default collection configured")?;

    let response = service
        .find(&collection, &args.query, args.limit, args.score_threshold)
        .await?;

    super::print_json(&response)
}
