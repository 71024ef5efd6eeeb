//! Store command
//!
//! Embeds one document and stores it in a collection.

use anyhow::{bail, Context, Result};
use clap::Args;

use crate::GlobalOptions;

/// Store a document in a collection
#[derive(Args, Debug)]
pub struct StoreArgs {
    /// Document text to store
    information: String,

    /// Target collection (falls back to the configured default collection)
    #[arg(long, short = 'c')]
    collection: Option<String>,

    /// Metadata as a JSON object, e.g. '{"case":"X-1"}'
    #[arg(long, short = 'm')]
    metadata: Option<String>,
}

/// Execute the store command
pub async fn execute(args: StoreArgs, global: GlobalOptions) -> Result<()> {
    super::init_tracing(&global);

    let metadata = match args.metadata {
        Some(raw) => {
            let value: serde_json::Value =
                serde_json::from_str(&raw).context("Failed to parse --metadata as JSON")?;
            match value {
                serde_json::Value::Object(map) => Some(map),
                _ => bail!("--metadata must be a JSON object"),
            }
        }
        None => None,
    };

    let (config, service) = super::build_service(&global).await?;

    let collection = args
        .collection
        .or_else(|| config.models.default_collection.clone())
        .context("No collection given and no default collection configured")?;

    let receipt = service
        .store(&collection, &args.information, metadata)
        .await?;

    super::print_json(&receipt)
}
