//! Collections command
//!
//! Lists backend collections or shows details for one.

use anyhow::Result;
use clap::Args;

use crate::GlobalOptions;

/// List collections, or show details for one
#[derive(Args, Debug)]
pub struct CollectionsArgs {
    /// Collection to describe in detail (omit to list all)
    name: Option<String>,
}

/// Execute the collections command
pub async fn execute(args: CollectionsArgs, global: GlobalOptions) -> Result<()> {
    super::init_tracing(&global);

    let (_config, service) = super::build_service(&global).await?;

    match args.name {
        Some(name) => {
            let detail = service.collection_info(&name).await?;
            super::print_json(&detail)
        }
        None => {
            let summaries = service.list_collections().await?;
            super::print_json(&summaries)
        }
    }
}
