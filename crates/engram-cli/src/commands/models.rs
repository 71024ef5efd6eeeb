//! Models command
//!
//! Shows the collection-to-model routing rules and the model registry.

use anyhow::Result;
use clap::Args;

use crate::GlobalOptions;

/// Show model routing rules and the model registry
#[derive(Args, Debug)]
pub struct ModelsArgs {}

/// Execute the models command
pub async fn execute(_args: ModelsArgs, global: GlobalOptions) -> Result<()> {
    super::init_tracing(&global);

    let (_config, service) = super::build_service(&global).await?;

    super::print_json(&service.model_mappings())
}
