//! Embedder trait and execution-provider types.
//!
//! An [`Embedder`] is one loaded model runtime; the pool hands out one shared
//! instance per model id. Implementations must accept concurrent calls once
//! constructed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::registry::ModelDescriptor;

/// Execution backend negotiated for a model runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// NVIDIA CUDA device
    Cuda,
    /// Apple Metal device
    Metal,
    /// CPU fallback, always last in the negotiated order
    Cpu,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionProvider::Cuda => write!(f, "cuda"),
            ExecutionProvider::Metal => write!(f, "metal"),
            ExecutionProvider::Cpu => write!(f, "cpu"),
        }
    }
}

/// A ready embedding runtime for one model.
///
/// # Thread safety
///
/// Implementations must be `Send + Sync`; callers share one instance across
/// concurrent requests. If the underlying runtime is not re-entrant the
/// implementation serializes internally, never pool-wide.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of documents, one vector per input, in input order.
    ///
    /// An empty batch returns an empty result without touching the runtime.
    async fn embed_documents(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Embed a search query.
    ///
    /// May apply a model-specific retrieval prefix; otherwise identical to
    /// document embedding.
    async fn embed_query(&self, text: String) -> Result<Vec<f32>>;

    /// Output dimensionality.
    fn dimensions(&self) -> u64;

    /// The model id this runtime serves.
    fn model_id(&self) -> &str;

    /// Execution providers in negotiated order (e.g. `[cuda, cpu]`).
    fn active_providers(&self) -> &[ExecutionProvider];
}

/// Source of shared embedders, keyed by model.
///
/// The pool implements this; tests substitute deterministic stubs.
#[async_trait]
pub trait EmbedderProvider: Send + Sync {
    /// Get the shared embedder for a model, constructing it on first use.
    async fn get(&self, model: &ModelDescriptor) -> Result<std::sync::Arc<dyn Embedder>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_provider_display() {
        assert_eq!(ExecutionProvider::Cuda.to_string(), "cuda");
        assert_eq!(ExecutionProvider::Metal.to_string(), "metal");
        assert_eq!(ExecutionProvider::Cpu.to_string(), "cpu");
    }

    #[test]
    fn test_execution_provider_serde() {
        let json = serde_json::to_string(&vec![ExecutionProvider::Cuda, ExecutionProvider::Cpu])
            .unwrap();
        assert_eq!(json, r#"["cuda","cpu"]"#);
    }
}
