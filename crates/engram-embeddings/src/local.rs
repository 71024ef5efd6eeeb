//! Local embedding runtime using Candle.
//!
//! One code path serves every catalogue model: all are BERT-architecture
//! sentence encoders whose weights, tokenizer, and config come from the
//! HuggingFace Hub. Output vectors are mean-pooled over the attention mask
//! and L2-normalized.
//!
//! GPU acceleration via compile-time features:
//! - `--features metal` for macOS Metal/MPS
//! - `--features cuda` for NVIDIA CUDA

use std::path::PathBuf;
use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use hf_hub::{api::sync::Api, Repo, RepoType};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer};
use tracing::{debug, info};

use async_trait::async_trait;

use crate::error::{EmbeddingError, Result};
use crate::provider::{Embedder, ExecutionProvider};
use crate::registry::ModelDescriptor;

/// Data type for model inference
const DTYPE: DType = DType::F32;

/// A loaded BERT encoder bound to one catalogue model.
///
/// Construction is slow (weight download + load + device negotiation) and is
/// expected to run on a blocking thread; the pool serializes it per model id.
/// Once constructed the embedder accepts concurrent calls.
///
/// Uses an `Arc` inner so the handle can be cloned into `spawn_blocking`.
#[derive(Clone)]
pub struct CandleEmbedder {
    inner: Arc<EmbedderInner>,
}

struct EmbedderInner {
    descriptor: ModelDescriptor,
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    active_providers: Vec<ExecutionProvider>,
}

impl CandleEmbedder {
    /// Load the model, negotiating an execution device.
    ///
    /// When `gpu_enabled` is set and the runtime reports a GPU, the GPU is
    /// attempted first and CPU kept as fallback; otherwise CPU only. A CPU
    /// failure is fatal for this model.
    pub fn load(descriptor: &ModelDescriptor, gpu_enabled: bool) -> Result<Self> {
        let (config_path, tokenizer_path, weights_path) = fetch_model_files(&descriptor.model_id)?;

        let config_str = std::fs::read_to_string(&config_path)
            .map_err(|e| EmbeddingError::Runtime(format!("failed to read config: {e}")))?;
        let config: BertConfig = serde_json::from_str(&config_str)
            .map_err(|e| EmbeddingError::Runtime(format!("failed to parse config: {e}")))?;

        if config.hidden_size as u64 != descriptor.dimensions {
            return Err(EmbeddingError::unavailable(
                &descriptor.model_id,
                format!(
                    "model hidden size {} does not match registered dimensions {}",
                    config.hidden_size, descriptor.dimensions
                ),
            ));
        }

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbeddingError::Runtime(format!("failed to load tokenizer: {e}")))?;

        let providers = negotiated_providers(gpu_enabled);
        let mut last_err = None;

        for (i, provider) in providers.iter().enumerate() {
            match open_device(*provider) {
                Ok(device) => match load_weights(&weights_path, &config, &device) {
                    Ok(model) => {
                        info!(
                            model_id = %descriptor.model_id,
                            provider = %provider,
                            dimensions = descriptor.dimensions,
                            "embedder ready"
                        );
                        return Ok(Self {
                            inner: Arc::new(EmbedderInner {
                                descriptor: descriptor.clone(),
                                model,
                                tokenizer,
                                device,
                                // Providers actually negotiated: the one that
                                // won plus any remaining fallbacks.
                                active_providers: providers[i..].to_vec(),
                            }),
                        });
                    }
                    Err(e) => {
                        debug!(provider = %provider, "weight load failed: {e}");
                        last_err = Some(e);
                    }
                },
                Err(e) => {
                    debug!(provider = %provider, "device unavailable: {e}");
                    last_err = Some(e);
                }
            }
        }

        Err(EmbeddingError::unavailable(
            &descriptor.model_id,
            last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no execution provider available".to_string()),
        ))
    }

}

impl EmbedderInner {
    /// Synchronous batch encoding (runs on a blocking thread).
    fn encode_sync(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
        debug!(
            model_id = %self.descriptor.model_id,
            count = texts.len(),
            "encoding batch"
        );

        let mut tokenizer = self.tokenizer.clone();
        let padding = PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        };
        tokenizer.with_padding(Some(padding));

        let encodings = tokenizer
            .encode_batch(texts, true)
            .map_err(|e| EmbeddingError::Runtime(format!("tokenization failed: {e}")))?;

        let token_ids: Vec<Tensor> = encodings
            .iter()
            .map(|enc| Tensor::new(enc.get_ids(), &self.device))
            .collect::<candle_core::Result<Vec<_>>>()?;

        let attention_masks: Vec<Tensor> = encodings
            .iter()
            .map(|enc| Tensor::new(enc.get_attention_mask(), &self.device))
            .collect::<candle_core::Result<Vec<_>>>()?;

        let token_ids = Tensor::stack(&token_ids, 0)?;
        let attention_mask = Tensor::stack(&attention_masks, 0)?;
        let token_type_ids = token_ids.zeros_like()?;

        let embeddings = self
            .model
            .forward(&token_ids, &token_type_ids, Some(&attention_mask))?;

        let pooled = mean_pool(&embeddings, &attention_mask)?;
        let normalized = normalize_l2(&pooled)?;

        let rows = normalized.dim(0)?;
        let mut result = Vec::with_capacity(rows);
        for i in 0..rows {
            result.push(normalized.get(i)?.to_vec1::<f32>()?);
        }

        Ok(result)
    }
}

#[async_trait]
impl Embedder for CandleEmbedder {
    async fn embed_documents(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.encode_sync(&texts))
            .await
            .map_err(|e| EmbeddingError::Runtime(format!("blocking task panicked: {e}")))?
    }

    async fn embed_query(&self, text: String) -> Result<Vec<f32>> {
        let text = match &self.inner.descriptor.query_prefix {
            Some(prefix) => format!("{prefix}{text}"),
            None => text,
        };

        let mut vectors = self.embed_documents(vec![text]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Runtime("runtime returned no vector".to_string()))
    }

    fn dimensions(&self) -> u64 {
        self.inner.descriptor.dimensions
    }

    fn model_id(&self) -> &str {
        &self.inner.descriptor.model_id
    }

    fn active_providers(&self) -> &[ExecutionProvider] {
        &self.inner.active_providers
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Providers to attempt, in order, given the GPU setting and what the
/// runtime reports as available.
fn negotiated_providers(gpu_enabled: bool) -> Vec<ExecutionProvider> {
    if gpu_enabled {
        if candle_core::utils::cuda_is_available() {
            return vec![ExecutionProvider::Cuda, ExecutionProvider::Cpu];
        }
        if candle_core::utils::metal_is_available() {
            return vec![ExecutionProvider::Metal, ExecutionProvider::Cpu];
        }
        debug!("GPU requested but no GPU runtime available, using CPU");
    }
    vec![ExecutionProvider::Cpu]
}

/// Open the device backing an execution provider.
fn open_device(provider: ExecutionProvider) -> Result<Device> {
    match provider {
        ExecutionProvider::Cuda => Device::new_cuda(0).map_err(EmbeddingError::from),
        ExecutionProvider::Metal => Device::new_metal(0).map_err(EmbeddingError::from),
        ExecutionProvider::Cpu => Ok(Device::Cpu),
    }
}

/// Load BERT weights onto a device.
fn load_weights(weights_path: &PathBuf, config: &BertConfig, device: &Device) -> Result<BertModel> {
    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[weights_path.clone()], DTYPE, device)
            .map_err(|e| EmbeddingError::Runtime(format!("failed to load weights: {e}")))?
    };

    BertModel::load(vb, config)
        .map_err(|e| EmbeddingError::Runtime(format!("failed to create model: {e}")))
}

/// Download model files from the HuggingFace Hub (cached locally).
fn fetch_model_files(model_id: &str) -> Result<(PathBuf, PathBuf, PathBuf)> {
    let api = Api::new()
        .map_err(|e| EmbeddingError::model_fetch(model_id, format!("hub API unavailable: {e}")))?;
    let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, "main".to_string());
    let api_repo = api.repo(repo);

    let config = api_repo
        .get("config.json")
        .map_err(|e| EmbeddingError::model_fetch(model_id, format!("config.json: {e}")))?;
    let tokenizer = api_repo
        .get("tokenizer.json")
        .map_err(|e| EmbeddingError::model_fetch(model_id, format!("tokenizer.json: {e}")))?;
    let weights = api_repo
        .get("model.safetensors")
        .map_err(|e| EmbeddingError::model_fetch(model_id, format!("model.safetensors: {e}")))?;

    Ok((config, tokenizer, weights))
}

/// L2 normalize embeddings
fn normalize_l2(v: &Tensor) -> Result<Tensor> {
    v.broadcast_div(&v.sqr()?.sum_keepdim(1)?.sqrt()?)
        .map_err(|e| EmbeddingError::Runtime(format!("L2 normalization failed: {e}")))
}

/// Mean pooling with attention mask
fn mean_pool(embeddings: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let attention_mask_expanded = attention_mask.to_dtype(DTYPE)?.unsqueeze(2)?;

    let sum_mask = attention_mask_expanded.sum(1)?;
    let masked_embeddings = embeddings.broadcast_mul(&attention_mask_expanded)?;
    let summed = masked_embeddings.sum(1)?;

    summed
        .broadcast_div(&sum_mask)
        .map_err(|e| EmbeddingError::Runtime(format!("mean pooling failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_only_when_gpu_disabled() {
        let providers = negotiated_providers(false);
        assert_eq!(providers, vec![ExecutionProvider::Cpu]);
    }

    #[test]
    fn test_cpu_is_always_last() {
        let providers = negotiated_providers(true);
        assert_eq!(*providers.last().unwrap(), ExecutionProvider::Cpu);
    }

    #[test]
    fn test_open_cpu_device() {
        let device = open_device(ExecutionProvider::Cpu).unwrap();
        assert!(matches!(device, Device::Cpu));
    }
}
