//! Lazy, shared pool of embedding runtimes.
//!
//! One embedder per model id, process-wide. Construction is serialized per
//! key and runs on a blocking thread; requests for different models never
//! block each other. A construction failure is memoized for the process
//! lifetime so a broken model is not retried on every request.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::{EmbeddingError, Result};
use crate::local::CandleEmbedder;
use crate::provider::{Embedder, EmbedderProvider};
use crate::registry::ModelDescriptor;

/// Outcome of a one-shot construction attempt, kept for the process lifetime.
type PoolSlot = Arc<OnceCell<std::result::Result<Arc<dyn Embedder>, String>>>;

/// Factory producing an embedder for a model; swapped out in tests.
type EmbedderLoader =
    Arc<dyn Fn(&ModelDescriptor, bool) -> Result<Arc<dyn Embedder>> + Send + Sync>;

/// Shared pool of per-model embedders.
pub struct EmbedderPool {
    gpu_enabled: bool,
    slots: Mutex<HashMap<String, PoolSlot>>,
    loader: EmbedderLoader,
}

impl EmbedderPool {
    /// Create a pool backed by the candle runtime.
    pub fn new(gpu_enabled: bool) -> Self {
        Self::with_loader(
            gpu_enabled,
            Arc::new(|descriptor, gpu| {
                CandleEmbedder::load(descriptor, gpu).map(|e| Arc::new(e) as Arc<dyn Embedder>)
            }),
        )
    }

    fn with_loader(gpu_enabled: bool, loader: EmbedderLoader) -> Self {
        Self {
            gpu_enabled,
            slots: Mutex::new(HashMap::new()),
            loader,
        }
    }

    /// Get the shared embedder for a model, constructing it on first call.
    ///
    /// Concurrent callers for the same model wait on one construction and
    /// receive the same instance. A failed construction stays failed.
    pub async fn get(&self, descriptor: &ModelDescriptor) -> Result<Arc<dyn Embedder>> {
        let slot = {
            let mut slots = self
                .slots
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(slots.entry(descriptor.model_id.clone()).or_default())
        };

        let outcome = slot
            .get_or_init(|| {
                let loader = Arc::clone(&self.loader);
                let descriptor = descriptor.clone();
                let gpu_enabled = self.gpu_enabled;
                async move {
                    info!(model_id = %descriptor.model_id, "constructing embedder");
                    let result = tokio::task::spawn_blocking(move || {
                        loader(&descriptor, gpu_enabled)
                    })
                    .await
                    .map_err(|e| {
                        EmbeddingError::Runtime(format!("construction task panicked: {e}"))
                    })
                    .and_then(|r| r);

                    match result {
                        Ok(embedder) => Ok(embedder),
                        Err(e) => {
                            warn!("embedder construction failed permanently: {e}");
                            Err(e.to_string())
                        }
                    }
                }
            })
            .await;

        match outcome {
            Ok(embedder) => Ok(Arc::clone(embedder)),
            Err(message) => Err(EmbeddingError::unavailable(
                &descriptor.model_id,
                message.clone(),
            )),
        }
    }
}

#[async_trait]
impl EmbedderProvider for EmbedderPool {
    async fn get(&self, model: &ModelDescriptor) -> Result<Arc<dyn Embedder>> {
        EmbedderPool::get(self, model).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ExecutionProvider;
    use crate::registry::ModelRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubEmbedder {
        model_id: String,
        dimensions: u64,
        providers: Vec<ExecutionProvider>,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed_documents(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|_| vec![0.0; self.dimensions as usize])
                .collect())
        }

        async fn embed_query(&self, _text: String) -> Result<Vec<f32>> {
            Ok(vec![0.0; self.dimensions as usize])
        }

        fn dimensions(&self) -> u64 {
            self.dimensions
        }

        fn model_id(&self) -> &str {
            &self.model_id
        }

        fn active_providers(&self) -> &[ExecutionProvider] {
            &self.providers
        }
    }

    fn descriptor(model_id: &str) -> ModelDescriptor {
        ModelRegistry::builtin()
            .get(model_id)
            .expect("builtin model")
            .clone()
    }

    fn counting_pool(constructions: Arc<AtomicUsize>) -> EmbedderPool {
        EmbedderPool::with_loader(
            false,
            Arc::new(move |desc, _gpu| {
                constructions.fetch_add(1, Ordering::SeqCst);
                // Make the construction slow enough that racing callers
                // overlap it.
                std::thread::sleep(Duration::from_millis(50));
                Ok(Arc::new(StubEmbedder {
                    model_id: desc.model_id.clone(),
                    dimensions: desc.dimensions,
                    providers: vec![ExecutionProvider::Cpu],
                }) as Arc<dyn Embedder>)
            }),
        )
    }

    #[tokio::test]
    async fn test_singleton_per_model_under_concurrency() {
        let constructions = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(counting_pool(Arc::clone(&constructions)));
        let desc = descriptor("BAAI/bge-base-en-v1.5");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            let desc = desc.clone();
            handles.push(tokio::spawn(async move { pool.get(&desc).await.unwrap() }));
        }

        let embedders: Vec<_> = futures_join(handles).await;

        assert_eq!(constructions.load(Ordering::SeqCst), 1);
        for pair in embedders.windows(2) {
            assert!(Arc::ptr_eq(&pair[0], &pair[1]));
        }
    }

    #[tokio::test]
    async fn test_distinct_models_get_distinct_embedders() {
        let constructions = Arc::new(AtomicUsize::new(0));
        let pool = counting_pool(Arc::clone(&constructions));

        let a = pool.get(&descriptor("BAAI/bge-base-en-v1.5")).await.unwrap();
        let b = pool.get(&descriptor("BAAI/bge-large-en-v1.5")).await.unwrap();

        assert_eq!(constructions.load(Ordering::SeqCst), 2);
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.dimensions(), 768);
        assert_eq!(b.dimensions(), 1024);
    }

    #[tokio::test]
    async fn test_failure_is_memoized() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_in_loader = Arc::clone(&attempts);
        let pool = EmbedderPool::with_loader(
            false,
            Arc::new(move |desc, _gpu| {
                attempts_in_loader.fetch_add(1, Ordering::SeqCst);
                Err(EmbeddingError::unavailable(&desc.model_id, "boom"))
            }),
        );

        let desc = descriptor("BAAI/bge-small-en-v1.5");
        assert!(pool.get(&desc).await.is_err());
        assert!(pool.get(&desc).await.is_err());

        // The second call must fail fast from the memoized outcome.
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    async fn futures_join<T>(handles: Vec<tokio::task::JoinHandle<T>>) -> Vec<T> {
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(handle.await.unwrap());
        }
        out
    }
}
