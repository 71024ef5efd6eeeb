//! Collection lifecycle management.
//!
//! `ensure` makes a backend collection ready for use under the model
//! resolved for its name: verifying geometry when it exists, creating it
//! with the model's vector spec when it does not. Work is serialized per
//! collection name and memoized for the process lifetime; a geometry
//! mismatch is terminal until an operator intervenes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use engram_config::IndexSettings;
use engram_embeddings::{ModelDescriptor, ModelResolver};

use crate::backend::{CollectionGeometry, VectorBackend, VectorSpec};
use crate::error::{Result, StoreError};

/// A collection verified (or created) against its resolved model.
#[derive(Debug, Clone)]
pub struct ResolvedCollection {
    /// Collection name
    pub name: String,
    /// Persisted vector slot name
    pub vector_name: String,
    /// The model bound to this collection
    pub model: ModelDescriptor,
}

/// Memoized per-collection outcome.
#[derive(Clone)]
enum EnsureOutcome {
    Ready(ResolvedCollection),
    /// Terminal for this process; carries the human-readable detail
    Mismatched(String),
}

type EnsureSlot = Arc<OnceCell<EnsureOutcome>>;

/// Ensures collections exist with the right vector geometry before use.
pub struct CollectionManager {
    backend: Arc<dyn VectorBackend>,
    resolver: Arc<ModelResolver>,
    index: IndexSettings,
    slots: Mutex<HashMap<String, EnsureSlot>>,
}

impl CollectionManager {
    /// Create a manager over a backend and resolver.
    pub fn new(
        backend: Arc<dyn VectorBackend>,
        resolver: Arc<ModelResolver>,
        index: IndexSettings,
    ) -> Self {
        Self {
            backend,
            resolver,
            index,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Make `collection` ready for use under its resolved model.
    ///
    /// Serialized per collection name; parallel across names. The first
    /// successful outcome is memoized, as is a geometry mismatch. A missing
    /// collection with `create_if_missing = false` and transient backend
    /// failures are not memoized, so later calls may retry.
    pub async fn ensure(
        &self,
        collection: &str,
        create_if_missing: bool,
    ) -> Result<ResolvedCollection> {
        let slot = {
            let mut slots = self
                .slots
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(slots.entry(collection.to_string()).or_default())
        };

        let outcome = slot
            .get_or_try_init(|| self.ensure_uncached(collection, create_if_missing))
            .await?;

        match outcome {
            EnsureOutcome::Ready(resolved) => Ok(resolved.clone()),
            EnsureOutcome::Mismatched(detail) => {
                Err(StoreError::model_mismatch(collection, detail.clone()))
            }
        }
    }

    async fn ensure_uncached(
        &self,
        collection: &str,
        create_if_missing: bool,
    ) -> Result<EnsureOutcome> {
        let model = self.resolver.resolve(collection).clone();
        let vector_name = model.vector_name();

        if let Some(geometry) = self.backend.describe_collection(collection).await? {
            return Ok(self.verified(collection, &geometry, model, vector_name));
        }

        if !create_if_missing {
            return Err(StoreError::NoSuchCollection(collection.to_string()));
        }

        let spec = VectorSpec {
            vector_name: vector_name.clone(),
            dimensions: model.dimensions,
            distance: model.distance,
            hnsw_m: self.index.hnsw_m,
            hnsw_ef_construct: self.index.hnsw_ef_construct,
            quantization: self.index.enable_quantization,
        };

        match self.backend.create_collection(collection, &spec).await {
            Ok(()) => {
                info!(
                    collection,
                    model_id = %model.model_id,
                    dimensions = model.dimensions,
                    "collection created"
                );
                Ok(EnsureOutcome::Ready(ResolvedCollection {
                    name: collection.to_string(),
                    vector_name,
                    model,
                }))
            }
            Err(create_err) => {
                // Lost a create race against another writer: the collection
                // may exist now. Re-verify instead of failing.
                if let Some(geometry) = self.backend.describe_collection(collection).await? {
                    debug!(collection, "create raced, re-verifying geometry");
                    return Ok(self.verified(collection, &geometry, model, vector_name));
                }
                Err(create_err)
            }
        }
    }

    fn verified(
        &self,
        collection: &str,
        geometry: &CollectionGeometry,
        model: ModelDescriptor,
        vector_name: String,
    ) -> EnsureOutcome {
        match geometry.vectors.get(&vector_name) {
            Some(slot)
                if slot.dimensions == model.dimensions
                    && slot.distance == Some(model.distance) =>
            {
                EnsureOutcome::Ready(ResolvedCollection {
                    name: collection.to_string(),
                    vector_name,
                    model,
                })
            }
            Some(slot) => {
                let detail = format!(
                    "vector slot '{}' has {} dims / {:?}, resolved model '{}' needs {} dims / {}",
                    vector_name,
                    slot.dimensions,
                    slot.distance,
                    model.model_id,
                    model.dimensions,
                    model.distance
                );
                warn!(collection, "{detail}");
                EnsureOutcome::Mismatched(detail)
            }
            None => {
                let mut found: Vec<&str> = geometry.vectors.keys().map(String::as_str).collect();
                found.sort_unstable();
                let detail = format!(
                    "expected vector slot '{}' for model '{}', found {:?}",
                    vector_name, model.model_id, found
                );
                warn!(collection, "{detail}");
                EnsureOutcome::Mismatched(detail)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use engram_config::ModelSettings;
    use engram_embeddings::{Distance, ModelRegistry};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn resolver() -> Arc<ModelResolver> {
        let registry = Arc::new(ModelRegistry::builtin());
        Arc::new(ModelResolver::from_settings(registry, &ModelSettings::default()).unwrap())
    }

    fn manager(backend: Arc<InMemoryBackend>) -> CollectionManager {
        CollectionManager::new(backend, resolver(), IndexSettings::default())
    }

    #[tokio::test]
    async fn test_ensure_creates_and_memoizes() {
        let backend = Arc::new(InMemoryBackend::new());
        let manager = manager(Arc::clone(&backend));

        let resolved = manager.ensure("legal_notes", true).await.unwrap();
        assert_eq!(resolved.model.dimensions, 1024);
        assert_eq!(resolved.vector_name, "bge-large-english-v1-5");

        manager.ensure("legal_notes", true).await.unwrap();
        assert_eq!(backend.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_ensure_creates_once() {
        let backend = Arc::new(InMemoryBackend::new());
        let manager = Arc::new(manager(Arc::clone(&backend)));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                manager.ensure("lessons_learned", true).await.unwrap()
            }));
        }
        for handle in handles {
            let resolved = handle.await.unwrap();
            assert_eq!(resolved.model.dimensions, 768);
        }

        assert_eq!(backend.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_no_create_on_read() {
        let backend = Arc::new(InMemoryBackend::new());
        let manager = manager(Arc::clone(&backend));

        let result = manager.ensure("lessons_learned", false).await;
        assert!(matches!(result, Err(StoreError::NoSuchCollection(_))));
        assert_eq!(backend.create_calls(), 0);

        // A later write may still create; the miss was not memoized.
        manager.ensure("lessons_learned", true).await.unwrap();
        assert_eq!(backend.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_mismatch_is_terminal() {
        let backend = Arc::new(InMemoryBackend::new());

        // Pre-create externally with foreign geometry (384-dim default slot).
        backend
            .create_collection(
                "legal_notes",
                &VectorSpec {
                    vector_name: "all-minilm-l6-v2".to_string(),
                    dimensions: 384,
                    distance: Distance::Cosine,
                    hnsw_m: 16,
                    hnsw_ef_construct: 128,
                    quantization: false,
                },
            )
            .await
            .unwrap();

        let manager = manager(Arc::clone(&backend));

        let first = manager.ensure("legal_notes", true).await;
        assert!(matches!(first, Err(StoreError::ModelMismatch { .. })));

        let second = manager.ensure("legal_notes", true).await;
        assert!(matches!(second, Err(StoreError::ModelMismatch { .. })));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_on_same_slot() {
        let backend = Arc::new(InMemoryBackend::new());

        backend
            .create_collection(
                "legal_notes",
                &VectorSpec {
                    vector_name: "bge-large-english-v1-5".to_string(),
                    dimensions: 768,
                    distance: Distance::Cosine,
                    hnsw_m: 16,
                    hnsw_ef_construct: 128,
                    quantization: false,
                },
            )
            .await
            .unwrap();

        let manager = manager(Arc::clone(&backend));
        let result = manager.ensure("legal_notes", true).await;
        assert!(matches!(result, Err(StoreError::ModelMismatch { .. })));
    }

    /// Backend whose first describe fails, to prove transient errors are
    /// not memoized.
    struct FlakyBackend {
        inner: InMemoryBackend,
        failed_once: AtomicBool,
    }

    #[async_trait::async_trait]
    impl VectorBackend for FlakyBackend {
        async fn collection_exists(&self, collection: &str) -> Result<bool> {
            self.inner.collection_exists(collection).await
        }

        async fn create_collection(&self, collection: &str, spec: &VectorSpec) -> Result<()> {
            self.inner.create_collection(collection, spec).await
        }

        async fn describe_collection(
            &self,
            collection: &str,
        ) -> Result<Option<CollectionGeometry>> {
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                return Err(StoreError::BackendUnavailable("connection reset".into()));
            }
            self.inner.describe_collection(collection).await
        }

        async fn list_collections(&self) -> Result<Vec<String>> {
            self.inner.list_collections().await
        }

        async fn upsert_points(
            &self,
            collection: &str,
            vector_name: &str,
            points: Vec<crate::backend::PointData>,
        ) -> Result<()> {
            self.inner.upsert_points(collection, vector_name, points).await
        }

        async fn search_points(
            &self,
            collection: &str,
            vector_name: &str,
            vector: Vec<f32>,
            limit: u64,
            score_threshold: f32,
        ) -> Result<Vec<crate::backend::ScoredHit>> {
            self.inner
                .search_points(collection, vector_name, vector, limit, score_threshold)
                .await
        }

        async fn retrieve_points(
            &self,
            collection: &str,
            vector_name: &str,
            ids: &[String],
            with_vector: bool,
        ) -> Result<Vec<crate::backend::StoredPoint>> {
            self.inner
                .retrieve_points(collection, vector_name, ids, with_vector)
                .await
        }

        async fn set_payload(
            &self,
            collection: &str,
            ids: &[String],
            payload: serde_json::Map<String, serde_json::Value>,
            key: Option<&str>,
        ) -> Result<()> {
            self.inner.set_payload(collection, ids, payload, key).await
        }

        async fn delete_points(&self, collection: &str, ids: &[String]) -> Result<()> {
            self.inner.delete_points(collection, ids).await
        }
    }

    #[tokio::test]
    async fn test_transient_failure_is_retryable() {
        let backend = Arc::new(FlakyBackend {
            inner: InMemoryBackend::new(),
            failed_once: AtomicBool::new(false),
        });
        let manager =
            CollectionManager::new(Arc::clone(&backend) as Arc<dyn VectorBackend>, resolver(), IndexSettings::default());

        let first = manager.ensure("notes", true).await;
        assert!(matches!(first, Err(StoreError::BackendUnavailable(_))));

        // Retry succeeds and creates the collection.
        let second = manager.ensure("notes", true).await.unwrap();
        assert_eq!(second.model.dimensions, 384);
    }
}
