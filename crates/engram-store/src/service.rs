//! The query/store engine.
//!
//! `MemoryService` composes resolver → embedder pool → collection manager →
//! backend into the public service operations. Every operation takes the
//! collection name explicitly; nothing relies on ambient state. Typed errors
//! surface outward; only the embedder CPU fallback and create races are
//! recovered internally (in the layers below).

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use engram_config::EngramConfig;
use engram_embeddings::{EmbedderProvider, ModelResolver};

use crate::backend::{CollectionGeometry, PointData, VectorBackend};
use crate::error::{Result, StoreError};
use crate::manager::{CollectionManager, ResolvedCollection};
use crate::schema::{
    document_payload, keys, BulkStoreReport, CollectionDetail, CollectionSummary, DeleteReport,
    MappingsReport, ModelInfo, PatternInfo, PointView, SearchEntry, SearchResponse, StoreReceipt,
    UpdateReport,
};

/// Default bulk-store chunk size.
const DEFAULT_BATCH_SIZE: usize = 100;

/// Collection-aware embedding and storage engine.
pub struct MemoryService {
    backend: Arc<dyn VectorBackend>,
    embedders: Arc<dyn EmbedderProvider>,
    resolver: Arc<ModelResolver>,
    manager: CollectionManager,
    default_limit: u64,
    default_threshold: f32,
    auto_create: bool,
    default_collection: Option<String>,
}

impl MemoryService {
    /// Assemble the engine from its collaborators and configuration.
    pub fn new(
        backend: Arc<dyn VectorBackend>,
        embedders: Arc<dyn EmbedderProvider>,
        resolver: Arc<ModelResolver>,
        config: &EngramConfig,
    ) -> Self {
        let manager = CollectionManager::new(
            Arc::clone(&backend),
            Arc::clone(&resolver),
            config.index.clone(),
        );

        Self {
            backend,
            embedders,
            resolver,
            manager,
            default_limit: config.search.default_limit,
            default_threshold: config.search.default_threshold,
            auto_create: config.index.auto_create_collections,
            default_collection: config.models.default_collection.clone(),
        }
    }

    /// Collection used when a transport tool omits the argument.
    pub fn default_collection(&self) -> Option<&str> {
        self.default_collection.as_deref()
    }

    // =========================================================================
    // Write operations
    // =========================================================================

    /// Store one document.
    pub async fn store(
        &self,
        collection: &str,
        information: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Result<StoreReceipt> {
        require_non_empty("collection_name", collection)?;
        require_non_empty("information", information)?;

        // Geometry is checked before any embedding is computed.
        let resolved = self.manager.ensure(collection, self.auto_create).await?;
        let embedder = self.embedders.get(&resolved.model).await?;

        let mut vectors = embedder
            .embed_documents(vec![information.to_string()])
            .await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| StoreError::Internal("embedder returned no vector".to_string()))?;

        let point_id = Uuid::new_v4().to_string();
        let payload = document_payload(information, metadata);

        self.backend
            .upsert_points(
                collection,
                &resolved.vector_name,
                vec![PointData {
                    id: point_id.clone(),
                    vector,
                    payload,
                }],
            )
            .await?;

        debug!(collection, point_id, model = %resolved.model.model_id, "document stored");

        Ok(StoreReceipt {
            point_id,
            vector_model: resolved.model.display_name.clone(),
            dimensions: resolved.model.dimensions,
        })
    }

    /// Store many documents in chunks.
    ///
    /// Ids are assigned up front so `point_ids[i]` always corresponds to
    /// `documents[i]`. A failed chunk is reported and skipped; prior chunks
    /// are not rolled back.
    pub async fn bulk_store(
        &self,
        collection: &str,
        documents: Vec<String>,
        metadata_list: Option<Vec<Map<String, Value>>>,
        batch_size: Option<usize>,
    ) -> Result<BulkStoreReport> {
        require_non_empty("collection_name", collection)?;
        if documents.is_empty() {
            return Err(StoreError::invalid_input("documents", "must not be empty"));
        }
        for (i, doc) in documents.iter().enumerate() {
            if doc.is_empty() {
                return Err(StoreError::invalid_input(
                    format!("documents[{i}]"),
                    "must not be empty",
                ));
            }
        }
        if let Some(ref list) = metadata_list {
            if list.len() != documents.len() {
                return Err(StoreError::invalid_input(
                    "metadata_list",
                    format!(
                        "length {} does not match documents length {}",
                        list.len(),
                        documents.len()
                    ),
                ));
            }
        }
        let batch_size = batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(StoreError::invalid_input("batch_size", "must be positive"));
        }

        let resolved = self.manager.ensure(collection, self.auto_create).await?;
        let embedder = self.embedders.get(&resolved.model).await?;

        let point_ids: Vec<String> = documents
            .iter()
            .map(|_| Uuid::new_v4().to_string())
            .collect();

        let mut stored_count = 0;
        let mut failed_count = 0;
        let mut errors = Vec::new();

        for (chunk_index, start) in (0..documents.len()).step_by(batch_size).enumerate() {
            let end = (start + batch_size).min(documents.len());
            let chunk = &documents[start..end];

            let outcome = self
                .store_chunk(
                    collection,
                    &resolved,
                    embedder.as_ref(),
                    chunk,
                    &point_ids[start..end],
                    metadata_list.as_ref().map(|l| &l[start..end]),
                )
                .await;

            match outcome {
                Ok(()) => stored_count += chunk.len(),
                Err(e) => {
                    failed_count += chunk.len();
                    errors.push(format!("chunk {chunk_index}: {e}"));
                }
            }
        }

        Ok(BulkStoreReport {
            stored_count,
            failed_count,
            point_ids,
            vector_model: resolved.model.display_name.clone(),
            errors,
        })
    }

    async fn store_chunk(
        &self,
        collection: &str,
        resolved: &ResolvedCollection,
        embedder: &dyn engram_embeddings::Embedder,
        documents: &[String],
        point_ids: &[String],
        metadata: Option<&[Map<String, Value>]>,
    ) -> Result<()> {
        let vectors = embedder.embed_documents(documents.to_vec()).await?;
        if vectors.len() != documents.len() {
            return Err(StoreError::Internal(format!(
                "embedder returned {} vectors for {} documents",
                vectors.len(),
                documents.len()
            )));
        }

        let points: Vec<PointData> = documents
            .iter()
            .enumerate()
            .zip(vectors)
            .map(|((i, doc), vector)| PointData {
                id: point_ids[i].clone(),
                vector,
                payload: document_payload(doc, metadata.map(|m| m[i].clone())),
            })
            .collect();

        self.backend
            .upsert_points(collection, &resolved.vector_name, points)
            .await
    }

    /// Merge payload fields into existing points.
    ///
    /// Without `key` the merge happens at the payload root; with `key` it
    /// happens inside `payload[key]`, preserving siblings. Vectors are never
    /// recomputed. Idempotent.
    pub async fn update_payload(
        &self,
        collection: &str,
        point_ids: &[String],
        payload: Map<String, Value>,
        key: Option<&str>,
    ) -> Result<UpdateReport> {
        require_non_empty("collection_name", collection)?;
        require_ids("point_ids", point_ids)?;
        if payload.is_empty() {
            return Err(StoreError::invalid_input("payload", "must not be empty"));
        }

        let resolved = self.manager.ensure(collection, false).await?;

        // All ids must exist before anything is written.
        let existing = self
            .backend
            .retrieve_points(collection, &resolved.vector_name, point_ids, false)
            .await?;
        if existing.len() != point_ids.len() {
            let found: std::collections::HashSet<&str> =
                existing.iter().map(|p| p.id.as_str()).collect();
            let missing: Vec<&str> = point_ids
                .iter()
                .map(String::as_str)
                .filter(|id| !found.contains(id))
                .collect();
            return Err(StoreError::PointNotFound(missing.join(", ")));
        }

        self.backend
            .set_payload(collection, point_ids, payload, key)
            .await?;

        Ok(UpdateReport {
            updated_count: point_ids.len(),
        })
    }

    /// Delete points by id. Idempotent; absent ids are a no-op success.
    pub async fn delete_points(
        &self,
        collection: &str,
        point_ids: &[String],
    ) -> Result<DeleteReport> {
        require_non_empty("collection_name", collection)?;
        require_ids("point_ids", point_ids)?;

        let _resolved = self.manager.ensure(collection, false).await?;

        self.backend.delete_points(collection, point_ids).await?;

        Ok(DeleteReport {
            deleted_count: point_ids.len(),
        })
    }

    // =========================================================================
    // Read operations
    // =========================================================================

    /// Semantic search over one collection.
    ///
    /// A missing collection yields an empty result set flagged
    /// `no_such_collection`; it is never created by a read.
    pub async fn find(
        &self,
        collection: &str,
        query: &str,
        limit: Option<u64>,
        score_threshold: Option<f32>,
    ) -> Result<SearchResponse> {
        require_non_empty("collection_name", collection)?;
        require_non_empty("query", query)?;

        let limit = limit.unwrap_or(self.default_limit);
        if limit == 0 {
            return Err(StoreError::invalid_input("limit", "must be positive"));
        }
        let score_threshold = score_threshold.unwrap_or(self.default_threshold);
        if score_threshold < 0.0 {
            return Err(StoreError::invalid_input(
                "score_threshold",
                "must not be negative",
            ));
        }

        let resolved = match self.manager.ensure(collection, false).await {
            Ok(resolved) => resolved,
            Err(StoreError::NoSuchCollection(_)) => {
                return Ok(SearchResponse {
                    query: query.to_string(),
                    collection: collection.to_string(),
                    results: vec![],
                    total_found: 0,
                    limit,
                    score_threshold,
                    vector_model: String::new(),
                    no_such_collection: true,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => return Err(e),
        };

        let embedder = self.embedders.get(&resolved.model).await?;
        let vector = embedder.embed_query(query.to_string()).await?;

        let mut hits = self
            .backend
            .search_points(
                collection,
                &resolved.vector_name,
                vector,
                limit,
                score_threshold,
            )
            .await?;

        // Deterministic ordering regardless of the backend: score descending,
        // point id ascending on ties.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        let results: Vec<SearchEntry> = hits
            .into_iter()
            .map(|hit| SearchEntry {
                id: hit.id,
                score: hit.score,
                content: hit
                    .payload
                    .get(keys::DOCUMENT)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                metadata: hit.payload.get(keys::METADATA).cloned().unwrap_or(Value::Null),
                vector_model: resolved.model.display_name.clone(),
            })
            .collect();

        Ok(SearchResponse {
            query: query.to_string(),
            collection: collection.to_string(),
            total_found: results.len(),
            results,
            limit,
            score_threshold,
            vector_model: resolved.model.display_name.clone(),
            no_such_collection: false,
            timestamp: Utc::now(),
        })
    }

    /// Fetch one point: full payload plus its stored vector.
    pub async fn get_point(&self, collection: &str, point_id: &str) -> Result<PointView> {
        require_non_empty("collection_name", collection)?;
        require_uuid("point_id", point_id)?;

        let resolved = self.manager.ensure(collection, false).await?;

        let mut points = self
            .backend
            .retrieve_points(
                collection,
                &resolved.vector_name,
                &[point_id.to_string()],
                true,
            )
            .await?;

        let point = points
            .pop()
            .ok_or_else(|| StoreError::PointNotFound(point_id.to_string()))?;

        Ok(PointView {
            id: point.id,
            payload: Value::Object(point.payload),
            vector: point.vector,
        })
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Summaries of every backend collection.
    pub async fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
        let names = self.backend.list_collections().await?;

        let mut summaries = Vec::with_capacity(names.len());
        for name in names {
            if let Some(geometry) = self.backend.describe_collection(&name).await? {
                summaries.push(self.summarize(&name, &geometry));
            }
        }

        Ok(summaries)
    }

    /// Detailed view of one collection, including index parameters.
    pub async fn collection_info(&self, collection: &str) -> Result<CollectionDetail> {
        require_non_empty("collection_name", collection)?;

        let geometry = self
            .backend
            .describe_collection(collection)
            .await?
            .ok_or_else(|| StoreError::NoSuchCollection(collection.to_string()))?;

        Ok(CollectionDetail {
            summary: self.summarize(collection, &geometry),
            hnsw_m: geometry.hnsw_m,
            hnsw_ef_construct: geometry.hnsw_ef_construct,
            segments_count: geometry.segments_count,
            optimizer_status: geometry.optimizer_status,
        })
    }

    /// The resolver's configured mappings plus the model registry.
    pub fn model_mappings(&self) -> MappingsReport {
        let registry = self.resolver.registry();

        let mut models: Vec<ModelInfo> = registry
            .iter()
            .map(|m| ModelInfo {
                model_id: m.model_id.clone(),
                display_name: m.display_name.clone(),
                dimensions: m.dimensions,
                distance: m.distance,
                vector_name: m.vector_name(),
                description: m.description.clone(),
            })
            .collect();
        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));

        MappingsReport {
            default_model: self.resolver.default_model().model_id.clone(),
            exact: self.resolver.exact_mappings().clone(),
            patterns: self
                .resolver
                .pattern_rules()
                .iter()
                .map(|(contains, model_id)| PatternInfo {
                    contains: contains.clone(),
                    model_id: model_id.clone(),
                })
                .collect(),
            models,
        }
    }

    fn summarize(&self, name: &str, geometry: &CollectionGeometry) -> CollectionSummary {
        let registry = self.resolver.registry();

        // Prefer a slot that decodes to a known model, else the first by name.
        let mut slots: Vec<(&String, &crate::backend::VectorSlot)> =
            geometry.vectors.iter().collect();
        slots.sort_by(|a, b| a.0.cmp(b.0));
        let chosen = slots
            .iter()
            .find(|(slot_name, _)| registry.find_by_vector_name(slot_name).is_some())
            .or_else(|| slots.first());

        let (vector_name, dimensions, distance) = match chosen {
            Some((slot_name, slot)) => ((*slot_name).clone(), slot.dimensions, slot.distance),
            None => (String::new(), 0, None),
        };

        CollectionSummary {
            name: name.to_string(),
            points_count: geometry.points_count,
            dimensions,
            distance,
            vector_model: registry
                .find_by_vector_name(&vector_name)
                .map(|m| m.display_name.clone()),
            vector_name,
            status: geometry.status.clone(),
            quantization: geometry.quantization,
        }
    }
}

// ============================================================================
// Input validation
// ============================================================================

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(StoreError::invalid_input(field, "must not be empty"));
    }
    Ok(())
}

fn require_ids(field: &str, ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        return Err(StoreError::invalid_input(field, "must not be empty"));
    }
    for id in ids {
        require_uuid(field, id)?;
    }
    Ok(())
}

fn require_uuid(field: &str, id: &str) -> Result<()> {
    Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| StoreError::invalid_input(field, format!("'{id}' is not a valid UUID")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_uuid() {
        assert!(require_uuid("point_id", "3fa85f64-5717-4562-b3fc-2c963f66afa6").is_ok());
        assert!(require_uuid("point_id", "not-a-uuid").is_err());
        assert!(require_uuid("point_id", "").is_err());
    }

    #[test]
    fn test_require_ids_rejects_empty_list() {
        assert!(require_ids("point_ids", &[]).is_err());
    }
}
