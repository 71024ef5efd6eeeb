//! In-memory implementation of the vector backend contract.
//!
//! Exact nearest-neighbour over a `BTreeMap`, with the same named-vector,
//! payload-merge, and idempotent-delete semantics as the Qdrant adapter.
//! Used by the engine's integration tests and for offline smoke runs; not
//! intended for production data.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use engram_embeddings::Distance;

use crate::error::{Result, StoreError};

use super::{
    CollectionGeometry, PointData, ScoredHit, StoredPoint, VectorBackend, VectorSlot, VectorSpec,
};

struct StoredRecord {
    vector: Vec<f32>,
    payload: Map<String, Value>,
}

struct MemCollection {
    spec: VectorSpec,
    points: BTreeMap<String, StoredRecord>,
}

/// In-process vector store.
#[derive(Default)]
pub struct InMemoryBackend {
    collections: RwLock<HashMap<String, MemCollection>>,
    create_calls: AtomicUsize,
}

impl InMemoryBackend {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `create_collection` attempts observed, successful or not.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorBackend for InMemoryBackend {
    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(collection))
    }

    async fn create_collection(&self, collection: &str, spec: &VectorSpec) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let mut collections = self.collections.write().await;
        if collections.contains_key(collection) {
            return Err(StoreError::BackendUnavailable(format!(
                "collection '{collection}' already exists"
            )));
        }

        collections.insert(
            collection.to_string(),
            MemCollection {
                spec: spec.clone(),
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn describe_collection(&self, collection: &str) -> Result<Option<CollectionGeometry>> {
        let collections = self.collections.read().await;
        let Some(mem) = collections.get(collection) else {
            return Ok(None);
        };

        Ok(Some(CollectionGeometry {
            vectors: HashMap::from([(
                mem.spec.vector_name.clone(),
                VectorSlot {
                    dimensions: mem.spec.dimensions,
                    distance: Some(mem.spec.distance),
                },
            )]),
            points_count: mem.points.len() as u64,
            status: "green".to_string(),
            hnsw_m: Some(mem.spec.hnsw_m),
            hnsw_ef_construct: Some(mem.spec.hnsw_ef_construct),
            quantization: mem.spec.quantization,
            segments_count: Some(1),
            optimizer_status: Some("ok".to_string()),
        }))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn upsert_points(
        &self,
        collection: &str,
        vector_name: &str,
        points: Vec<PointData>,
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        let mem = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::NoSuchCollection(collection.to_string()))?;

        if vector_name != mem.spec.vector_name {
            return Err(StoreError::Internal(format!(
                "unknown vector slot '{vector_name}' in collection '{collection}'"
            )));
        }

        for point in points {
            if point.vector.len() as u64 != mem.spec.dimensions {
                return Err(StoreError::Internal(format!(
                    "vector length {} does not match collection dimensions {}",
                    point.vector.len(),
                    mem.spec.dimensions
                )));
            }
            mem.points.insert(
                point.id,
                StoredRecord {
                    vector: point.vector,
                    payload: point.payload,
                },
            );
        }

        Ok(())
    }

    async fn search_points(
        &self,
        collection: &str,
        vector_name: &str,
        vector: Vec<f32>,
        limit: u64,
        score_threshold: f32,
    ) -> Result<Vec<ScoredHit>> {
        let collections = self.collections.read().await;
        let mem = collections
            .get(collection)
            .ok_or_else(|| StoreError::NoSuchCollection(collection.to_string()))?;

        if vector_name != mem.spec.vector_name {
            return Err(StoreError::Internal(format!(
                "unknown vector slot '{vector_name}' in collection '{collection}'"
            )));
        }

        let mut hits: Vec<ScoredHit> = mem
            .points
            .iter()
            .map(|(id, record)| ScoredHit {
                id: id.clone(),
                score: score(mem.spec.distance, &vector, &record.vector),
                payload: record.payload.clone(),
            })
            .filter(|hit| hit.score >= score_threshold)
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit as usize);

        Ok(hits)
    }

    async fn retrieve_points(
        &self,
        collection: &str,
        _vector_name: &str,
        ids: &[String],
        with_vector: bool,
    ) -> Result<Vec<StoredPoint>> {
        let collections = self.collections.read().await;
        let mem = collections
            .get(collection)
            .ok_or_else(|| StoreError::NoSuchCollection(collection.to_string()))?;

        Ok(ids
            .iter()
            .filter_map(|id| {
                mem.points.get(id).map(|record| StoredPoint {
                    id: id.clone(),
                    payload: record.payload.clone(),
                    vector: with_vector.then(|| record.vector.clone()),
                })
            })
            .collect())
    }

    async fn set_payload(
        &self,
        collection: &str,
        ids: &[String],
        payload: Map<String, Value>,
        key: Option<&str>,
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        let mem = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::NoSuchCollection(collection.to_string()))?;

        for id in ids {
            let Some(record) = mem.points.get_mut(id) else {
                continue;
            };

            match key {
                None => {
                    for (k, v) in payload.clone() {
                        record.payload.insert(k, v);
                    }
                }
                Some(key) => {
                    let target = record
                        .payload
                        .entry(key.to_string())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if !target.is_object() {
                        *target = Value::Object(Map::new());
                    }
                    if let Some(nested) = target.as_object_mut() {
                        for (k, v) in payload.clone() {
                            nested.insert(k, v);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn delete_points(&self, collection: &str, ids: &[String]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let mem = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::NoSuchCollection(collection.to_string()))?;

        for id in ids {
            mem.points.remove(id);
        }

        Ok(())
    }
}

/// Similarity score; higher is better for every metric so ordering is
/// uniform (euclidean distances are negated).
fn score(distance: Distance, a: &[f32], b: &[f32]) -> f32 {
    match distance {
        Distance::Cosine => {
            let dot = dot_product(a, b);
            let norms = norm(a) * norm(b);
            if norms == 0.0 {
                0.0
            } else {
                dot / norms
            }
        }
        Distance::Dot => dot_product(a, b),
        Distance::Euclid => {
            let squared: f32 = a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum();
            -squared.sqrt()
        }
    }
}

fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f32]) -> f32 {
    dot_product(v, v).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> VectorSpec {
        VectorSpec {
            vector_name: "all-minilm-l6-v2".to_string(),
            dimensions: 3,
            distance: Distance::Cosine,
            hnsw_m: 16,
            hnsw_ef_construct: 128,
            quantization: false,
        }
    }

    fn point(id: &str, vector: Vec<f32>, payload: Value) -> PointData {
        PointData {
            id: id.to_string(),
            vector,
            payload: payload.as_object().unwrap().clone(),
        }
    }

    #[tokio::test]
    async fn test_create_twice_errors() {
        let backend = InMemoryBackend::new();
        backend.create_collection("c", &spec()).await.unwrap();
        assert!(backend.create_collection("c", &spec()).await.is_err());
        assert_eq!(backend.create_calls(), 2);
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimensions() {
        let backend = InMemoryBackend::new();
        backend.create_collection("c", &spec()).await.unwrap();

        let result = backend
            .upsert_points(
                "c",
                "all-minilm-l6-v2",
                vec![point("a", vec![1.0, 0.0], json!({}))],
            )
            .await;
        assert!(matches!(result, Err(StoreError::Internal(_))));
    }

    #[tokio::test]
    async fn test_search_orders_by_score_then_id() {
        let backend = InMemoryBackend::new();
        backend.create_collection("c", &spec()).await.unwrap();

        backend
            .upsert_points(
                "c",
                "all-minilm-l6-v2",
                vec![
                    point("b", vec![1.0, 0.0, 0.0], json!({})),
                    point("a", vec![1.0, 0.0, 0.0], json!({})),
                    point("z", vec![0.0, 1.0, 0.0], json!({})),
                ],
            )
            .await
            .unwrap();

        let hits = backend
            .search_points("c", "all-minilm-l6-v2", vec![1.0, 0.0, 0.0], 10, 0.0)
            .await
            .unwrap();

        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        // Equal top scores break ties by ascending id
        assert_eq!(ids, vec!["a", "b", "z"]);
    }

    #[tokio::test]
    async fn test_search_applies_threshold_and_limit() {
        let backend = InMemoryBackend::new();
        backend.create_collection("c", &spec()).await.unwrap();

        backend
            .upsert_points(
                "c",
                "all-minilm-l6-v2",
                vec![
                    point("a", vec![1.0, 0.0, 0.0], json!({})),
                    point("b", vec![0.0, 1.0, 0.0], json!({})),
                ],
            )
            .await
            .unwrap();

        let hits = backend
            .search_points("c", "all-minilm-l6-v2", vec![1.0, 0.0, 0.0], 10, 0.5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");

        let hits = backend
            .search_points("c", "all-minilm-l6-v2", vec![1.0, 0.0, 0.0], 1, 0.0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_set_payload_merges_at_root_and_nested() {
        let backend = InMemoryBackend::new();
        backend.create_collection("c", &spec()).await.unwrap();

        backend
            .upsert_points(
                "c",
                "all-minilm-l6-v2",
                vec![point(
                    "a",
                    vec![1.0, 0.0, 0.0],
                    json!({"document": "d", "metadata": {"sync_status": "pending", "other": "keep"}, "legacy": true}),
                )],
            )
            .await
            .unwrap();

        // Nested merge preserves siblings and unknown top-level keys
        backend
            .set_payload(
                "c",
                &["a".to_string()],
                json!({"sync_status": "synced"}).as_object().unwrap().clone(),
                Some("metadata"),
            )
            .await
            .unwrap();

        let points = backend
            .retrieve_points("c", "all-minilm-l6-v2", &["a".to_string()], false)
            .await
            .unwrap();
        let payload = Value::Object(points[0].payload.clone());
        assert_eq!(
            payload["metadata"],
            json!({"sync_status": "synced", "other": "keep"})
        );
        assert_eq!(payload["document"], "d");
        assert_eq!(payload["legacy"], true);

        // Root merge overwrites only the named field
        backend
            .set_payload(
                "c",
                &["a".to_string()],
                json!({"document": "d2"}).as_object().unwrap().clone(),
                None,
            )
            .await
            .unwrap();

        let points = backend
            .retrieve_points("c", "all-minilm-l6-v2", &["a".to_string()], false)
            .await
            .unwrap();
        let payload = Value::Object(points[0].payload.clone());
        assert_eq!(payload["document"], "d2");
        assert_eq!(payload["legacy"], true);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let backend = InMemoryBackend::new();
        backend.create_collection("c", &spec()).await.unwrap();
        backend
            .upsert_points(
                "c",
                "all-minilm-l6-v2",
                vec![point("a", vec![1.0, 0.0, 0.0], json!({}))],
            )
            .await
            .unwrap();

        backend.delete_points("c", &["a".to_string()]).await.unwrap();
        backend.delete_points("c", &["a".to_string()]).await.unwrap();

        let points = backend
            .retrieve_points("c", "all-minilm-l6-v2", &["a".to_string()], false)
            .await
            .unwrap();
        assert!(points.is_empty());
    }
}
