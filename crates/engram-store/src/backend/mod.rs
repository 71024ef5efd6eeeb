//! Vector database abstraction.
//!
//! [`VectorBackend`] is the thin contract the engine consumes; any store
//! offering collection CRUD, point upsert/search/retrieve/update/delete and
//! index configuration can implement it. Two implementations ship: the
//! Qdrant adapter and an in-memory store for tests and offline smoke runs.

mod memory;
mod qdrant;

pub use memory::InMemoryBackend;
pub use qdrant::QdrantBackend;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use engram_embeddings::Distance;

use crate::error::Result;

/// Geometry and index tuning for a collection's single named vector slot.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSpec {
    /// Name of the vector slot; encodes the model's display-name slug
    pub vector_name: String,
    /// Vector dimensionality
    pub dimensions: u64,
    /// Distance metric
    pub distance: Distance,
    /// HNSW M build parameter
    pub hnsw_m: u64,
    /// HNSW ef_construct build parameter
    pub hnsw_ef_construct: u64,
    /// Apply scalar int8 quantization
    pub quantization: bool,
}

/// One vector slot as persisted by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSlot {
    /// Dimensionality of the slot
    pub dimensions: u64,
    /// Distance metric, `None` when the backend reports one this engine
    /// does not model
    pub distance: Option<Distance>,
}

/// Observed geometry and stats of an existing collection.
#[derive(Debug, Clone, Default)]
pub struct CollectionGeometry {
    /// Named vector slots; the empty string keys an unnamed default slot
    pub vectors: HashMap<String, VectorSlot>,
    /// Stored point count
    pub points_count: u64,
    /// Backend status string (e.g. "green")
    pub status: String,
    /// HNSW M, if exposed
    pub hnsw_m: Option<u64>,
    /// HNSW ef_construct, if exposed
    pub hnsw_ef_construct: Option<u64>,
    /// Whether quantization is configured
    pub quantization: bool,
    /// Segment count, if exposed
    pub segments_count: Option<u64>,
    /// Optimizer status, if exposed
    pub optimizer_status: Option<String>,
}

/// A point to upsert.
#[derive(Debug, Clone)]
pub struct PointData {
    /// UUID-shaped id
    pub id: String,
    /// Embedding, length must equal the collection's dimensions
    pub vector: Vec<f32>,
    /// Arbitrary JSON payload
    pub payload: Map<String, Value>,
}

/// A scored search hit.
#[derive(Debug, Clone)]
pub struct ScoredHit {
    /// Point id
    pub id: String,
    /// Similarity score, higher is better for cosine/dot
    pub score: f32,
    /// Stored payload
    pub payload: Map<String, Value>,
}

/// A retrieved point.
#[derive(Debug, Clone)]
pub struct StoredPoint {
    /// Point id
    pub id: String,
    /// Stored payload
    pub payload: Map<String, Value>,
    /// Stored vector, when requested
    pub vector: Option<Vec<f32>>,
}

/// Contract over the vector database.
///
/// Implementations surface transport failures as
/// [`StoreError::BackendUnavailable`](crate::StoreError::BackendUnavailable)
/// and perform no internal retries; operations are designed so callers can.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Whether a collection exists.
    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    /// Create a collection with the given vector spec.
    ///
    /// Errors if the collection already exists; callers racing on create
    /// re-check existence and re-verify geometry.
    async fn create_collection(&self, collection: &str, spec: &VectorSpec) -> Result<()>;

    /// Observed geometry of a collection, `None` when absent.
    async fn describe_collection(&self, collection: &str) -> Result<Option<CollectionGeometry>>;

    /// Names of all collections.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Insert or replace points under the named vector slot.
    ///
    /// An id collision replaces the existing point, vector and payload.
    async fn upsert_points(
        &self,
        collection: &str,
        vector_name: &str,
        points: Vec<PointData>,
    ) -> Result<()>;

    /// Nearest-neighbour search against the named vector slot.
    async fn search_points(
        &self,
        collection: &str,
        vector_name: &str,
        vector: Vec<f32>,
        limit: u64,
        score_threshold: f32,
    ) -> Result<Vec<ScoredHit>>;

    /// Fetch points by id; absent ids are silently skipped.
    async fn retrieve_points(
        &self,
        collection: &str,
        vector_name: &str,
        ids: &[String],
        with_vector: bool,
    ) -> Result<Vec<StoredPoint>>;

    /// Merge payload fields into the listed points.
    ///
    /// Without `key`, the given fields overwrite same-named top-level fields
    /// and all others are preserved. With `key`, the merge happens inside
    /// `payload[key]`, preserving siblings.
    async fn set_payload(
        &self,
        collection: &str,
        ids: &[String],
        payload: Map<String, Value>,
        key: Option<&str>,
    ) -> Result<()>;

    /// Delete points by id; absent ids are a no-op.
    async fn delete_points(&self, collection: &str, ids: &[String]) -> Result<()>;
}
