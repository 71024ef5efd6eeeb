//! Payload conventions and response types for the storage engine.
//!
//! The only stable persisted shape is the point payload: conventional keys
//! `document` (raw string) and `metadata` (map). Payloads written by older or
//! external writers may carry other top-level keys; the engine preserves
//! them on update and tolerates their absence on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use engram_embeddings::Distance;

/// Conventional payload keys.
pub mod keys {
    /// Raw document text
    pub const DOCUMENT: &str = "document";
    /// Caller-supplied metadata map
    pub const METADATA: &str = "metadata";
}

/// Build the payload for a newly stored document.
///
/// `metadata` defaults to an empty map so round-trips are stable whether or
/// not the caller supplied one.
pub fn document_payload(document: &str, metadata: Option<Map<String, Value>>) -> Map<String, Value> {
    let mut payload = Map::with_capacity(2);
    payload.insert(keys::DOCUMENT.to_string(), Value::String(document.to_string()));
    payload.insert(
        keys::METADATA.to_string(),
        Value::Object(metadata.unwrap_or_default()),
    );
    payload
}

/// Result of storing a single document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreReceipt {
    /// Id of the stored point (UUID)
    pub point_id: String,
    /// Display name of the model that embedded the document
    pub vector_model: String,
    /// Dimensionality of the stored vector
    pub dimensions: u64,
}

/// Result of a bulk store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkStoreReport {
    /// Documents successfully embedded and upserted
    pub stored_count: usize,
    /// Documents whose chunk failed
    pub failed_count: usize,
    /// Point ids positionally matching the input documents
    pub point_ids: Vec<String>,
    /// Display name of the model used for every chunk
    pub vector_model: String,
    /// First error per failed chunk, if any
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<String>,
}

/// One search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEntry {
    /// Point id
    pub id: String,
    /// Backend similarity score, higher is better for cosine/dot
    pub score: f32,
    /// `payload.document`, empty string when the payload deviates
    pub content: String,
    /// `payload.metadata`, `null` when absent
    pub metadata: Value,
    /// Display name of the collection's model
    pub vector_model: String,
}

/// Full response of a find operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Echo of the query
    pub query: String,
    /// Echo of the collection name
    pub collection: String,
    /// Hits ordered by score descending, point id ascending on ties
    pub results: Vec<SearchEntry>,
    /// Number of hits returned
    pub total_found: usize,
    /// Effective limit after defaults
    pub limit: u64,
    /// Effective score threshold after defaults
    pub score_threshold: f32,
    /// Display name of the collection's model, empty if unknown
    pub vector_model: String,
    /// Set when the collection does not exist; the result set is empty and
    /// nothing was created
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_such_collection: bool,
    /// When the search ran
    pub timestamp: DateTime<Utc>,
}

/// A retrieved point: full payload, optionally its vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointView {
    /// Point id
    pub id: String,
    /// The complete payload as stored, unknown keys included
    pub payload: Value,
    /// The stored vector, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

impl PointView {
    /// The conventional `document` field, if present and a string.
    pub fn document(&self) -> Option<&str> {
        self.payload.get(keys::DOCUMENT).and_then(Value::as_str)
    }

    /// The conventional `metadata` field, if present.
    pub fn metadata(&self) -> Option<&Value> {
        self.payload.get(keys::METADATA)
    }
}

/// Result of a payload update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateReport {
    /// Points whose payload was updated
    pub updated_count: usize,
}

/// Result of a delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteReport {
    /// Ids processed; deleting an absent id is a no-op success
    pub deleted_count: usize,
}

/// One collection in the list view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSummary {
    /// Collection name
    pub name: String,
    /// Stored point count
    pub points_count: u64,
    /// Vector dimensionality
    pub dimensions: u64,
    /// Distance metric, if decodable
    pub distance: Option<Distance>,
    /// Persisted vector slot name
    pub vector_name: String,
    /// Display name of the model the slot decodes to, if known
    pub vector_model: Option<String>,
    /// Backend collection status
    pub status: String,
    /// Whether quantization is configured
    pub quantization: bool,
}

/// Detailed view of one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionDetail {
    /// Summary fields
    #[serde(flatten)]
    pub summary: CollectionSummary,
    /// HNSW M parameter, if exposed
    pub hnsw_m: Option<u64>,
    /// HNSW ef_construct parameter, if exposed
    pub hnsw_ef_construct: Option<u64>,
    /// Segment count, if exposed
    pub segments_count: Option<u64>,
    /// Optimizer status, if exposed
    pub optimizer_status: Option<String>,
}

/// One model in the mappings report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Hub model id
    pub model_id: String,
    /// Display name
    pub display_name: String,
    /// Output dimensionality
    pub dimensions: u64,
    /// Distance metric
    pub distance: Distance,
    /// Persisted vector slot name
    pub vector_name: String,
    /// Short description
    pub description: String,
}

/// A substring routing rule in the mappings report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternInfo {
    /// Substring matched against collection names
    pub contains: String,
    /// Target model id
    pub model_id: String,
}

/// The resolver's configuration plus the registry, for introspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingsReport {
    /// Fallback model id
    pub default_model: String,
    /// Exact collection name → model id
    pub exact: std::collections::HashMap<String, String>,
    /// Substring rules in evaluation order
    pub patterns: Vec<PatternInfo>,
    /// Every registered model
    pub models: Vec<ModelInfo>,
}
