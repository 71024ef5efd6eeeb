//! MCP Tool parameter definitions
//!
//! These structs define the JSON Schema for tool parameters using schemars.
//! `collection` is optional on every tool; when omitted, the configured
//! default collection is used (and the call fails if none is configured).

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameters for the store tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoreParams {
    /// Text to remember
    #[schemars(description = "The document text to embed and store")]
    pub information: String,

    /// Target collection
    #[schemars(
        description = "Collection to store into; its name selects the embedding model. Defaults to the configured default collection"
    )]
    pub collection: Option<String>,

    /// Structured metadata
    #[schemars(description = "Optional metadata map stored alongside the document")]
    pub metadata: Option<Map<String, Value>>,
}

/// Parameters for the bulk_store tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BulkStoreParams {
    /// Documents to store
    #[schemars(description = "Documents to embed and store, in order")]
    pub documents: Vec<String>,

    /// Target collection
    #[schemars(
        description = "Collection to store into; its name selects the embedding model. Defaults to the configured default collection"
    )]
    pub collection: Option<String>,

    /// Per-document metadata
    #[schemars(
        description = "Optional metadata maps, one per document (must match documents length)"
    )]
    pub metadata_list: Option<Vec<Map<String, Value>>>,

    /// Embedding/upsert chunk size
    #[schemars(description = "Documents per embed+upsert chunk (default 100)")]
    pub batch_size: Option<usize>,
}

/// Parameters for the find tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FindParams {
    /// Natural-language query
    #[schemars(description = "Query text; embedded with the collection's model")]
    pub query: String,

    /// Collection to search
    #[schemars(
        description = "Collection to search. Defaults to the configured default collection. Missing collections return an empty result, they are never created"
    )]
    pub collection: Option<String>,

    /// Maximum results
    #[schemars(description = "Maximum results to return (default 10)")]
    pub limit: Option<u64>,

    /// Minimum score
    #[schemars(description = "Minimum similarity score, 0 disables filtering (default 0)")]
    pub score_threshold: Option<f32>,
}

/// Parameters for the get_point tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetPointParams {
    /// Point id
    #[schemars(description = "UUID of the point to fetch")]
    pub point_id: String,

    /// Collection holding the point
    #[schemars(description = "Collection holding the point. Defaults to the configured default collection")]
    pub collection: Option<String>,
}

/// Parameters for the update_payload tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpdatePayloadParams {
    /// Points to update
    #[schemars(description = "UUIDs of the points to update")]
    pub point_ids: Vec<String>,

    /// Fields to merge
    #[schemars(
        description = "Fields to merge into the payload; same-named fields at the target level are overwritten, everything else is preserved. Vectors are never recomputed"
    )]
    pub payload: Map<String, Value>,

    /// Nested merge target
    #[schemars(
        description = "Optional payload key to merge inside (e.g. \"metadata\"); omitted merges at the root"
    )]
    pub key: Option<String>,

    /// Collection holding the points
    #[schemars(description = "Collection holding the points. Defaults to the configured default collection")]
    pub collection: Option<String>,
}

/// Parameters for the delete_points tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeletePointsParams {
    /// Points to delete
    #[schemars(description = "UUIDs of the points to delete; deleting an absent id is a no-op")]
    pub point_ids: Vec<String>,

    /// Collection holding the points
    #[schemars(description = "Collection holding the points. Defaults to the configured default collection")]
    pub collection: Option<String>,
}

/// Parameters for the collection_info tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CollectionInfoParams {
    /// Collection to describe
    #[schemars(description = "Collection to describe")]
    pub collection: String,
}

/// Parameters for the list_collections tool (none)
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ListCollectionsParams {}

/// Parameters for the model_mappings tool (none)
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ModelMappingsParams {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_store_params_deserialize() {
        let params: StoreParams = serde_json::from_value(json!({
            "information": "Party A owes Party B $100.",
            "collection": "legal_notes",
            "metadata": {"case": "X-1"}
        }))
        .unwrap();

        assert_eq!(params.information, "Party A owes Party B $100.");
        assert_eq!(params.collection.as_deref(), Some("legal_notes"));
        assert_eq!(params.metadata.unwrap()["case"], "X-1");
    }

    #[test]
    fn test_optional_fields_default_to_none() {
        let params: FindParams = serde_json::from_value(json!({"query": "file handles"})).unwrap();
        assert!(params.collection.is_none());
        assert!(params.limit.is_none());
        assert!(params.score_threshold.is_none());
    }

    #[test]
    fn test_update_payload_params_deserialize() {
        let params: UpdatePayloadParams = serde_json::from_value(json!({
            "point_ids": ["3fa85f64-5717-4562-b3fc-2c963f66afa6"],
            "payload": {"sync_status": "synced"},
            "key": "metadata"
        }))
        .unwrap();

        assert_eq!(params.point_ids.len(), 1);
        assert_eq!(params.key.as_deref(), Some("metadata"));
    }

    #[test]
    fn test_schema_generation() {
        // Every params struct must produce a schema without panicking.
        let _ = schemars::schema_for!(StoreParams);
        let _ = schemars::schema_for!(BulkStoreParams);
        let _ = schemars::schema_for!(FindParams);
        let _ = schemars::schema_for!(GetPointParams);
        let _ = schemars::schema_for!(UpdatePayloadParams);
        let _ = schemars::schema_for!(DeletePointsParams);
        let _ = schemars::schema_for!(CollectionInfoParams);
    }
}
