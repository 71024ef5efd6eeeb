//! Engram MCP Server implementation
//!
//! This module implements the MCP server using the rmcp SDK, exposing the
//! memory service one tool per operation: store, bulk_store, find,
//! get_point, update_payload, delete_points, list_collections,
//! collection_info, and model_mappings.

use std::sync::Arc;

use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use serde::Serialize;
use tracing::{debug, info};

use engram_config::EngramConfig;
use engram_embeddings::{EmbedderPool, ModelRegistry, ModelResolver};
use engram_store::{MemoryService, QdrantBackend, VectorBackend};

use crate::error::{to_mcp_error, Result as ServerResult};
use crate::tools::*;

/// Engram MCP server exposing semantic memory tools
#[derive(Clone)]
pub struct EngramServer {
    service: Arc<MemoryService>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl EngramServer {
    /// Wrap an already-assembled service.
    pub fn new(service: Arc<MemoryService>) -> Self {
        Self {
            service,
            tool_router: Self::tool_router(),
        }
    }

    /// Assemble the full engine from configuration and connect to Qdrant.
    pub async fn connect(config: &EngramConfig) -> ServerResult<Self> {
        info!("Initializing Engram MCP server");

        let registry = Arc::new(ModelRegistry::builtin());
        let resolver = Arc::new(ModelResolver::from_settings(
            Arc::clone(&registry),
            &config.models,
        )?);

        let backend: Arc<dyn VectorBackend> =
            Arc::new(QdrantBackend::connect(&config.backend).await?);
        let embedders = Arc::new(EmbedderPool::new(config.embedding.gpu_enabled));

        let service = Arc::new(MemoryService::new(backend, embedders, resolver, config));

        info!("Engram MCP server ready");
        Ok(Self::new(service))
    }

    /// The collection a tool call targets, falling back to the configured
    /// default.
    fn target_collection(&self, provided: Option<String>) -> Result<String, McpError> {
        provided
            .or_else(|| self.service.default_collection().map(str::to_string))
            .ok_or_else(|| {
                McpError::invalid_params(
                    "collection is required (no default collection is configured)",
                    None,
                )
            })
    }

    // =========================================================================
    // MCP Tools
    // =========================================================================

    #[tool(
        name = "store",
        description = "Store a document in a collection. The collection name selects the embedding model (e.g. names containing 'legal' use a high-precision model); the collection is created on first use with that model's vector geometry. Returns the new point id."
    )]
    async fn store(
        &self,
        Parameters(params): Parameters<StoreParams>,
    ) -> Result<CallToolResult, McpError> {
        let collection = self.target_collection(params.collection)?;
        debug!(collection, "store");

        let receipt = self
            .service
            .store(&collection, &params.information, params.metadata)
            .await
            .map_err(to_mcp_error)?;

        json_result(&receipt)
    }

    #[tool(
        name = "bulk_store",
        description = "Store many documents in one call, chunked by batch_size. Point ids in the result correspond positionally to the input documents. A failed chunk is reported in `errors` without rolling back earlier chunks."
    )]
    async fn bulk_store(
        &self,
        Parameters(params): Parameters<BulkStoreParams>,
    ) -> Result<CallToolResult, McpError> {
        let collection = self.target_collection(params.collection)?;
        debug!(collection, count = params.documents.len(), "bulk_store");

        let report = self
            .service
            .bulk_store(
                &collection,
                params.documents,
                params.metadata_list,
                params.batch_size,
            )
            .await
            .map_err(to_mcp_error)?;

        json_result(&report)
    }

    #[tool(
        name = "find",
        description = "Semantic search over one collection. Results are ordered by score descending (ties broken by point id). Searching a collection that does not exist returns an empty result flagged no_such_collection; it is never created by a search."
    )]
    async fn find(
        &self,
        Parameters(params): Parameters<FindParams>,
    ) -> Result<CallToolResult, McpError> {
        let collection = self.target_collection(params.collection)?;
        debug!(collection, query = %params.query, "find");

        let response = self
            .service
            .find(
                &collection,
                &params.query,
                params.limit,
                params.score_threshold,
            )
            .await
            .map_err(to_mcp_error)?;

        json_result(&response)
    }

    #[tool(
        name = "get_point",
        description = "Fetch one point by id: the full payload (document, metadata, and any other keys) plus its stored vector."
    )]
    async fn get_point(
        &self,
        Parameters(params): Parameters<GetPointParams>,
    ) -> Result<CallToolResult, McpError> {
        let collection = self.target_collection(params.collection)?;

        let point = self
            .service
            .get_point(&collection, &params.point_id)
            .await
            .map_err(to_mcp_error)?;

        json_result(&point)
    }

    #[tool(
        name = "update_payload",
        description = "Merge fields into the payload of existing points without re-embedding. Without `key` the merge happens at the payload root; with `key` (e.g. \"metadata\") it merges inside that map, preserving sibling fields. Idempotent."
    )]
    async fn update_payload(
        &self,
        Parameters(params): Parameters<UpdatePayloadParams>,
    ) -> Result<CallToolResult, McpError> {
        let collection = self.target_collection(params.collection)?;

        let report = self
            .service
            .update_payload(
                &collection,
                &params.point_ids,
                params.payload,
                params.key.as_deref(),
            )
            .await
            .map_err(to_mcp_error)?;

        json_result(&report)
    }

    #[tool(
        name = "delete_points",
        description = "Delete points by id. Irreversible; deleting an id that does not exist is a no-op success."
    )]
    async fn delete_points(
        &self,
        Parameters(params): Parameters<DeletePointsParams>,
    ) -> Result<CallToolResult, McpError> {
        let collection = self.target_collection(params.collection)?;

        let report = self
            .service
            .delete_points(&collection, &params.point_ids)
            .await
            .map_err(to_mcp_error)?;

        json_result(&report)
    }

    #[tool(
        name = "list_collections",
        description = "List every collection with its point count, vector geometry, model binding, status, and quantization setting."
    )]
    async fn list_collections(
        &self,
        Parameters(_params): Parameters<ListCollectionsParams>,
    ) -> Result<CallToolResult, McpError> {
        let summaries = self
            .service
            .list_collections()
            .await
            .map_err(to_mcp_error)?;

        json_result(&summaries)
    }

    #[tool(
        name = "collection_info",
        description = "Detailed view of one collection: geometry, HNSW parameters, segment counts, and optimizer status as exposed by the backend."
    )]
    async fn collection_info(
        &self,
        Parameters(params): Parameters<CollectionInfoParams>,
    ) -> Result<CallToolResult, McpError> {
        let detail = self
            .service
            .collection_info(&params.collection)
            .await
            .map_err(to_mcp_error)?;

        json_result(&detail)
    }

    #[tool(
        name = "model_mappings",
        description = "The collection-to-model routing rules (exact names, substring patterns, default) plus the full model registry."
    )]
    async fn model_mappings(
        &self,
        Parameters(_params): Parameters<ModelMappingsParams>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.service.model_mappings())
    }
}

// Implement ServerHandler for tool routing
#[tool_handler]
impl rmcp::ServerHandler for EngramServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Engram: collection-aware semantic memory.\n\n\
                TOOLS:\n\
                - store / bulk_store: Save documents; the collection name picks the embedding model\n\
                - find: Semantic search within one collection (never creates it)\n\
                - get_point: Fetch a stored point by id\n\
                - update_payload: Merge metadata into stored points without re-embedding\n\
                - delete_points: Remove points by id\n\
                - list_collections / collection_info: Inspect what is stored\n\
                - model_mappings: See which models back which collection names\n\n\
                Each collection is permanently bound to one embedding model; \
                store and search always use the model the collection was created with."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Render a response value as pretty JSON tool output.
fn json_result(value: &impl Serialize) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(value).unwrap_or_default(),
    )]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_store::InMemoryBackend;

    fn server(default_collection: Option<&str>) -> EngramServer {
        let mut config = EngramConfig::default();
        config.models.default_collection = default_collection.map(str::to_string);

        let registry = Arc::new(ModelRegistry::builtin());
        let resolver =
            Arc::new(ModelResolver::from_settings(Arc::clone(&registry), &config.models).unwrap());
        let backend: Arc<dyn VectorBackend> = Arc::new(InMemoryBackend::new());
        let embedders = Arc::new(EmbedderPool::new(false));

        EngramServer::new(Arc::new(MemoryService::new(
            backend, embedders, resolver, &config,
        )))
    }

    #[test]
    fn test_target_collection_prefers_explicit() {
        let server = server(Some("memories"));
        assert_eq!(
            server.target_collection(Some("notes".into())).unwrap(),
            "notes"
        );
        assert_eq!(server.target_collection(None).unwrap(), "memories");
    }

    #[test]
    fn test_target_collection_requires_some_collection() {
        let server = server(None);
        let err = server.target_collection(None).unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    }

    #[test]
    fn test_get_info_advertises_tools() {
        let server = server(None);
        let info = rmcp::ServerHandler::get_info(&server);
        assert!(info.instructions.unwrap().contains("store"));
    }
}
