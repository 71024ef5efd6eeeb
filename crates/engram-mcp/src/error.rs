//! Error types for the MCP server

use thiserror::Error;

use engram_embeddings::EmbeddingError;
use engram_store::StoreError;

/// Result type for MCP server setup
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors that can occur while assembling the server
#[derive(Error, Debug)]
pub enum ServerError {
    /// Routing table or registry rejected the configuration
    #[error("invalid model routing: {0}")]
    Routing(#[from] EmbeddingError),

    /// The storage engine failed during startup
    #[error("storage engine error: {0}")]
    Store(#[from] StoreError),
}

/// Translate an engine error into an MCP protocol error.
///
/// Caller-fixable kinds surface as invalid-params so clients see them as
/// their mistake; everything else is an internal error with the typed
/// message preserved.
pub fn to_mcp_error(err: StoreError) -> rmcp::ErrorData {
    if err.is_caller_error() {
        rmcp::ErrorData::invalid_params(err.to_string(), None)
    } else {
        rmcp::ErrorData::internal_error(err.to_string(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_errors_map_to_invalid_params() {
        let err = to_mcp_error(StoreError::invalid_input("query", "must not be empty"));
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);

        let err = to_mcp_error(StoreError::PointNotFound("abc".into()));
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
    }

    #[test]
    fn test_operational_errors_map_to_internal() {
        let err = to_mcp_error(StoreError::BackendUnavailable("down".into()));
        assert_eq!(err.code, rmcp::model::ErrorCode::INTERNAL_ERROR);

        let err = to_mcp_error(StoreError::model_mismatch("c", "wrong dims"));
        assert_eq!(err.code, rmcp::model::ErrorCode::INTERNAL_ERROR);
    }
}
