//! Error types for engram-store

use thiserror::Error;

use engram_embeddings::EmbeddingError;

/// Errors that can occur in storage engine operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Caller-supplied input was rejected; names the offending field
    #[error("invalid input for '{field}': {message}")]
    InvalidInput { field: String, message: String },

    /// Operation against a collection that does not exist (and must)
    #[error("collection '{0}' does not exist")]
    NoSuchCollection(String),

    /// The collection's persisted vector geometry disagrees with the model
    /// resolved for its name; terminal until an operator intervenes
    #[error("collection '{collection}' is bound to a different model: {detail}")]
    ModelMismatch { collection: String, detail: String },

    /// The embedding runtime refused to construct, even on CPU
    #[error("embedder unavailable: {0}")]
    EmbedderUnavailable(String),

    /// The vector database could not be reached or errored; may be transient
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Lookup or update against an id with no stored point
    #[error("point not found: {0}")]
    PointNotFound(String),

    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// Invariant violation; report and refuse
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Create an InvalidInput error.
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a ModelMismatch error.
    pub fn model_mismatch(collection: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ModelMismatch {
            collection: collection.into(),
            detail: detail.into(),
        }
    }

    /// Whether the caller can fix this error by changing the request.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidInput { .. }
                | StoreError::NoSuchCollection(_)
                | StoreError::PointNotFound(_)
        )
    }
}

impl From<EmbeddingError> for StoreError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::InvalidInput { field, message } => {
                StoreError::InvalidInput { field, message }
            }
            EmbeddingError::Unavailable { .. } | EmbeddingError::ModelFetch { .. } => {
                StoreError::EmbedderUnavailable(err.to_string())
            }
            EmbeddingError::UnknownModel(_) => StoreError::Internal(err.to_string()),
            EmbeddingError::Runtime(msg) => StoreError::Internal(msg),
        }
    }
}

impl From<qdrant_client::QdrantError> for StoreError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        StoreError::BackendUnavailable(err.to_string())
    }
}

/// Result type for engram-store operations
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_error_classification() {
        assert!(StoreError::invalid_input("query", "must not be empty").is_caller_error());
        assert!(StoreError::NoSuchCollection("x".into()).is_caller_error());
        assert!(StoreError::PointNotFound("id".into()).is_caller_error());
        assert!(!StoreError::BackendUnavailable("down".into()).is_caller_error());
        assert!(!StoreError::model_mismatch("c", "d").is_caller_error());
    }

    #[test]
    fn test_embedding_error_mapping() {
        let err: StoreError =
            EmbeddingError::unavailable("BAAI/bge-base-en-v1.5", "no device").into();
        assert!(matches!(err, StoreError::EmbedderUnavailable(_)));

        let err: StoreError =
            EmbeddingError::invalid_input("texts", "must be valid UTF-8").into();
        assert!(matches!(err, StoreError::InvalidInput { .. }));
    }
}
