//! Error types for engram-embeddings

use thiserror::Error;

/// Errors that can occur while resolving models or generating embeddings
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// A mapping or default references a model id missing from the registry
    #[error("unknown model id '{0}' (not in the registry)")]
    UnknownModel(String),

    /// The embedder refused to construct, even on the CPU fallback
    #[error("embedder unavailable for model '{model_id}': {message}")]
    Unavailable { model_id: String, message: String },

    /// Model files could not be fetched from the hub
    #[error("failed to fetch model files for '{model_id}': {message}")]
    ModelFetch { model_id: String, message: String },

    /// Inference-time failure (tokenization, forward pass, pooling)
    #[error("embedding runtime error: {0}")]
    Runtime(String),

    /// Caller-supplied input was rejected
    #[error("invalid input for '{field}': {message}")]
    InvalidInput { field: String, message: String },
}

impl EmbeddingError {
    /// Create an Unavailable error.
    pub fn unavailable(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            model_id: model_id.into(),
            message: message.into(),
        }
    }

    /// Create a ModelFetch error.
    pub fn model_fetch(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelFetch {
            model_id: model_id.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidInput error.
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<candle_core::Error> for EmbeddingError {
    fn from(err: candle_core::Error) -> Self {
        EmbeddingError::Runtime(err.to_string())
    }
}

/// Result type for engram-embeddings operations
pub type Result<T> = std::result::Result<T, EmbeddingError>;
