//! Catalogue of known embedding models.
//!
//! Every model here is a BERT-architecture sentence encoder loadable by the
//! single candle code path in [`crate::local`]. The catalogue is immutable
//! after construction; routing tables are validated against it at startup.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{EmbeddingError, Result};

/// Distance metric a model's vector space is calibrated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    /// Cosine similarity (vectors are L2-normalized at encode time)
    Cosine,
    /// Dot product
    Dot,
    /// Euclidean distance
    Euclid,
}

impl std::fmt::Display for Distance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Distance::Cosine => write!(f, "cosine"),
            Distance::Dot => write!(f, "dot"),
            Distance::Euclid => write!(f, "euclid"),
        }
    }
}

/// Description of one embedding model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Hub id, unique within the registry (e.g. "BAAI/bge-base-en-v1.5")
    pub model_id: String,

    /// Human-readable name; its slug names the vector slot in the backend
    pub display_name: String,

    /// Output dimensionality
    pub dimensions: u64,

    /// Distance metric for collections bound to this model
    pub distance: Distance,

    /// Short description for introspection output
    pub description: String,

    /// Retrieval instruction prepended to queries (BGE-style models);
    /// documents are embedded without it
    pub query_prefix: Option<String>,
}

impl ModelDescriptor {
    /// The vector slot name persisted into the backend for this model.
    pub fn vector_name(&self) -> String {
        vector_slug(&self.display_name)
    }
}

/// Derive the persisted vector slot name from a model display name.
///
/// Lowercases the name and collapses every run of non-alphanumeric
/// characters into a single '-', trimming leading/trailing dashes. The
/// result is part of the on-disk format: once a collection is created with
/// a slug, searches must keep using it.
pub fn vector_slug(display_name: &str) -> String {
    let mut slug = String::with_capacity(display_name.len());
    let mut pending_dash = false;

    for c in display_name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Immutable registry of known models, keyed by model id.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: HashMap<String, ModelDescriptor>,
}

impl ModelRegistry {
    /// Registry of the built-in model catalogue.
    pub fn builtin() -> Self {
        const BGE_QUERY_PREFIX: &str =
            "Represent this sentence for searching relevant passages: ";

        let models = vec![
            ModelDescriptor {
                model_id: "BAAI/bge-large-en-v1.5".to_string(),
                display_name: "BGE Large English v1.5".to_string(),
                dimensions: 1024,
                distance: Distance::Cosine,
                description: "High-precision English retrieval model".to_string(),
                query_prefix: Some(BGE_QUERY_PREFIX.to_string()),
            },
            ModelDescriptor {
                model_id: "BAAI/bge-base-en-v1.5".to_string(),
                display_name: "BGE Base English v1.5".to_string(),
                dimensions: 768,
                distance: Distance::Cosine,
                description: "Balanced quality/latency English retrieval model".to_string(),
                query_prefix: Some(BGE_QUERY_PREFIX.to_string()),
            },
            ModelDescriptor {
                model_id: "BAAI/bge-small-en-v1.5".to_string(),
                display_name: "BGE Small English v1.5".to_string(),
                dimensions: 384,
                distance: Distance::Cosine,
                description: "Fast English retrieval model".to_string(),
                query_prefix: Some(BGE_QUERY_PREFIX.to_string()),
            },
            ModelDescriptor {
                model_id: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
                display_name: "All MiniLM L6 v2".to_string(),
                dimensions: 384,
                distance: Distance::Cosine,
                description: "General-purpose sentence encoder, fastest option".to_string(),
                query_prefix: None,
            },
        ];

        Self {
            models: models
                .into_iter()
                .map(|m| (m.model_id.clone(), m))
                .collect(),
        }
    }

    /// Build a registry from an explicit model list.
    ///
    /// Duplicate model ids are rejected.
    pub fn from_models(models: Vec<ModelDescriptor>) -> Result<Self> {
        let mut map = HashMap::with_capacity(models.len());
        for model in models {
            if map.insert(model.model_id.clone(), model).is_some() {
                return Err(EmbeddingError::Runtime(
                    "duplicate model id in registry".to_string(),
                ));
            }
        }
        Ok(Self { models: map })
    }

    /// Look up a model by id.
    pub fn get(&self, model_id: &str) -> Option<&ModelDescriptor> {
        self.models.get(model_id)
    }

    /// Whether a model id is known.
    pub fn contains(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id)
    }

    /// Iterate all registered models.
    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }

    /// Number of registered models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Find the model whose persisted vector slug equals `slug`.
    ///
    /// Used to decode which model a pre-existing collection was created with.
    pub fn find_by_vector_name(&self, slug: &str) -> Option<&ModelDescriptor> {
        self.models.values().find(|m| m.vector_name() == slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_slug_pinned() {
        // The slug is a persisted format; these exact values must not drift.
        assert_eq!(vector_slug("BGE Large English v1.5"), "bge-large-english-v1-5");
        assert_eq!(vector_slug("BGE Base English v1.5"), "bge-base-english-v1-5");
        assert_eq!(vector_slug("BGE Small English v1.5"), "bge-small-english-v1-5");
        assert_eq!(vector_slug("All MiniLM L6 v2"), "all-minilm-l6-v2");
    }

    #[test]
    fn test_vector_slug_collapses_runs() {
        assert_eq!(vector_slug("  a -- b  "), "a-b");
        assert_eq!(vector_slug("v2.0 (beta)"), "v2-0-beta");
        assert_eq!(vector_slug("___"), "");
    }

    #[test]
    fn test_builtin_registry() {
        let registry = ModelRegistry::builtin();
        assert_eq!(registry.len(), 4);

        let large = registry.get("BAAI/bge-large-en-v1.5").unwrap();
        assert_eq!(large.dimensions, 1024);
        assert_eq!(large.distance, Distance::Cosine);
        assert!(large.query_prefix.is_some());

        let minilm = registry.get("sentence-transformers/all-MiniLM-L6-v2").unwrap();
        assert_eq!(minilm.dimensions, 384);
        assert!(minilm.query_prefix.is_none());
    }

    #[test]
    fn test_find_by_vector_name() {
        let registry = ModelRegistry::builtin();
        let model = registry.find_by_vector_name("bge-base-english-v1-5").unwrap();
        assert_eq!(model.model_id, "BAAI/bge-base-en-v1.5");

        assert!(registry.find_by_vector_name("no-such-slug").is_none());
    }

    #[test]
    fn test_from_models_rejects_duplicates() {
        let registry = ModelRegistry::builtin();
        let model = registry.get("BAAI/bge-base-en-v1.5").unwrap().clone();
        let result = ModelRegistry::from_models(vec![model.clone(), model]);
        assert!(result.is_err());
    }
}
