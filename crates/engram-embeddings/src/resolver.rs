//! Collection-name to model resolution.
//!
//! The resolver is a pure function over configuration captured at startup:
//! exact mappings first, then substring rules in configured order, then the
//! default model. Every referenced model id is validated against the
//! registry at construction; an unknown id refuses to start.

use std::collections::HashMap;
use std::sync::Arc;

use engram_config::ModelSettings;

use crate::error::{EmbeddingError, Result};
use crate::registry::{ModelDescriptor, ModelRegistry};

/// Resolves collection names to embedding model descriptors.
#[derive(Debug, Clone)]
pub struct ModelResolver {
    registry: Arc<ModelRegistry>,
    exact: HashMap<String, String>,
    patterns: Vec<(String, String)>,
    default_model: String,
}

impl ModelResolver {
    /// Build a resolver, validating every referenced model id.
    pub fn new(
        registry: Arc<ModelRegistry>,
        exact: HashMap<String, String>,
        patterns: Vec<(String, String)>,
        default_model: String,
    ) -> Result<Self> {
        for model_id in exact
            .values()
            .chain(patterns.iter().map(|(_, m)| m))
            .chain(std::iter::once(&default_model))
        {
            if !registry.contains(model_id) {
                return Err(EmbeddingError::UnknownModel(model_id.clone()));
            }
        }

        Ok(Self {
            registry,
            exact,
            patterns,
            default_model,
        })
    }

    /// Build a resolver from the configuration's routing section.
    pub fn from_settings(registry: Arc<ModelRegistry>, settings: &ModelSettings) -> Result<Self> {
        Self::new(
            registry,
            settings.collections.clone(),
            settings
                .patterns
                .iter()
                .map(|r| (r.contains.clone(), r.model.clone()))
                .collect(),
            settings.default_model.clone(),
        )
    }

    /// Resolve a collection name to its model.
    ///
    /// Pure: no I/O, no locks, deterministic for a given resolver.
    pub fn resolve(&self, collection_name: &str) -> &ModelDescriptor {
        if let Some(model_id) = self.exact.get(collection_name) {
            return self.descriptor(model_id);
        }

        for (substring, model_id) in &self.patterns {
            if collection_name.contains(substring.as_str()) {
                return self.descriptor(model_id);
            }
        }

        self.descriptor(&self.default_model)
    }

    /// The registry backing this resolver.
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Exact mappings, for introspection output.
    pub fn exact_mappings(&self) -> &HashMap<String, String> {
        &self.exact
    }

    /// Pattern rules in evaluation order, for introspection output.
    pub fn pattern_rules(&self) -> &[(String, String)] {
        &self.patterns
    }

    /// The fallback model id.
    pub fn default_model(&self) -> &ModelDescriptor {
        self.descriptor(&self.default_model)
    }

    fn descriptor(&self, model_id: &str) -> &ModelDescriptor {
        // Validated at construction; the registry is immutable afterwards.
        self.registry
            .get(model_id)
            .unwrap_or_else(|| panic!("model '{model_id}' validated at init is missing"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ModelResolver {
        let registry = Arc::new(ModelRegistry::builtin());
        ModelResolver::new(
            Arc::clone(&registry),
            HashMap::from([(
                "contracts_2024".to_string(),
                "BAAI/bge-base-en-v1.5".to_string(),
            )]),
            vec![
                ("legal".to_string(), "BAAI/bge-large-en-v1.5".to_string()),
                ("lessons".to_string(), "BAAI/bge-base-en-v1.5".to_string()),
                ("working".to_string(), "BAAI/bge-small-en-v1.5".to_string()),
            ],
            "sentence-transformers/all-MiniLM-L6-v2".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_exact_wins_over_patterns() {
        let r = resolver();
        // "contracts_2024" would not match any pattern anyway, but an exact
        // entry must also beat a matching pattern:
        assert_eq!(r.resolve("contracts_2024").model_id, "BAAI/bge-base-en-v1.5");
    }

    #[test]
    fn test_pattern_order() {
        let r = resolver();
        assert_eq!(r.resolve("legal_notes").model_id, "BAAI/bge-large-en-v1.5");
        assert_eq!(r.resolve("lessons_learned").model_id, "BAAI/bge-base-en-v1.5");
        assert_eq!(r.resolve("working_solutions").model_id, "BAAI/bge-small-en-v1.5");
    }

    #[test]
    fn test_default_fallback() {
        let r = resolver();
        assert_eq!(
            r.resolve("random_collection").model_id,
            "sentence-transformers/all-MiniLM-L6-v2"
        );
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let r = resolver();
        let a = r.resolve("legal_notes").model_id.clone();
        let b = r.resolve("legal_notes").model_id.clone();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unknown_model_refuses_to_start() {
        let registry = Arc::new(ModelRegistry::builtin());
        let result = ModelResolver::new(
            registry,
            HashMap::new(),
            vec![("x".to_string(), "no/such-model".to_string())],
            "sentence-transformers/all-MiniLM-L6-v2".to_string(),
        );
        assert!(matches!(result, Err(EmbeddingError::UnknownModel(_))));
    }

    #[test]
    fn test_from_settings_defaults() {
        let registry = Arc::new(ModelRegistry::builtin());
        let settings = ModelSettings::default();
        let r = ModelResolver::from_settings(registry, &settings).unwrap();

        assert_eq!(r.resolve("legal_notes").dimensions, 1024);
        assert_eq!(r.resolve("lessons_learned").dimensions, 768);
        assert_eq!(r.resolve("working_solutions").dimensions, 384);
        assert_eq!(r.resolve("anything_else").dimensions, 384);
    }
}
