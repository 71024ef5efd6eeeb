//! Engram Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.engram/config.toml`
//! - Local config: `.engram/config.toml` (in workspace)
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → CLI overrides.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration for Engram.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngramConfig {
    /// Vector database backend configuration
    pub backend: BackendSettings,

    /// Collection-to-model routing configuration
    pub models: ModelSettings,

    /// Collection index creation configuration
    pub index: IndexSettings,

    /// Embedding runtime configuration
    pub embedding: EmbeddingSettings,

    /// Search defaults
    pub search: SearchSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Qdrant backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Qdrant server URL (gRPC port)
    pub url: String,

    /// API key for authentication (optional)
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

/// Collection-name routing to embedding models.
///
/// Resolution order: exact entry in `collections`, then the first matching
/// substring rule in `patterns`, then `default_model`.
///
/// # Example TOML
///
/// ```toml
/// [models]
/// default_model = "sentence-transformers/all-MiniLM-L6-v2"
///
/// [models.collections]
/// "legal_notes" = "BAAI/bge-large-en-v1.5"
///
/// [[models.patterns]]
/// contains = "legal"
/// model = "BAAI/bge-large-en-v1.5"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Fallback model id when no mapping matches
    pub default_model: String,

    /// Collection used when a tool call omits the collection argument
    pub default_collection: Option<String>,

    /// Exact collection name → model id
    pub collections: HashMap<String, String>,

    /// Ordered substring rules, first match wins
    pub patterns: Vec<PatternRule>,
}

/// A substring routing rule: collections whose name contains `contains`
/// resolve to `model`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatternRule {
    /// Substring to look for in the collection name
    pub contains: String,

    /// Target model id
    pub model: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        let rule = |contains: &str, model: &str| PatternRule {
            contains: contains.to_string(),
            model: model.to_string(),
        };

        Self {
            default_model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            default_collection: None,
            collections: HashMap::new(),
            // High-precision for contractual/professional content, balanced
            // for distilled knowledge, fast for scratch collections.
            patterns: vec![
                rule("legal", "BAAI/bge-large-en-v1.5"),
                rule("career", "BAAI/bge-large-en-v1.5"),
                rule("lessons", "BAAI/bge-base-en-v1.5"),
                rule("knowledge", "BAAI/bge-base-en-v1.5"),
                rule("analysis", "BAAI/bge-base-en-v1.5"),
                rule("debug", "BAAI/bge-small-en-v1.5"),
                rule("working", "BAAI/bge-small-en-v1.5"),
                rule("solutions", "BAAI/bge-small-en-v1.5"),
                rule("technical", "BAAI/bge-small-en-v1.5"),
            ],
        }
    }
}

/// Collection index creation settings, applied on first use of a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Create missing collections on store (reads never create)
    pub auto_create_collections: bool,

    /// Apply scalar int8 quantization on create
    pub enable_quantization: bool,

    /// HNSW ef_construct build parameter
    pub hnsw_ef_construct: u64,

    /// HNSW M build parameter
    pub hnsw_m: u64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            auto_create_collections: true,
            enable_quantization: true,
            hnsw_ef_construct: 128,
            hnsw_m: 16,
        }
    }
}

/// Embedding runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Attempt GPU execution (CUDA/Metal) before falling back to CPU
    pub gpu_enabled: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { gpu_enabled: false }
    }
}

/// Search defaults applied when callers omit these parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Default result limit
    pub default_limit: u64,

    /// Default minimum score threshold
    pub default_threshold: f32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_limit: 10,
            default_threshold: 0.0,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional; default stderr)
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override backend URL
    pub backend_url: Option<String>,

    /// Override backend API key
    pub backend_api_key: Option<String>,

    /// Override GPU usage
    pub gpu_enabled: Option<bool>,

    /// Override default collection
    pub default_collection: Option<String>,

    /// Override log level
    pub log_level: Option<String>,
}

impl EngramConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref url) = overrides.backend_url {
            self.backend.url = url.clone();
        }

        if let Some(ref key) = overrides.backend_api_key {
            self.backend.api_key = Some(key.clone());
        }

        if let Some(gpu) = overrides.gpu_enabled {
            self.embedding.gpu_enabled = gpu;
        }

        if let Some(ref collection) = overrides.default_collection {
            self.models.default_collection = Some(collection.clone());
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validate the configuration.
    ///
    /// Model ids referenced by the routing table are checked against the
    /// registry when the resolver is constructed; this validates everything
    /// the config crate can check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.url.is_empty() {
            return Err(ConfigError::invalid_value("backend.url", "must not be empty"));
        }

        if self.models.default_model.is_empty() {
            return Err(ConfigError::invalid_value(
                "models.default_model",
                "must not be empty",
            ));
        }

        for (i, rule) in self.models.patterns.iter().enumerate() {
            if rule.contains.is_empty() {
                return Err(ConfigError::invalid_value(
                    format!("models.patterns[{i}].contains"),
                    "must not be empty",
                ));
            }
            if rule.model.is_empty() {
                return Err(ConfigError::invalid_value(
                    format!("models.patterns[{i}].model"),
                    "must not be empty",
                ));
            }
        }

        if self.search.default_limit == 0 {
            return Err(ConfigError::invalid_value(
                "search.default_limit",
                "must be positive",
            ));
        }

        if self.search.default_threshold < 0.0 {
            return Err(ConfigError::invalid_value(
                "search.default_threshold",
                "must not be negative",
            ));
        }

        if self.index.hnsw_ef_construct == 0 || self.index.hnsw_m == 0 {
            return Err(ConfigError::invalid_value(
                "index.hnsw_ef_construct / index.hnsw_m",
                "must be positive",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngramConfig::default();
        assert_eq!(config.backend.url, "http://localhost:6334");
        assert!(config.backend.api_key.is_none());
        assert!(config.index.auto_create_collections);
        assert!(config.index.enable_quantization);
        assert_eq!(config.index.hnsw_ef_construct, 128);
        assert_eq!(config.index.hnsw_m, 16);
        assert_eq!(config.search.default_limit, 10);
        assert!(!config.embedding.gpu_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_routing_rules() {
        let config = EngramConfig::default();
        let first = &config.models.patterns[0];
        assert_eq!(first.contains, "legal");
        assert_eq!(first.model, "BAAI/bge-large-en-v1.5");
        assert_eq!(
            config.models.default_model,
            "sentence-transformers/all-MiniLM-L6-v2"
        );
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = EngramConfig::default();
        let overrides = ConfigOverrides {
            backend_url: Some("http://remote:6334".to_string()),
            gpu_enabled: Some(true),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        config.apply_overrides(&overrides);

        assert_eq!(config.backend.url, "http://remote:6334");
        assert!(config.embedding.gpu_enabled);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validate_rejects_empty_url() {
        let mut config = EngramConfig::default();
        config.backend.url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let mut config = EngramConfig::default();
        config.search.default_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_pattern() {
        let mut config = EngramConfig::default();
        config.models.patterns.push(PatternRule {
            contains: String::new(),
            model: "BAAI/bge-base-en-v1.5".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = EngramConfig::default();
        config
            .models
            .collections
            .insert("legal_notes".to_string(), "BAAI/bge-large-en-v1.5".to_string());
        config.models.default_collection = Some("memories".to_string());

        let toml_str = toml::to_string(&config).unwrap();
        let parsed: EngramConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(
            parsed.models.collections.get("legal_notes").unwrap(),
            "BAAI/bge-large-en-v1.5"
        );
        assert_eq!(parsed.models.default_collection.as_deref(), Some("memories"));
        assert_eq!(parsed.models.patterns, config.models.patterns);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: EngramConfig = toml::from_str(
            r#"
            [backend]
            url = "http://qdrant.internal:6334"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.backend.url, "http://qdrant.internal:6334");
        assert_eq!(parsed.search.default_limit, 10);
        assert!(!parsed.models.patterns.is_empty());
    }
}
