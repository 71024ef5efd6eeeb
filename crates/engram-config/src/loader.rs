//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.engram/config.toml`
//! 2. Local config: `.engram/config.toml` (in workspace)
//! 3. CLI overrides
//!
//! Later sources override earlier ones.

use crate::error::ConfigError;
use crate::{ConfigOverrides, EngramConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Global configuration directory name.
const GLOBAL_CONFIG_DIR: &str = ".engram";

/// Local configuration directory name.
const LOCAL_CONFIG_DIR: &str = ".engram";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.engram`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config
    global_config: Option<EngramConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.engram`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR));

        Self {
            global_config_dir,
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    ///
    /// Useful for testing.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_config: None,
        }
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path for a workspace.
    pub fn local_config_path(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a workspace with optional CLI overrides.
    ///
    /// Merges config in order: global → local → overrides.
    pub fn load(
        &mut self,
        workspace_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<EngramConfig, ConfigError> {
        // Start with default config
        let mut config = EngramConfig::default();

        // Apply global config if available
        if let Some(global_config) = self.load_global()? {
            config = merge_configs(config, global_config);
        }

        // Apply local config if available
        if let Some(local_config) = self.load_local(workspace_root)? {
            config = merge_configs(config, local_config);
        }

        // Apply CLI overrides
        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        config.validate()?;

        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<EngramConfig>, ConfigError> {
        // Return cached global config if available
        if let Some(ref config) = self.global_config {
            return Ok(Some(config.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let config = load_config_file(&global_path)?;

        // Cache the global config
        self.global_config = Some(config.clone());

        Ok(Some(config))
    }

    /// Load only the local configuration for a workspace.
    pub fn load_local(&self, workspace_root: &Path) -> Result<Option<EngramConfig>, ConfigError> {
        let local_path = self.local_config_path(workspace_root);

        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        load_config_file(&local_path).map(Some)
    }

    /// Initialize global configuration directory.
    ///
    /// Creates `~/.engram/config.toml` with default configuration.
    pub fn init_global(&self) -> Result<PathBuf, ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };

        if !global_dir.exists() {
            std::fs::create_dir_all(global_dir)
                .map_err(|e| ConfigError::create_dir(global_dir, e))?;
        }

        let config_path = global_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            let default_config = EngramConfig::default();
            save_config_file(&config_path, &default_config)?;
        }

        Ok(config_path)
    }

    /// Clear cached global configuration.
    ///
    /// Forces reload on next `load_global()` call.
    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

/// Load a configuration file from disk.
fn load_config_file(path: &Path) -> Result<EngramConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

    toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))
}

/// Save a configuration file to disk.
fn save_config_file(path: &Path, config: &EngramConfig) -> Result<(), ConfigError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

/// Merge two configurations, with `overlay` taking precedence.
///
/// This performs a field-by-field merge, allowing partial configs. Scalar
/// fields win when they differ from the defaults; the routing table and
/// pattern list win when non-empty.
fn merge_configs(base: EngramConfig, overlay: EngramConfig) -> EngramConfig {
    let defaults = EngramConfig::default();

    let mut merged = base;

    if overlay.backend.url != defaults.backend.url {
        merged.backend.url = overlay.backend.url;
    }
    if overlay.backend.api_key.is_some() {
        merged.backend.api_key = overlay.backend.api_key;
    }
    if overlay.backend.timeout_secs != defaults.backend.timeout_secs {
        merged.backend.timeout_secs = overlay.backend.timeout_secs;
    }

    if overlay.models.default_model != defaults.models.default_model {
        merged.models.default_model = overlay.models.default_model;
    }
    if overlay.models.default_collection.is_some() {
        merged.models.default_collection = overlay.models.default_collection;
    }
    if !overlay.models.collections.is_empty() {
        merged.models.collections = overlay.models.collections;
    }
    if overlay.models.patterns != defaults.models.patterns {
        merged.models.patterns = overlay.models.patterns;
    }

    if overlay.index.auto_create_collections != defaults.index.auto_create_collections {
        merged.index.auto_create_collections = overlay.index.auto_create_collections;
    }
    if overlay.index.enable_quantization != defaults.index.enable_quantization {
        merged.index.enable_quantization = overlay.index.enable_quantization;
    }
    if overlay.index.hnsw_ef_construct != defaults.index.hnsw_ef_construct {
        merged.index.hnsw_ef_construct = overlay.index.hnsw_ef_construct;
    }
    if overlay.index.hnsw_m != defaults.index.hnsw_m {
        merged.index.hnsw_m = overlay.index.hnsw_m;
    }

    if overlay.embedding.gpu_enabled != defaults.embedding.gpu_enabled {
        merged.embedding.gpu_enabled = overlay.embedding.gpu_enabled;
    }

    if overlay.search.default_limit != defaults.search.default_limit {
        merged.search.default_limit = overlay.search.default_limit;
    }
    if overlay.search.default_threshold != defaults.search.default_threshold {
        merged.search.default_threshold = overlay.search.default_threshold;
    }

    if overlay.logging.level != defaults.logging.level {
        merged.logging.level = overlay.logging.level;
    }
    if overlay.logging.file.is_some() {
        merged.logging.file = overlay.logging.file;
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &Path, content: &str) {
        let config_dir = dir.join(LOCAL_CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join(CONFIG_FILE_NAME), content).unwrap();
    }

    #[test]
    fn test_load_without_files_returns_defaults() {
        let global = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();

        let mut loader = ConfigLoader::with_global_dir(global.path());
        let config = loader.load(workspace.path(), None).unwrap();

        assert_eq!(config.backend.url, "http://localhost:6334");
    }

    #[test]
    fn test_local_overrides_global() {
        let global = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();

        std::fs::write(
            global.path().join(CONFIG_FILE_NAME),
            r#"
            [backend]
            url = "http://global:6334"

            [search]
            default_limit = 25
            "#,
        )
        .unwrap();

        write_config(
            workspace.path(),
            r#"
            [backend]
            url = "http://local:6334"
            "#,
        );

        let mut loader = ConfigLoader::with_global_dir(global.path());
        let config = loader.load(workspace.path(), None).unwrap();

        // Local URL wins, global limit survives
        assert_eq!(config.backend.url, "http://local:6334");
        assert_eq!(config.search.default_limit, 25);
    }

    #[test]
    fn test_cli_overrides_win() {
        let global = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();

        write_config(
            workspace.path(),
            r#"
            [backend]
            url = "http://local:6334"
            "#,
        );

        let overrides = ConfigOverrides {
            backend_url: Some("http://cli:6334".to_string()),
            ..Default::default()
        };

        let mut loader = ConfigLoader::with_global_dir(global.path());
        let config = loader.load(workspace.path(), Some(&overrides)).unwrap();

        assert_eq!(config.backend.url, "http://cli:6334");
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let global = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();

        write_config(workspace.path(), "backend = 42");

        let mut loader = ConfigLoader::with_global_dir(global.path());
        let result = loader.load(workspace.path(), None);

        assert!(matches!(result, Err(ConfigError::ParseToml { .. })));
    }

    #[test]
    fn test_init_global_creates_file() {
        let global = TempDir::new().unwrap();
        let loader = ConfigLoader::with_global_dir(global.path());

        let path = loader.init_global().unwrap();
        assert!(path.exists());

        // Re-running must not overwrite
        let path_again = loader.init_global().unwrap();
        assert_eq!(path, path_again);
    }

    #[test]
    fn test_custom_routing_survives_merge() {
        let global = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();

        write_config(
            workspace.path(),
            r#"
            [models.collections]
            "case_files" = "BAAI/bge-large-en-v1.5"

            [[models.patterns]]
            contains = "research"
            model = "BAAI/bge-base-en-v1.5"
            "#,
        );

        let mut loader = ConfigLoader::with_global_dir(global.path());
        let config = loader.load(workspace.path(), None).unwrap();

        assert_eq!(
            config.models.collections.get("case_files").unwrap(),
            "BAAI/bge-large-en-v1.5"
        );
        assert_eq!(config.models.patterns.len(), 1);
        assert_eq!(config.models.patterns[0].contains, "research");
    }
}
