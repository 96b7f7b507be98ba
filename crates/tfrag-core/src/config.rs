//! Settings for tfrag.
//!
//! Settings live in `~/.tfrag/config.yaml` by default. A missing file yields
//! the defaults, so the CLI works without any setup.
//!
//! # Example YAML
//!
//! ```yaml
//! retrieval:
//!   collections: [terraform_book, examples_terraform]
//!   kDocs: 3
//!   threshold: 0.2
//! vectorStore:
//!   backend: lancedb
//!   path: ~/.tfrag/store
//!   dimension: 384
//! embedding:
//!   modelId: intfloat/multilingual-e5-small
//!   device: auto
//! generation:
//!   provider: openai
//!   model: gpt-4o-mini
//! rulesPath: ~/.tfrag/classification_rules.yaml
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tfrag_db::collection::{StoreConfig, VectorMetric, DEFAULT_BACKEND};
use tfrag_model::{EmbeddingConfig, GenerationConfig};

use crate::errors::RagError;
use crate::pipeline::{PipelineOptions, DEFAULT_K_EXTRA};
use crate::state::{DEFAULT_K_DOCS, DEFAULT_THRESHOLD, MAX_K_DOCS};

/// Environment variable overriding the settings file path.
pub const TFRAG_CONFIG_ENV: &str = "TFRAG_CONFIG";

pub const DEFAULT_DIMENSION: usize = 384;

pub const DEFAULT_COLLECTIONS: [&str; 2] = ["terraform_book", "examples_terraform"];

// ============================================================================
// Settings
// ============================================================================

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub retrieval: RetrievalSettings,

    #[serde(default)]
    pub vector_store: VectorStoreSettings,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    /// Classifier rules file. The built-in rules apply when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_path: Option<PathBuf>,
}

impl Settings {
    /// Load settings from the default location.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if the file exists but cannot be parsed.
    pub fn load_default() -> Result<Self, RagError> {
        match Self::default_path() {
            Some(path) => Self::from_path(&path),
            None => {
                tracing::debug!("Could not determine home directory, using default settings");
                Ok(Self::default())
            }
        }
    }

    /// Load settings from `path`, or the defaults if it does not exist.
    pub fn from_path(path: &Path) -> Result<Self, RagError> {
        if !path.exists() {
            tracing::debug!("Settings not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            RagError::InvalidConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut settings = Self::from_yaml_str(&content).map_err(|e| {
            RagError::InvalidConfig(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        settings.expand_paths();

        let warnings = settings.validate()?;
        for warning in warnings {
            tracing::warn!("Config warning: {}", warning);
        }
        Ok(settings)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, RagError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// `~/.tfrag`
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".tfrag"))
    }

    /// `~/.tfrag/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        Self::default_dir().map(|d| d.join("config.yaml"))
    }

    fn expand_paths(&mut self) {
        self.vector_store.path = expand_home(&self.vector_store.path);
        if let Some(p) = self.rules_path.take() {
            self.rules_path = Some(expand_home(&p));
        }
        if let Some(p) = self.embedding.local_path.take() {
            self.embedding.local_path = Some(expand_home(&p));
        }
    }

    /// Check settings. Returns warnings; critical problems are errors.
    pub fn validate(&self) -> Result<Vec<String>, RagError> {
        let mut warnings = self.retrieval.validate()?;
        warnings.extend(self.vector_store.validate()?);

        if self.generation.max_retries == 0 {
            warnings.push(
                "generation.maxRetries=0 disables retries on transient HTTP errors".to_string(),
            );
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(RagError::InvalidConfiguration {
                message: format!(
                    "generation.temperature={} is out of range",
                    self.generation.temperature
                ),
                hint: "Use a temperature between 0.0 and 2.0".to_string(),
            });
        }
        if let Some(path) = &self.rules_path {
            if !path.exists() {
                warnings.push(format!(
                    "rulesPath {} does not exist; loading it will fail",
                    path.display()
                ));
            }
        }
        Ok(warnings)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            collections: self.retrieval.collections.clone(),
            k_extra: self.retrieval.k_extra,
            strict_relevance: self.retrieval.strict_relevance,
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(self.vector_store.dimension, self.vector_store.path.clone())
            .with_backend(&self.vector_store.backend)
            .with_metric(self.vector_store.metric)
    }
}

// ============================================================================
// RetrievalSettings
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalSettings {
    /// Collections searched for every query, in merge order.
    #[serde(default = "default_collections")]
    pub collections: Vec<String>,

    /// Default `k_docs` for CLI requests.
    #[serde(default = "default_k_docs")]
    pub k_docs: usize,

    /// Default threshold for CLI requests.
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Extra results fetched per collection.
    #[serde(default = "default_k_extra")]
    pub k_extra: usize,

    /// Apply the domain-aware relevance filter after retrieval.
    #[serde(default)]
    pub strict_relevance: bool,
}

fn default_collections() -> Vec<String> {
    DEFAULT_COLLECTIONS.iter().map(|s| s.to_string()).collect()
}

fn default_k_docs() -> usize {
    DEFAULT_K_DOCS
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn default_k_extra() -> usize {
    DEFAULT_K_EXTRA
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            collections: default_collections(),
            k_docs: default_k_docs(),
            threshold: default_threshold(),
            k_extra: default_k_extra(),
            strict_relevance: false,
        }
    }
}

impl RetrievalSettings {
    pub fn validate(&self) -> Result<Vec<String>, RagError> {
        let mut warnings = Vec::new();

        if self.collections.is_empty() {
            return Err(RagError::InvalidConfiguration {
                message: "retrieval.collections is empty".to_string(),
                hint: format!("List at least one collection, e.g. {:?}", DEFAULT_COLLECTIONS),
            });
        }
        if !(1..=MAX_K_DOCS).contains(&self.k_docs) {
            return Err(RagError::InvalidConfiguration {
                message: format!("retrieval.kDocs={} is out of range", self.k_docs),
                hint: format!("Set kDocs between 1 and {}", MAX_K_DOCS),
            });
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(RagError::InvalidConfiguration {
                message: format!("retrieval.threshold={} is out of range", self.threshold),
                hint: "Set threshold between 0.0 and 1.0".to_string(),
            });
        }
        if self.k_extra > 50 {
            warnings.push(format!(
                "retrieval.kExtra={} fetches many results per collection",
                self.k_extra
            ));
        }
        if self.threshold >= 0.9 {
            warnings.push(format!(
                "retrieval.threshold={} is very strict; most questions will find nothing",
                self.threshold
            ));
        }
        Ok(warnings)
    }
}

// ============================================================================
// VectorStoreSettings
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorStoreSettings {
    /// "lancedb" or "simple".
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Must match the embedding model output.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default)]
    pub metric: VectorMetric,
}

fn default_backend() -> String {
    DEFAULT_BACKEND.to_string()
}

fn default_store_path() -> PathBuf {
    Settings::default_dir()
        .unwrap_or_else(|| PathBuf::from(".tfrag"))
        .join("store")
}

fn default_dimension() -> usize {
    DEFAULT_DIMENSION
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
            dimension: default_dimension(),
            metric: VectorMetric::default(),
        }
    }
}

impl VectorStoreSettings {
    pub fn validate(&self) -> Result<Vec<String>, RagError> {
        if self.dimension == 0 {
            return Err(RagError::InvalidConfiguration {
                message: "vectorStore.dimension cannot be 0".to_string(),
                hint: format!(
                    "Set it to the embedding model output size (default {})",
                    DEFAULT_DIMENSION
                ),
            });
        }
        let mut warnings = Vec::new();
        if !tfrag_db::collection::available_backends().contains(&self.backend.as_str()) {
            warnings.push(format!(
                "vectorStore.backend '{}' is not compiled in (available: {})",
                self.backend,
                tfrag_db::collection::available_backends().join(", ")
            ));
        }
        Ok(warnings)
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(
            settings.retrieval.collections,
            vec!["terraform_book", "examples_terraform"]
        );
        assert_eq!(settings.retrieval.k_docs, 3);
        assert_eq!(settings.retrieval.threshold, 0.2);
        assert_eq!(settings.retrieval.k_extra, 5);
        assert!(!settings.retrieval.strict_relevance);
        assert_eq!(settings.vector_store.dimension, 384);
        assert_eq!(settings.vector_store.backend, "lancedb");
        assert!(settings.rules_path.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let settings = Settings::from_path(Path::new("/nonexistent/tfrag/config.yaml")).unwrap();
        assert_eq!(settings.retrieval.k_docs, DEFAULT_K_DOCS);
    }

    #[test]
    fn test_partial_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "retrieval:\n  collections: [docs]\n  strictRelevance: true\nvectorStore:\n  backend: simple\n  path: /tmp/tfrag-store\ngeneration:\n  provider: ollama\n  model: llama3"
        )
        .unwrap();

        let settings = Settings::from_path(file.path()).unwrap();
        assert_eq!(settings.retrieval.collections, vec!["docs"]);
        assert!(settings.retrieval.strict_relevance);
        assert_eq!(settings.retrieval.k_docs, 3);
        assert_eq!(settings.vector_store.backend, "simple");
        assert_eq!(settings.vector_store.path, PathBuf::from("/tmp/tfrag-store"));
        assert_eq!(settings.generation.model, "llama3");

        let options = settings.pipeline_options();
        assert_eq!(options.collections, vec!["docs"]);
        assert!(options.strict_relevance);

        let store = settings.store_config();
        assert_eq!(store.backend, "simple");
        assert!(!store.create_if_missing);
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let settings = Settings::from_yaml_str("  \n").unwrap();
        assert_eq!(settings.retrieval.k_extra, 5);
    }

    #[test]
    fn test_malformed_file_is_invalid_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "retrieval: [not, a, map]").unwrap();
        let err = Settings::from_path(file.path()).unwrap_err();
        assert!(matches!(err, RagError::InvalidConfig(_)));
    }

    #[test]
    fn test_validation_errors() {
        let mut settings = Settings::default();
        settings.retrieval.collections.clear();
        assert!(matches!(
            settings.validate(),
            Err(RagError::InvalidConfiguration { .. })
        ));

        let mut settings = Settings::default();
        settings.retrieval.threshold = 1.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.vector_store.dimension = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_warnings() {
        let mut settings = Settings::default();
        settings.retrieval.threshold = 0.95;
        settings.generation.max_retries = 0;
        settings.rules_path = Some(PathBuf::from("/nonexistent/rules.yaml"));
        let warnings = settings.validate().unwrap();
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn test_expand_home() {
        let plain = expand_home(Path::new("/var/data"));
        assert_eq!(plain, PathBuf::from("/var/data"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/store")), home.join("store"));
        }
    }
}
