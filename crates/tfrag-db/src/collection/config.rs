//! Store configuration and on-disk metadata.

use super::traits::VectorMetric;
use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_BACKEND: &str = "lancedb";

/// Metadata file written at the store root.
pub const STORE_META_FILENAME: &str = "store.meta.json";

// ============================================================================
// StoreConfig
// ============================================================================

/// How to open a collection store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    pub dimension: usize,

    /// Store root directory.
    pub path: PathBuf,

    /// "lancedb" or "simple".
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default)]
    pub metric: VectorMetric,

    /// Query-time callers leave this off so a wrong path is reported, not created.
    #[serde(default)]
    pub create_if_missing: bool,
}

fn default_backend() -> String {
    DEFAULT_BACKEND.to_string()
}

impl StoreConfig {
    pub fn new(dimension: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            dimension,
            path: path.into(),
            backend: DEFAULT_BACKEND.to_string(),
            metric: VectorMetric::Cosine,
            create_if_missing: false,
        }
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    pub fn with_metric(mut self, metric: VectorMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }
}

// ============================================================================
// StoreMeta
// ============================================================================

/// Contents of `store.meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMeta {
    pub backend: String,
    pub dimension: usize,
    pub metric: VectorMetric,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub created_at: Option<String>,
}

fn default_schema_version() -> u32 {
    1
}

impl StoreMeta {
    pub fn new(backend: impl Into<String>, dimension: usize, metric: VectorMetric) -> Self {
        Self {
            backend: backend.into(),
            dimension,
            metric,
            schema_version: 1,
            created_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}

// ============================================================================
// StoreCompatibility
// ============================================================================

/// Result of comparing an existing store with the requested config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCompatibility {
    Compatible,
    /// No store at the path.
    NotFound,
    /// Directory has data but no metadata file; opened as-is.
    Unversioned,
    IncompatibleDimension { expected: usize, actual: usize },
    IncompatibleBackend { expected: String, actual: String },
    IncompatibleMetric {
        expected: VectorMetric,
        actual: VectorMetric,
    },
    Corrupted(String),
}

impl StoreCompatibility {
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Compatible | Self::Unversioned)
    }
}

/// Compare the store at `config.path` with `config`.
pub fn check_store_compatibility(config: &StoreConfig) -> StoreCompatibility {
    let meta_path = config.path.join(STORE_META_FILENAME);

    if !meta_path.exists() {
        if !config.path.is_dir() {
            return StoreCompatibility::NotFound;
        }
        let entries = config.path.read_dir().map(|rd| rd.count()).unwrap_or(0);
        return if entries == 0 {
            StoreCompatibility::NotFound
        } else {
            StoreCompatibility::Unversioned
        };
    }

    match load_store_meta(&config.path) {
        Ok(meta) if meta.dimension != config.dimension => {
            StoreCompatibility::IncompatibleDimension {
                expected: config.dimension,
                actual: meta.dimension,
            }
        }
        Ok(meta) if meta.backend != config.backend => StoreCompatibility::IncompatibleBackend {
            expected: config.backend.clone(),
            actual: meta.backend,
        },
        Ok(meta) if meta.metric != config.metric => StoreCompatibility::IncompatibleMetric {
            expected: config.metric,
            actual: meta.metric,
        },
        Ok(_) => StoreCompatibility::Compatible,
        Err(e) => StoreCompatibility::Corrupted(e.to_string()),
    }
}

pub fn load_store_meta(path: &Path) -> DbResult<StoreMeta> {
    let meta_path = path.join(STORE_META_FILENAME);
    debug!("Loading store metadata from {:?}", meta_path);

    let content = fs::read_to_string(&meta_path)
        .map_err(|e| DbError::store_io(&meta_path, format!("Failed to read metadata: {}", e)))?;
    serde_json::from_str(&content)
        .map_err(|e| DbError::store_parse(&meta_path, format!("Failed to parse metadata: {}", e)))
}

pub fn write_store_meta(path: &Path, meta: &StoreMeta) -> DbResult<()> {
    fs::create_dir_all(path)?;
    let content = serde_json::to_string_pretty(meta)?;
    fs::write(path.join(STORE_META_FILENAME), content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_store_is_not_found() {
        let config = StoreConfig::new(384, "/nonexistent/tfrag/store");
        assert_eq!(
            check_store_compatibility(&config),
            StoreCompatibility::NotFound
        );
    }

    #[test]
    fn test_dimension_mismatch_detected() {
        let temp = TempDir::new().unwrap();
        write_store_meta(temp.path(), &StoreMeta::new("simple", 768, VectorMetric::Cosine))
            .unwrap();

        let config = StoreConfig::new(384, temp.path()).with_backend("simple");
        assert_eq!(
            check_store_compatibility(&config),
            StoreCompatibility::IncompatibleDimension {
                expected: 384,
                actual: 768
            }
        );
    }

    #[test]
    fn test_data_without_meta_is_unversioned() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("terraform_book.jsonl"), "").unwrap();

        let config = StoreConfig::new(384, temp.path()).with_backend("simple");
        let compat = check_store_compatibility(&config);
        assert_eq!(compat, StoreCompatibility::Unversioned);
        assert!(compat.is_usable());
    }

    #[test]
    fn test_meta_round_trip_matches() {
        let temp = TempDir::new().unwrap();
        write_store_meta(temp.path(), &StoreMeta::new("lancedb", 384, VectorMetric::Cosine))
            .unwrap();
        let config = StoreConfig::new(384, temp.path());
        assert_eq!(
            check_store_compatibility(&config),
            StoreCompatibility::Compatible
        );
    }
}
