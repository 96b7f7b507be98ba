//! Adapter layer for tfrag-db.
//!
//! Converts `DbError` into `RagError` and exposes a collection store as the
//! core's [`SearchBackend`].
//!
//! ```text
//! retriever / health
//!        ↓
//!   db_adapter (this module): lazy open + error conversion
//!        ↓
//!     tfrag-db (LanceDB tables or JSONL files per collection)
//! ```

use std::sync::{Arc, OnceLock};

use tfrag_db::collection::{open_store, ChunkPayload, CollectionStore, StoreConfig};
use tfrag_db::DbError;

use crate::errors::RagError;
use crate::retrieval::SearchBackend;

// ============================================================================
// Error Conversion
// ============================================================================

/// Convert a tfrag-db error to a tfrag-core error.
pub fn from_db_error(err: DbError) -> RagError {
    match err {
        DbError::Io(io_err) => RagError::Io(io_err),

        DbError::Json(json_err) => RagError::Json(json_err),

        DbError::StoreNotFound { ref path } => RagError::StoreUnavailable {
            path: path.display().to_string(),
            reason: "no store at this path; build the index first".to_string(),
        },

        DbError::StoreIncompatible { path, reason } => RagError::StoreUnavailable {
            path: path.display().to_string(),
            reason,
        },

        DbError::StoreIo { path, message } | DbError::StoreParse { path, message } => {
            RagError::StoreUnavailable {
                path: path.display().to_string(),
                reason: message,
            }
        }

        DbError::CollectionNotFound { name } => RagError::SearchFailed {
            collection: name,
            reason: "collection does not exist".to_string(),
        },

        DbError::Config { message } => RagError::InvalidConfiguration {
            message,
            hint: "Check the vectorStore section of the settings".to_string(),
        },

        other => RagError::Other(anyhow::anyhow!(other.to_string())),
    }
}

/// Extension trait to convert tfrag-db results.
pub trait IntoRagResult<T> {
    fn into_rag_result(self) -> Result<T, RagError>;
}

impl<T> IntoRagResult<T> for Result<T, DbError> {
    fn into_rag_result(self) -> Result<T, RagError> {
        self.map_err(from_db_error)
    }
}

// ============================================================================
// Lazy Store
// ============================================================================

/// Collection store opened on first use.
pub struct LazyStore {
    config: StoreConfig,
    store: OnceLock<Arc<dyn CollectionStore>>,
}

impl std::fmt::Debug for LazyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyStore")
            .field("path", &self.config.path)
            .field("backend", &self.config.backend)
            .field("open", &self.store.get().is_some())
            .finish()
    }
}

impl LazyStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            store: OnceLock::new(),
        }
    }

    /// Wrap an already-open store.
    pub fn from_store(config: StoreConfig, store: Arc<dyn CollectionStore>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(store);
        Self {
            config,
            store: cell,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Open the store if needed. A failed open is retried on the next call.
    pub fn store(&self) -> Result<&Arc<dyn CollectionStore>, RagError> {
        if let Some(store) = self.store.get() {
            return Ok(store);
        }
        tracing::debug!(
            "Opening {} store at {}",
            self.config.backend,
            self.config.path.display()
        );
        let opened = open_store(&self.config).into_rag_result()?;
        Ok(self.store.get_or_init(|| opened))
    }

    /// Point count of a collection, or `None` if it does not exist.
    pub fn collection_count(&self, collection: &str) -> Result<Option<usize>, RagError> {
        let store = self.store()?;
        if !store.has_collection(collection).into_rag_result()? {
            return Ok(None);
        }
        store.count(collection).map(Some).into_rag_result()
    }
}

impl SearchBackend for LazyStore {
    fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<(f32, ChunkPayload)>, RagError> {
        let points = self
            .store()?
            .search(collection, vector, limit)
            .map_err(|e| match e {
                DbError::CollectionNotFound { .. } => from_db_error(e),
                other => RagError::SearchFailed {
                    collection: collection.to_string(),
                    reason: other.to_string(),
                },
            })?;
        Ok(points.into_iter().map(|p| (p.score, p.payload)).collect())
    }
}
