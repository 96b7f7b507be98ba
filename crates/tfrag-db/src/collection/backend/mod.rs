//! Collection store backends.
//!
//! - `lancedb` (default): one LanceDB table per collection
//! - `simple`: one JSONL file per collection

#[cfg(feature = "lancedb")]
mod lancedb;

#[cfg(feature = "simple")]
mod simple;

#[cfg(feature = "lancedb")]
pub use self::lancedb::LanceDbCollectionStore;

#[cfg(feature = "simple")]
pub use simple::SimpleCollectionStore;

use super::config::{check_store_compatibility, write_store_meta, StoreCompatibility, StoreConfig, StoreMeta};
use super::traits::CollectionStore;
use crate::error::{DbError, DbResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Open a collection store.
///
/// 1. Compare the on-disk metadata with `config`
/// 2. Create the store if it is missing and `create_if_missing` is set
/// 3. Open the configured backend
pub fn open_store(config: &StoreConfig) -> DbResult<Arc<dyn CollectionStore>> {
    debug!("Opening {} store at {:?}", config.backend, config.path);

    let incompatible = |reason: String| DbError::StoreIncompatible {
        path: config.path.clone(),
        reason,
    };

    match check_store_compatibility(config) {
        StoreCompatibility::Compatible => {}
        StoreCompatibility::Unversioned => {
            warn!(
                "Store at {:?} has no {} file; assuming dimension {}",
                config.path,
                super::config::STORE_META_FILENAME,
                config.dimension
            );
        }
        StoreCompatibility::NotFound => {
            if !config.create_if_missing {
                return Err(DbError::StoreNotFound {
                    path: config.path.clone(),
                });
            }
            info!("Creating new store at {:?}", config.path);
            write_store_meta(
                &config.path,
                &StoreMeta::new(&config.backend, config.dimension, config.metric),
            )?;
        }
        StoreCompatibility::IncompatibleDimension { expected, actual } => {
            return Err(DbError::DimensionMismatch { expected, actual });
        }
        StoreCompatibility::IncompatibleBackend { expected, actual } => {
            return Err(incompatible(format!(
                "backend mismatch: expected '{}', found '{}'",
                expected, actual
            )));
        }
        StoreCompatibility::IncompatibleMetric { expected, actual } => {
            return Err(incompatible(format!(
                "metric mismatch: expected '{}', found '{}'",
                expected, actual
            )));
        }
        StoreCompatibility::Corrupted(msg) => {
            return Err(incompatible(format!("metadata unreadable: {}", msg)));
        }
    }

    match config.backend.as_str() {
        #[cfg(feature = "lancedb")]
        "lancedb" => Ok(Arc::new(LanceDbCollectionStore::open(config)?)),

        #[cfg(feature = "simple")]
        "simple" => Ok(Arc::new(SimpleCollectionStore::open(config)?)),

        backend => Err(DbError::Config {
            message: format!(
                "Unknown or disabled backend: '{}'. Available backends: {}",
                backend,
                available_backends().join(", ")
            ),
        }),
    }
}

/// Backend names compiled into this build.
#[allow(clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<&'static str> {
    let mut backends = Vec::new();

    #[cfg(feature = "lancedb")]
    backends.push("lancedb");

    #[cfg(feature = "simple")]
    backends.push("simple");

    backends
}
