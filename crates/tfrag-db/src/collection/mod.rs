//! Named vector collections.
//!
//! A store is a directory holding several collections that share one vector
//! dimension and distance metric. Each point carries the chunk text
//! (`page_content`) and a free-form JSON `metadata` map.

mod backend;
mod config;
mod traits;

pub use config::{
    check_store_compatibility, load_store_meta, write_store_meta, StoreCompatibility,
    StoreConfig, StoreMeta, DEFAULT_BACKEND, STORE_META_FILENAME,
};
pub use traits::{ChunkPayload, CollectionStore, PointInsert, ScoredPoint, VectorId, VectorMetric};

pub use backend::{available_backends, open_store};

#[cfg(feature = "lancedb")]
pub use backend::LanceDbCollectionStore;

#[cfg(feature = "simple")]
pub use backend::SimpleCollectionStore;
