//! # tfrag-db
//!
//! Storage layer for tfrag: named collections of embedded text chunks.
//!
//! Keeping the LanceDB/Arrow stack here means `tfrag-core` compiles without it
//! and its pipeline tests run against in-memory doubles.
//!
//! ## Architecture
//!
//! ```text
//! tfrag-cli → tfrag-core → (SearchBackend trait)
//!                 ↑
//!              tfrag-db (CollectionStore: LanceDB / JSONL)
//! ```
//!
//! ## Features
//!
//! - `lancedb` (default): one LanceDB table per collection
//! - `simple` (default): one JSONL file per collection, linear scan
//!
//! ## Usage
//!
//! ```ignore
//! use tfrag_db::collection::{open_store, StoreConfig};
//!
//! let store = open_store(&StoreConfig::new(384, "/path/to/store"))?;
//! let hits = store.search("terraform_book", &embedding, 8)?;
//! ```

pub mod collection;
pub mod error;

pub use error::{DbError, DbResult};
