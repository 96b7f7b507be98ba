//! # tfrag-core
//!
//! **Terraform RAG** – core query pipeline library.
//!
//! Answers infrastructure-as-code questions from pre-indexed collections: a
//! scope gate rejects off-topic queries, a weighted classifier picks the
//! intent, a retriever fans out across collections, a decider picks the
//! response strategy and a formatter produces the answer.
//!
//! ## Main Types
//!
//! - [`RagEngine`] – settings, rules and lazily loaded backends
//! - [`Pipeline`] – the stages over any [`EmbeddingBackend`],
//!   [`SearchBackend`] and [`GenerationBackend`]
//! - [`ClassifierRules`] – intent categories and domain vocabulary from YAML
//! - [`RagError`] – domain-specific error type
//!
//! ## Example
//!
//! ```ignore
//! use tfrag_core::RagEngine;
//!
//! let engine = RagEngine::with_defaults()?;
//! let response = engine.ask(engine.request("Dame el código de un storage account"))?;
//! println!("{}", response.answer);
//! for source in &response.sources {
//!     println!("{} ({:.2})", source.source, source.score);
//! }
//! ```

// Modules
pub mod config;
pub mod contextualize;
pub mod db_adapter;
pub mod decision;
pub mod engine;
pub mod errors;
pub mod formatter;
pub mod health;
pub mod intent;
pub mod model_adapter;
pub mod pipeline;
pub mod retrieval;
pub mod rules;
pub mod scope;
pub mod state;
pub mod text;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use config::Settings;
pub use decision::{contains_infra_code, route, ResponseDecider, Route};
pub use engine::{Classification, RagEngine};
pub use errors::RagError;
pub use formatter::{AnswerFormatter, GenerationBackend};
pub use health::{HealthReport, HealthStatus};
pub use intent::{IntentClassifier, IntentResult, ResponseAction};
pub use pipeline::{Pipeline, PipelineOptions};
pub use retrieval::{filter_by_relevance, DocumentHit, EmbeddingBackend, Retriever, SearchBackend};
pub use rules::ClassifierRules;
pub use scope::{ScopeDecision, ScopeGate, ScopeReason};
pub use state::{ChatMessage, ChatRole, PipelineState, QueryRequest, QueryResponse, SourceInfo};

pub use tfrag_model::DevicePreference;
