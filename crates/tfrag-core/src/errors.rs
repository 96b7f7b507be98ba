//! Error types for tfrag-core.
//!
//! Only request validation surfaces as an `Err` from the pipeline; the other
//! variants are produced by the engine's constructors and adapters, or are
//! folded into labeled answers inside the pipeline.

use thiserror::Error;

/// Domain-specific errors for tfrag operations.
#[derive(Error, Debug)]
pub enum RagError {
    /// Settings file exists but cannot be read or parsed.
    #[error("Config invalid: {0}")]
    InvalidConfig(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {message}. {hint}")]
    InvalidConfiguration {
        /// Description of the invalid configuration.
        message: String,
        /// Actionable hint on how to fix it.
        hint: String,
    },

    /// Classifier rules could not be loaded or contain a bad pattern.
    #[error("Classifier rules invalid ({source_name}): {message}")]
    RulesInvalid {
        /// File path, or "built-in" for the embedded defaults.
        source_name: String,
        /// What is wrong.
        message: String,
    },

    /// A request field is out of range or missing.
    #[error("{0}")]
    InvalidArgument(String),

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    /// The embedding model could not be loaded.
    #[error("Embedding provider `{provider}` is unavailable: {reason}")]
    EmbeddingUnavailable {
        /// Model or component that failed.
        provider: String,
        /// Reason why the provider is unavailable.
        reason: String,
    },

    /// Embedding a query failed after the model loaded.
    #[error("Failed to embed query: {reason}")]
    EmbeddingFailed {
        /// Description of the failure.
        reason: String,
    },

    /// The vector store could not be opened.
    #[error("Vector store unavailable at `{path}`: {reason}")]
    StoreUnavailable {
        /// Store root.
        path: String,
        /// Description of the failure.
        reason: String,
    },

    /// Searching one collection failed.
    #[error("Failed to search collection `{collection}`: {reason}")]
    SearchFailed {
        /// The collection that failed to search.
        collection: String,
        /// Description of the failure.
        reason: String,
    },

    /// The generation client could not be built.
    #[error("Generation provider `{provider}` is unavailable: {reason}")]
    GenerationUnavailable {
        /// Provider name.
        provider: String,
        /// Reason why the provider is unavailable.
        reason: String,
    },

    /// A generation call failed.
    #[error("Generation failed: {reason}")]
    GenerationFailed {
        /// Description of the failure.
        reason: String,
    },

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A wrapped generic error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
