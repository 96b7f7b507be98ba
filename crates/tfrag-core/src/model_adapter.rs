//! Adapter layer for tfrag-model.
//!
//! Converts `ModelError` into `RagError` and wraps the embedding and
//! generation models behind the core's [`EmbeddingBackend`] and
//! [`GenerationBackend`] traits.
//!
//! ```text
//! pipeline stages
//!        ↓
//!   model_adapter (this module): lazy loading + error conversion
//!        ↓
//!     tfrag-model (Candle embeddings, HTTP generation)
//! ```
//!
//! Models load on first use, so queries rejected by the scope gate never
//! touch model files or the network.

use std::sync::OnceLock;

use tfrag_model::{
    EmbeddingConfig, EmbeddingModel, GenerationConfig, GenerationModel, ModelError,
};

use crate::errors::RagError;
use crate::formatter::GenerationBackend;
use crate::retrieval::EmbeddingBackend;

// ============================================================================
// Error Conversion
// ============================================================================

/// Convert a tfrag-model error to a tfrag-core error.
pub fn from_model_error(err: ModelError) -> RagError {
    match err {
        ModelError::ModelsDirectoryNotFound { .. } => RagError::EmbeddingUnavailable {
            provider: "model-locator".to_string(),
            reason: err.to_string(),
        },

        ModelError::ModelNotFound { ref model_id, .. } => RagError::EmbeddingUnavailable {
            provider: model_id.clone(),
            reason: err.to_string(),
        },

        ModelError::IncompleteModelFiles { ref path, .. } => RagError::EmbeddingUnavailable {
            provider: path.display().to_string(),
            reason: err.to_string(),
        },

        ModelError::ModelLoad { model_id, message } => RagError::EmbeddingUnavailable {
            provider: model_id,
            reason: message,
        },

        ModelError::InvalidConfig { message } => RagError::EmbeddingUnavailable {
            provider: "model-config".to_string(),
            reason: message,
        },

        ModelError::DeviceNotAvailable { reason } => RagError::EmbeddingUnavailable {
            provider: "device".to_string(),
            reason,
        },

        ModelError::Tokenization { message } => RagError::EmbeddingFailed { reason: message },

        ModelError::EmbeddingFailed { model_id, message } => RagError::EmbeddingFailed {
            reason: format!("{}: {}", model_id, message),
        },

        ModelError::GenerationFailed { model_id, message } => RagError::GenerationFailed {
            reason: format!("{}: {}", model_id, message),
        },

        ModelError::Http { endpoint, message } => RagError::GenerationFailed {
            reason: format!("{}: {}", endpoint, message),
        },

        ModelError::MissingApiKey { ref provider } => RagError::GenerationUnavailable {
            provider: provider.clone(),
            reason: err.to_string(),
        },

        ModelError::ProviderNotAvailable { provider, reason } => {
            if provider == "candle" {
                RagError::EmbeddingUnavailable { provider, reason }
            } else {
                RagError::GenerationUnavailable { provider, reason }
            }
        }

        ModelError::Io(io_err) => RagError::Io(io_err),

        ModelError::Json(json_err) => RagError::Json(json_err),
    }
}

/// Extension trait to convert tfrag-model results.
pub trait IntoRagResult<T> {
    fn into_rag_result(self) -> Result<T, RagError>;
}

impl<T> IntoRagResult<T> for Result<T, ModelError> {
    fn into_rag_result(self) -> Result<T, RagError> {
        self.map_err(from_model_error)
    }
}

// ============================================================================
// Lazy Embedder
// ============================================================================

/// Query embedder that loads its model on first use.
pub struct LazyEmbedder {
    config: EmbeddingConfig,
    model: OnceLock<Box<dyn EmbeddingModel>>,
}

impl std::fmt::Debug for LazyEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyEmbedder")
            .field("model_id", &self.config.model_id)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl LazyEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            config,
            model: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    /// Load the model if needed. A failed load is retried on the next call.
    pub fn model(&self) -> Result<&dyn EmbeddingModel, RagError> {
        if let Some(model) = self.model.get() {
            return Ok(model.as_ref());
        }

        tracing::info!(
            "Loading embedding model {} (device: {})",
            self.config.model_id,
            self.config.device
        );
        let loaded = tfrag_model::create_embedding_model(&self.config).into_rag_result()?;
        Ok(self.model.get_or_init(|| loaded).as_ref())
    }
}

impl EmbeddingBackend for LazyEmbedder {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.model()?.embed_query(text).into_rag_result()
    }
}

// ============================================================================
// Lazy Generator
// ============================================================================

/// Generation client built on first use.
pub struct LazyGenerator {
    config: GenerationConfig,
    model: OnceLock<Box<dyn GenerationModel>>,
}

impl std::fmt::Debug for LazyGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyGenerator")
            .field("provider", &self.config.provider)
            .field("model", &self.config.model)
            .finish()
    }
}

impl LazyGenerator {
    pub fn new(config: GenerationConfig) -> Self {
        Self {
            config,
            model: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    fn model(&self) -> Result<&dyn GenerationModel, RagError> {
        if let Some(model) = self.model.get() {
            return Ok(model.as_ref());
        }
        let built = tfrag_model::create_generation_model(&self.config).into_rag_result()?;
        Ok(self.model.get_or_init(|| built).as_ref())
    }
}

impl GenerationBackend for LazyGenerator {
    fn generate(&self, prompt: &str) -> Result<String, RagError> {
        self.model()?.generate(prompt).into_rag_result()
    }
}
