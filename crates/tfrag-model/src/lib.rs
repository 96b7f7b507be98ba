//! # tfrag-model
//!
//! ML inference layer for tfrag: query embeddings and answer generation.
//!
//! - **Embedding models**: Candle bi-encoders producing normalized query vectors
//! - **Generation models**: HTTP clients for OpenAI-compatible and Ollama endpoints
//! - **Model locator**: runtime path resolution for on-disk model assets
//!
//! Test doubles live in the consuming crates; this crate only ships production
//! implementations.
//!
//! ## Model Location
//!
//! 1. `$TFRAG_MODELS_DIR` environment variable
//! 2. `~/.tfrag/models` user directory
//! 3. `{exe_dir}/models` next to the binary
//!
//! ## Features
//!
//! - `embedded` (default): local Candle inference
//! - `remote` (default): HTTP generation clients
//! - `metal` / `cuda`: GPU acceleration for Candle

pub mod config;
pub mod error;
pub mod model_locator;

#[cfg(feature = "embedded")]
mod embedding;

#[cfg(feature = "remote")]
mod generation;

pub use error::{ModelError, ModelResult};

pub use config::{
    DevicePreference, EmbeddingConfig, GenerationConfig, GenerationProviderKind,
    HuggingFaceModelConfig, ModelArchitecture, ModelInfo, API_KEY_ENV_VARS,
};

pub use model_locator::{
    ModelLocator, DEFAULT_EMBEDDING_MODEL_NAME, EMBEDDINGS_SUBDIR, REQUIRED_MODEL_FILES,
    TFRAG_MODELS_DIR_ENV,
};

/// Default embedding model (full HuggingFace identifier).
pub const DEFAULT_EMBEDDING_MODEL_ID: &str = "intfloat/multilingual-e5-small";

/// Default chat model for answer generation.
pub const DEFAULT_GENERATION_MODEL: &str = "gpt-4o-mini";

// ============================================================================
// Embedding Model Trait
// ============================================================================

/// Bi-encoder producing L2-normalized vectors.
pub trait EmbeddingModel: Send + Sync + std::fmt::Debug {
    /// Embed a batch of texts verbatim, one vector per input.
    fn embed(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>>;

    /// Prefix applied by [`EmbeddingModel::embed_query`].
    fn query_prefix(&self) -> &str {
        ""
    }

    /// Embed a search query, applying the model's query prefix.
    fn embed_query(&self, query: &str) -> ModelResult<Vec<f32>> {
        let input = format!("{}{}", self.query_prefix(), query);
        self.embed(&[input.as_str()])?
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::embedding_failed(self.model_id(), "no vector returned"))
    }

    fn dimension(&self) -> usize;

    fn model_info(&self) -> &ModelInfo;

    fn model_id(&self) -> &str {
        &self.model_info().model_id
    }
}

// ============================================================================
// Generation Model Trait
// ============================================================================

/// Text generator used to synthesize answers from retrieved context.
pub trait GenerationModel: Send + Sync + std::fmt::Debug {
    /// Complete a single prompt.
    fn generate(&self, prompt: &str) -> ModelResult<String>;

    fn model_id(&self) -> &str;
}

// ============================================================================
// Factory Functions
// ============================================================================

/// Load the embedding model described by `config`.
#[cfg(feature = "embedded")]
pub fn create_embedding_model(config: &EmbeddingConfig) -> ModelResult<Box<dyn EmbeddingModel>> {
    Ok(Box::new(embedding::CandleEmbeddingModel::new(config)?))
}

#[cfg(not(feature = "embedded"))]
pub fn create_embedding_model(_config: &EmbeddingConfig) -> ModelResult<Box<dyn EmbeddingModel>> {
    Err(ModelError::ProviderNotAvailable {
        provider: "candle".to_string(),
        reason: "tfrag-model was built without the 'embedded' feature".to_string(),
    })
}

/// Build the generation client described by `config`.
#[cfg(feature = "remote")]
pub fn create_generation_model(
    config: &GenerationConfig,
) -> ModelResult<Box<dyn GenerationModel>> {
    Ok(Box::new(generation::HttpGenerationModel::new(config)?))
}

#[cfg(not(feature = "remote"))]
pub fn create_generation_model(
    config: &GenerationConfig,
) -> ModelResult<Box<dyn GenerationModel>> {
    Err(ModelError::ProviderNotAvailable {
        provider: config.provider.to_string(),
        reason: "tfrag-model was built without the 'remote' feature".to_string(),
    })
}

#[cfg(feature = "embedded")]
pub use embedding::CandleEmbeddingModel;

#[cfg(feature = "remote")]
pub use generation::HttpGenerationModel;
