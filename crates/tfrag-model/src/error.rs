//! Error types for tfrag-model.
//!
//! Errors explain what went wrong and, for missing model files, where the
//! models were expected and how to install them.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tfrag-model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while loading or running models.
#[derive(Debug, Error)]
pub enum ModelError {
    // ========================================================================
    // Model discovery errors
    // ========================================================================
    /// No models directory found in any search location.
    #[error("{}", format_models_dir_not_found(.searched))]
    ModelsDirectoryNotFound { searched: Vec<PathBuf> },

    /// Model files not found at expected location.
    #[error("{}", format_model_not_found(.model_id, .path))]
    ModelNotFound { model_id: String, path: PathBuf },

    /// Model directory exists but is missing required files.
    #[error("{}", format_incomplete_model(.path, .missing))]
    IncompleteModelFiles {
        path: PathBuf,
        missing: Vec<&'static str>,
    },

    // ========================================================================
    // Model loading errors
    // ========================================================================
    #[error("Failed to load model '{model_id}': {message}")]
    ModelLoad { model_id: String, message: String },

    #[error("Invalid model configuration: {message}\n\nThe model's config.json may be corrupted or incompatible.")]
    InvalidConfig { message: String },

    // ========================================================================
    // Inference errors
    // ========================================================================
    #[error("Tokenization failed: {message}")]
    Tokenization { message: String },

    #[error("Embedding failed for model '{model_id}': {message}")]
    EmbeddingFailed { model_id: String, message: String },

    /// The generation endpoint returned an error or an unusable body.
    #[error("Generation failed for model '{model_id}': {message}")]
    GenerationFailed { model_id: String, message: String },

    /// Transport-level failure talking to a remote provider.
    #[error("Request to {endpoint} failed: {message}")]
    Http { endpoint: String, message: String },

    // ========================================================================
    // Provider errors
    // ========================================================================
    #[error("Provider '{provider}' not available: {reason}")]
    ProviderNotAvailable { provider: String, reason: String },

    #[error("Compute device not available: {reason}\n\nSet `device: cpu` in ~/.tfrag/config.yaml or pass --device cpu.")]
    DeviceNotAvailable { reason: String },

    /// Remote provider requires an API key and none was configured.
    #[error("Missing API key for provider '{provider}'. Set TFRAG_API_KEY or OPENAI_API_KEY.")]
    MissingApiKey { provider: String },

    // ========================================================================
    // I/O errors
    // ========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error message formatters
// ============================================================================

fn format_models_dir_not_found(searched: &[PathBuf]) -> String {
    let list = searched
        .iter()
        .enumerate()
        .map(|(i, p)| format!("  {}. {}", i + 1, p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Models directory not found.\n\n\
        tfrag searched these locations:\n\
        {list}\n\n\
        To fix:\n\
        1. Set $TFRAG_MODELS_DIR to your models directory, OR\n\
        2. Copy models to ~/.tfrag/models/, OR\n\
        3. Ensure models/ exists next to the tfrag binary."
    )
}

fn format_model_not_found(model_id: &str, path: &std::path::Path) -> String {
    format!(
        "Model not found: {model_id}\n\n\
        Expected at: {}\n\n\
        The model directory must contain config.json, model.safetensors and tokenizer.json.",
        path.display()
    )
}

fn format_incomplete_model(path: &std::path::Path, missing: &[&str]) -> String {
    format!(
        "Incomplete model installation at {}\n\nMissing files: {}",
        path.display(),
        missing.join(", ")
    )
}

// ============================================================================
// Error constructors
// ============================================================================

impl ModelError {
    pub fn model_load(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelLoad {
            model_id: model_id.into(),
            message: message.into(),
        }
    }

    pub fn embedding_failed(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingFailed {
            model_id: model_id.into(),
            message: message.into(),
        }
    }

    pub fn generation_failed(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GenerationFailed {
            model_id: model_id.into(),
            message: message.into(),
        }
    }

    pub fn http(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Http {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn tokenization(message: impl Into<String>) -> Self {
        Self::Tokenization {
            message: message.into(),
        }
    }

    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_models_dir_not_found_lists_locations() {
        let err = ModelError::ModelsDirectoryNotFound {
            searched: vec![PathBuf::from("/a/models"), PathBuf::from("/b/models")],
        };
        let msg = err.to_string();
        assert!(msg.contains("1. /a/models"));
        assert!(msg.contains("2. /b/models"));
        assert!(msg.contains("TFRAG_MODELS_DIR"));
    }

    #[test]
    fn test_only_http_errors_are_transient() {
        assert!(ModelError::http("http://localhost", "connection refused").is_transient());
        assert!(!ModelError::generation_failed("m", "bad body").is_transient());
        assert!(!ModelError::MissingApiKey {
            provider: "openai".into()
        }
        .is_transient());
    }
}
