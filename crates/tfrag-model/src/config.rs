//! Configuration types for tfrag-model.
//!
//! These are the canonical embedding and generation settings. `tfrag-core`
//! embeds them in its own `Settings` rather than redefining them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::model_locator::ModelLocator;
use crate::{DEFAULT_EMBEDDING_MODEL_ID, DEFAULT_GENERATION_MODEL};

/// Environment variables consulted for the generation API key, in order.
pub const API_KEY_ENV_VARS: &[&str] = &["TFRAG_API_KEY", "OPENAI_API_KEY"];

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Prefix e5-family models expect in front of search queries.
pub const DEFAULT_QUERY_PREFIX: &str = "query: ";

// ============================================================================
// DevicePreference
// ============================================================================

/// Preference for compute device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// GPU if one was compiled in and is present, else CPU.
    #[default]
    Auto,
    Gpu,
    Cpu,
}

impl std::fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Gpu => write!(f, "gpu"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "gpu" | "metal" | "cuda" => Ok(Self::Gpu),
            "cpu" => Ok(Self::Cpu),
            _ => Err(format!(
                "Unknown device: '{}'. Use 'auto', 'gpu', or 'cpu'.",
                s
            )),
        }
    }
}

// ============================================================================
// ModelArchitecture
// ============================================================================

/// Encoder architecture, inferred from the model's config.json.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelArchitecture {
    #[default]
    Bert,
    XlmRoberta,
    Unknown,
}

impl std::fmt::Display for ModelArchitecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bert => write!(f, "bert"),
            Self::XlmRoberta => write!(f, "xlm-roberta"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ============================================================================
// ModelInfo
// ============================================================================

/// Information about a loaded embedding model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_id: String,
    pub dimension: usize,
    pub max_seq_len: usize,
    #[serde(default)]
    pub architecture: ModelArchitecture,
}

impl ModelInfo {
    pub fn new(model_id: impl Into<String>, dimension: usize, max_seq_len: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dimension,
            max_seq_len,
            architecture: ModelArchitecture::default(),
        }
    }

    pub fn with_architecture(mut self, arch: ModelArchitecture) -> Self {
        self.architecture = arch;
        self
    }
}

// ============================================================================
// EmbeddingConfig
// ============================================================================

/// Configuration for the query embedding model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingConfig {
    /// Model ID (e.g., "intfloat/multilingual-e5-small").
    #[serde(default = "default_embedding_model_id")]
    pub model_id: String,

    #[serde(default)]
    pub device: DevicePreference,

    /// Explicit model directory. If None, the [`ModelLocator`] search order applies.
    #[serde(default)]
    pub local_path: Option<PathBuf>,

    #[serde(default = "default_max_seq_len")]
    pub max_sequence_length: usize,

    /// Text prepended to queries before embedding.
    #[serde(default = "default_query_prefix")]
    pub query_prefix: String,
}

fn default_embedding_model_id() -> String {
    DEFAULT_EMBEDDING_MODEL_ID.to_string()
}

fn default_max_seq_len() -> usize {
    512
}

fn default_query_prefix() -> String {
    DEFAULT_QUERY_PREFIX.to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: default_embedding_model_id(),
            device: DevicePreference::default(),
            local_path: None,
            max_sequence_length: default_max_seq_len(),
            query_prefix: default_query_prefix(),
        }
    }
}

impl EmbeddingConfig {
    /// Resolve the model directory.
    ///
    /// Priority:
    /// 1. Explicit `local_path` if set
    /// 2. ModelLocator search order ($TFRAG_MODELS_DIR → ~/.tfrag/models → {exe}/models)
    ///
    /// Returns the path even if it doesn't exist (caller should validate).
    pub fn effective_model_path(&self) -> PathBuf {
        if let Some(ref path) = self.local_path {
            return path.clone();
        }

        match ModelLocator::new().embedding_model_path(&self.model_id) {
            Ok(path) => path,
            Err(_) => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".tfrag")
                .join("models")
                .join(crate::model_locator::EMBEDDINGS_SUBDIR)
                .join(crate::model_locator::extract_model_name(&self.model_id)),
        }
    }

    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    pub fn with_device(mut self, device: DevicePreference) -> Self {
        self.device = device;
        self
    }
}

// ============================================================================
// GenerationConfig
// ============================================================================

/// Which HTTP API the generation client speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProviderKind {
    /// OpenAI-compatible `/chat/completions`.
    #[default]
    Openai,
    /// Ollama `/api/generate`.
    Ollama,
}

impl std::fmt::Display for GenerationProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Openai => write!(f, "openai"),
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for GenerationProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "openai-compatible" => Ok(Self::Openai),
            "ollama" => Ok(Self::Ollama),
            _ => Err(format!(
                "Unknown generation provider: '{}'. Use 'openai' or 'ollama'.",
                s
            )),
        }
    }
}

/// Configuration for the answer generation client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default)]
    pub provider: GenerationProviderKind,

    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Endpoint root. Defaults depend on the provider.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Inline API key. Prefer the environment variables in [`API_KEY_ENV_VARS`].
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_generation_model() -> String {
    DEFAULT_GENERATION_MODEL.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: GenerationProviderKind::default(),
            model: default_generation_model(),
            base_url: None,
            api_key: None,
            temperature: 0.0,
            max_tokens: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl GenerationConfig {
    pub fn effective_base_url(&self) -> String {
        let url = match (&self.base_url, self.provider) {
            (Some(url), _) => url.as_str(),
            (None, GenerationProviderKind::Openai) => DEFAULT_OPENAI_BASE_URL,
            (None, GenerationProviderKind::Ollama) => DEFAULT_OLLAMA_BASE_URL,
        };
        url.trim_end_matches('/').to_string()
    }

    /// Inline key first, then the environment.
    pub fn effective_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Some(key.clone());
        }
        API_KEY_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|k| !k.trim().is_empty())
    }

    pub fn with_provider(mut self, provider: GenerationProviderKind) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

// ============================================================================
// HuggingFaceModelConfig
// ============================================================================

/// Subset of a HuggingFace config.json needed to pick an architecture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuggingFaceModelConfig {
    #[serde(default)]
    pub architectures: Vec<String>,
    #[serde(default)]
    pub hidden_size: usize,
    #[serde(default = "default_max_position")]
    pub max_position_embeddings: usize,
    #[serde(default)]
    pub model_type: String,
}

fn default_max_position() -> usize {
    512
}

impl HuggingFaceModelConfig {
    pub fn infer_architecture(&self) -> ModelArchitecture {
        for arch in &self.architectures {
            let lower = arch.to_lowercase();
            if lower.contains("roberta") {
                return ModelArchitecture::XlmRoberta;
            }
            if lower.contains("bert") {
                return ModelArchitecture::Bert;
            }
        }

        match self.model_type.to_lowercase().as_str() {
            "bert" => ModelArchitecture::Bert,
            "roberta" | "xlm-roberta" => ModelArchitecture::XlmRoberta,
            _ => ModelArchitecture::Unknown,
        }
    }
}
