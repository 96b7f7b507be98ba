//! Candle sentence embeddings (BERT / XLM-RoBERTa encoders).
//!
//! Token states are mean-pooled over the attention mask and L2-normalized,
//! so cosine similarity against the indexed vectors reduces to a dot product.

use std::path::Path;
use std::sync::Mutex;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::config::{
    DevicePreference, EmbeddingConfig, HuggingFaceModelConfig, ModelArchitecture, ModelInfo,
};
use crate::error::{ModelError, ModelResult};
use crate::EmbeddingModel;

enum Encoder {
    Bert(BertModel),
    XlmRoberta(XLMRobertaModel),
}

impl Encoder {
    fn forward(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        attention_mask: &Tensor,
    ) -> candle_core::Result<Tensor> {
        match self {
            Encoder::Bert(model) => model.forward(input_ids, token_type_ids, Some(attention_mask)),
            Encoder::XlmRoberta(model) => {
                model.forward(input_ids, attention_mask, token_type_ids, None, None, None)
            }
        }
    }
}

/// Candle-backed [`EmbeddingModel`].
pub struct CandleEmbeddingModel {
    model_info: ModelInfo,
    query_prefix: String,
    encoder: Mutex<Encoder>,
    tokenizer: Tokenizer,
    device: Device,
}

impl std::fmt::Debug for CandleEmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleEmbeddingModel")
            .field("model_id", &self.model_info.model_id)
            .field("dimension", &self.model_info.dimension)
            .field("architecture", &self.model_info.architecture)
            .finish()
    }
}

unsafe impl Send for CandleEmbeddingModel {}
unsafe impl Sync for CandleEmbeddingModel {}

impl CandleEmbeddingModel {
    /// Load the model described by `config` from disk.
    pub fn new(config: &EmbeddingConfig) -> ModelResult<Self> {
        let model_path = config.effective_model_path();
        if !model_path.exists() {
            return Err(ModelError::ModelNotFound {
                model_id: config.model_id.clone(),
                path: model_path,
            });
        }

        let config_json = std::fs::read_to_string(model_path.join("config.json")).map_err(|e| {
            ModelError::model_load(&config.model_id, format!("config.json: {}", e))
        })?;
        let hf_config: HuggingFaceModelConfig = serde_json::from_str(&config_json)?;
        let architecture = hf_config.infer_architecture();
        if hf_config.hidden_size == 0 {
            return Err(ModelError::InvalidConfig {
                message: "hidden_size is missing or zero".to_string(),
            });
        }
        let max_seq_len = config
            .max_sequence_length
            .min(hf_config.max_position_embeddings);

        info!(
            "Loading embedding model '{}' from {:?} (arch={}, dim={})",
            config.model_id, model_path, architecture, hf_config.hidden_size
        );

        let (pad_id, pad_token) = match architecture {
            ModelArchitecture::XlmRoberta => (1, "<pad>"),
            ModelArchitecture::Bert | ModelArchitecture::Unknown => (0, "[PAD]"),
        };
        let tokenizer = load_tokenizer(&model_path, max_seq_len, pad_id, pad_token)?;
        let device = select_device(config.device)?;
        let encoder = load_encoder(&model_path, &config_json, architecture, &device)?;

        Ok(Self {
            model_info: ModelInfo::new(&config.model_id, hf_config.hidden_size, max_seq_len)
                .with_architecture(architecture),
            query_prefix: config.query_prefix.clone(),
            encoder: Mutex::new(encoder),
            tokenizer,
            device,
        })
    }

    fn failed(&self, e: impl std::fmt::Display) -> ModelError {
        ModelError::embedding_failed(&self.model_info.model_id, e.to_string())
    }

    fn encode(&self, texts: &[&str]) -> ModelResult<Tensor> {
        let inputs: Vec<String> = texts.iter().map(|s| s.to_string()).collect();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| ModelError::tokenization(e.to_string()))?;

        let batch = encodings.len();
        let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);
        let ids: Vec<u32> = encodings.iter().flat_map(|e| e.get_ids().to_vec()).collect();
        let mask: Vec<u32> = encodings
            .iter()
            .flat_map(|e| e.get_attention_mask().to_vec())
            .collect();

        let ids = Tensor::from_vec(ids, (batch, seq_len), &self.device).map_err(|e| self.failed(e))?;
        let mask =
            Tensor::from_vec(mask, (batch, seq_len), &self.device).map_err(|e| self.failed(e))?;
        let type_ids = ids.zeros_like().map_err(|e| self.failed(e))?;

        let hidden = {
            let encoder = self.encoder.lock().map_err(|e| self.failed(e))?;
            encoder
                .forward(&ids, &type_ids, &mask)
                .map_err(|e| self.failed(format!("forward pass: {}", e)))?
        };

        pool_and_normalize(&hidden, &mask).map_err(|e| self.failed(e))
    }
}

/// Masked mean over the sequence axis followed by row-wise L2 normalization.
fn pool_and_normalize(hidden: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = mask
        .unsqueeze(2)?
        .to_dtype(DType::F32)?
        .broadcast_as(hidden.shape())?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
    let pooled = summed.broadcast_div(&counts)?;

    let norm = pooled
        .sqr()?
        .sum_keepdim(1)?
        .sqrt()?
        .clamp(1e-12, f64::MAX)?;
    pooled.broadcast_div(&norm)
}

fn load_tokenizer(
    model_path: &Path,
    max_length: usize,
    pad_id: u32,
    pad_token: &str,
) -> ModelResult<Tokenizer> {
    let tokenizer_path = model_path.join("tokenizer.json");
    let load_err = |e: String| ModelError::model_load(model_path.display().to_string(), e);

    if !tokenizer_path.exists() {
        return Err(load_err("tokenizer.json not found".to_string()));
    }

    let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| load_err(e.to_string()))?;
    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        pad_id,
        pad_token: pad_token.to_string(),
        ..Default::default()
    }));
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| load_err(e.to_string()))?;

    Ok(tokenizer)
}

fn select_device(pref: DevicePreference) -> ModelResult<Device> {
    match pref {
        DevicePreference::Cpu => Ok(Device::Cpu),
        DevicePreference::Auto => Ok(try_gpu().unwrap_or_else(|| {
            info!("Using CPU");
            Device::Cpu
        })),
        DevicePreference::Gpu => try_gpu().ok_or_else(|| ModelError::DeviceNotAvailable {
            reason: gpu_not_available_reason(),
        }),
    }
}

fn try_gpu() -> Option<Device> {
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("Using Metal GPU");
                return Some(device);
            }
            Err(e) => debug!("Metal not available: {}", e),
        }
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("Using CUDA GPU");
                return Some(device);
            }
            Err(e) => debug!("CUDA not available: {}", e),
        }
    }

    debug!("No GPU backend compiled in or available");
    None
}

fn gpu_not_available_reason() -> String {
    if cfg!(any(feature = "metal", feature = "cuda")) {
        "no usable GPU was found on this system".to_string()
    } else {
        "tfrag was built without GPU support; rebuild with --features metal or --features cuda"
            .to_string()
    }
}

fn load_encoder(
    model_path: &Path,
    config_json: &str,
    architecture: ModelArchitecture,
    device: &Device,
) -> ModelResult<Encoder> {
    let weights_path = model_path.join("model.safetensors");
    let load_err = |e: String| ModelError::model_load(model_path.display().to_string(), e);

    if !weights_path.exists() {
        return Err(load_err("model.safetensors not found".to_string()));
    }

    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, device)
            .map_err(|e| load_err(e.to_string()))?
    };

    match architecture {
        ModelArchitecture::Bert | ModelArchitecture::Unknown => {
            let bert_config: BertConfig = serde_json::from_str(config_json)?;
            BertModel::load(vb, &bert_config)
                .map(Encoder::Bert)
                .map_err(|e| load_err(e.to_string()))
        }
        ModelArchitecture::XlmRoberta => {
            let xlmr_config: XLMRobertaConfig = serde_json::from_str(config_json)?;
            XLMRobertaModel::new(&xlmr_config, vb)
                .map(Encoder::XlmRoberta)
                .map_err(|e| load_err(e.to_string()))
        }
    }
}

impl EmbeddingModel for CandleEmbeddingModel {
    fn embed(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let normalized = self.encode(texts)?;
        normalized.to_vec2::<f32>().map_err(|e| self.failed(e))
    }

    fn query_prefix(&self) -> &str {
        &self.query_prefix
    }

    fn dimension(&self) -> usize {
        self.model_info.dimension
    }

    fn model_info(&self) -> &ModelInfo {
        &self.model_info
    }
}
