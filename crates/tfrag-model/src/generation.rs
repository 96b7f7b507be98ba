//! HTTP answer generation.
//!
//! Two wire formats are supported:
//!
//! - OpenAI-compatible `POST {base}/chat/completions` (single user message)
//! - Ollama `POST {base}/api/generate` with `stream: false`
//!
//! ## Flow
//!
//! 1. Build the provider-specific JSON body
//! 2. Send with a blocking client, bearer auth when a key is present
//! 3. Retry transport errors, 429 and 5xx with linear backoff
//! 4. Extract the completion text; an empty completion is an error

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::{GenerationConfig, GenerationProviderKind};
use crate::error::{ModelError, ModelResult};
use crate::GenerationModel;

/// Base delay between retries; attempt `n` waits `n * RETRY_BACKOFF`.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Blocking HTTP client for chat-completion style endpoints.
#[derive(Debug)]
pub struct HttpGenerationModel {
    config: GenerationConfig,
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpGenerationModel {
    pub fn new(config: &GenerationConfig) -> ModelResult<Self> {
        let api_key = config.effective_api_key();
        if config.provider == GenerationProviderKind::Openai
            && api_key.is_none()
            && config.base_url.is_none()
        {
            return Err(ModelError::MissingApiKey {
                provider: config.provider.to_string(),
            });
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ModelError::ProviderNotAvailable {
                provider: config.provider.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            endpoint: endpoint_for(config),
            api_key,
            config: config.clone(),
            client,
        })
    }

    fn send_once(&self, body: &Value) -> ModelResult<String> {
        let mut request = self.client.post(&self.endpoint).json(body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .map_err(|e| ModelError::http(&self.endpoint, e.to_string()))?;
        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(ModelError::http(&self.endpoint, format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(ModelError::generation_failed(
                &self.config.model,
                format!("HTTP {}: {}", status, detail.trim()),
            ));
        }

        let payload: Value = response
            .json()
            .map_err(|e| ModelError::generation_failed(&self.config.model, e.to_string()))?;
        extract_completion(self.config.provider, &payload)
            .ok_or_else(|| ModelError::generation_failed(&self.config.model, "empty completion"))
    }
}

impl GenerationModel for HttpGenerationModel {
    fn generate(&self, prompt: &str) -> ModelResult<String> {
        let body = request_body(&self.config, prompt);
        let attempts = self.config.max_retries.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = RETRY_BACKOFF * (attempt - 1);
                debug!(
                    "generation: retry attempt {}/{} after {:?}",
                    attempt, attempts, delay
                );
                std::thread::sleep(delay);
            }

            match self.send_once(&body) {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() => {
                    warn!("Generation request failed (attempt {}): {}", attempt, e);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err
            .unwrap_or_else(|| ModelError::generation_failed(&self.config.model, "no attempts")))
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

fn endpoint_for(config: &GenerationConfig) -> String {
    let base = config.effective_base_url();
    match config.provider {
        GenerationProviderKind::Openai => format!("{}/chat/completions", base),
        GenerationProviderKind::Ollama => format!("{}/api/generate", base),
    }
}

fn request_body(config: &GenerationConfig, prompt: &str) -> Value {
    match config.provider {
        GenerationProviderKind::Openai => {
            let mut body = json!({
                "model": config.model,
                "messages": [{ "role": "user", "content": prompt }],
                "temperature": config.temperature,
            });
            if let Some(max) = config.max_tokens {
                body["max_tokens"] = json!(max);
            }
            body
        }
        GenerationProviderKind::Ollama => {
            let mut options = json!({ "temperature": config.temperature });
            if let Some(max) = config.max_tokens {
                options["num_predict"] = json!(max);
            }
            json!({
                "model": config.model,
                "prompt": prompt,
                "stream": false,
                "options": options,
            })
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OllamaCompletion {
    #[serde(default)]
    response: String,
}

fn extract_completion(provider: GenerationProviderKind, payload: &Value) -> Option<String> {
    let text = match provider {
        GenerationProviderKind::Openai => {
            let parsed: ChatCompletion = serde_json::from_value(payload.clone()).ok()?;
            parsed.choices.into_iter().next()?.message.content?
        }
        GenerationProviderKind::Ollama => {
            let parsed: OllamaCompletion = serde_json::from_value(payload.clone()).ok()?;
            parsed.response
        }
    };

    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ollama_config() -> GenerationConfig {
        GenerationConfig::default().with_provider(GenerationProviderKind::Ollama)
    }

    #[test]
    fn test_openai_body_shape() {
        let config = GenerationConfig {
            max_tokens: Some(256),
            ..Default::default()
        };
        let body = request_body(&config, "What is a module?");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "What is a module?");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["max_tokens"], 256);
    }

    #[test]
    fn test_ollama_body_disables_streaming() {
        let body = request_body(&ollama_config(), "hi");
        assert_eq!(body["stream"], false);
        assert_eq!(body["prompt"], "hi");
        assert!(body["options"].get("num_predict").is_none());
    }

    #[test]
    fn test_endpoints() {
        assert_eq!(
            endpoint_for(&GenerationConfig::default()),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            endpoint_for(&ollama_config()),
            "http://localhost:11434/api/generate"
        );
    }

    #[test]
    fn test_extract_openai_completion() {
        let payload = json!({
            "choices": [{ "message": { "role": "assistant", "content": "  Use a module block.\n" } }]
        });
        assert_eq!(
            extract_completion(GenerationProviderKind::Openai, &payload).as_deref(),
            Some("Use a module block.")
        );
    }

    #[test]
    fn test_extract_rejects_empty_completion() {
        let empty_choices = json!({ "choices": [] });
        assert!(extract_completion(GenerationProviderKind::Openai, &empty_choices).is_none());

        let blank = json!({ "response": "   " });
        assert!(extract_completion(GenerationProviderKind::Ollama, &blank).is_none());
    }

    #[test]
    fn test_openai_without_key_or_base_url_is_rejected() {
        let config = GenerationConfig {
            api_key: Some(String::new()),
            ..Default::default()
        };
        // Only meaningful when the environment carries no key either.
        if config.effective_api_key().is_none() {
            assert!(matches!(
                HttpGenerationModel::new(&config),
                Err(ModelError::MissingApiKey { .. })
            ));
        }
    }

    #[test]
    fn test_unreachable_endpoint_is_http_error() {
        let config = GenerationConfig {
            max_retries: 1,
            timeout_secs: 2,
            ..ollama_config().with_base_url("http://127.0.0.1:9")
        };
        let model = HttpGenerationModel::new(&config).unwrap();
        assert!(matches!(model.generate("ping"), Err(ModelError::Http { .. })));
    }
}
