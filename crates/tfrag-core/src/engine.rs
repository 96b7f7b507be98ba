//! tfrag engine: owns settings, classifier rules and the lazily loaded
//! backends, and runs the pipeline against them.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tfrag_model::DevicePreference;

use crate::config::Settings;
use crate::db_adapter::LazyStore;
use crate::errors::RagError;
use crate::health::{check_health, HealthReport};
use crate::intent::{IntentClassifier, IntentResult};
use crate::model_adapter::{LazyEmbedder, LazyGenerator};
use crate::pipeline::Pipeline;
use crate::rules::{self, ClassifierRules};
use crate::scope::{ScopeDecision, ScopeGate};
use crate::state::{PipelineState, QueryRequest, QueryResponse};

// ============================================================================
// RagEngine
// ============================================================================

/// Entry point for answering questions.
///
/// Construction reads settings and rules only. The embedding model, vector
/// store and generation client load on first use.
///
/// # Example
///
/// ```ignore
/// use tfrag_core::{QueryRequest, RagEngine};
///
/// let engine = RagEngine::with_defaults()?;
/// let response = engine.ask(QueryRequest::new("¿Cómo creo un storage account?"))?;
/// println!("{}", response.answer);
/// ```
#[derive(Debug)]
pub struct RagEngine {
    settings: Settings,
    rules: Arc<ClassifierRules>,
    embedder: LazyEmbedder,
    store: LazyStore,
    generator: LazyGenerator,
}

/// Scope and intent of a question, without retrieval.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub question: String,
    pub scope: ScopeDecision,
    /// Present only for in-scope questions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentResult>,
    /// Answer the pipeline would give a rejected question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_message: Option<String>,
}

impl RagEngine {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create an engine from settings, loading the process-wide rules.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid or the rules fail to load.
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let rules = rules::load_shared(settings.rules_path.as_deref())?;
        Self::with_rules(settings, rules)
    }

    /// Create an engine with explicit rules, bypassing the shared instance.
    pub fn with_rules(settings: Settings, rules: Arc<ClassifierRules>) -> anyhow::Result<Self> {
        let warnings = settings.validate()?;
        for warning in warnings {
            tracing::warn!("Config warning: {}", warning);
        }
        Ok(Self {
            embedder: LazyEmbedder::new(settings.embedding.clone()),
            store: LazyStore::new(settings.store_config()),
            generator: LazyGenerator::new(settings.generation.clone()),
            settings,
            rules,
        })
    }

    /// Create an engine from `~/.tfrag/config.yaml`, or defaults.
    pub fn with_defaults() -> anyhow::Result<Self> {
        Self::from_settings(Settings::load_default()?)
    }

    /// Create an engine from a specific settings file.
    pub fn with_config(path: &Path) -> anyhow::Result<Self> {
        Self::from_settings(Settings::from_path(path)?)
    }

    /// Override the embedding device. Takes effect because the model has not
    /// loaded yet; call it before the first question.
    pub fn set_device(&mut self, device: DevicePreference) {
        self.settings.embedding.device = device;
        self.embedder = LazyEmbedder::new(self.settings.embedding.clone());
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn rules(&self) -> &ClassifierRules {
        &self.rules
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    fn pipeline(&self) -> Pipeline<'_> {
        Pipeline::new(
            Arc::clone(&self.rules),
            &self.embedder,
            &self.store,
            &self.generator,
        )
        .with_options(self.settings.pipeline_options())
    }

    /// A request with the configured defaults for `k_docs` and `threshold`.
    pub fn request(&self, question: impl Into<String>) -> QueryRequest {
        QueryRequest::new(question)
            .with_k_docs(self.settings.retrieval.k_docs)
            .with_threshold(self.settings.retrieval.threshold)
    }

    /// Answer a question. Only invalid requests return `Err`.
    pub fn ask(&self, request: QueryRequest) -> Result<QueryResponse, RagError> {
        self.pipeline().run(request)
    }

    /// Answer a question and keep the full pipeline state.
    pub fn ask_with_state(&self, request: QueryRequest) -> Result<PipelineState, RagError> {
        self.pipeline().run_state(request)
    }

    /// Scope and intent of `question`. Never loads models.
    pub fn classify(&self, question: &str) -> Classification {
        let gate = ScopeGate::new(Arc::clone(&self.rules));
        let scope = gate.evaluate(question);
        let (intent, rejection_message) = if scope.in_scope {
            let classifier = IntentClassifier::new(Arc::clone(&self.rules));
            (Some(classifier.classify(question)), None)
        } else {
            (None, Some(gate.rejection_message(question)))
        };
        Classification {
            question: question.to_string(),
            scope,
            intent,
            rejection_message,
        }
    }

    /// Store reachability and document counts for the configured collections.
    pub fn health(&self) -> HealthReport {
        check_health(&self.store, &self.settings.retrieval.collections)
    }

    pub fn embedding_loaded(&self) -> bool {
        self.embedder.is_loaded()
    }
}
