//! Request, response and per-request pipeline state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::RagError;
use crate::intent::{IntentResult, IntentScoreMap, ResponseAction};
use crate::retrieval::DocumentHit;
use crate::scope::ScopeDecision;

pub const DEFAULT_K_DOCS: usize = 3;
pub const MAX_K_DOCS: usize = 20;
pub const DEFAULT_THRESHOLD: f32 = 0.2;

// ============================================================================
// Request
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A question to answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default = "default_k_docs")]
    pub k_docs: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chat_history: Vec<ChatMessage>,
}

fn default_k_docs() -> usize {
    DEFAULT_K_DOCS
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            k_docs: DEFAULT_K_DOCS,
            threshold: DEFAULT_THRESHOLD,
            chat_history: Vec::new(),
        }
    }

    pub fn with_k_docs(mut self, k_docs: usize) -> Self {
        self.k_docs = k_docs;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.chat_history = history;
        self
    }

    pub fn validate(&self) -> Result<(), RagError> {
        if self.question.trim().is_empty() {
            return Err(RagError::InvalidArgument(
                "question must not be empty".to_string(),
            ));
        }
        if !(1..=MAX_K_DOCS).contains(&self.k_docs) {
            return Err(RagError::InvalidArgument(format!(
                "k_docs must be between 1 and {} (got {})",
                MAX_K_DOCS, self.k_docs
            )));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(RagError::InvalidArgument(format!(
                "threshold must be between 0.0 and 1.0 (got {})",
                self.threshold
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Response
// ============================================================================

/// A source consulted for the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub metadata: Map<String, Value>,
    pub score: f32,
    pub source: String,
    pub collection: String,
}

impl From<&DocumentHit> for SourceInfo {
    fn from(hit: &DocumentHit) -> Self {
        Self {
            content: Some(hit.content.clone()),
            metadata: hit.metadata.clone(),
            score: hit.score,
            source: hit.source.clone(),
            collection: hit.collection.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SourceInfo>,
    pub question: String,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Pipeline state
// ============================================================================

/// Everything one request accumulates while it moves through the stages.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub request: QueryRequest,
    /// Question as asked.
    pub original_question: String,
    /// Question after contextualization; what later stages see.
    pub question: String,
    pub scope: Option<ScopeDecision>,
    pub intent: String,
    pub intents: Vec<String>,
    pub is_multi_intent: bool,
    pub intent_scores: IntentScoreMap,
    pub preferred_collection: Option<String>,
    pub action: Option<ResponseAction>,
    pub hits: Vec<DocumentHit>,
    pub template: Option<DocumentHit>,
    /// Set by the stage that finishes the request.
    pub answer: Option<String>,
    /// Why the request ended before a response strategy ran
    /// (`rejected`, `no_results`, `embedding_failed`).
    pub terminal_outcome: Option<&'static str>,
    pub sources: Vec<SourceInfo>,
    /// Human-readable stage messages.
    pub trace: Vec<String>,
}

impl PipelineState {
    pub fn new(request: QueryRequest) -> Self {
        Self {
            original_question: request.question.clone(),
            question: request.question.clone(),
            request,
            scope: None,
            intent: String::new(),
            intents: Vec::new(),
            is_multi_intent: false,
            intent_scores: Vec::new(),
            preferred_collection: None,
            action: None,
            hits: Vec::new(),
            template: None,
            answer: None,
            terminal_outcome: None,
            sources: Vec::new(),
            trace: Vec::new(),
        }
    }

    /// Whether a stage already produced the final answer.
    pub fn is_finished(&self) -> bool {
        self.answer.is_some()
    }

    pub fn finish(&mut self, answer: impl Into<String>) {
        self.answer = Some(answer.into());
    }

    /// Finish without a response strategy. Clears the classifier's action
    /// guess so it is not reported as the outcome.
    pub fn finish_early(&mut self, outcome: &'static str, answer: impl Into<String>) {
        self.action = None;
        self.terminal_outcome = Some(outcome);
        self.finish(answer);
    }

    /// Final outcome: the terminal outcome, else the chosen action.
    pub fn outcome(&self) -> &'static str {
        self.terminal_outcome
            .or_else(|| self.action.map(|a| a.as_str()))
            .unwrap_or("none")
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.trace.push(message.into());
    }

    pub fn apply_intent(&mut self, result: IntentResult) {
        self.intent = result.primary_intent;
        self.intents = result.all_intents_found;
        self.is_multi_intent = result.is_multi_intent;
        self.intent_scores = result.scores;
        self.preferred_collection = result.preferred_collection;
        self.action = Some(result.action);
    }

    pub fn into_response(self) -> QueryResponse {
        QueryResponse {
            answer: self.answer.unwrap_or_default(),
            sources: self.sources,
            question: self.original_question,
            timestamp: Utc::now(),
        }
    }
}
