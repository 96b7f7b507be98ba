//! The query pipeline.
//!
//! ## Flow
//!
//! 1. Contextualize follow-up questions from chat history
//! 2. Gate the query on domain scope (rejections end the request)
//! 3. Classify intent
//! 4. Retrieve hits across collections
//! 5. Decide the response strategy
//! 6. Format the answer (generate, template or hybrid)
//!
//! Each stage takes the [`PipelineState`] and returns it updated. Once a stage
//! sets the answer, the remaining stages pass the state through untouched.

use std::sync::Arc;
use std::time::Instant;

use crate::contextualize::contextualize;
use crate::decision::{route, ResponseDecider, Route};
use crate::errors::RagError;
use crate::formatter::{AnswerFormatter, GenerationBackend};
use crate::intent::IntentClassifier;
use crate::retrieval::{
    filter_by_relevance, EmbeddingBackend, Retriever, SearchBackend, DEFAULT_MIN_DOMAIN_OVERLAP,
    DEFAULT_MIN_SCORE,
};
use crate::rules::ClassifierRules;
use crate::scope::ScopeGate;
use crate::state::{PipelineState, QueryRequest, QueryResponse, SourceInfo};

/// Extra results fetched per collection beyond `k_docs`.
pub const DEFAULT_K_EXTRA: usize = 5;

pub const NO_RESULTS_MESSAGE: &str =
    "No relevant information was found for this question. Try rephrasing it with more technical detail.";

pub const EMBEDDING_ERROR_LABEL: &str = "[error] Could not process the question";

pub const OUTCOME_REJECTED: &str = "rejected";
pub const OUTCOME_NO_RESULTS: &str = "no_results";
pub const OUTCOME_EMBEDDING_FAILED: &str = "embedding_failed";

/// Retrieval settings the pipeline applies to every request.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub collections: Vec<String>,
    pub k_extra: usize,
    /// Apply [`filter_by_relevance`] after retrieval.
    pub strict_relevance: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            collections: vec!["terraform_book".to_string(), "examples_terraform".to_string()],
            k_extra: DEFAULT_K_EXTRA,
            strict_relevance: false,
        }
    }
}

/// One configured pipeline over borrowed backends.
pub struct Pipeline<'a> {
    rules: Arc<ClassifierRules>,
    gate: ScopeGate,
    classifier: IntentClassifier,
    decider: ResponseDecider,
    embedder: &'a dyn EmbeddingBackend,
    search: &'a dyn SearchBackend,
    generator: &'a dyn GenerationBackend,
    options: PipelineOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        rules: Arc<ClassifierRules>,
        embedder: &'a dyn EmbeddingBackend,
        search: &'a dyn SearchBackend,
        generator: &'a dyn GenerationBackend,
    ) -> Self {
        Self {
            gate: ScopeGate::new(Arc::clone(&rules)),
            classifier: IntentClassifier::new(Arc::clone(&rules)),
            decider: ResponseDecider::new(Arc::clone(&rules)),
            rules,
            embedder,
            search,
            generator,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Answer a request. Only request validation returns `Err`.
    pub fn run(&self, request: QueryRequest) -> Result<QueryResponse, RagError> {
        Ok(self.run_state(request)?.into_response())
    }

    /// Like [`Pipeline::run`] but returns the full final state.
    pub fn run_state(&self, request: QueryRequest) -> Result<PipelineState, RagError> {
        request.validate()?;
        let start = Instant::now();

        let mut state = PipelineState::new(request);
        state = self.stage("contextualize", state, |s| self.contextualize(s));
        state = self.stage("scope_gate", state, |s| self.validate_scope(s));
        state = self.stage("intent_classifier", state, |s| self.classify(s));
        state = self.stage("retriever", state, |s| self.retrieve(s));
        state = self.stage("response_decider", state, |s| self.decide(s));
        state = self.stage("answer_formatter", state, |s| self.format(s));

        let outcome = state.outcome();
        tracing::info!(
            component = "pipeline",
            duration_ms = start.elapsed().as_millis() as u64,
            outcome,
            sources = state.sources.len(),
            "Request completed"
        );
        Ok(state)
    }

    fn stage(
        &self,
        component: &'static str,
        state: PipelineState,
        f: impl FnOnce(PipelineState) -> PipelineState,
    ) -> PipelineState {
        if state.is_finished() {
            return state;
        }
        let start = Instant::now();
        let state = f(state);
        let outcome = if state.is_finished() { "finished" } else { "continue" };
        tracing::debug!(
            component,
            duration_ms = start.elapsed().as_millis() as u64,
            outcome,
            "Stage completed"
        );
        state
    }

    // ========================================================================
    // Stages
    // ========================================================================

    pub fn contextualize(&self, mut state: PipelineState) -> PipelineState {
        if state.request.chat_history.is_empty() {
            return state;
        }
        let rewritten = contextualize(self.generator, &state.question, &state.request.chat_history);
        if rewritten != state.question {
            state.note(format!("Contextualized: {}", rewritten));
            state.question = rewritten;
        }
        state
    }

    pub fn validate_scope(&self, mut state: PipelineState) -> PipelineState {
        let decision = self.gate.evaluate(&state.question);
        state.note(format!("Scope: {}", decision.message));
        if !decision.in_scope {
            let message = self.gate.rejection_message(&state.question);
            state.sources.clear();
            state.finish_early(OUTCOME_REJECTED, message);
        }
        state.scope = Some(decision);
        state
    }

    pub fn classify(&self, mut state: PipelineState) -> PipelineState {
        let result = self.classifier.classify(&state.question);
        state.note(format!(
            "Intent: {} (multi-intent: {})",
            result.primary_intent, result.is_multi_intent
        ));
        state.apply_intent(result);
        state
    }

    pub fn retrieve(&self, mut state: PipelineState) -> PipelineState {
        let k_docs = state.request.k_docs;
        let threshold = state.request.threshold;
        let retriever = Retriever::new(self.embedder, self.search);

        let hits = match retriever.retrieve(
            &state.question,
            &self.options.collections,
            k_docs + self.options.k_extra,
            threshold,
        ) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("Retrieval aborted: {}", e);
                state.note(format!("Retrieval failed: {}", e));
                state.sources.clear();
                state.finish_early(
                    OUTCOME_EMBEDDING_FAILED,
                    format!("{}: {}", EMBEDDING_ERROR_LABEL, e),
                );
                return state;
            }
        };

        let mut hits = if self.options.strict_relevance {
            filter_by_relevance(
                &self.rules,
                &state.question,
                hits,
                DEFAULT_MIN_SCORE,
                DEFAULT_MIN_DOMAIN_OVERLAP,
            )
        } else {
            hits
        };
        hits.truncate(k_docs);
        state.note(format!("Retrieved {} documents", hits.len()));

        if hits.is_empty() {
            state.finish_early(OUTCOME_NO_RESULTS, NO_RESULTS_MESSAGE);
            return state;
        }
        state.sources = hits.iter().map(SourceInfo::from).collect();
        state.hits = hits;
        state
    }

    pub fn decide(&self, mut state: PipelineState) -> PipelineState {
        let decision = self.decider.decide(
            &state.intent,
            state.is_multi_intent,
            &state.hits,
            state.action,
            state.request.threshold,
        );
        state.note(format!("Decision: {}", decision.action));
        state.action = Some(decision.action);
        state.template = decision.template;
        state
    }

    pub fn format(&self, mut state: PipelineState) -> PipelineState {
        let formatter = AnswerFormatter::new(self.generator);
        let answer = match route(state.action) {
            Route::Generate => formatter.generate(&state.question, &state.hits),
            Route::FormatTemplate => {
                if let Some(hit) = &state.template {
                    state.sources = vec![SourceInfo::from(hit)];
                }
                formatter.template(state.template.as_ref())
            }
            Route::FormatHybrid => formatter.hybrid(&state.question, &state.hits),
        };
        state.finish(answer);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::GENERATION_ERROR_LABEL;
    use crate::intent::ResponseAction;
    use crate::state::ChatMessage;
    use crate::testing::{hit_payload, MockEmbedder, MockGenerator, ScriptedSearch};

    const CODE: &str =
        "resource \"azurerm_storage_account\" \"main\" {\n  name = \"stexample\"\n}";
    const PROSE: &str = "A storage account groups Azure Storage services under one namespace.";

    fn rules() -> Arc<ClassifierRules> {
        Arc::new(ClassifierRules::builtin().unwrap())
    }

    fn search() -> ScriptedSearch {
        ScriptedSearch::new()
            .with_hits(
                "terraform_book",
                vec![(
                    0.82,
                    hit_payload(PROSE)
                        .with_meta("source", "books/azure.pdf")
                        .with_meta("page", 12),
                )],
            )
            .with_hits(
                "examples_terraform",
                vec![(
                    0.88,
                    hit_payload(CODE).with_meta("path", "examples/storage/main.tf"),
                )],
            )
    }

    #[test]
    fn test_greeting_is_rejected_without_backends() {
        let embedder = MockEmbedder::default();
        let search = search();
        let generator = MockGenerator::failing();
        let rules = rules();
        let pipeline = Pipeline::new(Arc::clone(&rules), &embedder, &search, &generator);

        let response = pipeline.run(QueryRequest::new("hola")).unwrap();
        assert_eq!(
            Some(response.answer.as_str()),
            rules.rejection_messages.greeting.pick("hola")
        );
        assert!(response.sources.is_empty());
        assert_eq!(embedder.calls(), 0);
        assert_eq!(search.calls(), 0);
    }

    #[test]
    fn test_code_question_returns_template() {
        let embedder = MockEmbedder::default();
        let search = search();
        let generator = MockGenerator::failing();
        let pipeline = Pipeline::new(rules(), &embedder, &search, &generator);

        let state = pipeline
            .run_state(QueryRequest::new("Dame el código de un storage account").with_threshold(0.8))
            .unwrap();
        assert_eq!(state.action, Some(ResponseAction::ReturnTemplate));
        let answer = state.answer.clone().unwrap();
        assert!(answer.contains(CODE));
        assert_eq!(state.sources.len(), 1);
        assert_eq!(state.sources[0].source, "examples/storage/main.tf");
        assert!(generator.prompts().is_empty());
    }

    #[test]
    fn test_explanation_generates_with_sources() {
        let embedder = MockEmbedder::default();
        let search = search();
        let generator = MockGenerator::replying("A storage account is...");
        let pipeline = Pipeline::new(rules(), &embedder, &search, &generator);

        let response = pipeline
            .run(QueryRequest::new("¿Qué es un storage account en Azure?"))
            .unwrap();
        assert_eq!(response.answer, "A storage account is...");
        assert_eq!(response.sources.len(), 2);
        assert!(response.sources[0].score >= response.sources[1].score);
        assert_eq!(
            response.sources[1].metadata.get("reference").and_then(|v| v.as_str()),
            Some("books/azure.pdf#page=12")
        );
    }

    #[test]
    fn test_generation_failure_is_labeled_answer() {
        let embedder = MockEmbedder::default();
        let search = search();
        let generator = MockGenerator::failing();
        let pipeline = Pipeline::new(rules(), &embedder, &search, &generator);

        let response = pipeline
            .run(QueryRequest::new("¿Qué es un storage account en Azure?"))
            .unwrap();
        assert!(response.answer.starts_with(GENERATION_ERROR_LABEL));
    }

    #[test]
    fn test_hybrid_fallback_never_errors() {
        let embedder = MockEmbedder::default();
        let search = search();
        let generator = MockGenerator::failing();
        let pipeline = Pipeline::new(rules(), &embedder, &search, &generator);

        let state = pipeline
            .run_state(QueryRequest::new(
                "Explica qué es un storage account y dame el código",
            ))
            .unwrap();
        assert_eq!(state.action, Some(ResponseAction::HybridResponse));
        let answer = state.answer.unwrap();
        assert!(answer.contains(PROSE));
        assert!(answer.contains("azurerm_storage_account"));
    }

    #[test]
    fn test_embedding_failure_is_labeled_answer() {
        let embedder = MockEmbedder::failing();
        let search = search();
        let generator = MockGenerator::failing();
        let pipeline = Pipeline::new(rules(), &embedder, &search, &generator);

        let response = pipeline
            .run(QueryRequest::new("¿Qué es un storage account en Azure?"))
            .unwrap();
        assert!(response.answer.starts_with(EMBEDDING_ERROR_LABEL));
        assert!(response.sources.is_empty());
    }

    #[test]
    fn test_no_results_clears_early_action() {
        let embedder = MockEmbedder::default();
        let search = ScriptedSearch::new();
        let generator = MockGenerator::replying("unused");
        let pipeline = Pipeline::new(rules(), &embedder, &search, &generator);

        let state = pipeline
            .run_state(QueryRequest::new("Dame el código de un storage account"))
            .unwrap();
        assert_eq!(state.answer.as_deref(), Some(NO_RESULTS_MESSAGE));
        assert!(state.action.is_none());
        assert_eq!(state.outcome(), OUTCOME_NO_RESULTS);
    }

    #[test]
    fn test_embedding_failure_outcome() {
        let embedder = MockEmbedder::failing();
        let search = search();
        let generator = MockGenerator::failing();
        let pipeline = Pipeline::new(rules(), &embedder, &search, &generator);

        let state = pipeline
            .run_state(QueryRequest::new("Dame el código de un storage account"))
            .unwrap();
        assert!(state.action.is_none());
        assert_eq!(state.outcome(), OUTCOME_EMBEDDING_FAILED);
    }

    #[test]
    fn test_rejection_and_strategy_outcomes() {
        let embedder = MockEmbedder::default();
        let search = search();
        let generator = MockGenerator::failing();
        let pipeline = Pipeline::new(rules(), &embedder, &search, &generator);

        let rejected = pipeline.run_state(QueryRequest::new("hola")).unwrap();
        assert_eq!(rejected.outcome(), OUTCOME_REJECTED);

        let template = pipeline
            .run_state(QueryRequest::new("Dame el código de un storage account").with_threshold(0.8))
            .unwrap();
        assert_eq!(template.outcome(), "return_template");
    }

    #[test]
    fn test_no_results_message() {
        let embedder = MockEmbedder::default();
        let search = ScriptedSearch::new().failing("terraform_book");
        let generator = MockGenerator::replying("unused");
        let pipeline = Pipeline::new(rules(), &embedder, &search, &generator);

        let response = pipeline
            .run(QueryRequest::new("¿Qué es un storage account en Azure?"))
            .unwrap();
        assert_eq!(response.answer, NO_RESULTS_MESSAGE);
        assert!(response.sources.is_empty());
        assert!(generator.prompts().is_empty());
    }

    #[test]
    fn test_threshold_filters_sources() {
        let embedder = MockEmbedder::default();
        let search = search();
        let generator = MockGenerator::replying("answer");
        let pipeline = Pipeline::new(rules(), &embedder, &search, &generator);

        let response = pipeline
            .run(QueryRequest::new("¿Qué es un storage account en Azure?").with_threshold(0.85))
            .unwrap();
        assert_eq!(response.sources.len(), 1);
        assert!(response.sources.iter().all(|s| s.score >= 0.85));
    }

    #[test]
    fn test_k_docs_limits_sources() {
        let embedder = MockEmbedder::default();
        let search = search();
        let generator = MockGenerator::replying("answer");
        let pipeline = Pipeline::new(rules(), &embedder, &search, &generator);

        let response = pipeline
            .run(QueryRequest::new("¿Qué es un storage account en Azure?").with_k_docs(1))
            .unwrap();
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].collection, "examples_terraform");
    }

    #[test]
    fn test_invalid_request_is_err() {
        let embedder = MockEmbedder::default();
        let search = search();
        let generator = MockGenerator::replying("answer");
        let pipeline = Pipeline::new(rules(), &embedder, &search, &generator);

        assert!(pipeline.run(QueryRequest::new("")).is_err());
        assert!(pipeline
            .run(QueryRequest::new("terraform azure").with_k_docs(50))
            .is_err());
    }

    #[test]
    fn test_follow_up_is_contextualized() {
        let embedder = MockEmbedder::default();
        let search = search();
        let generator = MockGenerator::replying("¿Qué es un storage account en Azure?");
        let pipeline = Pipeline::new(rules(), &embedder, &search, &generator);

        let request = QueryRequest::new("¿y eso qué es?").with_history(vec![
            ChatMessage::user("Dame un storage account"),
            ChatMessage::assistant("resource \"azurerm_storage_account\" ..."),
        ]);
        let state = pipeline.run_state(request).unwrap();
        assert_eq!(state.original_question, "¿y eso qué es?");
        assert_eq!(state.question, "¿Qué es un storage account en Azure?");
        assert!(state.scope.unwrap().in_scope);
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let embedder = MockEmbedder::default();
        let search = search();
        let generator = MockGenerator::replying("same");
        let pipeline = Pipeline::new(rules(), &embedder, &search, &generator);

        for q in ["hola", "recipe for chocolate cake", "Dame el código de un storage account"] {
            let a = pipeline.run(QueryRequest::new(q)).unwrap();
            let b = pipeline.run(QueryRequest::new(q)).unwrap();
            assert_eq!(a.answer, b.answer, "{q}");
            assert_eq!(a.sources, b.sources, "{q}");
        }
    }

    #[test]
    fn test_strict_relevance_applies_filter() {
        let embedder = MockEmbedder::default();
        let search = search();
        let generator = MockGenerator::replying("answer");
        let options = PipelineOptions {
            strict_relevance: true,
            ..PipelineOptions::default()
        };
        let pipeline =
            Pipeline::new(rules(), &embedder, &search, &generator).with_options(options);

        // Mostly domain vocabulary: keeps hits >= 0.75
        let state = pipeline
            .run_state(QueryRequest::new("terraform azure storage account"))
            .unwrap();
        assert_eq!(state.hits.len(), 2);

        // Generic wording needs 0.85
        let state = pipeline
            .run_state(QueryRequest::new("tell me about the storage thing please"))
            .unwrap();
        assert_eq!(state.hits.len(), 1);
        assert_eq!(state.hits[0].score, 0.88);
    }
}
