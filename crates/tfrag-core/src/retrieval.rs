//! Multi-collection retrieval.
//!
//! ## Flow
//!
//! 1. Embed the query once
//! 2. Search each collection for its top `k_per_collection` points
//! 3. Drop points below the threshold and build [`DocumentHit`]s
//! 4. Merge, sort by score descending and truncate
//!
//! A collection that fails to search is logged and skipped. Only an embedding
//! failure is returned as an error.

use std::cmp::Ordering;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tfrag_db::collection::ChunkPayload;

use crate::errors::RagError;
use crate::rules::ClassifierRules;
use crate::scope::ScopeGate;
use crate::text::tokenize;

/// Metadata keys that may carry the source path, in priority order.
pub const PATH_KEYS: [&str; 4] = ["path", "doc_path", "source", "file"];

/// Minimum score for queries with enough domain vocabulary.
pub const DEFAULT_MIN_SCORE: f32 = 0.75;

/// Minimum share of domain tokens for a query to count as domain-specific.
pub const DEFAULT_MIN_DOMAIN_OVERLAP: f32 = 0.3;

/// Minimum score for generic queries.
pub const GENERIC_QUERY_MIN_SCORE: f32 = 0.85;

pub const UNKNOWN_SOURCE: &str = "unknown";

// ============================================================================
// Collaborator traits
// ============================================================================

/// Computes query embeddings.
pub trait EmbeddingBackend: Send + Sync {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError>;
}

/// Top-K similarity search over named collections.
pub trait SearchBackend: Send + Sync {
    /// Return up to `limit` `(score, payload)` pairs, best first.
    fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<(f32, ChunkPayload)>, RagError>;
}

// ============================================================================
// DocumentHit
// ============================================================================

/// A retrieved chunk with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentHit {
    pub content: String,
    pub metadata: Map<String, Value>,
    pub score: f32,
    /// Source path, or `"unknown"`.
    pub source: String,
    pub collection: String,
}

impl DocumentHit {
    /// Build a hit from a search result, enriching its metadata.
    pub fn from_payload(collection: &str, score: f32, payload: ChunkPayload) -> Self {
        let mut metadata = payload.metadata;
        let path = resolve_path(&metadata);

        if !path.is_empty() && !metadata.contains_key("path") {
            metadata.insert("path".to_string(), Value::String(path.clone()));
        }

        let has_section = metadata
            .get("section")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty());
        if !has_section {
            if let Some(section) = infer_section(&path) {
                metadata.insert("section".to_string(), Value::String(section));
            }
        }

        let page = metadata.get("page").and_then(value_as_page);
        let pages = page.clone().unwrap_or_else(|| "-".to_string());
        metadata.insert("pages".to_string(), Value::String(pages));

        if !path.is_empty() {
            metadata.insert(
                "reference".to_string(),
                Value::String(build_reference(&path, page.as_deref())),
            );
        }
        metadata.insert(
            "collection".to_string(),
            Value::String(collection.to_string()),
        );

        let source = if path.is_empty() {
            UNKNOWN_SOURCE.to_string()
        } else {
            path
        };

        Self {
            content: payload.page_content,
            metadata,
            score,
            source,
            collection: collection.to_string(),
        }
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn reference(&self) -> Option<&str> {
        self.meta_str("reference")
    }
}

fn resolve_path(metadata: &Map<String, Value>) -> String {
    PATH_KEYS
        .iter()
        .filter_map(|k| metadata.get(*k).and_then(Value::as_str))
        .find(|p| !p.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Penultimate path component, e.g. `"networking"` for `"a/networking/main.tf"`.
fn infer_section(path: &str) -> Option<String> {
    let parts: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() >= 2 {
        Some(parts[parts.len() - 2].to_string())
    } else {
        None
    }
}

fn value_as_page(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// `path#page=N` when a page number is known, the plain path otherwise.
pub fn build_reference(path: &str, page: Option<&str>) -> String {
    match page {
        Some(p) => format!("{}#page={}", path, p),
        None => path.to_string(),
    }
}

// ============================================================================
// Retriever
// ============================================================================

/// Fans a query out across collections and merges the results.
pub struct Retriever<'a> {
    embedder: &'a dyn EmbeddingBackend,
    search: &'a dyn SearchBackend,
    gate: Option<&'a ScopeGate>,
}

impl<'a> Retriever<'a> {
    pub fn new(embedder: &'a dyn EmbeddingBackend, search: &'a dyn SearchBackend) -> Self {
        Self {
            embedder,
            search,
            gate: None,
        }
    }

    /// Re-check scope before searching. Out-of-scope queries return no hits.
    pub fn with_scope_gate(mut self, gate: &'a ScopeGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Retrieve hits scoring at least `threshold`, best first, at most
    /// `k_per_collection * collections.len()` of them.
    pub fn retrieve(
        &self,
        query: &str,
        collections: &[String],
        k_per_collection: usize,
        threshold: f32,
    ) -> Result<Vec<DocumentHit>, RagError> {
        if let Some(gate) = self.gate {
            let decision = gate.evaluate(query);
            if !decision.in_scope {
                tracing::debug!("Retrieval skipped: {}", decision.message);
                return Ok(Vec::new());
            }
        }
        if collections.is_empty() || k_per_collection == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed_query(query)?;

        let mut hits = Vec::new();
        let mut failed = 0usize;
        for collection in collections {
            let start = Instant::now();
            match self.search.search(collection, &vector, k_per_collection) {
                Ok(points) => {
                    let before = hits.len();
                    hits.extend(
                        points
                            .into_iter()
                            .take(k_per_collection)
                            .filter(|(score, _)| *score >= threshold)
                            .map(|(score, payload)| {
                                DocumentHit::from_payload(collection, score, payload)
                            }),
                    );
                    tracing::debug!(
                        collection = %collection,
                        kept = hits.len() - before,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Searched collection"
                    );
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!("Skipping collection '{}': {}", collection, e);
                }
            }
        }
        if failed == collections.len() {
            tracing::warn!("All {} collections failed to search", failed);
        }

        // Stable sort keeps collection order on equal scores.
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(k_per_collection * collections.len());
        Ok(hits)
    }
}

/// Keep hits whose score suits how domain-specific the query is.
///
/// Queries where at least `min_domain_overlap` of the tokens are domain
/// keywords keep hits scoring `min_score` or more; other queries need
/// [`GENERIC_QUERY_MIN_SCORE`].
pub fn filter_by_relevance(
    rules: &ClassifierRules,
    query: &str,
    hits: Vec<DocumentHit>,
    min_score: f32,
    min_domain_overlap: f32,
) -> Vec<DocumentHit> {
    let tokens = tokenize(query);
    let ratio = if tokens.is_empty() {
        0.0
    } else {
        let domain = tokens
            .iter()
            .filter(|t| rules.domain_keywords.contains(*t))
            .count();
        domain as f32 / tokens.len() as f32
    };
    let cutoff = if ratio >= min_domain_overlap {
        min_score
    } else {
        GENERIC_QUERY_MIN_SCORE
    };
    hits.into_iter().filter(|h| h.score >= cutoff).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{hit_payload, MockEmbedder, ScriptedSearch};
    use std::sync::Arc;

    fn collections(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_payload_enriches_metadata() {
        let payload = ChunkPayload::new("resource \"azurerm_resource_group\" \"rg\" {}")
            .with_meta("doc_path", "examples/networking/main.tf");
        let hit = DocumentHit::from_payload("examples_terraform", 0.9, payload);

        assert_eq!(hit.source, "examples/networking/main.tf");
        assert_eq!(hit.meta_str("path"), Some("examples/networking/main.tf"));
        assert_eq!(hit.meta_str("section"), Some("networking"));
        assert_eq!(hit.meta_str("pages"), Some("-"));
        assert_eq!(hit.meta_str("collection"), Some("examples_terraform"));
        assert_eq!(hit.reference(), Some("examples/networking/main.tf"));
    }

    #[test]
    fn test_paged_reference() {
        let payload = ChunkPayload::new("text")
            .with_meta("source", "books/terraform.pdf")
            .with_meta("page", 42)
            .with_meta("section", "state");
        let hit = DocumentHit::from_payload("terraform_book", 0.5, payload);
        assert_eq!(hit.reference(), Some("books/terraform.pdf#page=42"));
        assert_eq!(hit.meta_str("pages"), Some("42"));
        assert_eq!(hit.meta_str("section"), Some("state"));
    }

    #[test]
    fn test_pdf_without_page_has_plain_reference() {
        let payload = ChunkPayload::new("text").with_meta("source", "books/terraform.pdf");
        let hit = DocumentHit::from_payload("terraform_book", 0.9, payload);
        assert_eq!(hit.reference(), Some("books/terraform.pdf"));
        assert_eq!(hit.meta_str("pages"), Some("-"));
    }

    #[test]
    fn test_missing_path_is_unknown() {
        let hit = DocumentHit::from_payload("c", 0.5, ChunkPayload::new("text"));
        assert_eq!(hit.source, UNKNOWN_SOURCE);
        assert!(hit.reference().is_none());
        assert!(hit.meta_str("section").is_none());
    }

    #[test]
    fn test_build_reference() {
        assert_eq!(build_reference("a.pdf", None), "a.pdf");
        assert_eq!(build_reference("a.md", Some("3")), "a.md#page=3");
        assert_eq!(build_reference("a.tf", None), "a.tf");
    }

    #[test]
    fn test_retrieve_merges_filters_and_sorts() {
        let search = ScriptedSearch::new()
            .with_hits(
                "book",
                vec![(0.9, hit_payload("b1")), (0.5, hit_payload("b2")), (0.1, hit_payload("b3"))],
            )
            .with_hits("code", vec![(0.7, hit_payload("c1")), (0.05, hit_payload("c2"))]);
        let embedder = MockEmbedder::default();
        let retriever = Retriever::new(&embedder, &search);

        let hits = retriever
            .retrieve("storage account azure", &collections(&["book", "code"]), 3, 0.2)
            .unwrap();

        let contents: Vec<&str> = hits.iter().map(|h| h.content.as_str()).collect();
        assert_eq!(contents, vec!["b1", "c1", "b2"]);
        assert!(hits.iter().all(|h| h.score >= 0.2));
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(embedder.calls(), 1);
    }

    #[test]
    fn test_ties_keep_collection_order() {
        let search = ScriptedSearch::new()
            .with_hits("first", vec![(0.8, hit_payload("f"))])
            .with_hits("second", vec![(0.8, hit_payload("s"))]);
        let embedder = MockEmbedder::default();
        let hits = Retriever::new(&embedder, &search)
            .retrieve("q", &collections(&["first", "second"]), 2, 0.0)
            .unwrap();
        assert_eq!(hits[0].collection, "first");
        assert_eq!(hits[1].collection, "second");
    }

    #[test]
    fn test_length_is_capped() {
        let many: Vec<(f32, ChunkPayload)> =
            (0..10).map(|i| (0.9 - i as f32 * 0.01, hit_payload("x"))).collect();
        let search = ScriptedSearch::new().with_hits("a", many);
        let embedder = MockEmbedder::default();
        let hits = Retriever::new(&embedder, &search)
            .retrieve("q", &collections(&["a"]), 4, 0.0)
            .unwrap();
        assert_eq!(hits.len(), 4);
    }

    #[test]
    fn test_failing_collection_is_skipped() {
        let search = ScriptedSearch::new()
            .with_hits("good", vec![(0.6, hit_payload("ok"))])
            .failing("bad");
        let embedder = MockEmbedder::default();
        let hits = Retriever::new(&embedder, &search)
            .retrieve("q", &collections(&["bad", "good"]), 3, 0.2)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].collection, "good");
    }

    #[test]
    fn test_all_collections_failing_is_empty() {
        let search = ScriptedSearch::new().failing("a").failing("b");
        let embedder = MockEmbedder::default();
        let hits = Retriever::new(&embedder, &search)
            .retrieve("q", &collections(&["a", "b"]), 3, 0.2)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_embedding_failure_is_an_error() {
        let search = ScriptedSearch::new();
        let embedder = MockEmbedder::failing();
        let result = Retriever::new(&embedder, &search).retrieve("q", &collections(&["a"]), 3, 0.2);
        assert!(matches!(result, Err(RagError::EmbeddingFailed { .. })));
    }

    #[test]
    fn test_scope_recheck_skips_search() {
        let rules = Arc::new(ClassifierRules::builtin().unwrap());
        let gate = ScopeGate::new(rules);
        let search = ScriptedSearch::new().with_hits("a", vec![(0.9, hit_payload("x"))]);
        let embedder = MockEmbedder::default();
        let hits = Retriever::new(&embedder, &search)
            .with_scope_gate(&gate)
            .retrieve("hola", &collections(&["a"]), 3, 0.0)
            .unwrap();
        assert!(hits.is_empty());
        assert_eq!(embedder.calls(), 0);
    }

    #[test]
    fn test_filter_by_relevance() {
        let rules = ClassifierRules::builtin().unwrap();
        let hits = vec![
            DocumentHit::from_payload("a", 0.9, hit_payload("high")),
            DocumentHit::from_payload("a", 0.8, hit_payload("mid")),
            DocumentHit::from_payload("a", 0.5, hit_payload("low")),
        ];

        let domain = filter_by_relevance(
            &rules,
            "terraform azure storage",
            hits.clone(),
            DEFAULT_MIN_SCORE,
            DEFAULT_MIN_DOMAIN_OVERLAP,
        );
        assert_eq!(domain.len(), 2);

        let generic = filter_by_relevance(
            &rules,
            "tell me about chocolate cake recipes please",
            hits,
            DEFAULT_MIN_SCORE,
            DEFAULT_MIN_DOMAIN_OVERLAP,
        );
        assert_eq!(generic.len(), 1);
        assert_eq!(generic[0].content, "high");
    }
}
