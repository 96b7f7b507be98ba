//! Answer formatting: generation, verbatim templates and hybrid answers.

use crate::decision::contains_infra_code;
use crate::errors::RagError;
use crate::retrieval::DocumentHit;

/// Maximum characters of code kept in the hybrid fallback answer.
pub const HYBRID_FALLBACK_CODE_CHARS: usize = 1200;

/// Chunks used per bucket in a hybrid prompt.
pub const HYBRID_CONTEXT_PER_BUCKET: usize = 2;

pub const NO_TEMPLATE_MESSAGE: &str =
    "No template was found for this request. Try describing the resource you need in more detail.";

pub const GENERATION_ERROR_LABEL: &str = "[error] Could not generate an answer";

/// Produces text from a prompt.
pub trait GenerationBackend: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, RagError>;
}

/// Builds the final answer for each response strategy.
pub struct AnswerFormatter<'a> {
    generator: &'a dyn GenerationBackend,
}

impl<'a> AnswerFormatter<'a> {
    pub fn new(generator: &'a dyn GenerationBackend) -> Self {
        Self { generator }
    }

    /// Free-form answer grounded on `hits`. Never fails; a generation error
    /// becomes a labeled answer.
    pub fn generate(&self, question: &str, hits: &[DocumentHit]) -> String {
        let prompt = answer_prompt(question, hits);
        match self.complete(&prompt) {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("Generation failed: {}", e);
                format!("{}: {}", GENERATION_ERROR_LABEL, e)
            }
        }
    }

    /// Verbatim template answer with source attribution.
    pub fn template(&self, hit: Option<&DocumentHit>) -> String {
        let Some(hit) = hit.filter(|h| !h.content.trim().is_empty()) else {
            return NO_TEMPLATE_MESSAGE.to_string();
        };
        let mut out = String::from("Here is a template that matches your request:\n\n");
        out.push_str(&fence_hcl(&hit.content));
        out.push_str("\n\n");
        out.push_str(&attribution(hit));
        out
    }

    /// Explanation followed by code. Falls back to the best chunks verbatim
    /// when generation fails.
    pub fn hybrid(&self, question: &str, hits: &[DocumentHit]) -> String {
        let (code, explanation) = partition_hits(hits);
        let prompt = hybrid_prompt(question, &explanation, &code);
        match self.complete(&prompt) {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("Hybrid generation failed, using retrieved chunks: {}", e);
                hybrid_fallback(&explanation, &code)
            }
        }
    }

    /// Trimmed completion. A blank completion counts as a failure.
    fn complete(&self, prompt: &str) -> Result<String, RagError> {
        let answer = self.generator.generate(prompt)?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(RagError::GenerationFailed {
                reason: "empty completion".to_string(),
            });
        }
        Ok(answer.to_string())
    }
}

/// Split hits into code and explanation buckets. An empty bucket is filled
/// with the hits in their original order.
pub fn partition_hits(hits: &[DocumentHit]) -> (Vec<&DocumentHit>, Vec<&DocumentHit>) {
    let (mut code, mut explanation): (Vec<&DocumentHit>, Vec<&DocumentHit>) =
        hits.iter().partition(|h| contains_infra_code(&h.content));
    if code.is_empty() {
        code = hits.iter().collect();
    }
    if explanation.is_empty() {
        explanation = hits.iter().collect();
    }
    (code, explanation)
}

pub fn answer_prompt(question: &str, hits: &[DocumentHit]) -> String {
    let context = hits
        .iter()
        .map(|h| h.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Answer the question using the context below. Reply in the language of the question.\n\n\
         Context:\n{}\n\n\
         Question: {}\n\n\
         Answer:",
        context, question
    )
}

fn hybrid_prompt(question: &str, explanation: &[&DocumentHit], code: &[&DocumentHit]) -> String {
    let join = |hits: &[&DocumentHit]| {
        hits.iter()
            .take(HYBRID_CONTEXT_PER_BUCKET)
            .map(|h| h.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    };
    format!(
        "The question asks for an explanation and for code. First explain the concepts \
         using the documentation, then show the code using the examples. \
         Reply in the language of the question.\n\n\
         Documentation:\n{}\n\n\
         Code examples:\n{}\n\n\
         Question: {}\n\n\
         Answer:",
        join(explanation),
        join(code),
        question
    )
}

fn hybrid_fallback(explanation: &[&DocumentHit], code: &[&DocumentHit]) -> String {
    let mut parts = Vec::new();
    if let Some(first) = explanation.first() {
        parts.push(first.content.trim().to_string());
    }
    if let Some(first) = code.first() {
        parts.push(fence_hcl(&truncate_chars(&first.content, HYBRID_FALLBACK_CODE_CHARS)));
    }
    if parts.is_empty() {
        return NO_TEMPLATE_MESSAGE.to_string();
    }
    parts.join("\n\n")
}

fn fence_hcl(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.starts_with("```") {
        trimmed.to_string()
    } else {
        format!("```hcl\n{}\n```", trimmed)
    }
}

fn attribution(hit: &DocumentHit) -> String {
    match hit.reference() {
        Some(reference) if reference != hit.source => {
            format!("Source: {} ({})", hit.source, reference)
        }
        _ => format!("Source: {}", hit.source),
    }
}

/// Truncate to `max` characters, marking the cut with `...`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}
