//! Scope gate: decides whether a query belongs to the assistant's domain.
//!
//! ## Flow
//!
//! 1. Lowercase and strip accents for conversational pattern matching
//! 2. Reject bare greetings, thanks and farewells
//! 3. Reject queries with fewer than two word tokens
//! 4. Count distinct tokens found in the domain vocabulary
//! 5. Enforce the configured minimum of domain terms
//! 6. Accept on any domain term, or on three or more tokens

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::rules::ClassifierRules;
use crate::text::{normalize, tokenize};

/// Minimum token count for a query to be considered at all.
pub const MIN_QUERY_TOKENS: usize = 2;

/// Token count at which a query without domain terms is still accepted.
pub const CONTEXT_TOKENS: usize = 3;

/// Why a query was accepted or rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScopeReason {
    /// Matched an out-of-scope pattern.
    Conversational,
    TooShort,
    InsufficientTerms { found: usize, required: usize },
    /// Accepted: contains this many domain terms.
    DomainTerms { count: usize },
    /// Accepted: no domain terms but enough words.
    EnoughContext,
    TooGeneric,
}

impl ScopeReason {
    pub fn message_key(&self) -> &'static str {
        match self {
            ScopeReason::Conversational => "conversational",
            ScopeReason::TooShort => "too_short",
            ScopeReason::InsufficientTerms { .. } => "insufficient_terms",
            ScopeReason::DomainTerms { .. } => "valid",
            ScopeReason::EnoughContext => "no_keywords_context",
            ScopeReason::TooGeneric => "too_generic",
        }
    }

    fn fallback_message(&self) -> &'static str {
        match self {
            ScopeReason::Conversational => "Query looks conversational, not technical",
            ScopeReason::TooShort => "Query is too short (at least 2 words are needed)",
            ScopeReason::InsufficientTerms { .. } => {
                "Query lacks technical terms (found: {found}, required: {required})"
            }
            ScopeReason::DomainTerms { .. } => "Valid query with {count} technical terms",
            ScopeReason::EnoughContext => "Query has no domain keywords but enough context",
            ScopeReason::TooGeneric => "Query is too generic and has no technical terms",
        }
    }

    fn placeholders(&self) -> Vec<(&'static str, String)> {
        match self {
            ScopeReason::InsufficientTerms { found, required } => {
                vec![("found", found.to_string()), ("required", required.to_string())]
            }
            ScopeReason::DomainTerms { count } => vec![("count", count.to_string())],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for ScopeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut text = self.fallback_message().to_string();
        for (name, value) in self.placeholders() {
            text = text.replace(&format!("{{{}}}", name), &value);
        }
        f.write_str(&text)
    }
}

/// Outcome of [`ScopeGate::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeDecision {
    pub in_scope: bool,
    pub reason: ScopeReason,
    /// Reason rendered from the configured validation messages.
    pub message: String,
}

/// Which rejection message table applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    Greeting,
    Generic,
}

/// Domain scope gate.
#[derive(Debug, Clone)]
pub struct ScopeGate {
    rules: Arc<ClassifierRules>,
}

impl ScopeGate {
    pub fn new(rules: Arc<ClassifierRules>) -> Self {
        Self { rules }
    }

    /// Decide whether `query` is in scope.
    pub fn evaluate(&self, query: &str) -> ScopeDecision {
        let reason = self.reason_for(query);
        let in_scope = matches!(
            reason,
            ScopeReason::DomainTerms { .. } | ScopeReason::EnoughContext
        );
        let message = self.rules.validation_message(
            reason.message_key(),
            reason.fallback_message(),
            &reason.placeholders(),
        );
        ScopeDecision {
            in_scope,
            reason,
            message,
        }
    }

    fn reason_for(&self, query: &str) -> ScopeReason {
        let folded = normalize(query.trim());
        if self
            .rules
            .out_of_scope_patterns
            .iter()
            .any(|p| p.is_match(&folded))
        {
            return ScopeReason::Conversational;
        }

        let tokens = tokenize(query);
        if tokens.len() < MIN_QUERY_TOKENS {
            return ScopeReason::TooShort;
        }

        let overlap = self.domain_overlap(&tokens);
        let required = self.rules.min_domain_keywords;
        if required > 0 && overlap < required {
            return ScopeReason::InsufficientTerms {
                found: overlap,
                required,
            };
        }
        if overlap > 0 {
            return ScopeReason::DomainTerms { count: overlap };
        }
        if tokens.len() >= CONTEXT_TOKENS {
            return ScopeReason::EnoughContext;
        }
        ScopeReason::TooGeneric
    }

    /// Number of distinct tokens that are domain keywords.
    pub fn domain_overlap(&self, tokens: &[String]) -> usize {
        let unique: HashSet<&String> = tokens.iter().collect();
        unique
            .into_iter()
            .filter(|t| self.rules.domain_keywords.contains(*t))
            .count()
    }

    pub fn rejection_kind(&self, query: &str) -> RejectionKind {
        if self.rules.greeting_pattern.is_match(&normalize(query)) {
            RejectionKind::Greeting
        } else {
            RejectionKind::Generic
        }
    }

    /// User-facing answer for a rejected query.
    ///
    /// List-valued messages are picked by hashing the normalized query, so the
    /// same query always gets the same message.
    pub fn rejection_message(&self, query: &str) -> String {
        let seed = normalize(query.trim());
        let messages = &self.rules.rejection_messages;
        let picked = match self.rejection_kind(query) {
            RejectionKind::Greeting => messages
                .greeting
                .pick(&seed)
                .or_else(|| messages.generic.pick(&seed)),
            RejectionKind::Generic => messages.generic.pick(&seed),
        };
        picked
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_REJECTION_MESSAGE.to_string())
    }
}

/// Used when the rules define no rejection messages.
pub const DEFAULT_REJECTION_MESSAGE: &str =
    "I can only help with infrastructure-as-code questions. Please rephrase with more technical detail.";
