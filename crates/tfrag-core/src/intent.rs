//! Weighted intent classification.
//!
//! Every category is scored against the normalized query:
//! `weight * (keywords found + 1.5 * patterns matched)`. The highest score
//! wins; ties go to the category declared first, and an all-zero map falls
//! back to the configured default intent.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::RagError;
use crate::rules::{ClassifierRules, PATTERN_MATCH_SCORE};
use crate::text::normalize;

/// Response strategy chosen for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseAction {
    GenerateAnswer,
    ReturnTemplate,
    HybridResponse,
}

impl ResponseAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseAction::GenerateAnswer => "generate_answer",
            ResponseAction::ReturnTemplate => "return_template",
            ResponseAction::HybridResponse => "hybrid_response",
        }
    }
}

impl fmt::Display for ResponseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseAction {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "generate_answer" => Ok(ResponseAction::GenerateAnswer),
            "return_template" => Ok(ResponseAction::ReturnTemplate),
            "hybrid_response" => Ok(ResponseAction::HybridResponse),
            other => Err(RagError::InvalidArgument(format!(
                "unknown response action `{}`",
                other
            ))),
        }
    }
}

/// Per-category scores, in declaration order.
pub type IntentScoreMap = Vec<(String, f64)>;

/// Result of [`IntentClassifier::classify`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResult {
    pub primary_intent: String,
    pub all_intents_found: Vec<String>,
    pub is_multi_intent: bool,
    pub action: ResponseAction,
    pub scores: IntentScoreMap,
    /// Preferred collection of the primary intent, if it declares one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_collection: Option<String>,
}

impl IntentResult {
    pub fn score_of(&self, intent: &str) -> f64 {
        self.scores
            .iter()
            .find(|(name, _)| name == intent)
            .map(|(_, s)| *s)
            .unwrap_or(0.0)
    }
}

/// Scores queries against the configured intent categories.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    rules: Arc<ClassifierRules>,
}

impl IntentClassifier {
    pub fn new(rules: Arc<ClassifierRules>) -> Self {
        Self { rules }
    }

    /// Score every category against `query`.
    pub fn scores(&self, query: &str) -> IntentScoreMap {
        let text = normalize(query);
        self.rules
            .categories
            .iter()
            .map(|category| {
                let keyword_hits = category
                    .keywords
                    .iter()
                    .filter(|kw| !kw.is_empty() && text.contains(kw.as_str()))
                    .count() as f64;
                let pattern_hits = category
                    .patterns
                    .iter()
                    .filter(|p| p.is_match(&text))
                    .count() as f64;
                let score = category.weight * (keyword_hits + PATTERN_MATCH_SCORE * pattern_hits);
                (category.name.clone(), score)
            })
            .collect()
    }

    pub fn classify(&self, query: &str) -> IntentResult {
        let scores = self.scores(query);

        // Strictly greater keeps the first-declared category on ties.
        let mut best: Option<(&str, f64)> = None;
        for (name, score) in &scores {
            if *score > 0.0 && best.is_none_or(|(_, top)| *score > top) {
                best = Some((name.as_str(), *score));
            }
        }
        let primary_intent = best
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| self.rules.default_intent.clone());

        let positive: Vec<String> = scores
            .iter()
            .filter(|(_, s)| *s > 0.0)
            .map(|(name, _)| name.clone())
            .collect();
        let lowered = query.to_lowercase();
        let has_connector = self
            .rules
            .multi_intent_connectors
            .iter()
            .any(|c| lowered.contains(c.as_str()));
        let is_multi_intent = has_connector && positive.len() >= 2;

        let action = if is_multi_intent {
            ResponseAction::HybridResponse
        } else if self.rules.is_explanation_intent(&primary_intent) {
            ResponseAction::GenerateAnswer
        } else {
            ResponseAction::ReturnTemplate
        };

        let all_intents_found = if is_multi_intent {
            positive
        } else {
            vec![primary_intent.clone()]
        };
        let preferred_collection = self
            .rules
            .category(&primary_intent)
            .and_then(|c| c.collection.clone());

        tracing::debug!(
            intent = %primary_intent,
            multi = is_multi_intent,
            action = %action,
            "Classified query"
        );

        IntentResult {
            primary_intent,
            all_intents_found,
            is_multi_intent,
            action,
            scores,
            preferred_collection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> IntentClassifier {
        IntentClassifier::new(Arc::new(ClassifierRules::builtin().unwrap()))
    }

    fn inline(yaml: &str) -> IntentClassifier {
        IntentClassifier::new(Arc::new(ClassifierRules::from_yaml_str(yaml, "inline").unwrap()))
    }

    #[test]
    fn test_explanation_query() {
        let result = classifier().classify("¿Qué es el state de Terraform?");
        assert_eq!(result.primary_intent, "explanation");
        assert_eq!(result.action, ResponseAction::GenerateAnswer);
        assert!(!result.is_multi_intent);
        assert_eq!(result.all_intents_found, vec!["explanation"]);
        assert_eq!(result.preferred_collection.as_deref(), Some("terraform_book"));
    }

    #[test]
    fn test_code_query() {
        let result = classifier().classify("Dame el código de un storage account");
        assert_eq!(result.primary_intent, "code_template");
        assert_eq!(result.action, ResponseAction::ReturnTemplate);
    }

    #[test]
    fn test_multi_intent_needs_connector() {
        let with = classifier().classify("Explica qué es un storage account y dame el código");
        assert!(with.is_multi_intent);
        assert_eq!(with.action, ResponseAction::HybridResponse);
        assert!(with.all_intents_found.len() >= 2);

        let without = classifier().classify("Explica qué es un storage account, dame el código");
        assert!(!without.is_multi_intent);
        assert_eq!(without.all_intents_found.len(), 1);
    }

    #[test]
    fn test_connector_alone_is_not_multi_intent() {
        let c = inline(
            r#"
intentPatterns:
  - name: code_template
    keywords: [code]
  - name: explanation
    explanation: true
    keywords: [explain]
multiIntentConnectors: [" and "]
"#,
        );
        let result = c.classify("code and more code");
        assert!(!result.is_multi_intent);
        assert_eq!(result.action, ResponseAction::ReturnTemplate);
    }

    #[test]
    fn test_all_zero_falls_back_to_default() {
        let result = classifier().classify("zzz qqq");
        assert_eq!(result.primary_intent, "code_template");
        assert!(result.scores.iter().all(|(_, s)| *s == 0.0));
        assert_eq!(result.action, ResponseAction::ReturnTemplate);
    }

    #[test]
    fn test_ties_go_to_first_declared() {
        let c = inline(
            r#"
defaultIntent: alpha
intentPatterns:
  - name: alpha
    keywords: [shared]
  - name: beta
    keywords: [shared]
"#,
        );
        assert_eq!(c.classify("shared word").primary_intent, "alpha");
    }

    #[test]
    fn test_weighted_scores() {
        let c = inline(
            r#"
defaultIntent: light
intentPatterns:
  - name: light
    weight: 1.0
    keywords: [vm]
  - name: heavy
    weight: 2.0
    keywords: [vm]
    patterns: ['\bvm\b']
"#,
        );
        let result = c.classify("Create a VM");
        assert_eq!(result.score_of("light"), 1.0);
        assert_eq!(result.score_of("heavy"), 2.0 * (1.0 + 1.5));
        assert_eq!(result.primary_intent, "heavy");
    }

    #[test]
    fn test_classify_is_deterministic() {
        let c = classifier();
        let q = "Ejemplo completo de AKS con terraform y explica los módulos";
        let first = c.classify(q);
        for _ in 0..5 {
            assert_eq!(c.classify(q), first);
        }
    }

    #[test]
    fn test_response_action_round_trip_names() {
        for action in [
            ResponseAction::GenerateAnswer,
            ResponseAction::ReturnTemplate,
            ResponseAction::HybridResponse,
        ] {
            assert_eq!(action.to_string().parse::<ResponseAction>().unwrap(), action);
        }
        assert!("teleport".parse::<ResponseAction>().is_err());
    }
}
