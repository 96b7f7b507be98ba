//! Response strategy selection and routing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::intent::ResponseAction;
use crate::retrieval::DocumentHit;
use crate::rules::ClassifierRules;

/// Substrings that mark a chunk as infrastructure code.
pub const INFRA_CODE_MARKERS: [&str; 8] = [
    "resource ",
    "variable ",
    "output ",
    "module ",
    "provider ",
    "terraform {",
    "data ",
    "locals {",
];

/// Whether `content` looks like infrastructure code.
pub fn contains_infra_code(content: &str) -> bool {
    !content.is_empty() && INFRA_CODE_MARKERS.iter().any(|m| content.contains(m))
}

/// Terminal stage selected by the decider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Generate,
    FormatTemplate,
    FormatHybrid,
}

/// Map an action to its terminal stage. No action means generation.
pub fn route(action: Option<ResponseAction>) -> Route {
    match action {
        Some(ResponseAction::ReturnTemplate) => Route::FormatTemplate,
        Some(ResponseAction::HybridResponse) => Route::FormatHybrid,
        Some(ResponseAction::GenerateAnswer) | None => Route::Generate,
    }
}

/// Route from an action name; unknown names route to generation.
pub fn route_name(action: &str) -> Route {
    route(action.parse().ok())
}

/// Final decision: the action and, for templates, the chosen hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: ResponseAction,
    pub template: Option<DocumentHit>,
}

/// Picks the response strategy from intent and hit quality.
#[derive(Debug, Clone)]
pub struct ResponseDecider {
    rules: Arc<ClassifierRules>,
}

impl ResponseDecider {
    pub fn new(rules: Arc<ClassifierRules>) -> Self {
        Self { rules }
    }

    pub fn decide(
        &self,
        intent: &str,
        is_multi_intent: bool,
        hits: &[DocumentHit],
        incoming: Option<ResponseAction>,
        threshold: f32,
    ) -> Decision {
        if is_multi_intent || incoming == Some(ResponseAction::HybridResponse) {
            return Decision {
                action: ResponseAction::HybridResponse,
                template: None,
            };
        }

        if self.rules.is_code_intent(intent) {
            if let Some(hit) = best_template(hits, threshold) {
                tracing::debug!(score = hit.score, source = %hit.source, "Template found");
                return Decision {
                    action: ResponseAction::ReturnTemplate,
                    template: Some(hit.clone()),
                };
            }
            tracing::debug!(
                best_score = hits.first().map(|h| h.score).unwrap_or(0.0),
                "No template at or above {:.2}",
                threshold
            );
        }

        Decision {
            action: ResponseAction::GenerateAnswer,
            template: None,
        }
    }
}

/// First hit, in score order, that clears the threshold and holds code.
pub fn best_template(hits: &[DocumentHit], threshold: f32) -> Option<&DocumentHit> {
    hits.iter()
        .find(|h| h.score >= threshold && contains_infra_code(&h.content))
}
