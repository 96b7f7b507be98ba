//! Classifier rules: intent categories, domain vocabulary, out-of-scope
//! patterns and user-facing messages.
//!
//! Rules are read from YAML once and compiled into an immutable
//! [`ClassifierRules`] value. Built-in defaults ship with the crate; a custom
//! file can replace them wholesale.
//!
//! # Example YAML
//!
//! ```yaml
//! defaultIntent: code_template
//! intentPatterns:
//!   - name: code_template
//!     weight: 1.0
//!     keywords: [code, template]
//!     patterns: ['\bresource\s+"?azurerm_']
//!   - name: explanation
//!     weight: 1.0
//!     explanation: true
//!     keywords: [what is, explain]
//! domainKeywords: [terraform, azure]
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::errors::RagError;
use crate::text::{normalize, strip_diacritics};

/// Built-in rules, embedded at compile time.
pub const BUILTIN_RULES_YAML: &str = include_str!("../config/classification_rules.yaml");

/// Source name reported for the embedded rules.
pub const BUILTIN_RULES_SOURCE: &str = "built-in";

pub const DEFAULT_INTENT: &str = "code_template";

pub const DEFAULT_GREETING_PATTERN: &str = r"\b(hola|hi|hello|hey)\b";

pub const DEFAULT_MIN_DOMAIN_KEYWORDS: usize = 1;

/// Score added per matching regex pattern, before weighting.
pub const PATTERN_MATCH_SCORE: f64 = 1.5;

// ============================================================================
// YAML schema
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RulesFile {
    #[serde(default)]
    intent_patterns: Vec<IntentCategoryDef>,
    #[serde(default = "default_intent")]
    default_intent: String,
    #[serde(default = "default_code_intents")]
    code_intents: Vec<String>,
    #[serde(default)]
    multi_intent_connectors: Vec<String>,
    #[serde(default)]
    domain_keywords: Vec<String>,
    #[serde(default)]
    out_of_scope_patterns: Vec<String>,
    #[serde(default = "default_greeting_pattern")]
    greeting_pattern: String,
    #[serde(default = "default_min_domain_keywords")]
    min_domain_keywords: usize,
    #[serde(default)]
    rejection_messages: RejectionMessages,
    #[serde(default)]
    validation_messages: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntentCategoryDef {
    name: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    patterns: Vec<String>,
    #[serde(default = "default_weight")]
    weight: f64,
    #[serde(default)]
    collection: Option<String>,
    #[serde(default)]
    explanation: bool,
}

fn default_intent() -> String {
    DEFAULT_INTENT.to_string()
}

fn default_code_intents() -> Vec<String> {
    vec!["code_template".to_string(), "full_example".to_string()]
}

fn default_greeting_pattern() -> String {
    DEFAULT_GREETING_PATTERN.to_string()
}

fn default_min_domain_keywords() -> usize {
    DEFAULT_MIN_DOMAIN_KEYWORDS
}

fn default_weight() -> f64 {
    1.0
}

// ============================================================================
// Messages
// ============================================================================

/// One message, or several variants to choose from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageSet {
    One(String),
    Many(Vec<String>),
}

impl Default for MessageSet {
    fn default() -> Self {
        MessageSet::Many(Vec::new())
    }
}

impl MessageSet {
    /// Pick a message. The same `seed` always yields the same variant.
    pub fn pick(&self, seed: &str) -> Option<&str> {
        match self {
            MessageSet::One(msg) => Some(msg.as_str()),
            MessageSet::Many(list) if list.is_empty() => None,
            MessageSet::Many(list) => {
                let idx = (fnv1a(seed.as_bytes()) % list.len() as u64) as usize;
                Some(list[idx].as_str())
            }
        }
    }

    pub fn variants(&self) -> Vec<&str> {
        match self {
            MessageSet::One(msg) => vec![msg.as_str()],
            MessageSet::Many(list) => list.iter().map(String::as_str).collect(),
        }
    }
}

/// 64-bit FNV-1a. Stable across builds, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325_u64, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

/// Rejection messages by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionMessages {
    #[serde(default)]
    pub greeting: MessageSet,
    #[serde(default)]
    pub generic: MessageSet,
}

// ============================================================================
// Compiled rules
// ============================================================================

/// A compiled intent category.
#[derive(Debug, Clone)]
pub struct IntentCategory {
    pub name: String,
    /// Normalized keywords, matched as substrings.
    pub keywords: Vec<String>,
    pub patterns: Vec<Regex>,
    pub weight: f64,
    /// Preferred collection for this intent, if any.
    pub collection: Option<String>,
    /// Explanation-style categories are answered by generation.
    pub explanation: bool,
}

/// Immutable classifier configuration.
#[derive(Debug, Clone)]
pub struct ClassifierRules {
    /// Where the rules came from: a file path or [`BUILTIN_RULES_SOURCE`].
    pub source_name: String,
    /// Categories in declaration order.
    pub categories: Vec<IntentCategory>,
    pub default_intent: String,
    pub code_intents: Vec<String>,
    /// Lowercase connectors; accents are kept.
    pub multi_intent_connectors: Vec<String>,
    /// Normalized domain vocabulary.
    pub domain_keywords: HashSet<String>,
    /// Compiled without diacritics; match against `normalize`d text.
    pub out_of_scope_patterns: Vec<Regex>,
    pub greeting_pattern: Regex,
    pub min_domain_keywords: usize,
    pub rejection_messages: RejectionMessages,
    pub validation_messages: HashMap<String, String>,
}

impl ClassifierRules {
    /// The rules embedded in the crate.
    pub fn builtin() -> Result<Self, RagError> {
        Self::from_yaml_str(BUILTIN_RULES_YAML, BUILTIN_RULES_SOURCE)
    }

    /// Load rules from a YAML file. A missing file is an error.
    pub fn from_path(path: &Path) -> Result<Self, RagError> {
        let source_name = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|e| RagError::RulesInvalid {
            source_name: source_name.clone(),
            message: format!("failed to read: {}", e),
        })?;
        Self::from_yaml_str(&content, &source_name)
    }

    /// Load from `path` when given, else the built-in rules.
    pub fn load(path: Option<&Path>) -> Result<Self, RagError> {
        match path {
            Some(p) => Self::from_path(p),
            None => Self::builtin(),
        }
    }

    /// Parse and compile rules from YAML text.
    pub fn from_yaml_str(content: &str, source_name: &str) -> Result<Self, RagError> {
        let invalid = |message: String| RagError::RulesInvalid {
            source_name: source_name.to_string(),
            message,
        };

        let file: RulesFile =
            serde_yaml::from_str(content).map_err(|e| invalid(format!("parse error: {}", e)))?;

        let mut seen = HashSet::new();
        let mut categories = Vec::with_capacity(file.intent_patterns.len());
        for def in file.intent_patterns {
            if !seen.insert(def.name.clone()) {
                return Err(invalid(format!("duplicate intent category `{}`", def.name)));
            }
            if !def.weight.is_finite() || def.weight < 0.0 {
                return Err(invalid(format!(
                    "intent `{}` has invalid weight {}",
                    def.name, def.weight
                )));
            }
            let patterns = def
                .patterns
                .iter()
                .map(|p| compile_pattern(&strip_diacritics(p)).map_err(|e| invalid(e)))
                .collect::<Result<Vec<_>, _>>()?;
            categories.push(IntentCategory {
                keywords: def.keywords.iter().map(|k| normalize(k)).collect(),
                patterns,
                weight: def.weight,
                collection: def.collection,
                explanation: def.explanation,
                name: def.name,
            });
        }

        if !categories.is_empty() && !seen.contains(&file.default_intent) {
            return Err(invalid(format!(
                "defaultIntent `{}` is not a declared intent category",
                file.default_intent
            )));
        }

        let out_of_scope_patterns = file
            .out_of_scope_patterns
            .iter()
            .map(|p| compile_pattern(&strip_diacritics(p)).map_err(|e| invalid(e)))
            .collect::<Result<Vec<_>, _>>()?;
        let greeting_pattern =
            compile_pattern(&strip_diacritics(&file.greeting_pattern)).map_err(invalid)?;

        Ok(Self {
            source_name: source_name.to_string(),
            categories,
            default_intent: file.default_intent,
            code_intents: file.code_intents,
            multi_intent_connectors: file
                .multi_intent_connectors
                .iter()
                .map(|c| c.to_lowercase())
                .collect(),
            domain_keywords: file.domain_keywords.iter().map(|k| normalize(k)).collect(),
            out_of_scope_patterns,
            greeting_pattern,
            min_domain_keywords: file.min_domain_keywords,
            rejection_messages: file.rejection_messages,
            validation_messages: file.validation_messages,
        })
    }

    pub fn category(&self, name: &str) -> Option<&IntentCategory> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Whether `intent` is answered with a verbatim template when possible.
    pub fn is_code_intent(&self, intent: &str) -> bool {
        self.code_intents.iter().any(|c| c == intent)
    }

    pub fn is_explanation_intent(&self, intent: &str) -> bool {
        self.category(intent).is_some_and(|c| c.explanation)
    }

    /// Render a validation message template, replacing `{name}` placeholders.
    ///
    /// Falls back to `fallback` when the key is not configured.
    pub fn validation_message(&self, key: &str, fallback: &str, args: &[(&str, String)]) -> String {
        let template = self
            .validation_messages
            .get(key)
            .map(String::as_str)
            .unwrap_or(fallback);
        args.iter().fold(template.to_string(), |acc, (name, value)| {
            acc.replace(&format!("{{{}}}", name), value)
        })
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, String> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| format!("bad pattern `{}`: {}", pattern, e))
}

// ============================================================================
// Shared instance
// ============================================================================

static SHARED_RULES: OnceLock<Arc<ClassifierRules>> = OnceLock::new();

/// Load the process-wide rules once.
///
/// The first successful call wins; later calls return the same rules even if
/// they pass a different path.
pub fn load_shared(path: Option<&Path>) -> Result<Arc<ClassifierRules>, RagError> {
    if let Some(rules) = SHARED_RULES.get() {
        return Ok(Arc::clone(rules));
    }
    let rules = Arc::new(ClassifierRules::load(path)?);
    if path.is_none() {
        tracing::debug!("Loaded built-in classifier rules");
    } else {
        tracing::debug!("Loaded classifier rules from {}", rules.source_name);
    }
    Ok(Arc::clone(SHARED_RULES.get_or_init(|| rules)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rules_compile() {
        let rules = ClassifierRules::builtin().unwrap();
        assert_eq!(rules.source_name, BUILTIN_RULES_SOURCE);
        assert_eq!(rules.default_intent, "code_template");
        assert_eq!(rules.min_domain_keywords, 1);
        assert!(rules.category("explanation").unwrap().explanation);
        assert!(!rules.category("code_template").unwrap().explanation);
        assert!(rules.is_code_intent("full_example"));
        assert!(rules.domain_keywords.contains("terraform"));
        assert!(rules.domain_keywords.contains("codigo"));
    }

    #[test]
    fn test_categories_keep_declaration_order() {
        let rules = ClassifierRules::builtin().unwrap();
        let names: Vec<&str> = rules.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["code_template", "full_example", "explanation", "troubleshooting"]
        );
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let rules = ClassifierRules::from_yaml_str("{}", "inline").unwrap();
        assert!(rules.categories.is_empty());
        assert_eq!(rules.default_intent, DEFAULT_INTENT);
        assert_eq!(rules.min_domain_keywords, DEFAULT_MIN_DOMAIN_KEYWORDS);
        assert!(rules.greeting_pattern.is_match("hey there"));
    }

    #[test]
    fn test_keywords_are_normalized() {
        let yaml = r#"
intentPatterns:
  - name: explanation
    keywords: ["Qué Es"]
defaultIntent: explanation
domainKeywords: ["Código"]
"#;
        let rules = ClassifierRules::from_yaml_str(yaml, "inline").unwrap();
        assert_eq!(rules.categories[0].keywords, vec!["que es"]);
        assert!(rules.domain_keywords.contains("codigo"));
    }

    #[test]
    fn test_bad_regex_is_rejected() {
        let yaml = r#"
intentPatterns:
  - name: code_template
    patterns: ["(unclosed"]
"#;
        let err = ClassifierRules::from_yaml_str(yaml, "inline").unwrap_err();
        assert!(matches!(err, RagError::RulesInvalid { .. }));
        assert!(err.to_string().contains("(unclosed"));
    }

    #[test]
    fn test_unknown_default_intent_is_rejected() {
        let yaml = r#"
defaultIntent: nope
intentPatterns:
  - name: code_template
"#;
        assert!(ClassifierRules::from_yaml_str(yaml, "inline").is_err());
    }

    #[test]
    fn test_duplicate_category_is_rejected() {
        let yaml = r#"
intentPatterns:
  - name: code_template
  - name: code_template
"#;
        assert!(ClassifierRules::from_yaml_str(yaml, "inline").is_err());
    }

    #[test]
    fn test_message_set_pick_is_deterministic() {
        let set = MessageSet::Many(vec!["a".into(), "b".into(), "c".into()]);
        let first = set.pick("que tiempo hace").unwrap();
        for _ in 0..10 {
            assert_eq!(set.pick("que tiempo hace").unwrap(), first);
        }
        assert_eq!(MessageSet::One("x".into()).pick("any"), Some("x"));
        assert_eq!(MessageSet::default().pick("any"), None);
    }

    #[test]
    fn test_message_set_pick_is_stable() {
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
        let set = MessageSet::Many(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(set.pick("hola"), Some("c"));
        assert_eq!(set.pick("terraform"), Some("b"));
    }

    #[test]
    fn test_rejection_messages_accept_string_or_list() {
        let yaml = r#"
rejectionMessages:
  greeting: "hi there"
  generic: ["one", "two"]
"#;
        let rules = ClassifierRules::from_yaml_str(yaml, "inline").unwrap();
        assert_eq!(rules.rejection_messages.greeting, MessageSet::One("hi there".into()));
        assert_eq!(rules.rejection_messages.generic.variants(), vec!["one", "two"]);
    }

    #[test]
    fn test_validation_message_placeholders() {
        let rules = ClassifierRules::builtin().unwrap();
        let msg = rules.validation_message("valid", "valid with {count}", &[("count", "3".into())]);
        assert!(msg.contains('3'));
        assert!(!msg.contains("{count}"));

        let fallback = rules.validation_message("missing_key", "found {n}", &[("n", "2".into())]);
        assert_eq!(fallback, "found 2");
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = ClassifierRules::from_path(Path::new("/nonexistent/rules.yaml")).unwrap_err();
        assert!(matches!(err, RagError::RulesInvalid { .. }));
    }
}
