//! Follow-up question rewriting from chat history.

use crate::formatter::{truncate_chars, GenerationBackend};
use crate::state::{ChatMessage, ChatRole};

/// Most recent history messages included in the prompt.
pub const HISTORY_WINDOW: usize = 6;

/// Characters kept per history message.
pub const HISTORY_MESSAGE_CHARS: usize = 200;

/// Rewritten questions this short are discarded.
pub const MIN_REWRITE_CHARS: usize = 3;

/// Rewrite `question` into a self-contained one using `history`.
///
/// Returns the original question when there is no history, when generation
/// fails, or when the rewrite is too short.
pub fn contextualize(
    generator: &dyn GenerationBackend,
    question: &str,
    history: &[ChatMessage],
) -> String {
    if history.is_empty() {
        return question.to_string();
    }

    let prompt = contextualize_prompt(question, history);
    match generator.generate(&prompt) {
        Ok(rewritten) => {
            let rewritten = rewritten.trim();
            if rewritten.chars().count() > MIN_REWRITE_CHARS {
                rewritten.to_string()
            } else {
                tracing::warn!("Empty rewrite, keeping original question");
                question.to_string()
            }
        }
        Err(e) => {
            tracing::warn!("Contextualization failed: {}", e);
            question.to_string()
        }
    }
}

pub fn contextualize_prompt(question: &str, history: &[ChatMessage]) -> String {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let transcript: String = history[start..]
        .iter()
        .map(|m| {
            let label = match m.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
            };
            format!(
                "{}: {}\n",
                label,
                truncate_chars(&m.content, HISTORY_MESSAGE_CHARS)
            )
        })
        .collect();

    format!(
        "Given a conversation about Terraform and Azure, rewrite the user's question so it \
         can be understood without the history.\n\n\
         HISTORY:\n{}\n\
         CURRENT QUESTION: {}\n\n\
         - If the question is already self-contained, return it unchanged\n\
         - If it refers to the history, add the missing context\n\
         - Keep the language of the original question\n\
         - Reply with the rewritten question only\n\n\
         REWRITTEN QUESTION:",
        transcript, question
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGenerator;

    fn history(n: usize) -> Vec<ChatMessage> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    ChatMessage::user(format!("question {}", i))
                } else {
                    ChatMessage::assistant(format!("answer {}", i))
                }
            })
            .collect()
    }

    #[test]
    fn test_no_history_is_noop() {
        let generator = MockGenerator::replying("rewritten question");
        assert_eq!(contextualize(&generator, "how do I install it", &[]), "how do I install it");
        assert!(generator.prompts().is_empty());
    }

    #[test]
    fn test_rewrite_replaces_question() {
        let generator = MockGenerator::replying("  How do I install Terraform?  ");
        let out = contextualize(&generator, "how do I install it", &history(2));
        assert_eq!(out, "How do I install Terraform?");
    }

    #[test]
    fn test_short_rewrite_is_discarded() {
        let generator = MockGenerator::replying("ok");
        assert_eq!(contextualize(&generator, "and then?", &history(2)), "and then?");
    }

    #[test]
    fn test_failure_keeps_original() {
        let generator = MockGenerator::failing();
        assert_eq!(contextualize(&generator, "and then?", &history(2)), "and then?");
    }

    #[test]
    fn test_prompt_uses_last_six_truncated() {
        let mut msgs = history(8);
        msgs.push(ChatMessage::user("x".repeat(500)));
        let prompt = contextualize_prompt("q", &msgs);

        assert!(!prompt.contains("question 0"));
        assert!(!prompt.contains("question 2"));
        assert!(prompt.contains("answer 3"));
        assert!(prompt.contains("Assistant: answer 7"));
        assert!(prompt.contains(&format!("User: {}...", "x".repeat(200))));
        assert!(!prompt.contains(&"x".repeat(201)));
    }
}
