//! Message styling for CLI output.
//!
//! | Prefix | Meaning | Color |
//! |--------|---------|-------|
//! | `[ok]` | Answer produced | Green |
//! | `[err]` | Command failed | Red |
//! | `[warn]` | Degraded or rejected | Yellow |
//! | `[info]` | Neutral status | Blue |
//! | `[hint]` | Suggested next step | Cyan |

use owo_colors::OwoColorize;
use tfrag_core::HealthStatus;

use super::color::ColorMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Ok,
    Err,
    Warn,
    Info,
    Hint,
}

impl MessageType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Ok => "[ok]",
            Self::Err => "[err]",
            Self::Warn => "[warn]",
            Self::Info => "[info]",
            Self::Hint => "[hint]",
        }
    }
}

/// Formats messages, headers and values according to the color mode.
///
/// ```ignore
/// let style = Style::new(ColorMode::Never);
/// assert_eq!(style.message(MessageType::Ok, "Answered"), "[ok] Answered");
/// ```
#[derive(Debug, Clone)]
pub struct Style {
    color_mode: ColorMode,
}

impl Default for Style {
    fn default() -> Self {
        Self::new(ColorMode::Auto)
    }
}

impl Style {
    pub fn new(color_mode: ColorMode) -> Self {
        Self { color_mode }
    }

    pub fn colors_enabled(&self) -> bool {
        self.color_mode.is_enabled()
    }

    pub fn message(&self, msg_type: MessageType, text: &str) -> String {
        let prefix = msg_type.prefix();
        if !self.colors_enabled() {
            return format!("{} {}", prefix, text);
        }
        let colored = match msg_type {
            MessageType::Ok => prefix.green().to_string(),
            MessageType::Err => prefix.red().to_string(),
            MessageType::Warn => prefix.yellow().to_string(),
            MessageType::Info => prefix.blue().to_string(),
            MessageType::Hint => prefix.cyan().to_string(),
        };
        format!("{} {}", colored, text)
    }

    /// Bold section title such as `ANSWER` or `SOURCES`.
    pub fn section(&self, title: &str) -> String {
        if self.colors_enabled() {
            title.bold().to_string()
        } else {
            title.to_string()
        }
    }

    /// An error followed by indented cause and hint lines.
    pub fn error_with_context(&self, msg: &str, cause: Option<&str>, hint: Option<&str>) -> String {
        let mut output = self.message(MessageType::Err, msg);
        if let Some(cause) = cause {
            output.push_str(&format!("\n      Cause: {}", cause));
        }
        if let Some(hint) = hint {
            output.push_str(&format!("\n      Hint: {}", hint));
        }
        output
    }

    pub fn key_value(&self, key: &str, value: &str) -> String {
        if self.colors_enabled() {
            format!("{}: {}", key.dimmed(), value)
        } else {
            format!("{}: {}", key, value)
        }
    }

    /// Document path or collection name.
    pub fn source(&self, path: &str) -> String {
        if self.colors_enabled() {
            path.cyan().to_string()
        } else {
            path.to_string()
        }
    }

    /// Similarity score: green from 0.8, yellow from 0.5, red below.
    pub fn score(&self, value: f32) -> String {
        let formatted = format!("{:.3}", value);
        if !self.colors_enabled() {
            return formatted;
        }
        if value >= 0.8 {
            formatted.green().to_string()
        } else if value >= 0.5 {
            formatted.yellow().to_string()
        } else {
            formatted.red().to_string()
        }
    }

    pub fn health(&self, status: HealthStatus) -> String {
        let text = status.to_string();
        if !self.colors_enabled() {
            return text;
        }
        match status {
            HealthStatus::Healthy => text.green().to_string(),
            HealthStatus::Degraded => text.yellow().to_string(),
            HealthStatus::Unhealthy => text.red().to_string(),
        }
    }

    /// Message type matching a health status.
    pub fn health_message_type(status: HealthStatus) -> MessageType {
        match status {
            HealthStatus::Healthy => MessageType::Ok,
            HealthStatus::Degraded => MessageType::Warn,
            HealthStatus::Unhealthy => MessageType::Err,
        }
    }
}
