//! Spinner for the answer pipeline.
//!
//! Embedding model loading and generation can take seconds, so `tfrag ask`
//! shows a spinner on stderr. It is hidden for `--quiet`, `--json` and when
//! stderr is not a terminal.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Spinner tick characters (Braille-based).
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Animated spinner.
    Interactive,
    /// Non-TTY or `--quiet`.
    Quiet,
    /// Machine-readable output.
    Silent,
}

impl ProgressMode {
    pub fn detect(quiet: bool, json: bool) -> Self {
        if json {
            Self::Silent
        } else if quiet || !std::io::stderr().is_terminal() {
            Self::Quiet
        } else {
            Self::Interactive
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Interactive)
    }
}

pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    pub fn start(message: &str, mode: ProgressMode) -> Self {
        if !mode.is_interactive() {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let style = ProgressStyle::default_spinner()
            .tick_chars(SPINNER_CHARS)
            .template("{spinner:.cyan} {msg} ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let bar = ProgressBar::new_spinner();
        bar.set_style(style);
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    pub fn elapsed(&self) -> Duration {
        self.bar.elapsed()
    }

    /// Remove the spinner line before results are printed.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}
