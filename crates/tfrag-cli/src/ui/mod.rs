//! # CLI UI Module
//!
//! Styling and formatting layer for tfrag output.
//!
//! Human output goes to stdout with `[ok]`/`[err]`/`[warn]`/`[info]` prefixes.
//! `--json` output is plain JSON on stdout; logs and spinners go to stderr so
//! it stays machine-parseable.
//!
//! ## Module Structure
//!
//! - `color`: color mode detection (`--color`, `NO_COLOR`, TTY)
//! - `style`: message prefixes and value styling
//! - `format`: score, count and text helpers
//! - `table`: source, collection and intent tables with comfy-table
//! - `progress`: spinner shown while the pipeline runs

pub mod color;
pub mod format;
pub mod progress;
pub mod style;
pub mod table;

pub use color::ColorMode;
pub use progress::{ProgressMode, Spinner};
pub use style::{MessageType, Style};
