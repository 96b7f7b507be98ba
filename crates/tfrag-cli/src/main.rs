//! # tfrag CLI
//!
//! Ask Terraform questions against the indexed book and example collections.
//! Run `tfrag --help` for usage information.

mod cli;
pub mod ui;

use std::process::ExitCode;

fn main() -> ExitCode {
    cli::run()
}
