//! Shared test utilities for tfrag-cli integration tests.

use assert_cmd::Command;
use tempfile::TempDir;

/// A `tfrag` command isolated from the user's settings and store.
///
/// `HOME` points at `home`, so the default settings file and vector store
/// resolve inside it, and colors are off.
#[allow(deprecated)]
pub fn tfrag_cmd(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tfrag").expect("tfrag binary should exist");
    cmd.env("HOME", home.path())
        .env("NO_COLOR", "1")
        .env_remove("TFRAG_CONFIG")
        .env_remove("TFRAG_RULES")
        .env_remove("TFRAG_DEVICE")
        .env_remove("TFRAG_VERBOSE")
        .env_remove("TFRAG_QUIET")
        .env_remove("TFRAG_COLOR");
    cmd
}
