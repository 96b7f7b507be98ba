//! Runtime path resolution for embedding models.
//!
//! Models are disk assets installed next to tfrag, never downloaded at query
//! time.
//!
//! # Search Order
//!
//! 1. **Environment override**: `$TFRAG_MODELS_DIR`
//! 2. **User directory**: `~/.tfrag/models`
//! 3. **Binary-relative**: `{exe_dir}/models`
//!
//! # Model Layout
//!
//! ```text
//! {models_dir}/
//!   embeddings/
//!     multilingual-e5-small/
//!       config.json
//!       model.safetensors
//!       tokenizer.json
//! ```

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{ModelError, ModelResult};

/// Environment variable for overriding the models directory.
pub const TFRAG_MODELS_DIR_ENV: &str = "TFRAG_MODELS_DIR";

pub const EMBEDDINGS_SUBDIR: &str = "embeddings";

/// Default embedding model name (short form).
pub const DEFAULT_EMBEDDING_MODEL_NAME: &str = "multilingual-e5-small";

/// Required files for a valid model directory.
pub const REQUIRED_MODEL_FILES: &[&str] = &["config.json", "model.safetensors", "tokenizer.json"];

// ============================================================================
// ModelLocator
// ============================================================================

/// Locates model directories using a fixed search order.
#[derive(Debug, Clone, Default)]
pub struct ModelLocator {
    base_dir: Option<PathBuf>,
}

impl ModelLocator {
    pub fn new() -> Self {
        Self { base_dir: None }
    }

    /// Locator pinned to one base directory; the search order is skipped.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    /// Candidate base directories in search order, existing or not.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        if let Some(ref base) = self.base_dir {
            return vec![base.clone()];
        }

        let mut paths = Vec::new();
        if let Ok(env_path) = env::var(TFRAG_MODELS_DIR_ENV) {
            if !env_path.trim().is_empty() {
                paths.push(PathBuf::from(env_path));
            }
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".tfrag").join("models"));
        }
        if let Some(exe_dir) = env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
        {
            paths.push(exe_dir.join("models"));
        }
        paths
    }

    /// Resolve the first search path that is an existing directory.
    pub fn resolve_base_dir(&self) -> ModelResult<PathBuf> {
        let searched = self.search_paths();
        searched
            .iter()
            .find(|p| p.is_dir())
            .cloned()
            .ok_or(ModelError::ModelsDirectoryNotFound { searched })
    }

    /// Resolve the directory of an embedding model.
    ///
    /// Accepts a full model ID ("intfloat/multilingual-e5-small") or its short
    /// name. Tries `{base}/embeddings/{name}`, `{base}/{model_id}`, then
    /// `{base}/{name}`.
    pub fn embedding_model_path(&self, model_id: &str) -> ModelResult<PathBuf> {
        let base = self.resolve_base_dir()?;
        let model_name = extract_model_name(model_id);

        let candidates = [
            base.join(EMBEDDINGS_SUBDIR).join(model_name),
            base.join(model_id),
            base.join(model_name),
        ];

        if let Some(found) = candidates.iter().find(|p| is_valid_model_dir(p)) {
            return Ok(found.clone());
        }

        Err(ModelError::ModelNotFound {
            model_id: model_id.to_string(),
            path: candidates[0].clone(),
        })
    }

    pub fn default_embedding_model_path(&self) -> ModelResult<PathBuf> {
        self.embedding_model_path(DEFAULT_EMBEDDING_MODEL_NAME)
    }

    /// Check that a model directory contains every required file.
    pub fn validate_model_dir(&self, path: &Path) -> ModelResult<()> {
        if !path.exists() {
            return Err(ModelError::ModelNotFound {
                model_id: path.display().to_string(),
                path: path.to_path_buf(),
            });
        }

        let missing: Vec<&'static str> = REQUIRED_MODEL_FILES
            .iter()
            .copied()
            .filter(|file| !path.join(file).exists())
            .collect();

        if !missing.is_empty() {
            return Err(ModelError::IncompleteModelFiles {
                path: path.to_path_buf(),
                missing,
            });
        }

        Ok(())
    }
}

/// "intfloat/multilingual-e5-small" → "multilingual-e5-small"
pub(crate) fn extract_model_name(model_id: &str) -> &str {
    model_id.rsplit('/').next().unwrap_or(model_id)
}

fn is_valid_model_dir(path: &Path) -> bool {
    path.is_dir() && path.join("config.json").exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup_mock_model_dir(temp: &TempDir, model_name: &str) -> PathBuf {
        let model_path = temp.path().join(EMBEDDINGS_SUBDIR).join(model_name);
        fs::create_dir_all(&model_path).unwrap();
        for file in REQUIRED_MODEL_FILES {
            fs::write(model_path.join(file), "{}").unwrap();
        }
        model_path
    }

    #[test]
    fn test_extract_model_name() {
        assert_eq!(
            extract_model_name("intfloat/multilingual-e5-small"),
            "multilingual-e5-small"
        );
        assert_eq!(extract_model_name("simple-model"), "simple-model");
    }

    #[test]
    fn test_embedding_model_path_full_and_short_id() {
        let temp = TempDir::new().unwrap();
        let expected = setup_mock_model_dir(&temp, "multilingual-e5-small");
        let locator = ModelLocator::with_base_dir(temp.path());

        assert_eq!(
            locator
                .embedding_model_path("intfloat/multilingual-e5-small")
                .unwrap(),
            expected
        );
        assert_eq!(locator.default_embedding_model_path().unwrap(), expected);
    }

    #[test]
    fn test_model_not_found() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(EMBEDDINGS_SUBDIR)).unwrap();

        let locator = ModelLocator::with_base_dir(temp.path());
        match locator.embedding_model_path("nonexistent-model").unwrap_err() {
            ModelError::ModelNotFound { model_id, .. } => {
                assert_eq!(model_id, "nonexistent-model");
            }
            other => panic!("Expected ModelNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_model_dir_incomplete() {
        let temp = TempDir::new().unwrap();
        let model_path = temp.path().join("incomplete-model");
        fs::create_dir_all(&model_path).unwrap();
        fs::write(model_path.join("config.json"), "{}").unwrap();

        let locator = ModelLocator::with_base_dir(temp.path());
        match locator.validate_model_dir(&model_path).unwrap_err() {
            ModelError::IncompleteModelFiles { missing, .. } => {
                assert_eq!(missing, vec!["model.safetensors", "tokenizer.json"]);
            }
            other => panic!("Expected IncompleteModelFiles, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_fixed_base_dir() {
        let locator = ModelLocator::with_base_dir("/nonexistent/tfrag/models");
        match locator.resolve_base_dir().unwrap_err() {
            ModelError::ModelsDirectoryNotFound { searched } => {
                assert_eq!(searched, vec![PathBuf::from("/nonexistent/tfrag/models")]);
            }
            other => panic!("Expected ModelsDirectoryNotFound, got {:?}", other),
        }
    }
}
