//! Integration tests for ModelLocator against real directory layouts and
//! the `TFRAG_MODELS_DIR` override.

use std::env;
use std::fs;
use std::sync::Mutex;

use tempfile::TempDir;
use tfrag_model::{
    EmbeddingConfig, ModelError, ModelLocator, EMBEDDINGS_SUBDIR, REQUIRED_MODEL_FILES,
    TFRAG_MODELS_DIR_ENV,
};

// Env var mutations must not interleave across tests.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn setup_mock_model(temp: &TempDir, relative: &str) -> std::path::PathBuf {
    let model_path = temp.path().join(relative);
    fs::create_dir_all(&model_path).expect("Failed to create model directory");
    for file in REQUIRED_MODEL_FILES {
        let content = match *file {
            "config.json" => r#"{"hidden_size": 384, "max_position_embeddings": 512}"#,
            _ => "{}",
        };
        fs::write(model_path.join(file), content).expect("Failed to write model file");
    }
    model_path
}

#[test]
fn test_env_override_is_searched_first() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let temp = TempDir::new().unwrap();
    let expected = setup_mock_model(&temp, &format!("{}/multilingual-e5-small", EMBEDDINGS_SUBDIR));

    env::set_var(TFRAG_MODELS_DIR_ENV, temp.path());
    let locator = ModelLocator::new();
    let base = locator.resolve_base_dir();
    let model = locator.embedding_model_path("intfloat/multilingual-e5-small");
    env::remove_var(TFRAG_MODELS_DIR_ENV);

    assert_eq!(base.unwrap(), temp.path());
    assert_eq!(model.unwrap(), expected);
}

#[test]
fn test_hf_style_layout_is_found() {
    let temp = TempDir::new().unwrap();
    let expected = setup_mock_model(&temp, "intfloat/multilingual-e5-small");

    let locator = ModelLocator::with_base_dir(temp.path());
    let path = locator
        .embedding_model_path("intfloat/multilingual-e5-small")
        .unwrap();
    assert_eq!(path, expected);
}

#[test]
fn test_flat_layout_is_found() {
    let temp = TempDir::new().unwrap();
    let expected = setup_mock_model(&temp, "custom-encoder");

    let locator = ModelLocator::with_base_dir(temp.path());
    assert_eq!(locator.embedding_model_path("custom-encoder").unwrap(), expected);
}

#[test]
fn test_directory_without_config_is_not_a_model() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join(EMBEDDINGS_SUBDIR).join("empty-model")).unwrap();

    let locator = ModelLocator::with_base_dir(temp.path());
    assert!(matches!(
        locator.embedding_model_path("empty-model"),
        Err(ModelError::ModelNotFound { .. })
    ));
}

#[test]
fn test_explicit_local_path_bypasses_locator() {
    let config = EmbeddingConfig::default().with_local_path("/opt/models/e5");
    assert_eq!(
        config.effective_model_path(),
        std::path::PathBuf::from("/opt/models/e5")
    );
}
