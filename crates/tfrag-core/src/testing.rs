//! Deterministic in-memory backends for unit tests.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tfrag_db::collection::ChunkPayload;

use crate::errors::RagError;
use crate::formatter::GenerationBackend;
use crate::retrieval::{EmbeddingBackend, SearchBackend};

pub const MOCK_DIMENSION: usize = 8;

pub fn hit_payload(content: &str) -> ChunkPayload {
    ChunkPayload::new(content)
}

/// Hash-seeded embedder.
#[derive(Default)]
pub struct MockEmbedder {
    fail: bool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingBackend for MockEmbedder {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RagError::EmbeddingFailed {
                reason: "mock embedder failure".to_string(),
            });
        }
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();
        Ok((0..MOCK_DIMENSION)
            .map(|i| ((seed >> (i * 8)) & 0xff) as f32 / 255.0)
            .collect())
    }
}

/// Search backend returning scripted hits per collection.
#[derive(Default)]
pub struct ScriptedSearch {
    hits: HashMap<String, Vec<(f32, ChunkPayload)>>,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hits(mut self, collection: &str, hits: Vec<(f32, ChunkPayload)>) -> Self {
        self.hits.insert(collection.to_string(), hits);
        self
    }

    pub fn failing(mut self, collection: &str) -> Self {
        self.failing.insert(collection.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SearchBackend for ScriptedSearch {
    fn search(
        &self,
        collection: &str,
        _vector: &[f32],
        limit: usize,
    ) -> Result<Vec<(f32, ChunkPayload)>, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(collection) {
            return Err(RagError::SearchFailed {
                collection: collection.to_string(),
                reason: "mock search failure".to_string(),
            });
        }
        Ok(self
            .hits
            .get(collection)
            .map(|h| h.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// Generator with a fixed reply, or one that always fails.
pub struct MockGenerator {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl GenerationBackend for MockGenerator {
    fn generate(&self, prompt: &str) -> Result<String, RagError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(RagError::GenerationFailed {
                reason: "mock generator failure".to_string(),
            }),
        }
    }
}
