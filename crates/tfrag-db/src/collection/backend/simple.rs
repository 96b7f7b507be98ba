//! JSONL collection store.
//!
//! Each collection is `{root}/{collection}.jsonl`, one point per line, loaded
//! fully into memory on open. Search is a linear scan.

use super::super::config::StoreConfig;
use super::super::traits::{
    ChunkPayload, CollectionStore, PointInsert, ScoredPoint, VectorId, VectorMetric,
};
use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, trace};

const COLLECTION_EXTENSION: &str = "jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPoint {
    id: u64,
    vector: Vec<f32>,
    #[serde(flatten)]
    payload: ChunkPayload,
}

impl From<&PointInsert> for StoredPoint {
    fn from(insert: &PointInsert) -> Self {
        Self {
            id: insert.id.value(),
            vector: insert.vector.clone(),
            payload: insert.payload.clone(),
        }
    }
}

/// JSONL-backed [`CollectionStore`].
pub struct SimpleCollectionStore {
    root: PathBuf,
    dimension: usize,
    metric: VectorMetric,
    /// Points per collection in insertion order.
    collections: RwLock<BTreeMap<String, Vec<StoredPoint>>>,
}

impl SimpleCollectionStore {
    pub fn open(config: &StoreConfig) -> DbResult<Self> {
        debug!("Opening SimpleCollectionStore at {:?}", config.path);

        let mut collections = BTreeMap::new();
        for entry in fs::read_dir(&config.path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(COLLECTION_EXTENSION) {
                continue;
            }
            if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                collections.insert(name.to_string(), load_collection(&path)?);
            }
        }

        Ok(Self {
            root: config.path.clone(),
            dimension: config.dimension,
            metric: config.metric,
            collections: RwLock::new(collections),
        })
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", collection, COLLECTION_EXTENSION))
    }

    fn save_collection(&self, collection: &str, points: &[StoredPoint]) -> DbResult<()> {
        let path = self.collection_path(collection);
        let mut file = File::create(&path)?;
        for point in points {
            writeln!(file, "{}", serde_json::to_string(point)?)?;
        }
        debug!("Saved {} points to {:?}", points.len(), path);
        Ok(())
    }

    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.metric {
            VectorMetric::Cosine => cosine_similarity(a, b),
            VectorMetric::Dot => dot_product(a, b),
            VectorMetric::L2 => -euclidean_distance(a, b),
        }
    }
}

fn load_collection(path: &Path) -> DbResult<Vec<StoredPoint>> {
    let reader = BufReader::new(File::open(path)?);
    let mut points = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StoredPoint>(&line) {
            Ok(point) => points.push(point),
            Err(e) => debug!("Skipping invalid line {} in {:?}: {}", line_num + 1, path, e),
        }
    }

    debug!("Loaded {} points from {:?}", points.len(), path);
    Ok(points)
}

impl CollectionStore for SimpleCollectionStore {
    fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
    ) -> DbResult<Vec<ScoredPoint>> {
        trace!("Searching '{}' limit={}", collection, limit);

        if embedding.len() != self.dimension {
            return Err(DbError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        let collections = self
            .collections
            .read()
            .map_err(|e| DbError::internal(format!("Failed to acquire read lock: {}", e)))?;
        let points = collections
            .get(collection)
            .ok_or_else(|| DbError::collection_not_found(collection))?;

        let mut scored: Vec<(f32, &StoredPoint)> = points
            .iter()
            .map(|p| (self.similarity(embedding, &p.vector), p))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, point)| ScoredPoint {
                id: VectorId::new(point.id),
                score,
                payload: point.payload.clone(),
            })
            .collect())
    }

    fn upsert(&self, collection: &str, points: &[PointInsert]) -> DbResult<()> {
        if let Some(bad) = points.iter().find(|p| p.vector.len() != self.dimension) {
            return Err(DbError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.vector.len(),
            });
        }

        let mut collections = self
            .collections
            .write()
            .map_err(|e| DbError::internal(format!("Failed to acquire write lock: {}", e)))?;
        let stored = collections.entry(collection.to_string()).or_default();

        for insert in points {
            let point = StoredPoint::from(insert);
            match stored.iter_mut().find(|p| p.id == point.id) {
                Some(existing) => *existing = point,
                None => stored.push(point),
            }
        }

        self.save_collection(collection, stored)
    }

    fn collections(&self) -> DbResult<Vec<String>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| DbError::internal(format!("Failed to acquire read lock: {}", e)))?;
        Ok(collections.keys().cloned().collect())
    }

    fn count(&self, collection: &str) -> DbResult<usize> {
        let collections = self
            .collections
            .read()
            .map_err(|e| DbError::internal(format!("Failed to acquire read lock: {}", e)))?;
        collections
            .get(collection)
            .map(Vec::len)
            .ok_or_else(|| DbError::collection_not_found(collection))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> VectorMetric {
        self.metric
    }

    fn backend_name(&self) -> &'static str {
        "simple"
    }
}

// ============================================================================
// Similarity Functions
// ============================================================================

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::config::StoreConfig;
    use tempfile::TempDir;

    fn open_temp(temp: &TempDir) -> SimpleCollectionStore {
        let config = StoreConfig::new(3, temp.path()).with_backend("simple");
        SimpleCollectionStore::open(&config).unwrap()
    }

    fn point(id: u64, vector: [f32; 3], text: &str) -> PointInsert {
        PointInsert::new(
            id,
            vector.to_vec(),
            ChunkPayload::new(text).with_meta("path", format!("docs/{}.md", id)),
        )
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_search_orders_by_score_and_limits() {
        let temp = TempDir::new().unwrap();
        let store = open_temp(&temp);
        store
            .upsert(
                "terraform_book",
                &[
                    point(1, [0.0, 1.0, 0.0], "unrelated"),
                    point(2, [1.0, 0.0, 0.0], "exact"),
                    point(3, [0.7, 0.7, 0.0], "partial"),
                ],
            )
            .unwrap();

        let hits = store.search("terraform_book", &[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].payload.page_content, "exact");
        assert_eq!(hits[1].payload.page_content, "partial");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_missing_collection_is_an_error() {
        let temp = TempDir::new().unwrap();
        let store = open_temp(&temp);
        assert!(matches!(
            store.search("examples_terraform", &[1.0, 0.0, 0.0], 3),
            Err(DbError::CollectionNotFound { .. })
        ));
        assert!(store.count("examples_terraform").is_err());
    }

    #[test]
    fn test_upsert_replaces_and_persists() {
        let temp = TempDir::new().unwrap();
        {
            let store = open_temp(&temp);
            store
                .upsert("examples_terraform", &[point(1, [1.0, 0.0, 0.0], "v1")])
                .unwrap();
            store
                .upsert("examples_terraform", &[point(1, [1.0, 0.0, 0.0], "v2")])
                .unwrap();
        }

        let reopened = open_temp(&temp);
        assert_eq!(reopened.collections().unwrap(), vec!["examples_terraform"]);
        assert_eq!(reopened.count("examples_terraform").unwrap(), 1);
        let hits = reopened
            .search("examples_terraform", &[1.0, 0.0, 0.0], 5)
            .unwrap();
        assert_eq!(hits[0].payload.page_content, "v2");
        assert_eq!(hits[0].payload.metadata["path"], "docs/1.md");
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let temp = TempDir::new().unwrap();
        let store = open_temp(&temp);
        let bad = PointInsert::new(9u64, vec![1.0, 0.0], ChunkPayload::new("short"));
        assert!(matches!(
            store.upsert("terraform_book", &[bad]),
            Err(DbError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }
}
