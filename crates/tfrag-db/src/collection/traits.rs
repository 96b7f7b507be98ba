//! Collection store trait and point types.

use crate::error::DbResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// VectorId
// ============================================================================

/// Identifier of a point within one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorId(pub u64);

impl VectorId {
    pub fn new(id: u64) -> Self {
        VectorId(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for VectorId {
    fn from(id: u64) -> Self {
        VectorId(id)
    }
}

impl From<i64> for VectorId {
    fn from(id: i64) -> Self {
        VectorId(id as u64)
    }
}

impl std::fmt::Display for VectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// VectorMetric
// ============================================================================

/// Distance metric for similarity search. Scores are always "higher is better".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorMetric {
    #[default]
    Cosine,
    Dot,
    L2,
}

impl VectorMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorMetric::Cosine => "cosine",
            VectorMetric::Dot => "dot",
            VectorMetric::L2 => "l2",
        }
    }

    /// Convert a backend distance into a similarity score.
    pub fn distance_to_score(&self, distance: f32) -> f32 {
        match self {
            VectorMetric::Cosine | VectorMetric::Dot => 1.0 - distance,
            VectorMetric::L2 => -distance,
        }
    }
}

impl std::fmt::Display for VectorMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for VectorMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" => Ok(Self::Dot),
            "l2" | "euclidean" => Ok(Self::L2),
            _ => Err(format!(
                "Unknown metric: '{}'. Use 'cosine', 'dot', or 'l2'.",
                s
            )),
        }
    }
}

// ============================================================================
// Points
// ============================================================================

/// Stored chunk: the text and whatever metadata the indexer attached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    #[serde(default)]
    pub page_content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ChunkPayload {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A point to insert or replace in a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointInsert {
    pub id: VectorId,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

impl PointInsert {
    pub fn new(id: impl Into<VectorId>, vector: Vec<f32>, payload: ChunkPayload) -> Self {
        Self {
            id: id.into(),
            vector,
            payload,
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: VectorId,
    pub score: f32,
    pub payload: ChunkPayload,
}

// ============================================================================
// CollectionStore Trait
// ============================================================================

/// Storage backend holding named collections of embedded chunks.
///
/// - `search` returns at most `limit` points, best first.
/// - Searching a collection that does not exist is `DbError::CollectionNotFound`.
/// - `upsert` replaces points with the same ID and creates the collection on
///   first write.
pub trait CollectionStore: Send + Sync {
    fn search(&self, collection: &str, embedding: &[f32], limit: usize)
        -> DbResult<Vec<ScoredPoint>>;

    fn upsert(&self, collection: &str, points: &[PointInsert]) -> DbResult<()>;

    /// Names of existing collections, sorted.
    fn collections(&self) -> DbResult<Vec<String>>;

    /// Number of points in a collection; missing collections are an error.
    fn count(&self, collection: &str) -> DbResult<usize>;

    fn has_collection(&self, collection: &str) -> DbResult<bool> {
        Ok(self.collections()?.iter().any(|c| c == collection))
    }

    fn dimension(&self) -> usize;

    fn metric(&self) -> VectorMetric;

    /// Backend name as it appears in configuration.
    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_deserializes_without_metadata() {
        let payload: ChunkPayload =
            serde_json::from_str(r#"{"page_content": "resource \"azurerm_vnet\" {}"}"#).unwrap();
        assert!(payload.page_content.starts_with("resource"));
        assert!(payload.metadata.is_empty());
    }

    #[test]
    fn test_distance_to_score() {
        assert!((VectorMetric::Cosine.distance_to_score(0.25) - 0.75).abs() < 1e-6);
        assert!((VectorMetric::L2.distance_to_score(2.0) + 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!("Cosine".parse::<VectorMetric>().unwrap(), VectorMetric::Cosine);
        assert_eq!("euclidean".parse::<VectorMetric>().unwrap(), VectorMetric::L2);
        assert!("manhattan".parse::<VectorMetric>().is_err());
    }
}
