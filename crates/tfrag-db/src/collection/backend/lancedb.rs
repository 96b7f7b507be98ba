//! LanceDB collection store.
//!
//! Each collection is a table in one LanceDB database directory, with columns
//! `id`, `vector`, `page_content` and `metadata` (JSON text). Async calls run
//! on a private Tokio runtime so callers stay synchronous.

use super::super::config::StoreConfig;
use super::super::traits::{
    ChunkPayload, CollectionStore, PointInsert, ScoredPoint, VectorId, VectorMetric,
};
use crate::error::{DbError, DbResult};
use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, Int64Array, RecordBatch,
    RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::{
    connect,
    query::{ExecutableQuery, QueryBase},
    Connection, DistanceType, Table,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::runtime::Runtime;
use tracing::{debug, trace};

/// LanceDB-backed [`CollectionStore`].
pub struct LanceDbCollectionStore {
    dimension: usize,
    metric: VectorMetric,
    connection: Connection,
    /// Opened tables by collection name.
    tables: RwLock<HashMap<String, Table>>,
    runtime: Runtime,
}

impl LanceDbCollectionStore {
    pub fn open(config: &StoreConfig) -> DbResult<Self> {
        debug!("Opening LanceDbCollectionStore at {:?}", config.path);

        let runtime = Runtime::new()
            .map_err(|e| DbError::internal(format!("Failed to create runtime: {}", e)))?;

        let connection = runtime
            .block_on(async {
                connect(config.path.to_string_lossy().as_ref())
                    .execute()
                    .await
            })
            .map_err(|e| DbError::LanceDb {
                message: format!("Failed to connect: {}", e),
            })?;

        Ok(Self {
            dimension: config.dimension,
            metric: config.metric,
            connection,
            tables: RwLock::new(HashMap::new()),
            runtime,
        })
    }

    fn table_names(&self) -> DbResult<Vec<String>> {
        self.runtime
            .block_on(async { self.connection.table_names().execute().await })
            .map_err(|e| DbError::LanceDb {
                message: format!("Failed to list tables: {}", e),
            })
    }

    /// Open an existing table. With `create`, a missing table is created empty.
    fn table(&self, collection: &str, create: bool) -> DbResult<Table> {
        {
            let tables = self
                .tables
                .read()
                .map_err(|e| DbError::internal(format!("Failed to acquire table lock: {}", e)))?;
            if let Some(table) = tables.get(collection) {
                return Ok(table.clone());
            }
        }

        let exists = self.table_names()?.iter().any(|n| n == collection);
        let table = if exists {
            debug!("Opening table '{}'", collection);
            self.runtime
                .block_on(async { self.connection.open_table(collection).execute().await })
                .map_err(|e| DbError::LanceDb {
                    message: format!("Failed to open table '{}': {}", collection, e),
                })?
        } else if create {
            debug!("Creating table '{}'", collection);
            let schema = Arc::new(self.schema());
            let batch = self.points_to_batch(&[])?;
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            self.runtime
                .block_on(async {
                    self.connection
                        .create_table(collection, Box::new(batches))
                        .execute()
                        .await
                })
                .map_err(|e| DbError::LanceDb {
                    message: format!("Failed to create table '{}': {}", collection, e),
                })?
        } else {
            return Err(DbError::collection_not_found(collection));
        };

        self.tables
            .write()
            .map_err(|e| DbError::internal(format!("Failed to acquire table lock: {}", e)))?
            .insert(collection.to_string(), table.clone());
        Ok(table)
    }

    fn schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("page_content", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, true),
        ])
    }

    fn points_to_batch(&self, points: &[PointInsert]) -> DbResult<RecordBatch> {
        let ids: ArrayRef = Arc::new(Int64Array::from(
            points
                .iter()
                .map(|p| p.id.value() as i64)
                .collect::<Vec<_>>(),
        ));

        let flat: Vec<f32> = points.iter().flat_map(|p| p.vector.iter().copied()).collect();
        let vectors: ArrayRef = Arc::new(
            FixedSizeListArray::try_new(
                Arc::new(Field::new("item", DataType::Float32, true)),
                self.dimension as i32,
                Arc::new(Float32Array::from(flat)),
                None,
            )
            .map_err(|e| DbError::internal(format!("Failed to create vector array: {}", e)))?,
        );

        let contents: ArrayRef = Arc::new(StringArray::from(
            points
                .iter()
                .map(|p| p.payload.page_content.as_str())
                .collect::<Vec<_>>(),
        ));

        let metadata = points
            .iter()
            .map(|p| serde_json::to_string(&p.payload.metadata).map(Some))
            .collect::<Result<Vec<Option<String>>, _>>()?;
        let metadata: ArrayRef = Arc::new(StringArray::from(metadata));

        RecordBatch::try_new(Arc::new(self.schema()), vec![ids, vectors, contents, metadata])
            .map_err(|e| DbError::internal(format!("Failed to create batch: {}", e)))
    }

    fn distance_type(&self) -> DistanceType {
        match self.metric {
            VectorMetric::Cosine => DistanceType::Cosine,
            VectorMetric::Dot => DistanceType::Dot,
            VectorMetric::L2 => DistanceType::L2,
        }
    }
}

fn batch_to_points(batch: &RecordBatch, metric: VectorMetric) -> Vec<ScoredPoint> {
    let ids = batch
        .column_by_name("id")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>());
    let contents = batch
        .column_by_name("page_content")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>());
    let metadata = batch
        .column_by_name("metadata")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>());
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    let (Some(ids), Some(contents), Some(distances)) = (ids, contents, distances) else {
        debug!("Result batch is missing expected columns; skipping");
        return Vec::new();
    };

    (0..batch.num_rows())
        .map(|i| {
            let metadata = metadata
                .filter(|m| !m.is_null(i))
                .and_then(|m| serde_json::from_str(m.value(i)).ok())
                .unwrap_or_default();
            ScoredPoint {
                id: VectorId::from(ids.value(i)),
                score: metric.distance_to_score(distances.value(i)),
                payload: ChunkPayload {
                    page_content: contents.value(i).to_string(),
                    metadata,
                },
            }
        })
        .collect()
}

impl CollectionStore for LanceDbCollectionStore {
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

        let table = self.table(collection, false)?;
        let metric = self.metric;

        self.runtime.block_on(async {
            let results = table
                .vector_search(embedding.to_vec())
                .map_err(|e| DbError::LanceDb {
                    message: format!("Failed to create query: {}", e),
                })?
                .limit(limit)
                .distance_type(self.distance_type())
                .execute()
                .await
                .map_err(|e| DbError::LanceDb {
                    message: format!("Query failed: {}", e),
                })?;

            let batches: Vec<RecordBatch> =
                results.try_collect().await.map_err(|e| DbError::LanceDb {
                    message: format!("Failed to collect results: {}", e),
                })?;

            let mut points: Vec<ScoredPoint> = batches
                .iter()
                .flat_map(|b| batch_to_points(b, metric))
                .collect();
            points.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            points.truncate(limit);
            Ok(points)
        })
    }

    fn upsert(&self, collection: &str, points: &[PointInsert]) -> DbResult<()> {
        if points.is_empty() {
            return Ok(());
        }
        if let Some(bad) = points.iter().find(|p| p.vector.len() != self.dimension) {
            return Err(DbError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.vector.len(),
            });
        }

        debug!("Upserting {} points into '{}'", points.len(), collection);
        let table = self.table(collection, true)?;

        let id_list = points
            .iter()
            .map(|p| p.id.value().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let delete_filter = format!("id IN ({})", id_list);
        let batch = self.points_to_batch(points)?;

        self.runtime.block_on(async {
            if let Err(e) = table.delete(&delete_filter).await {
                debug!("Delete before upsert returned error (may be ok): {}", e);
            }

            let schema = batch.schema();
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            table
                .add(Box::new(batches))
                .execute()
                .await
                .map_err(|e| DbError::LanceDb {
                    message: format!("Insert failed: {}", e),
                })?;
            Ok(())
        })
    }

    fn collections(&self) -> DbResult<Vec<String>> {
        let mut names = self.table_names()?;
        names.sort();
        Ok(names)
    }

    fn count(&self, collection: &str) -> DbResult<usize> {
        let table = self.table(collection, false)?;
        self.runtime.block_on(async {
            table.count_rows(None).await.map_err(|e| DbError::LanceDb {
                message: format!("Count failed: {}", e),
            })
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> VectorMetric {
        self.metric
    }

    fn backend_name(&self) -> &'static str {
        "lancedb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp(temp: &TempDir) -> LanceDbCollectionStore {
        LanceDbCollectionStore::open(&StoreConfig::new(3, temp.path())).unwrap()
    }

    #[test]
    fn test_search_missing_table_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = open_temp(&temp);
        assert!(matches!(
            store.search("terraform_book", &[1.0, 0.0, 0.0], 3),
            Err(DbError::CollectionNotFound { .. })
        ));
    }

    #[test]
    fn test_upsert_search_count() {
        let temp = TempDir::new().unwrap();
        let store = open_temp(&temp);
        let points = vec![
            PointInsert::new(
                1u64,
                vec![1.0, 0.0, 0.0],
                ChunkPayload::new("resource \"azurerm_resource_group\" \"rg\" {}")
                    .with_meta("path", "examples/rg/main.tf"),
            ),
            PointInsert::new(2u64, vec![0.0, 1.0, 0.0], ChunkPayload::new("prose")),
        ];
        store.upsert("examples_terraform", &points).unwrap();

        assert_eq!(store.count("examples_terraform").unwrap(), 2);
        assert_eq!(store.collections().unwrap(), vec!["examples_terraform"]);

        let hits = store
            .search("examples_terraform", &[1.0, 0.0, 0.0], 1)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, VectorId(1));
        assert!(hits[0].score > 0.99);
        assert_eq!(hits[0].payload.metadata["path"], "examples/rg/main.tf");
    }
}
