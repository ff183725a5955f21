//! LanceDB engine adapter, behind the `lancedb` feature.

#![cfg(feature = "lancedb")]

use crate::engine::{DistanceMetric, IndexInfo, IndexSpec, SearchParams, VectorBatch, VectorStore, VectorTable};
use crate::{BenchError, BenchResult};
use arrow_array::{FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, UInt64Array};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::index::vector::IvfPqIndexBuilder;
use lancedb::index::Index;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;
use std::path::Path;
use std::sync::Arc;

pub const VECTOR_COLUMN: &str = "vector";

fn schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::UInt64, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dim as i32,
            ),
            false,
        ),
    ]))
}

fn to_record_batch(batch: &VectorBatch) -> BenchResult<(Arc<Schema>, RecordBatch)> {
    let schema = schema(batch.dim);
    let values = Float32Array::from(batch.vectors.clone());
    let list = FixedSizeListArray::try_new_from_values(values, batch.dim as i32)
        .map_err(BenchError::engine)?;
    let record = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(UInt64Array::from(batch.ids.clone())),
            Arc::new(list),
        ],
    )
    .map_err(BenchError::engine)?;
    Ok((schema, record))
}

impl From<DistanceMetric> for DistanceType {
    fn from(metric: DistanceMetric) -> Self {
        match metric {
            DistanceMetric::L2 => DistanceType::L2,
            DistanceMetric::Cosine => DistanceType::Cosine,
            DistanceMetric::Dot => DistanceType::Dot,
        }
    }
}

pub struct LanceStore {
    db: lancedb::Connection,
}

impl LanceStore {
    pub async fn connect(path: &Path) -> BenchResult<Self> {
        std::fs::create_dir_all(path)?;
        let uri = path
            .to_str()
            .ok_or_else(|| BenchError::Config(format!("non-UTF8 path: {}", path.display())))?;
        let db = lancedb::connect(uri)
            .execute()
            .await
            .map_err(BenchError::engine)?;
        Ok(Self { db })
    }
}

#[async_trait]
impl VectorStore for LanceStore {
    async fn table_names(&self) -> BenchResult<Vec<String>> {
        self.db
            .table_names()
            .execute()
            .await
            .map_err(BenchError::engine)
    }

    async fn open_table(&self, name: &str) -> BenchResult<Arc<dyn VectorTable>> {
        let table = self
            .db
            .open_table(name)
            .execute()
            .await
            .map_err(BenchError::engine)?;
        Ok(Arc::new(LanceTable { table }))
    }

    async fn create_table(
        &self,
        name: &str,
        initial: VectorBatch,
    ) -> BenchResult<Arc<dyn VectorTable>> {
        let (schema, record) = to_record_batch(&initial)?;
        let reader = RecordBatchIterator::new(vec![Ok(record)], schema);
        let table = self
            .db
            .create_table(name, Box::new(reader))
            .execute()
            .await
            .map_err(BenchError::engine)?;
        Ok(Arc::new(LanceTable { table }))
    }

    async fn drop_table(&self, name: &str) -> BenchResult<()> {
        self.db.drop_table(name).await.map_err(BenchError::engine)
    }
}

pub struct LanceTable {
    table: lancedb::Table,
}

#[async_trait]
impl VectorTable for LanceTable {
    async fn count_rows(&self) -> BenchResult<u64> {
        let n = self
            .table
            .count_rows(None)
            .await
            .map_err(BenchError::engine)?;
        Ok(n as u64)
    }

    async fn add(&self, batch: VectorBatch) -> BenchResult<()> {
        let (schema, record) = to_record_batch(&batch)?;
        let reader = RecordBatchIterator::new(vec![Ok(record)], schema);
        self.table
            .add(Box::new(reader))
            .execute()
            .await
            .map_err(BenchError::engine)?;
        Ok(())
    }

    async fn list_indices(&self) -> BenchResult<Vec<IndexInfo>> {
        let configs = self.table.list_indices().await.map_err(BenchError::engine)?;
        Ok(configs
            .into_iter()
            .map(|c| IndexInfo {
                name: c.name,
                index_type: format!("{:?}", c.index_type),
                columns: c.columns,
            })
            .collect())
    }

    async fn create_index(&self, column: &str, spec: &IndexSpec) -> BenchResult<()> {
        let builder = IvfPqIndexBuilder::default()
            .distance_type(spec.distance.into())
            .num_partitions(spec.num_partitions)
            .num_sub_vectors(spec.num_sub_vectors);
        self.table
            .create_index(&[column], Index::IvfPq(builder))
            .execute()
            .await
            .map_err(BenchError::engine)?;
        Ok(())
    }

    async fn nearest(&self, vector: &[f32], params: &SearchParams) -> BenchResult<usize> {
        let stream = self
            .table
            .query()
            .nearest_to(vector)
            .map_err(BenchError::engine)?
            .limit(params.k)
            .nprobes(params.nprobes)
            .refine_factor(params.refine_factor)
            .execute()
            .await
            .map_err(BenchError::engine)?;
        let batches: Vec<RecordBatch> = stream.try_collect().await.map_err(BenchError::engine)?;
        Ok(batches.iter().map(|b| b.num_rows()).sum())
    }
}
