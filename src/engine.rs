//! Engine seam: the storage/index engine is an external collaborator, the
//! harness only depends on this trait surface.

use crate::BenchResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub mod flat;
#[cfg(feature = "lancedb")]
pub mod lance;

/// Distance metric for the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    L2,
    Cosine,
    Dot,
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::L2 => write!(f, "l2"),
            Self::Cosine => write!(f, "cosine"),
            Self::Dot => write!(f, "dot"),
        }
    }
}

/// IVF-PQ index parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndexSpec {
    pub distance: DistanceMetric,
    pub num_partitions: u32,
    pub num_sub_vectors: u32,
}

/// Existing index on a table, as reported by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub index_type: String,
    pub columns: Vec<String>,
}

/// ANN search parameters for one query.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    pub k: usize,
    pub nprobes: usize,
    pub refine_factor: u32,
}

/// A batch of rows: `ids[i]` pairs with the `dim` floats at
/// `vectors[i * dim .. (i + 1) * dim]`.
#[derive(Debug, Clone)]
pub struct VectorBatch {
    pub dim: usize,
    pub ids: Vec<u64>,
    pub vectors: Vec<f32>,
}

impl VectorBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// One dataset root (a directory on disk holding the engine's tables).
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn table_names(&self) -> BenchResult<Vec<String>>;
    async fn open_table(&self, name: &str) -> BenchResult<Arc<dyn VectorTable>>;
    async fn create_table(
        &self,
        name: &str,
        initial: VectorBatch,
    ) -> BenchResult<Arc<dyn VectorTable>>;
    async fn drop_table(&self, name: &str) -> BenchResult<()>;
}

/// A table handle. Read concurrently by many workers during the query
/// phases; never written during them.
#[async_trait]
pub trait VectorTable: Send + Sync {
    async fn count_rows(&self) -> BenchResult<u64>;
    async fn add(&self, batch: VectorBatch) -> BenchResult<()>;
    async fn list_indices(&self) -> BenchResult<Vec<IndexInfo>>;
    async fn create_index(&self, column: &str, spec: &IndexSpec) -> BenchResult<()>;
    /// Execute one similarity search and return the number of result rows.
    async fn nearest(&self, vector: &[f32], params: &SearchParams) -> BenchResult<usize>;
}

/// Which engine implementation backs the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EngineKind {
    /// File-backed exact-scan reference engine, always available.
    Flat,
    /// LanceDB (requires building with `--features lancedb`).
    Lance,
}

/// Connect to the engine rooted at `path`, creating the directory if needed.
pub async fn connect(kind: EngineKind, path: &Path) -> BenchResult<Arc<dyn VectorStore>> {
    match kind {
        EngineKind::Flat => Ok(Arc::new(flat::FlatStore::connect(path)?)),
        #[cfg(feature = "lancedb")]
        EngineKind::Lance => Ok(Arc::new(lance::LanceStore::connect(path).await?)),
        #[cfg(not(feature = "lancedb"))]
        EngineKind::Lance => Err(crate::BenchError::Config(
            "lance engine requires building with --features lancedb".into(),
        )),
    }
}
