//! File-backed exact-scan reference engine.
//!
//! Keeps the harness runnable and testable without the `lancedb` feature.
//! Each table is a directory: `meta.json` plus one raw segment file per
//! added batch (per row: id as u64 LE followed by `dim` f32 LE). Vectors are
//! held in memory for search; search is an exact top-k scan, so nprobes and
//! refine factor are accepted and ignored.

use crate::engine::{IndexInfo, IndexSpec, SearchParams, VectorBatch, VectorStore, VectorTable};
use crate::{BenchError, BenchResult};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const META_FILE: &str = "meta.json";

#[derive(Debug, Serialize, Deserialize)]
struct Meta {
    dim: usize,
    segments: u64,
    indices: Vec<IndexInfo>,
}

pub struct FlatStore {
    root: PathBuf,
}

impl FlatStore {
    pub fn connect(root: &Path) -> BenchResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn table_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[async_trait]
impl VectorStore for FlatStore {
    async fn table_names(&self) -> BenchResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.path().join(META_FILE).is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn open_table(&self, name: &str) -> BenchResult<Arc<dyn VectorTable>> {
        Ok(Arc::new(FlatTable::open(self.table_dir(name))?))
    }

    async fn create_table(
        &self,
        name: &str,
        initial: VectorBatch,
    ) -> BenchResult<Arc<dyn VectorTable>> {
        Ok(Arc::new(FlatTable::create(self.table_dir(name), initial)?))
    }

    async fn drop_table(&self, name: &str) -> BenchResult<()> {
        let dir = self.table_dir(name);
        if dir.is_dir() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}

struct TableState {
    ids: Vec<u64>,
    vectors: Vec<f32>,
}

pub struct FlatTable {
    dir: PathBuf,
    dim: usize,
    state: RwLock<TableState>,
    meta: Mutex<Meta>,
}

impl FlatTable {
    fn create(dir: PathBuf, initial: VectorBatch) -> BenchResult<Self> {
        if dir.exists() {
            return Err(BenchError::Engine(format!(
                "table already exists: {}",
                dir.display()
            )));
        }
        fs::create_dir_all(&dir)?;
        let meta = Meta {
            dim: initial.dim,
            segments: 0,
            indices: Vec::new(),
        };
        let table = Self {
            dir,
            dim: initial.dim,
            state: RwLock::new(TableState {
                ids: Vec::new(),
                vectors: Vec::new(),
            }),
            meta: Mutex::new(meta),
        };
        table.write_meta()?;
        table.append(initial)?;
        Ok(table)
    }

    fn open(dir: PathBuf) -> BenchResult<Self> {
        let raw = fs::read_to_string(dir.join(META_FILE))?;
        let meta: Meta =
            serde_json::from_str(&raw).map_err(|e| BenchError::Engine(format!("bad meta: {e}")))?;
        let dim = meta.dim;
        let mut ids = Vec::new();
        let mut vectors = Vec::new();
        for seg in 0..meta.segments {
            read_segment(&dir.join(segment_name(seg)), dim, &mut ids, &mut vectors)?;
        }
        Ok(Self {
            dir,
            dim,
            state: RwLock::new(TableState { ids, vectors }),
            meta: Mutex::new(meta),
        })
    }

    fn write_meta(&self) -> BenchResult<()> {
        let meta = self.meta.lock();
        let json = serde_json::to_string_pretty(&*meta)
            .map_err(|e| BenchError::Engine(format!("meta encode: {e}")))?;
        fs::write(self.dir.join(META_FILE), json)?;
        Ok(())
    }

    fn append(&self, batch: VectorBatch) -> BenchResult<()> {
        if batch.dim != self.dim {
            return Err(BenchError::Engine(format!(
                "dimension mismatch: table {} vs batch {}",
                self.dim, batch.dim
            )));
        }
        if batch.vectors.len() != batch.ids.len() * batch.dim {
            return Err(BenchError::Engine("ragged batch".into()));
        }
        let seg = {
            let mut meta = self.meta.lock();
            let seg = meta.segments;
            meta.segments += 1;
            seg
        };
        let mut file = std::io::BufWriter::new(fs::File::create(self.dir.join(segment_name(seg)))?);
        for (i, id) in batch.ids.iter().enumerate() {
            file.write_all(&id.to_le_bytes())?;
            for x in &batch.vectors[i * self.dim..(i + 1) * self.dim] {
                file.write_all(&x.to_le_bytes())?;
            }
        }
        file.flush()?;
        self.write_meta()?;

        let mut state = self.state.write();
        state.ids.extend_from_slice(&batch.ids);
        state.vectors.extend_from_slice(&batch.vectors);
        Ok(())
    }
}

fn segment_name(seg: u64) -> String {
    format!("seg-{seg:06}.bin")
}

fn read_segment(
    path: &Path,
    dim: usize,
    ids: &mut Vec<u64>,
    vectors: &mut Vec<f32>,
) -> BenchResult<()> {
    let mut buf = Vec::new();
    fs::File::open(path)?.read_to_end(&mut buf)?;
    let row_size = 8 + dim * 4;
    if buf.len() % row_size != 0 {
        return Err(BenchError::Engine(format!(
            "segment {} is not a whole number of rows",
            path.display()
        )));
    }
    for row in buf.chunks_exact(row_size) {
        ids.push(u64::from_le_bytes(row[..8].try_into().unwrap()));
        for comp in row[8..].chunks_exact(4) {
            vectors.push(f32::from_le_bytes(comp.try_into().unwrap()));
        }
    }
    Ok(())
}

#[async_trait]
impl VectorTable for FlatTable {
    async fn count_rows(&self) -> BenchResult<u64> {
        Ok(self.state.read().ids.len() as u64)
    }

    async fn add(&self, batch: VectorBatch) -> BenchResult<()> {
        self.append(batch)
    }

    async fn list_indices(&self) -> BenchResult<Vec<IndexInfo>> {
        Ok(self.meta.lock().indices.clone())
    }

    async fn create_index(&self, column: &str, spec: &IndexSpec) -> BenchResult<()> {
        {
            let mut meta = self.meta.lock();
            meta.indices.push(IndexInfo {
                name: format!("{column}_idx"),
                index_type: format!(
                    "IVF_PQ(metric={}, partitions={}, sub_vectors={})",
                    spec.distance, spec.num_partitions, spec.num_sub_vectors
                ),
                columns: vec![column.to_string()],
            });
        }
        self.write_meta()
    }

    async fn nearest(&self, vector: &[f32], params: &SearchParams) -> BenchResult<usize> {
        if vector.len() != self.dim {
            return Err(BenchError::Engine(format!(
                "query dimension {} vs table {}",
                vector.len(),
                self.dim
            )));
        }
        let state = self.state.read();
        let n = state.ids.len();
        let mut dists: Vec<f32> = state
            .vectors
            .chunks_exact(self.dim)
            .map(|row| {
                row.iter()
                    .zip(vector)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f32>()
            })
            .collect();
        let k = params.k.min(n);
        if k > 0 && k < n {
            dists.select_nth_unstable_by(k - 1, |a, b| a.total_cmp(b));
        }
        Ok(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DistanceMetric;
    use tempfile::TempDir;

    fn batch(start: u64, rows: usize, dim: usize) -> VectorBatch {
        VectorBatch {
            dim,
            ids: (start..start + rows as u64).collect(),
            vectors: (0..rows * dim).map(|i| i as f32).collect(),
        }
    }

    #[tokio::test]
    async fn test_create_add_reopen() {
        let tmp = TempDir::new().unwrap();
        let store = FlatStore::connect(tmp.path()).unwrap();

        let table = store.create_table("vectors", batch(0, 10, 4)).await.unwrap();
        table.add(batch(10, 5, 4)).await.unwrap();
        assert_eq!(table.count_rows().await.unwrap(), 15);

        // Reopen from disk and re-count.
        let reopened = store.open_table("vectors").await.unwrap();
        assert_eq!(reopened.count_rows().await.unwrap(), 15);
        assert_eq!(store.table_names().await.unwrap(), vec!["vectors"]);
    }

    #[tokio::test]
    async fn test_index_listing() {
        let tmp = TempDir::new().unwrap();
        let store = FlatStore::connect(tmp.path()).unwrap();
        let table = store.create_table("vectors", batch(0, 4, 2)).await.unwrap();

        assert!(table.list_indices().await.unwrap().is_empty());
        let spec = IndexSpec {
            distance: DistanceMetric::L2,
            num_partitions: 8,
            num_sub_vectors: 2,
        };
        table.create_index("vector", &spec).await.unwrap();
        let indices = table.list_indices().await.unwrap();
        assert_eq!(indices.len(), 1);
        assert_eq!(indices[0].columns, vec!["vector"]);
    }

    #[tokio::test]
    async fn test_nearest_counts_rows() {
        let tmp = TempDir::new().unwrap();
        let store = FlatStore::connect(tmp.path()).unwrap();
        let table = store.create_table("vectors", batch(0, 20, 3)).await.unwrap();

        let params = SearchParams {
            k: 5,
            nprobes: 1,
            refine_factor: 10,
        };
        assert_eq!(table.nearest(&[0.0, 0.0, 0.0], &params).await.unwrap(), 5);

        // k larger than the table clamps to row count.
        let params = SearchParams {
            k: 100,
            nprobes: 1,
            refine_factor: 10,
        };
        assert_eq!(table.nearest(&[0.0, 0.0, 0.0], &params).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_engine_error() {
        let tmp = TempDir::new().unwrap();
        let store = FlatStore::connect(tmp.path()).unwrap();
        let table = store.create_table("vectors", batch(0, 4, 3)).await.unwrap();
        assert!(table.add(batch(4, 2, 5)).await.is_err());
    }

    #[tokio::test]
    async fn test_drop_table() {
        let tmp = TempDir::new().unwrap();
        let store = FlatStore::connect(tmp.path()).unwrap();
        store.create_table("vectors", batch(0, 4, 2)).await.unwrap();
        store.drop_table("vectors").await.unwrap();
        assert!(store.table_names().await.unwrap().is_empty());
        // Dropping a missing table is not an error.
        store.drop_table("vectors").await.unwrap();
    }
}
