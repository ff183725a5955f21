//! Immutable run configuration, built once from validated CLI arguments and
//! passed by reference to every component.

use crate::engine::DistanceMetric;
use crate::{BenchError, BenchResult};
use std::path::PathBuf;

/// Fully-validated benchmark configuration.
///
/// `datasets` carries one path per dataset; its length is the dataset count.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub datasets: Vec<PathBuf>,
    pub rows_per_dataset: usize,
    pub vector_dim: usize,
    pub batch_size: usize,
    pub num_partitions: u32,
    pub num_sub_vectors: u32,
    pub distance: DistanceMetric,
    pub num_queries: usize,
    pub num_workers: usize,
    pub concurrent_queries: usize,
    pub query_k: usize,
    pub nprobes: usize,
    pub refine_factor: u32,
    pub seed: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            datasets: Vec::new(),
            rows_per_dataset: 1_000_000,
            vector_dim: 768,
            batch_size: 100_000,
            num_partitions: 256,
            num_sub_vectors: 48,
            distance: DistanceMetric::L2,
            num_queries: 2_000,
            num_workers: 16,
            concurrent_queries: 4,
            query_k: 50,
            nprobes: 1,
            refine_factor: 10,
            seed: 42,
        }
    }
}

impl BenchConfig {
    /// Check every parameter the run depends on. Called once at startup;
    /// afterwards the config is treated as trusted everywhere.
    pub fn validate(&self) -> BenchResult<()> {
        if self.datasets.is_empty() {
            return Err(BenchError::Config("at least one dataset path required".into()));
        }
        for (name, v) in [
            ("rows-per-dataset", self.rows_per_dataset),
            ("vector-dim", self.vector_dim),
            ("batch-size", self.batch_size),
            ("num-queries", self.num_queries),
            ("num-workers", self.num_workers),
            ("concurrent-queries", self.concurrent_queries),
            ("query-k", self.query_k),
            ("nprobes", self.nprobes),
        ] {
            if v == 0 {
                return Err(BenchError::Config(format!("--{} must be >= 1", name)));
            }
        }
        if self.num_partitions == 0 || self.num_sub_vectors == 0 || self.refine_factor == 0 {
            return Err(BenchError::Config(
                "--num-partitions, --num-sub-vectors and --refine-factor must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Capacity of the shared work queue. Together with the per-worker permit
    /// this caps total in-flight queries at `num_workers * concurrent_queries`
    /// and makes the feeder block once the queue is full.
    pub fn queue_capacity(&self) -> usize {
        self.num_workers * self.concurrent_queries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_one_dataset() -> BenchConfig {
        BenchConfig {
            datasets: vec![PathBuf::from("/tmp/ds0")],
            ..BenchConfig::default()
        }
    }

    #[test]
    fn test_defaults_validate() {
        assert!(with_one_dataset().validate().is_ok());
    }

    #[test]
    fn test_empty_datasets_rejected() {
        let cfg = BenchConfig::default();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_params_rejected() {
        let mut cfg = with_one_dataset();
        cfg.num_workers = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = with_one_dataset();
        cfg.refine_factor = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_queue_capacity() {
        let mut cfg = with_one_dataset();
        cfg.num_workers = 16;
        cfg.concurrent_queries = 4;
        assert_eq!(cfg.queue_capacity(), 64);
    }
}
