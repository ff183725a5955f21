//! Cold-cache concurrent latency benchmark for vector-search storage engines.
//!
//! Pipeline: materialize datasets → ensure IVF-PQ indices → generate a fixed
//! query pool → warmup pass → drop OS page caches → timed pass → aggregate.

pub mod config;
pub mod datagen;
pub mod dataset;
pub mod engine;
pub mod executor;
pub mod pagecache;
pub mod report;
pub mod stats;

pub use config::BenchConfig;
pub use stats::LatencyStats;

pub type BenchResult<T> = std::result::Result<T, BenchError>;

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine error: {0}")]
    Engine(String),
    #[error("config error: {0}")]
    Config(String),
}

impl BenchError {
    /// Wrap an arbitrary engine failure. Engine errors are fatal to the run:
    /// no retry, no partial results.
    pub fn engine(e: impl std::fmt::Display) -> Self {
        BenchError::Engine(e.to_string())
    }
}
