//! Concurrent query executor: one feeder, a bounded queue, a fixed worker
//! pool, and a per-worker counting permit on in-flight queries.
//!
//! The double bound (queue capacity + permits) caps total in-flight work at
//! `num_workers * concurrent_queries`; a full queue blocks the feeder, so
//! item production can never outrun execution. There is no cancellation or
//! timeout: a hung query holds its permit for the rest of the phase.

use crate::config::BenchConfig;
use crate::engine::{SearchParams, VectorTable};
use crate::{BenchError, BenchResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const PROGRESS_EVERY: u64 = 100;

/// Which pass of the workload is running. Warmup discards latencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Warmup,
    Timed,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Warmup => "warmup",
            Phase::Timed => "timed",
        }
    }
}

/// Ephemeral pairing of a query with its target dataset. Produced once by
/// the feeder, consumed exactly once by one worker.
#[derive(Debug, Clone, Copy)]
struct WorkItem {
    dataset_idx: usize,
    query_idx: usize,
}

struct Shared {
    queries: Arc<Vec<Vec<f32>>>,
    params: SearchParams,
    phase: Phase,
    latencies: Mutex<Vec<Duration>>,
    completed: AtomicU64,
    total: u64,
    abort: AtomicBool,
    failure: Mutex<Option<BenchError>>,
}

impl Shared {
    fn fail(&self, e: BenchError) {
        let mut slot = self.failure.lock();
        if slot.is_none() {
            *slot = Some(e);
        }
        self.abort.store(true, Ordering::SeqCst);
    }
}

/// Distribute the whole query pool across the dataset tables and return the
/// collected latencies (empty for warmup).
///
/// Query `i` always targets dataset `i % tables.len()`. Any query failure
/// aborts the phase: the first error is kept, sibling workers stop pulling
/// items, and the error is returned. In-flight queries are not cancelled.
pub async fn run_phase(
    tables: &[Arc<dyn VectorTable>],
    queries: Arc<Vec<Vec<f32>>>,
    cfg: &BenchConfig,
    phase: Phase,
) -> BenchResult<Vec<Duration>> {
    let total = queries.len();
    let shared = Arc::new(Shared {
        queries,
        params: SearchParams {
            k: cfg.query_k,
            nprobes: cfg.nprobes,
            refine_factor: cfg.refine_factor,
        },
        phase,
        latencies: Mutex::new(Vec::with_capacity(if phase == Phase::Timed { total } else { 0 })),
        completed: AtomicU64::new(0),
        total: total as u64,
        abort: AtomicBool::new(false),
        failure: Mutex::new(None),
    });

    tracing::info!(
        phase = phase.label(),
        queries = total,
        datasets = tables.len(),
        workers = cfg.num_workers,
        per_worker = cfg.concurrent_queries,
        "starting query phase"
    );

    let (tx, rx) = async_channel::bounded::<WorkItem>(cfg.queue_capacity());

    let feeder = {
        let shared = shared.clone();
        let datasets = tables.len();
        tokio::spawn(async move {
            for i in 0..total {
                if shared.abort.load(Ordering::SeqCst) {
                    break;
                }
                let item = WorkItem {
                    dataset_idx: i % datasets,
                    query_idx: i,
                };
                // Blocks while the queue is full (backpressure); fails only
                // once every worker has exited.
                if tx.send(item).await.is_err() {
                    break;
                }
            }
            // Dropping the sender closes the queue; workers drain and stop.
        })
    };

    let mut workers = JoinSet::new();
    for _ in 0..cfg.num_workers {
        let rx = rx.clone();
        let shared = shared.clone();
        let tables: Vec<Arc<dyn VectorTable>> = tables.to_vec();
        let per_worker = cfg.concurrent_queries;
        workers.spawn(async move {
            let permits = Arc::new(Semaphore::new(per_worker));
            let mut in_flight = JoinSet::new();

            while let Ok(item) = rx.recv().await {
                if shared.abort.load(Ordering::SeqCst) {
                    break;
                }
                // Reap completed queries so the set stays bounded by the
                // permit count.
                while let Some(joined) = in_flight.try_join_next() {
                    check_joined(&shared, joined);
                }

                let permit = match permits.clone().acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => break,
                };
                let shared = shared.clone();
                let table = tables[item.dataset_idx].clone();
                in_flight.spawn(async move {
                    let result = execute_one(&*table, &shared, item).await;
                    drop(permit);
                    result
                });
            }

            while let Some(joined) = in_flight.join_next().await {
                check_joined(&shared, joined);
            }
        });
    }
    drop(rx);

    while let Some(res) = workers.join_next().await {
        if let Err(e) = res {
            shared.fail(BenchError::Engine(format!("worker panicked: {e}")));
        }
    }
    if let Err(e) = feeder.await {
        shared.fail(BenchError::Engine(format!("feeder panicked: {e}")));
    }

    if let Some(e) = shared.failure.lock().take() {
        return Err(e);
    }

    let latencies = std::mem::take(&mut *shared.latencies.lock());
    tracing::info!(
        phase = phase.label(),
        completed = shared.completed.load(Ordering::SeqCst),
        "phase complete"
    );
    Ok(latencies)
}

/// Run one query, timing strictly around the search call.
async fn execute_one(table: &dyn VectorTable, shared: &Shared, item: WorkItem) -> BenchResult<()> {
    let vector = &shared.queries[item.query_idx];
    let started = Instant::now();
    let outcome = table.nearest(vector, &shared.params).await;
    let elapsed = started.elapsed();
    outcome?;

    if shared.phase == Phase::Timed {
        shared.latencies.lock().push(elapsed);
    }
    let done = shared.completed.fetch_add(1, Ordering::Relaxed) + 1;
    if done % PROGRESS_EVERY == 0 || done == shared.total {
        tracing::info!(phase = shared.phase.label(), done, total = shared.total, "progress");
    }
    Ok(())
}

fn check_joined(shared: &Shared, joined: Result<BenchResult<()>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => shared.fail(e),
        Err(e) => shared.fail(BenchError::Engine(format!("query task panicked: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{IndexInfo, IndexSpec, VectorBatch};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Table that records which query indices hit it. The query vector's
    /// first component encodes the pool index (set by `pool`).
    struct RecordingTable {
        seen: Mutex<Vec<usize>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail_at: Option<usize>,
    }

    impl RecordingTable {
        fn new(fail_at: Option<usize>) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                fail_at,
            }
        }
    }

    #[async_trait]
    impl VectorTable for RecordingTable {
        async fn count_rows(&self) -> BenchResult<u64> {
            Ok(0)
        }
        async fn add(&self, _batch: VectorBatch) -> BenchResult<()> {
            Ok(())
        }
        async fn list_indices(&self) -> BenchResult<Vec<IndexInfo>> {
            Ok(Vec::new())
        }
        async fn create_index(&self, _column: &str, _spec: &IndexSpec) -> BenchResult<()> {
            Ok(())
        }

        async fn nearest(&self, vector: &[f32], _params: &SearchParams) -> BenchResult<usize> {
            let idx = vector[0] as usize;
            if self.fail_at == Some(idx) {
                return Err(BenchError::Engine("injected failure".into()));
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.seen.lock().push(idx);
            Ok(1)
        }
    }

    fn pool(n: usize) -> Arc<Vec<Vec<f32>>> {
        Arc::new((0..n).map(|i| vec![i as f32, 0.0]).collect())
    }

    fn cfg(workers: usize, per_worker: usize) -> BenchConfig {
        BenchConfig {
            datasets: vec!["unused".into()],
            num_workers: workers,
            concurrent_queries: per_worker,
            ..BenchConfig::default()
        }
    }

    async fn run_case(n: usize, datasets: usize, workers: usize, per_worker: usize) {
        let tables: Vec<Arc<RecordingTable>> =
            (0..datasets).map(|_| Arc::new(RecordingTable::new(None))).collect();
        let dyn_tables: Vec<Arc<dyn VectorTable>> =
            tables.iter().map(|t| t.clone() as Arc<dyn VectorTable>).collect();

        let latencies = run_phase(&dyn_tables, pool(n), &cfg(workers, per_worker), Phase::Timed)
            .await
            .unwrap();
        assert_eq!(latencies.len(), n);

        // Every query runs exactly once, on exactly the round-robin table.
        let mut all: Vec<usize> = Vec::new();
        for (t, table) in tables.iter().enumerate() {
            let seen = table.seen.lock();
            assert!(seen.iter().all(|&i| i % datasets == t));
            all.extend(seen.iter().copied());
        }
        all.sort_unstable();
        assert_eq!(all, (0..n).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_query_exactly_once() {
        run_case(103, 3, 4, 2).await;
        run_case(17, 1, 1, 1).await;
        run_case(64, 2, 8, 4).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_warmup_discards_latencies() {
        let table = Arc::new(RecordingTable::new(None));
        let tables: Vec<Arc<dyn VectorTable>> = vec![table.clone()];
        let latencies = run_phase(&tables, pool(25), &cfg(2, 2), Phase::Warmup)
            .await
            .unwrap();
        assert!(latencies.is_empty());
        assert_eq!(table.seen.lock().len(), 25);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_in_flight_bounded() {
        let table = Arc::new(RecordingTable::new(None));
        let tables: Vec<Arc<dyn VectorTable>> = vec![table.clone()];
        let workers = 3;
        let per_worker = 2;
        run_phase(&tables, pool(60), &cfg(workers, per_worker), Phase::Timed)
            .await
            .unwrap();
        assert!(table.max_in_flight.load(Ordering::SeqCst) <= workers * per_worker);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_query_failure_aborts_phase() {
        let table = Arc::new(RecordingTable::new(Some(7)));
        let tables: Vec<Arc<dyn VectorTable>> = vec![table.clone()];
        let err = run_phase(&tables, pool(200), &cfg(2, 2), Phase::Timed)
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::Engine(_)));
        // Fail-fast: nowhere near the full pool ran after the failure.
        assert!(table.seen.lock().len() < 200);
    }
}
