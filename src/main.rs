//! vecbench: cold-cache concurrent latency benchmark for vector search.
//!
//! Usage:
//!   vecbench                                  # 3 temp datasets, full defaults
//!   vecbench -d /data/a,/data/b               # explicit dataset paths
//!   vecbench --num-queries 500 --num-workers 8 --export results/

use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vecbench::config::BenchConfig;
use vecbench::engine::{self, EngineKind, IndexSpec, VectorStore, VectorTable};
use vecbench::{datagen, dataset, executor, pagecache, report, stats, BenchResult};

#[derive(Parser, Debug)]
#[command(name = "vecbench", about = "Cold-cache concurrent vector-search benchmark")]
struct Cli {
    /// Dataset paths (repeatable or comma-separated). Auto-generated temp
    /// paths when omitted; the list length overrides --num-datasets.
    #[arg(short, long = "dataset", value_delimiter = ',')]
    dataset: Vec<PathBuf>,

    /// Number of datasets when --dataset is not given.
    #[arg(long, default_value = "3")]
    num_datasets: usize,

    /// Rows materialized per dataset.
    #[arg(long, default_value = "1000000")]
    rows_per_dataset: usize,

    /// Vector dimensionality.
    #[arg(long, default_value = "768")]
    vector_dim: usize,

    /// Rows per write batch during materialization.
    #[arg(long, default_value = "100000")]
    batch_size: usize,

    /// IVF partition count for the index.
    #[arg(long, default_value = "256")]
    num_partitions: u32,

    /// PQ sub-vector count for the index.
    #[arg(long, default_value = "48")]
    num_sub_vectors: u32,

    /// Distance metric for the index.
    #[arg(long, value_enum, default_value = "l2")]
    distance_type: engine::DistanceMetric,

    /// Size of the fixed query pool.
    #[arg(long, default_value = "2000")]
    num_queries: usize,

    /// Worker count in the query executor pool.
    #[arg(long, default_value = "16")]
    num_workers: usize,

    /// In-flight query permits per worker.
    #[arg(long, default_value = "4")]
    concurrent_queries: usize,

    /// Result count per query.
    #[arg(short = 'k', long, default_value = "50")]
    query_k: usize,

    /// Coarse partitions probed per query.
    #[arg(long, default_value = "1")]
    nprobes: usize,

    /// Re-ranking oversampling multiplier.
    #[arg(long, default_value = "10")]
    refine_factor: u32,

    /// Seed for dataset and query generation.
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Engine backing the run (lance requires --features lancedb).
    #[arg(long, value_enum)]
    engine: Option<EngineKind>,

    /// Directory for CSV + JSON result export.
    #[arg(long)]
    export: Option<PathBuf>,

    /// Skip the warmup pass (development only; the timed pass then measures
    /// whatever cache state the machine happens to be in).
    #[arg(long)]
    skip_warmup: bool,

    /// Skip page-cache eviction between phases.
    #[arg(long)]
    skip_cache_drop: bool,
}

/// Query-pool seed is decoupled from the dataset seed so pool contents never
/// depend on dataset count.
const QUERY_SEED_OFFSET: u64 = 999;

fn default_engine() -> EngineKind {
    if cfg!(feature = "lancedb") {
        EngineKind::Lance
    } else {
        EngineKind::Flat
    }
}

struct DatasetHandle {
    label: String,
    path: PathBuf,
    _store: Arc<dyn VectorStore>,
    table: Arc<dyn VectorTable>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> BenchResult<()> {
    let engine_kind = cli.engine.unwrap_or_else(default_engine);

    // Auto-generated dataset roots live until the end of the run.
    let mut _tmp_root: Option<tempfile::TempDir> = None;
    let datasets = if cli.dataset.is_empty() {
        let tmp = tempfile::TempDir::new()?;
        let paths = (0..cli.num_datasets)
            .map(|i| tmp.path().join(format!("dataset-{i}")))
            .collect();
        _tmp_root = Some(tmp);
        paths
    } else {
        cli.dataset.clone()
    };

    let cfg = BenchConfig {
        datasets,
        rows_per_dataset: cli.rows_per_dataset,
        vector_dim: cli.vector_dim,
        batch_size: cli.batch_size,
        num_partitions: cli.num_partitions,
        num_sub_vectors: cli.num_sub_vectors,
        distance: cli.distance_type,
        num_queries: cli.num_queries,
        num_workers: cli.num_workers,
        concurrent_queries: cli.concurrent_queries,
        query_k: cli.query_k,
        nprobes: cli.nprobes,
        refine_factor: cli.refine_factor,
        seed: cli.seed,
    };
    cfg.validate()?;

    println!("{}", "vecbench — cold-cache vector query latency".bold().blue());
    println!(
        "  engine: {:?}  datasets: {}  rows: {}  dim: {}  queries: {}",
        engine_kind,
        cfg.datasets.len(),
        cfg.rows_per_dataset,
        cfg.vector_dim,
        cfg.num_queries
    );

    // ── Materialize datasets and indices ──
    let index_spec = IndexSpec {
        distance: cfg.distance,
        num_partitions: cfg.num_partitions,
        num_sub_vectors: cfg.num_sub_vectors,
    };
    let mut handles = Vec::with_capacity(cfg.datasets.len());
    for (i, path) in cfg.datasets.iter().enumerate() {
        let label = format!("dataset-{i}");
        let store = engine::connect(engine_kind, path).await?;
        let table =
            dataset::ensure_dataset(store.as_ref(), &label, &cfg, cfg.seed + i as u64).await?;
        dataset::ensure_index(table.as_ref(), &label, &index_spec).await?;
        handles.push(DatasetHandle {
            label,
            path: path.clone(),
            _store: store,
            table,
        });
    }
    let tables: Vec<Arc<dyn VectorTable>> = handles.iter().map(|h| h.table.clone()).collect();

    // ── Fixed query pool, reused unmodified by both phases ──
    let queries = Arc::new(datagen::generate_queries(
        cfg.num_queries,
        cfg.vector_dim,
        cfg.seed + QUERY_SEED_OFFSET,
    ));

    // ── Warmup ──
    if cli.skip_warmup {
        tracing::info!("warmup skipped");
    } else {
        executor::run_phase(&tables, queries.clone(), &cfg, executor::Phase::Warmup).await?;
    }

    // ── Evict page caches so the timed phase reads cold ──
    if cli.skip_cache_drop {
        tracing::info!("cache drop skipped");
    } else {
        let mut total = pagecache::CacheDropStats::default();
        for handle in &handles {
            let dropped = pagecache::drop_cache(&handle.path)?;
            tracing::info!(
                dataset = %handle.label,
                files = dropped.files,
                bytes = dropped.bytes,
                "page cache dropped"
            );
            total.files += dropped.files;
            total.bytes += dropped.bytes;
        }
        tracing::info!(files = total.files, bytes = total.bytes, "cache eviction complete");
    }

    // ── Timed phase; throughput comes from this wall clock ──
    let started = Instant::now();
    let latencies =
        executor::run_phase(&tables, queries.clone(), &cfg, executor::Phase::Timed).await?;
    let wall = started.elapsed();

    // ── Aggregate and report ──
    let latency_stats = stats::LatencyStats::compute(&latencies);
    let throughput = stats::throughput(latencies.len(), wall);
    let summary = report::RunSummary::new(
        &format!("{engine_kind:?}").to_lowercase(),
        &cfg,
        latency_stats,
        wall.as_secs_f64(),
        throughput,
    );
    report::print_summary(&summary);

    if let Some(dir) = &cli.export {
        std::fs::create_dir_all(dir)?;
        report::export_csv(&summary, &dir.join("vecbench_results.csv"))?;
        report::export_json(&summary, &dir.join("vecbench_results.json"))?;
    }

    Ok(())
}
