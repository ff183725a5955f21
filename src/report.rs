//! Terminal report plus CSV/JSON export of a finished run.

use crate::config::BenchConfig;
use crate::stats::LatencyStats;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Table};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub cpus: usize,
    pub timestamp: String,
}

impl SystemInfo {
    pub fn collect() -> Self {
        let epoch = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpus: std::thread::available_parallelism().map(|p| p.get()).unwrap_or(1),
            timestamp: format!("{}s-since-epoch", epoch.as_secs()),
        }
    }
}

/// Everything a finished run reports.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub engine: String,
    pub datasets: usize,
    pub rows_per_dataset: usize,
    pub vector_dim: usize,
    pub num_queries: usize,
    pub num_workers: usize,
    pub concurrent_queries: usize,
    pub query_k: usize,
    pub nprobes: usize,
    pub refine_factor: u32,
    pub wall_secs: f64,
    pub throughput_qps: f64,
    pub latency: LatencyStats,
    pub system: SystemInfo,
}

impl RunSummary {
    pub fn new(
        engine: &str,
        cfg: &BenchConfig,
        latency: LatencyStats,
        wall_secs: f64,
        throughput_qps: f64,
    ) -> Self {
        Self {
            engine: engine.to_string(),
            datasets: cfg.datasets.len(),
            rows_per_dataset: cfg.rows_per_dataset,
            vector_dim: cfg.vector_dim,
            num_queries: cfg.num_queries,
            num_workers: cfg.num_workers,
            concurrent_queries: cfg.concurrent_queries,
            query_k: cfg.query_k,
            nprobes: cfg.nprobes,
            refine_factor: cfg.refine_factor,
            wall_secs,
            throughput_qps,
            latency,
            system: SystemInfo::collect(),
        }
    }
}

/// Print the latency/throughput report for the timed phase.
pub fn print_summary(summary: &RunSummary) {
    println!("\n{}", "━━━ Cold-cache query latency ━━━".bold().cyan());
    println!(
        "  engine: {}  datasets: {}  rows/dataset: {}  dim: {}",
        summary.engine, summary.datasets, summary.rows_per_dataset, summary.vector_dim
    );
    println!(
        "  queries: {}  workers: {}  per-worker: {}  k: {}  nprobes: {}  refine: {}",
        summary.num_queries,
        summary.num_workers,
        summary.concurrent_queries,
        summary.query_k,
        summary.nprobes,
        summary.refine_factor
    );

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(vec!["Metric", "Seconds"]);
    let l = &summary.latency;
    for (name, value) in [
        ("mean", l.mean),
        ("std", l.std),
        ("min", l.min),
        ("max", l.max),
        ("p50", l.p50),
        ("p95", l.p95),
        ("p99", l.p99),
    ] {
        table.add_row(vec![Cell::new(name), Cell::new(format!("{value:.6}"))]);
    }
    println!("{table}");

    println!(
        "  {} {:.1} queries/sec  ({} queries in {:.2}s)",
        "throughput:".bold().green(),
        summary.throughput_qps,
        summary.num_queries,
        summary.wall_secs
    );
}

pub fn export_json(summary: &RunSummary, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(summary).map_err(std::io::Error::other)?;
    std::fs::write(path, json)?;
    println!("  JSON exported to {}", path.display());
    Ok(())
}

pub fn export_csv(summary: &RunSummary, path: &Path) -> std::io::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record([
        "engine",
        "datasets",
        "rows_per_dataset",
        "vector_dim",
        "num_queries",
        "num_workers",
        "concurrent_queries",
        "query_k",
        "nprobes",
        "refine_factor",
        "wall_secs",
        "throughput_qps",
        "mean_s",
        "std_s",
        "min_s",
        "max_s",
        "p50_s",
        "p95_s",
        "p99_s",
    ])?;
    let l = &summary.latency;
    wtr.write_record([
        summary.engine.clone(),
        summary.datasets.to_string(),
        summary.rows_per_dataset.to_string(),
        summary.vector_dim.to_string(),
        summary.num_queries.to_string(),
        summary.num_workers.to_string(),
        summary.concurrent_queries.to_string(),
        summary.query_k.to_string(),
        summary.nprobes.to_string(),
        summary.refine_factor.to_string(),
        format!("{:.6}", summary.wall_secs),
        format!("{:.2}", summary.throughput_qps),
        format!("{:.6}", l.mean),
        format!("{:.6}", l.std),
        format!("{:.6}", l.min),
        format!("{:.6}", l.max),
        format!("{:.6}", l.p50),
        format!("{:.6}", l.p95),
        format!("{:.6}", l.p99),
    ])?;
    wtr.flush()?;
    println!("  CSV exported to {}", path.display());
    Ok(())
}
