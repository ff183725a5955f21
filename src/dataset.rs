//! Dataset materialization and index building.
//!
//! Both operations are idempotent: a table with the expected row count is
//! reused as-is, and an already-indexed table is never re-indexed. Any
//! engine failure here is fatal to the run.

use crate::config::BenchConfig;
use crate::datagen::Datagen;
use crate::engine::{IndexSpec, VectorStore, VectorTable};
use crate::BenchResult;
use std::sync::Arc;
use std::time::Instant;

/// Table and column names are fixed; one table per dataset root.
pub const TABLE_NAME: &str = "vectors";
pub const VECTOR_COLUMN: &str = "vector";

/// Ensure the dataset table exists with exactly the configured row count.
///
/// Missing table: created from scratch by sequential synthetic batches.
/// Row-count mismatch: dropped and regenerated. Exact match: opened and
/// returned with zero writes.
pub async fn ensure_dataset(
    store: &dyn VectorStore,
    label: &str,
    cfg: &BenchConfig,
    seed: u64,
) -> BenchResult<Arc<dyn VectorTable>> {
    let rows = cfg.rows_per_dataset;

    if store.table_names().await?.iter().any(|n| n == TABLE_NAME) {
        let table = store.open_table(TABLE_NAME).await?;
        let count = table.count_rows().await?;
        if count == rows as u64 {
            tracing::info!(dataset = label, rows = count, "dataset up to date");
            return Ok(table);
        }
        tracing::info!(
            dataset = label,
            found = count,
            expected = rows,
            "row count mismatch, regenerating"
        );
        store.drop_table(TABLE_NAME).await?;
    } else {
        tracing::info!(dataset = label, rows, "dataset missing, generating");
    }

    // Sequential batch writes through a single table handle. Batches are
    // batch_size rows each, the final one sized to the remainder; rows below
    // batch_size produce a single batch of exactly rows.
    let mut gen = Datagen::new(seed);
    let started = Instant::now();
    let first = gen.batch(0, cfg.batch_size.min(rows), cfg.vector_dim);
    let mut written = first.len();
    let table = store.create_table(TABLE_NAME, first).await?;
    tracing::info!(dataset = label, written, total = rows, "wrote batch");

    while written < rows {
        let count = cfg.batch_size.min(rows - written);
        let batch = gen.batch(written as u64, count, cfg.vector_dim);
        table.add(batch).await?;
        written += count;
        tracing::info!(dataset = label, written, total = rows, "wrote batch");
    }

    tracing::info!(
        dataset = label,
        rows,
        elapsed_s = started.elapsed().as_secs_f64(),
        "dataset materialized"
    );
    Ok(table)
}

/// Ensure the table has a similarity index on the vector column.
///
/// The check is presence, not shape: any existing index skips the build,
/// even one that does not match the requested spec.
pub async fn ensure_index(
    table: &dyn VectorTable,
    label: &str,
    spec: &IndexSpec,
) -> BenchResult<()> {
    if !table.list_indices().await?.is_empty() {
        tracing::info!(dataset = label, "index present, skipping build");
        return Ok(());
    }

    tracing::info!(
        dataset = label,
        partitions = spec.num_partitions,
        sub_vectors = spec.num_sub_vectors,
        metric = %spec.distance,
        "building IVF-PQ index"
    );
    let started = Instant::now();
    table.create_index(VECTOR_COLUMN, spec).await?;
    tracing::info!(
        dataset = label,
        elapsed_s = started.elapsed().as_secs_f64(),
        "index built"
    );
    Ok(())
}
