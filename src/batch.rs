// batch.rs

use anyhow::{anyhow, Context, Result};
use log::info;
use rayon::prelude::*;

use crate::error::StructureMpError;

/// Partitions `items` into batches of at most `batch_size`, preserving
/// order. The last batch may be short.
pub fn generate_batches<T: Clone>(items: &[T], batch_size: usize) -> Vec<Vec<T>> {
    items
        .chunks(batch_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Applies `op` to every item, one batch at a time, on a worker pool sized
/// to the first batch. Each batch is fully dispatched and joined before the
/// next starts, so concurrency never exceeds the configured thread count.
/// Any worker failure aborts the batch and the run; there are no retries.
pub fn run_batches<T, F>(batches: &[Vec<T>], label: &str, op: F) -> Result<()>
where
    T: Sync,
    F: Fn(&T) -> std::result::Result<(), StructureMpError> + Sync,
{
    let Some(first) = batches.first() else {
        return Ok(());
    };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(first.len())
        .build()
        .context("failed to build worker pool")?;

    for (batch_no, batch) in batches.iter().enumerate() {
        pool.install(|| batch.par_iter().try_for_each(|item| op(item)))
            .map_err(|e| anyhow!("{}: batch {}/{} failed: {}", label, batch_no + 1, batches.len(), e))?;
        info!(
            "{}: batch {}/{} done ({} reps)",
            label,
            batch_no + 1,
            batches.len(),
            batch.len()
        );
    }
    Ok(())
}
