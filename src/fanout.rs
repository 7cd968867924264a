//! Per-shard dispatch and the delete-race retry.
//!
//! A shard query resolves the current cube pointer, then reads the cube.
//! A merge may reclaim that cube in between; the read then fails with
//! `SegmentDeleted` and is retried with a fresh pointer resolution.

use rayon::prelude::*;

use crate::error::{OlapError, Result};

/// Build the fan-out pool. `threads == 0` means no pool: shard queries run
/// sequentially on the caller's thread.
pub fn build_pool(threads: usize) -> Result<Option<rayon::ThreadPool>> {
    if threads == 0 {
        return Ok(None);
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("olap-shard-{i}"))
        .build()
        .map_err(|e| OlapError::InvalidConfig(format!("rayon pool: {e}")))?;
    Ok(Some(pool))
}

/// Run `op` up to `attempts` times, retrying only retryable failures.
/// The last error propagates unchanged.
pub fn with_retry<T>(attempts: u32, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Err(err) if err.is_retryable() && attempt < attempts => {
                tracing::warn!(what, attempt, error = %err, "retrying after concurrent merge");
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Apply `f` to every shard, in parallel when a pool is given. Results come
/// back in shard order; the first error wins.
pub fn for_each_shard<T, F>(pool: Option<&rayon::ThreadPool>, shards: &[String], f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(&str) -> Result<T> + Sync,
{
    match pool {
        Some(pool) if shards.len() > 1 => {
            pool.install(|| shards.par_iter().map(|shard| f(shard)).collect())
        }
        _ => shards.iter().map(|shard| f(shard)).collect(),
    }
}
