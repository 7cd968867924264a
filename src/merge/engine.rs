//! Shard merge engine.
//!
//! Per shard:
//! 1. Guard: register `app/shard` as in progress, or fail fast
//! 2. Plan: list durable segments; skip empty or already-merged shards
//! 3. Consolidate: fold all inputs into a new `.cube.<uuid>` directory
//! 4. Publish: expiration property, cube pointer, then mark created
//! 5. Grace period: optional sleep for in-flight readers of the old cube
//! 6. Reclaim: delete the inputs
//! 7. Release the guard on every exit path
//!
//! A merge never blocks readers. A reader that resolved the old pointer and
//! outlives the grace period hits `SegmentDeleted` and retries; the grace
//! period narrows that window but does not close it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{OlapError, Result};
use crate::merge::types::{MergeOptions, MergeOutcome, MergeReport};
use crate::storage::columnar::{consolidate, write_cube};
use crate::storage::{SegmentName, SegmentStore};

// ── Guard ──────────────────────────────────────────────────────────

/// Membership of a shard in the in-progress set. Released on drop.
pub struct MergeGuard<'a> {
    in_progress: &'a Mutex<HashSet<String>>,
    key: String,
}

impl Drop for MergeGuard<'_> {
    fn drop(&mut self) {
        self.in_progress.lock().remove(&self.key);
    }
}

// ── Engine ─────────────────────────────────────────────────────────

pub struct MergeEngine {
    store: Arc<SegmentStore>,
    in_progress: Mutex<HashSet<String>>,
}

impl MergeEngine {
    pub fn new(store: Arc<SegmentStore>) -> Self {
        Self {
            store,
            in_progress: Mutex::new(HashSet::new()),
        }
    }

    /// Claim a shard for merging. A second claim fails immediately with
    /// `MergeInProgress`.
    pub fn guard(&self, app: &str, shard: &str) -> Result<MergeGuard<'_>> {
        let key = format!("{}/{}", app, shard);
        if !self.in_progress.lock().insert(key.clone()) {
            return Err(OlapError::MergeInProgress {
                app: app.to_string(),
                shard: shard.to_string(),
            });
        }
        Ok(MergeGuard {
            in_progress: &self.in_progress,
            key,
        })
    }

    pub fn is_merging(&self, app: &str, shard: &str) -> bool {
        self.in_progress.lock().contains(&format!("{}/{}", app, shard))
    }

    /// Merge every segment of a shard into a new cube.
    pub fn merge(&self, app: &str, shard: &str, options: &MergeOptions) -> Result<MergeOutcome> {
        let _guard = self.guard(app, shard)?;
        let start = Instant::now();

        // ── Plan ───────────────────────────────────────────────────
        let segments = self.store.list_segments(app, shard)?;
        if segments.is_empty() {
            tracing::debug!(app, shard, "nothing to merge");
            return Ok(MergeOutcome::NothingToMerge);
        }
        if segments.len() == 1 && segments[0].is_cube() && !options.force_merge {
            tracing::debug!(app, shard, cube = %segments[0].name, "shard already merged");
            return Ok(MergeOutcome::AlreadyMerged {
                cube: segments[0].name.clone(),
            });
        }
        let current = self.store.cube_pointer(app, shard)?;
        let inputs = apply_order(segments, current.as_deref());

        // ── Consolidate ────────────────────────────────────────────
        // A failure here leaves the new directory begun but never created;
        // listing ignores it.
        let content = consolidate(&self.store, app, shard, &inputs)?;
        let cube = self.store.ids().next_cube();
        let path = self.store.begin_segment(app, shard, &cube)?;
        write_cube(self.store.directory(), &path, &content)?;

        // ── Publish ────────────────────────────────────────────────
        self.store.set_expiration(app, shard, options.expire_date)?;
        self.store.set_cube_pointer(app, shard, &cube)?;
        self.store.mark_created(app, shard, &cube)?;
        tracing::info!(
            app,
            shard,
            cube = %cube,
            inputs = inputs.len(),
            documents = content.doc_count(),
            "published cube"
        );

        // ── Grace period ───────────────────────────────────────────
        if options.timeout > 0 {
            std::thread::sleep(Duration::from_secs(options.timeout));
        }

        // ── Reclaim ────────────────────────────────────────────────
        let mut reclaim_failures = 0;
        for input in &inputs {
            if let Err(e) = self.store.delete_segment(app, shard, &input.name) {
                tracing::warn!(app, shard, segment = %input.name, "reclaim failed: {}", e);
                reclaim_failures += 1;
            }
        }

        Ok(MergeOutcome::Merged(MergeReport {
            cube,
            merged_segments: inputs.into_iter().map(|s| s.name).collect(),
            documents: content.doc_count(),
            reclaim_failures,
            duration_ms: start.elapsed().as_millis() as u64,
        }))
    }
}

/// Order inputs for consolidation: stray cubes, then the published cube,
/// then pending writes by creation stamp. `segments` arrives in creation
/// order (cubes first).
fn apply_order(segments: Vec<SegmentName>, current: Option<&str>) -> Vec<SegmentName> {
    let (mut cubes, pending): (Vec<SegmentName>, Vec<SegmentName>) =
        segments.into_iter().partition(|s| s.is_cube());
    if let Some(current) = current {
        if let Some(pos) = cubes.iter().position(|c| c.name == current) {
            let published = cubes.remove(pos);
            cubes.push(published);
        }
    }
    cubes.extend(pending);
    cubes
}

// ── Tests ──────────────────────────────────────────────────────────
