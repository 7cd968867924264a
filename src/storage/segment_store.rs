//! Per-shard segment store.
//!
//! Owns the on-disk layout, segment naming, the cube pointer and the
//! retention marker. Every operation except `add_segment` requires the
//! shard to exist.
//!
//! # Storage Layout
//!
//! ```text
//! applications/
//! +-- <app>/
//! |   +-- <shard>/
//! |   |   +-- .cube.txt            # current cube pointer
//! |   |   +-- expiration.txt       # optional retention date
//! |   |   +-- .cube.<uuid>/        # consolidated cube
//! |   |   +-- <b36>-<uuid>/        # pending write
//! |   |   +-- .before.<b36>-<uuid>/
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::{OlapError, Result};
use crate::storage::columnar::BATCH_FILE;
use crate::storage::directory::{Directory, FsDirectory};
use crate::storage::segment_name::{SegmentIdGenerator, SegmentName};
use crate::types::SegmentBatch;

pub const APPLICATIONS_DIR: &str = "applications";
pub const CUBE_POINTER: &str = ".cube.txt";
pub const EXPIRATION: &str = "expiration.txt";
pub const EXPIRATION_FORMAT: &str = "%Y-%m-%d";

pub struct SegmentStore {
    dir: Arc<dyn Directory>,
    ids: SegmentIdGenerator,
}

impl SegmentStore {
    pub fn new(dir: Arc<dyn Directory>) -> Self {
        Self {
            dir,
            ids: SegmentIdGenerator::new(),
        }
    }

    /// Store rooted at a local filesystem path.
    pub fn open_fs(root: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FsDirectory::new(root)))
    }

    pub fn directory(&self) -> &dyn Directory {
        self.dir.as_ref()
    }

    pub fn ids(&self) -> &SegmentIdGenerator {
        &self.ids
    }

    // ── Paths ──────────────────────────────────────────────────────

    pub fn app_path(app: &str) -> PathBuf {
        Path::new(APPLICATIONS_DIR).join(app)
    }

    pub fn shard_path(app: &str, shard: &str) -> PathBuf {
        Self::app_path(app).join(shard)
    }

    pub fn segment_path(app: &str, shard: &str, segment: &str) -> PathBuf {
        Self::shard_path(app, shard).join(segment)
    }

    fn require_shard(&self, app: &str, shard: &str) -> Result<PathBuf> {
        let path = Self::shard_path(app, shard);
        if !self.dir.exists(&path) {
            return Err(OlapError::ShardNotFound {
                app: app.to_string(),
                shard: shard.to_string(),
            });
        }
        Ok(path)
    }

    fn require_segment(&self, app: &str, shard: &str, segment: &str) -> Result<PathBuf> {
        self.require_shard(app, shard)?;
        let path = Self::segment_path(app, shard, segment);
        if !self.dir.exists(&path) {
            return Err(OlapError::SegmentNotFound {
                app: app.to_string(),
                shard: shard.to_string(),
                segment: segment.to_string(),
            });
        }
        Ok(path)
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Write a batch as a new immutable segment, creating the shard if
    /// needed. `overwrite = false` names it `.before.`.
    pub fn add_segment(
        &self,
        app: &str,
        shard: &str,
        batch: &SegmentBatch,
        overwrite: bool,
    ) -> Result<String> {
        let name = self.ids.next(overwrite);
        let path = Self::segment_path(app, shard, &name);
        self.dir.make_dirs(&path)?;
        let bytes = bincode::serialize(batch)?;
        self.dir.write_file(&path.join(BATCH_FILE), &bytes)?;
        self.dir.create(&path)?;
        tracing::debug!(app, shard, segment = %name, "segment added");
        Ok(name)
    }

    /// Begin a segment directory that is not yet durable.
    pub fn begin_segment(&self, app: &str, shard: &str, segment: &str) -> Result<PathBuf> {
        let path = Self::segment_path(app, shard, segment);
        self.dir.make_dirs(&path)?;
        Ok(path)
    }

    /// Mark a begun segment durable; it becomes visible to listing.
    pub fn mark_created(&self, app: &str, shard: &str, segment: &str) -> Result<()> {
        self.dir.create(&Self::segment_path(app, shard, segment))
    }

    // ── Listing ────────────────────────────────────────────────────

    /// All shards of an application, sorted. Unknown applications have none.
    pub fn list_shards(&self, app: &str) -> Result<Vec<String>> {
        let path = Self::app_path(app);
        if !self.dir.exists(&path) {
            return Ok(Vec::new());
        }
        let mut shards = self.dir.list_directories(&path)?;
        shards.sort();
        Ok(shards)
    }

    pub fn shard_exists(&self, app: &str, shard: &str) -> bool {
        self.dir.exists(&Self::shard_path(app, shard))
    }

    /// Durable segments of a shard in creation order. Directories that were
    /// begun but never created, or whose names fall outside the grammar,
    /// are ignored.
    pub fn list_segments(&self, app: &str, shard: &str) -> Result<Vec<SegmentName>> {
        let shard_path = self.require_shard(app, shard)?;
        let mut segments: Vec<SegmentName> = self
            .dir
            .list_directories(&shard_path)?
            .into_iter()
            .filter(|name| self.dir.is_created(&shard_path.join(name)))
            .filter_map(|name| SegmentName::parse(&name))
            .collect();
        segments.sort_by(|a, b| a.creation_cmp(b));
        Ok(segments)
    }

    pub fn read_batch(&self, app: &str, shard: &str, segment: &str) -> Result<SegmentBatch> {
        let path = self.require_segment(app, shard, segment)?;
        let bytes = self.dir.read_file(&path.join(BATCH_FILE))?;
        Ok(bincode::deserialize(&bytes)?)
    }

    // ── Deletes ────────────────────────────────────────────────────

    pub fn delete_shard(&self, app: &str, shard: &str) -> Result<()> {
        let path = self.require_shard(app, shard)?;
        self.dir.delete(&path)
    }

    pub fn delete_segment(&self, app: &str, shard: &str, segment: &str) -> Result<()> {
        let path = self.require_segment(app, shard, segment)?;
        self.dir.delete(&path)
    }

    // ── Properties ─────────────────────────────────────────────────

    /// Current cube of a shard; None if no merge has ever published one.
    pub fn cube_pointer(&self, app: &str, shard: &str) -> Result<Option<String>> {
        let path = self.require_shard(app, shard)?;
        self.dir.get_property(&path, CUBE_POINTER)
    }

    /// Publish a cube. This single property write is the shard's
    /// linearization point.
    pub fn set_cube_pointer(&self, app: &str, shard: &str, segment: &str) -> Result<()> {
        let path = self.require_shard(app, shard)?;
        self.dir.put_property(&path, CUBE_POINTER, Some(segment))
    }

    pub fn expiration(&self, app: &str, shard: &str) -> Result<Option<NaiveDate>> {
        let path = self.require_shard(app, shard)?;
        match self.dir.get_property(&path, EXPIRATION)? {
            None => Ok(None),
            Some(raw) => NaiveDate::parse_from_str(&raw, EXPIRATION_FORMAT)
                .map(Some)
                .map_err(|e| {
                    OlapError::InvalidConfig(format!("bad expiration '{}': {}", raw, e))
                }),
        }
    }

    /// Set or clear the retention marker.
    pub fn set_expiration(&self, app: &str, shard: &str, date: Option<NaiveDate>) -> Result<()> {
        let path = self.require_shard(app, shard)?;
        let formatted = date.map(|d| d.format(EXPIRATION_FORMAT).to_string());
        self.dir.put_property(&path, EXPIRATION, formatted.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::segment_name::SegmentKind;
    use crate::types::Document;
    use tempfile::tempdir;

    fn batch(id: &str) -> SegmentBatch {
        SegmentBatch::new().add("t", vec![Document::new(id).with("x", 1i64)])
    }

    #[test]
    fn test_add_segment_auto_creates_shard() {
        let dir = tempdir().unwrap();
        let store = SegmentStore::open_fs(dir.path());
        assert!(!store.shard_exists("app", "2024-01"));

        let name = store.add_segment("app", "2024-01", &batch("a"), true).unwrap();
        assert!(store.shard_exists("app", "2024-01"));

        let segments = store.list_segments("app", "2024-01").unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].name, name);
        assert_eq!(segments[0].kind, SegmentKind::Ordinary);
        assert_eq!(store.read_batch("app", "2024-01", &name).unwrap(), batch("a"));
    }

    #[test]
    fn test_overwrite_false_uses_before_prefix() {
        let dir = tempdir().unwrap();
        let store = SegmentStore::open_fs(dir.path());
        let name = store.add_segment("app", "s", &batch("a"), false).unwrap();
        assert!(name.starts_with(".before."));
    }

    #[test]
    fn test_list_ignores_uncreated_segments() {
        let dir = tempdir().unwrap();
        let store = SegmentStore::open_fs(dir.path());
        store.add_segment("app", "s", &batch("a"), true).unwrap();
        store.begin_segment("app", "s", ".cube.orphan").unwrap();

        let segments = store.list_segments("app", "s").unwrap();
        assert_eq!(segments.len(), 1);
        assert!(!segments[0].is_cube());
    }

    #[test]
    fn test_list_segments_in_creation_order() {
        let dir = tempdir().unwrap();
        let store = SegmentStore::open_fs(dir.path());
        let first = store.add_segment("app", "s", &batch("a"), true).unwrap();
        let second = store.add_segment("app", "s", &batch("b"), false).unwrap();
        let third = store.add_segment("app", "s", &batch("c"), true).unwrap();

        let names: Vec<String> = store
            .list_segments("app", "s")
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec![first, second, third]);
    }

    #[test]
    fn test_missing_shard_is_not_found() {
        let dir = tempdir().unwrap();
        let store = SegmentStore::open_fs(dir.path());
        assert!(matches!(
            store.list_segments("app", "nope"),
            Err(OlapError::ShardNotFound { .. })
        ));
        assert!(matches!(
            store.cube_pointer("app", "nope"),
            Err(OlapError::ShardNotFound { .. })
        ));
        assert!(store.list_shards("app").unwrap().is_empty());
    }

    #[test]
    fn test_delete_missing_segment_is_not_found() {
        let dir = tempdir().unwrap();
        let store = SegmentStore::open_fs(dir.path());
        store.add_segment("app", "s", &batch("a"), true).unwrap();
        assert!(matches!(
            store.delete_segment("app", "s", "nope"),
            Err(OlapError::SegmentNotFound { .. })
        ));
    }

    #[test]
    fn test_cube_pointer_and_expiration() {
        let dir = tempdir().unwrap();
        let store = SegmentStore::open_fs(dir.path());
        store.add_segment("app", "s", &batch("a"), true).unwrap();

        assert_eq!(store.cube_pointer("app", "s").unwrap(), None);
        store.set_cube_pointer("app", "s", ".cube.x").unwrap();
        assert_eq!(store.cube_pointer("app", "s").unwrap().as_deref(), Some(".cube.x"));

        let date = NaiveDate::from_ymd_opt(2030, 6, 1).unwrap();
        store.set_expiration("app", "s", Some(date)).unwrap();
        assert_eq!(store.expiration("app", "s").unwrap(), Some(date));
        store.set_expiration("app", "s", None).unwrap();
        assert_eq!(store.expiration("app", "s").unwrap(), None);
    }

    #[test]
    fn test_list_shards_sorted() {
        let dir = tempdir().unwrap();
        let store = SegmentStore::open_fs(dir.path());
        for shard in ["2024-03", "2024-01", "2024-02"] {
            store.add_segment("app", shard, &batch("a"), true).unwrap();
        }
        assert_eq!(
            store.list_shards("app").unwrap(),
            vec!["2024-01", "2024-02", "2024-03"]
        );
    }
}
