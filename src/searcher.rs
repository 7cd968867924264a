//! Read handles onto a single cube.
//!
//! A `CubeSearcher` is bound to one `(app, shard, segment)` directory.
//! Segments are immutable, so a searcher never changes after `open` and
//! needs no locking; column payloads are decoded lazily through the shared
//! field cache. The only hazard is the directory disappearing under a
//! reader (a merge reclaimed it), which surfaces as `SegmentDeleted`.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::FieldCache;
use crate::error::{OlapError, Result};
use crate::storage::columnar::{self, Column};
use crate::storage::SegmentStore;
use crate::types::{Value, ID_FIELD};

/// Field cache key: one decoded column of one table of one segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldKey {
    pub app: String,
    pub shard: String,
    pub segment: String,
    pub table: String,
    pub field: String,
}

pub type SharedFieldCache = Arc<FieldCache<FieldKey, Column>>;

// ── Cube Searcher ──────────────────────────────────────────────────

pub struct CubeSearcher {
    app: String,
    shard: String,
    segment: String,
    path: PathBuf,
    store: Arc<SegmentStore>,
    field_cache: SharedFieldCache,
    /// Table name -> stored field names. Loaded once at open.
    tables: HashMap<String, HashSet<String>>,
}

impl CubeSearcher {
    /// Open a searcher on a cube directory. Fails with `SegmentDeleted`
    /// if the directory, its table manifest, or any listed table is gone.
    pub fn open(
        store: Arc<SegmentStore>,
        field_cache: SharedFieldCache,
        app: &str,
        shard: &str,
        segment: &str,
    ) -> Result<Self> {
        let path = SegmentStore::segment_path(app, shard, segment);
        let deleted = || OlapError::SegmentDeleted {
            app: app.to_string(),
            shard: shard.to_string(),
            segment: segment.to_string(),
        };
        if !store.directory().exists(&path) {
            return Err(deleted());
        }

        // The manifest lists every table the cube was written with; a listed
        // table without files means a reclaim is under way.
        let mut tables = HashMap::new();
        let names = columnar::read_tables(store.directory(), &path)
            .map_err(|e| missing_as(e, deleted))?;
        for table in names {
            let table_path = path.join(&table);
            if !store.directory().exists(&table_path) {
                return Err(deleted());
            }
            let fields = columnar::read_fields(store.directory(), &table_path)
                .map_err(|e| missing_as(e, deleted))?;
            tables.insert(table, fields.into_iter().collect());
        }

        tracing::debug!(app, shard, segment, tables = tables.len(), "opened cube searcher");

        Ok(Self {
            app: app.to_string(),
            shard: shard.to_string(),
            segment: segment.to_string(),
            path,
            store,
            field_cache,
            tables,
        })
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn shard(&self) -> &str {
        &self.shard
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// Search surface for one table. Tables absent from the cube are empty.
    pub fn table(&self, table: &str) -> TableSearcher<'_> {
        TableSearcher {
            cube: self,
            table: table.to_string(),
            fields: self.tables.get(table),
        }
    }

    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    fn key(&self, table: &str, field: &str) -> FieldKey {
        FieldKey {
            app: self.app.clone(),
            shard: self.shard.clone(),
            segment: self.segment.clone(),
            table: table.to_string(),
            field: field.to_string(),
        }
    }

    fn deleted(&self) -> OlapError {
        OlapError::SegmentDeleted {
            app: self.app.clone(),
            shard: self.shard.clone(),
            segment: self.segment.clone(),
        }
    }
}

/// Map a vanished file to the delete-race error.
fn missing_as(err: OlapError, deleted: impl FnOnce() -> OlapError) -> OlapError {
    match err {
        OlapError::Io(ref io) if io.kind() == ErrorKind::NotFound => deleted(),
        other => other,
    }
}

// ── Table Searcher ─────────────────────────────────────────────────

/// Id/field/value search surface of one table within a cube.
pub struct TableSearcher<'a> {
    cube: &'a CubeSearcher,
    table: String,
    fields: Option<&'a HashSet<String>>,
}

impl<'a> TableSearcher<'a> {
    pub fn name(&self) -> &str {
        &self.table
    }

    pub fn cube(&self) -> &'a CubeSearcher {
        self.cube
    }

    /// Sorted document ids as a column of strings.
    pub fn ids(&self) -> Result<Arc<Column>> {
        if self.fields.is_none() {
            return Ok(Arc::new(Column::default()));
        }
        let cube = self.cube;
        let table_path = cube.path.join(&self.table);
        cube.field_cache.get_or_load(&cube.key(&self.table, ID_FIELD), || {
            let ids = columnar::read_ids(cube.store.directory(), &table_path)
                .map_err(|e| missing_as(e, || cube.deleted()))?;
            let column = Column::new(ids.into_iter().map(|id| Some(Value::Str(id))).collect());
            let size = column.estimated_size();
            Ok((column, size))
        })
    }

    pub fn doc_count(&self) -> Result<usize> {
        Ok(self.ids()?.len())
    }

    /// Id of a document ordinal.
    pub fn id(&self, doc: u32) -> Result<Option<String>> {
        Ok(self.ids()?.get(doc).map(|v| v.to_string()))
    }

    /// Ordinal of a document id (binary search over the sorted ids).
    pub fn find(&self, id: &str) -> Result<Option<u32>> {
        let ids = self.ids()?;
        let found = ids.rows.binary_search_by(|probe| match probe {
            Some(Value::Str(s)) => s.as_str().cmp(id),
            _ => Ordering::Less,
        });
        Ok(found.ok().map(|i| i as u32))
    }

    /// Stored field names, sorted. Excludes `_id`.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.into_iter().flatten().cloned().collect();
        names.sort();
        names
    }

    pub fn has_field(&self, field: &str) -> bool {
        field == ID_FIELD || self.fields.is_some_and(|f| f.contains(field))
    }

    /// Column of a field. `_id` yields the ids; unknown fields yield an
    /// all-empty column.
    pub fn column(&self, field: &str) -> Result<Arc<Column>> {
        if field == ID_FIELD {
            return self.ids();
        }
        if !self.has_field(field) {
            return Ok(Arc::new(Column::empty(self.doc_count()?)));
        }
        let cube = self.cube;
        let table_path = cube.path.join(&self.table);
        cube.field_cache.get_or_load(&cube.key(&self.table, field), || {
            let column = columnar::read_column(cube.store.directory(), &table_path, field)
                .map_err(|e| missing_as(e, || cube.deleted()))?;
            let size = column.estimated_size();
            Ok((column, size))
        })
    }
}
