//! Columnar segment format and consolidation.
//!
//! Pending writes keep the whole batch in `batch.bin`. A cube is laid out
//! per table, one column file per field, all columns aligned with the
//! sorted id list:
//!
//! ```text
//! .cube.<uuid>/
//! +-- tables.bin           # Vec<String>, every table written below
//! +-- <table>/
//! |   +-- ids.bin          # Vec<String>, sorted
//! |   +-- fields.bin       # Vec<String>
//! |   +-- f.<field>.bin    # Column
//! ```
//!
//! All files are bincode. `tables.bin` is written after the table
//! directories, so a readable manifest names only complete tables and a
//! manifest table with no directory means the cube is being reclaimed.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::directory::Directory;
use crate::storage::segment_name::{SegmentKind, SegmentName};
use crate::storage::segment_store::SegmentStore;
use crate::types::{Document, SegmentBatch, Value};

pub const BATCH_FILE: &str = "batch.bin";
pub const IDS_FILE: &str = "ids.bin";
pub const FIELDS_FILE: &str = "fields.bin";
pub const TABLES_FILE: &str = "tables.bin";

pub fn column_file(field: &str) -> String {
    format!("f.{}.bin", field)
}

// ── Column ─────────────────────────────────────────────────────────

/// Decoded values of one field, indexed by document ordinal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub rows: Vec<Option<Value>>,
}

impl Column {
    pub fn new(rows: Vec<Option<Value>>) -> Self {
        Self { rows }
    }

    /// Column with no values for `len` documents.
    pub fn empty(len: usize) -> Self {
        Self {
            rows: vec![None; len],
        }
    }

    #[inline]
    pub fn get(&self, doc: u32) -> Option<&Value> {
        self.rows.get(doc as usize).and_then(|v| v.as_ref())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Byte estimate reported to the field cache.
    pub fn estimated_size(&self) -> usize {
        let slots = self.rows.len() * std::mem::size_of::<Option<Value>>();
        let heap: usize = self
            .rows
            .iter()
            .flatten()
            .map(|v| v.estimated_size() - std::mem::size_of::<Value>())
            .sum();
        slots + heap
    }
}

// ── Cube Content ───────────────────────────────────────────────────

/// Documents of one table keyed (and therefore sorted) by id.
pub type TableDocs = BTreeMap<String, Document>;

/// In-memory consolidated state of a shard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CubeContent {
    pub tables: BTreeMap<String, TableDocs>,
}

impl CubeContent {
    /// Apply a write. Deletes apply first, then adds. Adds replace existing
    /// documents only when `overwrite` is set.
    pub fn apply_batch(&mut self, batch: &SegmentBatch, overwrite: bool) {
        for (table, ops) in &batch.tables {
            let docs = self.tables.entry(table.clone()).or_default();
            for id in &ops.deletes {
                docs.remove(id);
            }
            for doc in &ops.adds {
                if overwrite || !docs.contains_key(&doc.id) {
                    docs.insert(doc.id.clone(), doc.clone());
                }
            }
        }
    }

    /// Layer a previously consolidated cube over the current state.
    pub fn apply_cube(&mut self, cube: CubeContent) {
        for (table, docs) in cube.tables {
            self.tables.entry(table).or_default().extend(docs);
        }
    }

    pub fn doc_count(&self) -> usize {
        self.tables.values().map(|t| t.len()).sum()
    }

    pub fn get(&self, table: &str, id: &str) -> Option<&Document> {
        self.tables.get(table).and_then(|t| t.get(id))
    }
}

// ── Write ──────────────────────────────────────────────────────────

/// Write `content` as a cube under `seg_path`. Empty tables are omitted.
/// The caller marks the directory created.
pub fn write_cube(dir: &dyn Directory, seg_path: &Path, content: &CubeContent) -> Result<()> {
    dir.make_dirs(seg_path)?;
    let mut written: Vec<&String> = Vec::new();
    for (table, docs) in &content.tables {
        if docs.is_empty() {
            continue;
        }
        written.push(table);
        let table_path = seg_path.join(table);
        dir.make_dirs(&table_path)?;

        let ids: Vec<&String> = docs.keys().collect();
        dir.write_file(&table_path.join(IDS_FILE), &bincode::serialize(&ids)?)?;

        let fields: BTreeSet<&String> = docs.values().flat_map(|d| d.fields.keys()).collect();
        dir.write_file(&table_path.join(FIELDS_FILE), &bincode::serialize(&fields)?)?;

        for field in fields {
            let column = Column::new(
                docs.values()
                    .map(|d| d.fields.get(field.as_str()).cloned())
                    .collect(),
            );
            dir.write_file(
                &table_path.join(column_file(field)),
                &bincode::serialize(&column)?,
            )?;
        }
    }
    dir.write_file(&seg_path.join(TABLES_FILE), &bincode::serialize(&written)?)?;
    Ok(())
}

// ── Read ───────────────────────────────────────────────────────────

/// Table names recorded in a cube's manifest.
pub fn read_tables(dir: &dyn Directory, seg_path: &Path) -> Result<Vec<String>> {
    Ok(bincode::deserialize(&dir.read_file(&seg_path.join(TABLES_FILE))?)?)
}

pub fn read_ids(dir: &dyn Directory, table_path: &Path) -> Result<Vec<String>> {
    Ok(bincode::deserialize(&dir.read_file(&table_path.join(IDS_FILE))?)?)
}

pub fn read_fields(dir: &dyn Directory, table_path: &Path) -> Result<Vec<String>> {
    Ok(bincode::deserialize(&dir.read_file(&table_path.join(FIELDS_FILE))?)?)
}

pub fn read_column(dir: &dyn Directory, table_path: &Path, field: &str) -> Result<Column> {
    Ok(bincode::deserialize(&dir.read_file(&table_path.join(column_file(field)))?)?)
}

/// Decode a whole cube back into documents.
pub fn read_cube(dir: &dyn Directory, seg_path: &Path) -> Result<CubeContent> {
    let mut content = CubeContent::default();
    for table in read_tables(dir, seg_path)? {
        let table_path = seg_path.join(&table);
        let ids = read_ids(dir, &table_path)?;
        let mut docs: Vec<Document> = ids.into_iter().map(Document::new).collect();
        for field in read_fields(dir, &table_path)? {
            let column = read_column(dir, &table_path, &field)?;
            for (doc, value) in docs.iter_mut().zip(column.rows) {
                if let Some(value) = value {
                    doc.fields.insert(field.clone(), value);
                }
            }
        }
        content
            .tables
            .insert(table, docs.into_iter().map(|d| (d.id.clone(), d)).collect());
    }
    Ok(content)
}

// ── Consolidate ────────────────────────────────────────────────────

/// Fold a shard's segments into one state.
///
/// Inputs are applied in the given order; later inputs override earlier
/// ones for the same document id. `.before.` segments only fill gaps.
pub fn consolidate(
    store: &SegmentStore,
    app: &str,
    shard: &str,
    inputs: &[SegmentName],
) -> Result<CubeContent> {
    let mut content = CubeContent::default();
    for input in inputs {
        match input.kind {
            SegmentKind::Cube => {
                let path = SegmentStore::segment_path(app, shard, &input.name);
                content.apply_cube(read_cube(store.directory(), &path)?);
            }
            SegmentKind::Ordinary => {
                content.apply_batch(&store.read_batch(app, shard, &input.name)?, true);
            }
            SegmentKind::Before => {
                content.apply_batch(&store.read_batch(app, shard, &input.name)?, false);
            }
        }
    }
    Ok(content)
}
