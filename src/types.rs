//! Document and batch types shared by segments, cubes and queries.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Binary join key: the raw bytes of a referenced document id.
pub type JoinKey = Vec<u8>;

/// Reserved field name addressing the document id.
pub const ID_FIELD: &str = "_id";

// ── Value ──────────────────────────────────────────────────────────

/// A field value. Lists hold multi-valued fields (one-to-many links).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    /// Iterate the scalar values, flattening lists.
    pub fn scalars(&self) -> Vec<&Value> {
        match self {
            Value::List(items) => items.iter().flat_map(|v| v.scalars()).collect(),
            other => vec![other],
        }
    }

    /// Numeric view used by metrics. Strings never coerce.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Join key of a scalar value.
    pub fn join_key(&self) -> JoinKey {
        self.to_string().into_bytes()
    }

    /// Approximate heap + inline size, used for field cache accounting.
    pub fn estimated_size(&self) -> usize {
        let inline = std::mem::size_of::<Value>();
        match self {
            Value::Str(s) => inline + s.len(),
            Value::List(items) => inline + items.iter().map(Value::estimated_size).sum::<usize>(),
            _ => inline,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::Str(_) => 2,
            Value::List(_) => 3,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(","))
            }
        }
    }
}

// ── Document ───────────────────────────────────────────────────────

/// A document keyed by `id` within one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: BTreeMap<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

// ── Batches ────────────────────────────────────────────────────────

/// Document adds and deletes for one table within one write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableBatch {
    pub adds: Vec<Document>,
    pub deletes: Vec<String>,
}

/// One write: the content of an ordinary or `.before.` segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentBatch {
    pub tables: BTreeMap<String, TableBatch>,
}

impl SegmentBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add documents to a table.
    pub fn add(mut self, table: &str, docs: impl IntoIterator<Item = Document>) -> Self {
        self.tables
            .entry(table.to_string())
            .or_default()
            .adds
            .extend(docs);
        self
    }

    /// Delete document ids from a table.
    pub fn delete(mut self, table: &str, ids: impl IntoIterator<Item = String>) -> Self {
        self.tables
            .entry(table.to_string())
            .or_default()
            .deletes
            .extend(ids);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tables
            .values()
            .all(|t| t.adds.is_empty() && t.deletes.is_empty())
    }
}

// ── Tests ──────────────────────────────────────────────────────────
