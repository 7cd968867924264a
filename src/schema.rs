//! Application/table schema provider.
//!
//! The schema is owned by an external service; the store only reads it.
//! Documents are schemaless: any field not declared here is a plain value
//! field. Declarations matter for links, which drive XLink resolution.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{OlapError, Result};

// ── Field Kinds ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// Plain stored value.
    Value,
    /// Stored ids of documents in `table` (direct link).
    Link { table: String },
    /// Virtual: documents of `table` whose link field `field` references
    /// this document's id (inverse link).
    InverseLink { table: String, field: String },
}

/// A resolved link declaration, as seen from the declaring table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// The local field holds join keys of `target` documents.
    Direct { field: String, target: String },
    /// `source` documents reference the local id through their `via` field.
    Inverse {
        field: String,
        source: String,
        via: String,
    },
}

impl Link {
    /// The table scanned across the x-shards to resolve this link.
    pub fn scanned_table(&self) -> &str {
        match self {
            Link::Direct { target, .. } => target,
            Link::Inverse { source, .. } => source,
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Link::Direct { field, .. } | Link::Inverse { field, .. } => field,
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Link::Direct { .. })
    }
}

// ── Tables & Applications ──────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldKind>,
}

impl TableSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.insert(name.to_string(), kind);
        self
    }

    /// Kind of a field; undeclared fields are plain values.
    pub fn kind(&self, field: &str) -> FieldKind {
        self.fields.get(field).cloned().unwrap_or(FieldKind::Value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    #[serde(default)]
    pub tables: BTreeMap<String, TableSchema>,
}

impl Application {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tables: BTreeMap::new(),
        }
    }

    pub fn with_table(mut self, name: &str, table: TableSchema) -> Self {
        self.tables.insert(name.to_string(), table);
        self
    }

    pub fn table(&self, name: &str) -> Result<&TableSchema> {
        self.tables.get(name).ok_or_else(|| OlapError::TableNotFound {
            app: self.name.clone(),
            table: name.to_string(),
        })
    }

    /// Resolve `field` of `table` as a link. Non-link fields are a
    /// configuration error.
    pub fn link(&self, table: &str, field: &str) -> Result<Link> {
        match self.table(table)?.kind(field) {
            FieldKind::Link { table: target } => Ok(Link::Direct {
                field: field.to_string(),
                target,
            }),
            FieldKind::InverseLink { table: source, field: via } => Ok(Link::Inverse {
                field: field.to_string(),
                source,
                via,
            }),
            FieldKind::Value => Err(OlapError::NotALink {
                table: table.to_string(),
                field: field.to_string(),
            }),
        }
    }

    /// Check link declarations: targets exist, inverse links point back
    /// through a direct link.
    pub fn validate(&self) -> Result<()> {
        for (table_name, table) in &self.tables {
            for (field, kind) in &table.fields {
                match kind {
                    FieldKind::Value => {}
                    FieldKind::Link { table: target } => {
                        self.table(target).map_err(|_| {
                            OlapError::InvalidConfig(format!(
                                "{}.{} links to unknown table '{}'",
                                table_name, field, target
                            ))
                        })?;
                    }
                    FieldKind::InverseLink { table: source, field: via } => {
                        let back = self.table(source).map(|t| t.kind(via));
                        match back {
                            Ok(FieldKind::Link { table: t }) if &t == table_name => {}
                            _ => {
                                return Err(OlapError::InvalidConfig(format!(
                                    "{}.{}: inverse link needs {}.{} to link to '{}'",
                                    table_name, field, source, via, table_name
                                )))
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

// ── Provider ───────────────────────────────────────────────────────

pub trait SchemaProvider: Send + Sync {
    fn application(&self, name: &str) -> Result<Arc<Application>>;
}

/// In-memory schema registry.
#[derive(Default)]
pub struct MemorySchemaProvider {
    apps: RwLock<BTreeMap<String, Arc<Application>>>,
}

#[derive(Deserialize)]
struct SchemaFile {
    applications: Vec<Application>,
}

impl MemorySchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an application after validating its links.
    pub fn register(&self, app: Application) -> Result<()> {
        app.validate()?;
        self.apps.write().insert(app.name.clone(), Arc::new(app));
        Ok(())
    }

    /// Load `{"applications": [...]}` from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let file: SchemaFile = serde_json::from_str(&contents)?;
        let provider = Self::new();
        for app in file.applications {
            provider.register(app)?;
        }
        Ok(provider)
    }
}

impl SchemaProvider for MemorySchemaProvider {
    fn application(&self, name: &str) -> Result<Arc<Application>> {
        self.apps
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| OlapError::ApplicationNotFound(name.to_string()))
    }
}
