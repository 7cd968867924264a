//! Document search: request validation, per-cube execution and the
//! cross-shard merge.
//!
//! Each shard returns its locally ranked top `skip + size` rows. The merge
//! re-ranks the union and only then drops the first `skip` rows, since a
//! shard-local skip window says nothing about the global one. An id cursor
//! (`continue-at`/`continue-after`) filters before the shard limit and
//! counts toward `total` like any other predicate.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{OlapError, Result};
use crate::query::{get_shards_list, parse_query, rewrite_query, Pair, Query, ShardSelector};
use crate::searcher::CubeSearcher;
use crate::types::{Value, ID_FIELD};

pub const DEFAULT_PAGE_SIZE: usize = 100;

/// A search as received from the request layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SearchRequest {
    pub query: String,
    /// Fields to return. Empty means every stored field.
    pub fields: Vec<String>,
    /// Sort field; a leading `-` sorts descending. Unset sorts by id.
    pub order: Option<String>,
    pub size: usize,
    pub skip: usize,
    /// Id cursor: only documents with `_id >= continue_at`.
    pub continue_at: Option<String>,
    /// Id cursor: only documents with `_id > continue_after`.
    pub continue_after: Option<String>,
    /// Two comma-separated field names substituted for `_pair.first` and
    /// `_pair.second`.
    pub pair: Option<String>,
    pub shards: Option<ShardSelector>,
    pub x_shards: Option<ShardSelector>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            fields: Vec::new(),
            order: None,
            size: DEFAULT_PAGE_SIZE,
            skip: 0,
            continue_at: None,
            continue_after: None,
            pair: None,
            shards: None,
            x_shards: None,
        }
    }
}

impl SearchRequest {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Self::default()
        }
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn order(mut self, order: &str) -> Self {
        self.order = Some(order.to_string());
        self
    }

    pub fn page(mut self, skip: usize, size: usize) -> Self {
        self.skip = skip;
        self.size = size;
        self
    }

    pub fn continue_at(mut self, id: &str) -> Self {
        self.continue_at = Some(id.to_string());
        self
    }

    pub fn continue_after(mut self, id: &str) -> Self {
        self.continue_after = Some(id.to_string());
        self
    }

    pub fn pair(mut self, pair: &str) -> Self {
        self.pair = Some(pair.to_string());
        self
    }

    pub fn shards(mut self, selector: ShardSelector) -> Self {
        self.shards = Some(selector);
        self
    }

    pub fn x_shards(mut self, selector: ShardSelector) -> Self {
        self.x_shards = Some(selector);
        self
    }
}

// ── Plan ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub field: String,
    pub descending: bool,
}

impl SortOrder {
    pub fn parse(text: &str) -> Result<Self> {
        let (field, descending) = match text.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (text.strip_prefix('+').unwrap_or(text), false),
        };
        if field.is_empty() {
            return Err(OlapError::InvalidRequest(format!("invalid sort order '{}'", text)));
        }
        Ok(Self {
            field: field.to_string(),
            descending,
        })
    }
}

/// Id cursor for paging in id order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// `_id >= id`
    At(String),
    /// `_id > id`
    After(String),
}

impl Cursor {
    fn from_request(request: &SearchRequest) -> Result<Option<Self>> {
        let cursor = match (&request.continue_at, &request.continue_after) {
            (Some(_), Some(_)) => {
                return Err(OlapError::InvalidRequest(
                    "continue-at and continue-after are mutually exclusive".to_string(),
                ))
            }
            (Some(id), None) => Self::At(id.clone()),
            (None, Some(id)) => Self::After(id.clone()),
            (None, None) => return Ok(None),
        };
        if request.order.is_some() {
            return Err(OlapError::InvalidRequest(
                "continue-at/continue-after cannot be combined with order".to_string(),
            ));
        }
        Ok(Some(cursor))
    }

    pub fn admits(&self, id: &str) -> bool {
        match self {
            Self::At(start) => id >= start.as_str(),
            Self::After(start) => id > start.as_str(),
        }
    }
}

/// A validated search with the pair rewrite applied and shards resolved.
#[derive(Debug, Clone)]
pub struct SearchPlan {
    pub table: String,
    pub query: String,
    pub fields: Vec<String>,
    pub order: Option<SortOrder>,
    pub cursor: Option<Cursor>,
    pub skip: usize,
    pub size: usize,
    pub shards: Vec<String>,
    pub x_shards: Vec<String>,
}

impl SearchPlan {
    pub fn build(table: &str, request: &SearchRequest, available: &[String]) -> Result<Self> {
        if request.size == 0 {
            return Err(OlapError::InvalidRequest("size must be positive".to_string()));
        }
        let pair = request.pair.as_deref().map(Pair::parse).transpose()?;
        let query = rewrite_query(&request.query, pair.as_ref());
        parse_query(&query)?;

        let order = request.order.as_deref().map(SortOrder::parse).transpose()?;
        let cursor = Cursor::from_request(request)?;
        let shards = get_shards_list(request.shards.as_ref(), available)?;
        let x_shards = match &request.x_shards {
            Some(selector) => get_shards_list(Some(selector), available)?,
            None => shards.clone(),
        };

        Ok(Self {
            table: table.to_string(),
            query,
            fields: request.fields.clone(),
            order,
            cursor,
            skip: request.skip,
            size: request.size,
            shards,
            x_shards,
        })
    }

    /// Rows each shard must return to cover the global page.
    pub fn per_shard_limit(&self) -> usize {
        self.skip.saturating_add(self.size)
    }
}

// ── Results ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRow {
    pub id: String,
    pub shard: String,
    pub fields: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResult {
    pub rows: Vec<SearchRow>,
    /// Matching documents over all searched shards, before paging.
    pub total: u64,
}

impl SearchResult {
    pub fn ids(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.id.as_str()).collect()
    }
}

/// Run a resolved query against one cube, returning its top rows.
pub fn search_cube(cube: &CubeSearcher, plan: &SearchPlan, query: &Query) -> Result<SearchResult> {
    let table = cube.table(&plan.table);
    let docs = query.evaluate(&table)?;

    let fields = if plan.fields.is_empty() {
        table.field_names()
    } else {
        plan.fields.clone()
    };
    let mut columns = Vec::with_capacity(fields.len());
    for field in &fields {
        columns.push(table.column(field)?);
    }
    let ids = table.ids()?;

    let mut rows = Vec::with_capacity(docs.count());
    for doc in docs.iter() {
        let id = match ids.get(doc) {
            Some(id) => id.to_string(),
            None => continue,
        };
        if plan.cursor.as_ref().is_some_and(|c| !c.admits(&id)) {
            continue;
        }
        let mut values = BTreeMap::new();
        for (field, column) in fields.iter().zip(&columns) {
            if let Some(value) = column.get(doc) {
                values.insert(field.clone(), value.clone());
            }
        }
        rows.push(SearchRow {
            id,
            shard: cube.shard().to_string(),
            fields: values,
        });
    }

    let total = rows.len() as u64;
    sort_rows(&mut rows, plan.order.as_ref());
    rows.truncate(plan.per_shard_limit());
    Ok(SearchResult { rows, total })
}

/// Merge shard partials, then apply the global skip and page size.
pub fn merge_results(plan: &SearchPlan, partials: Vec<SearchResult>) -> SearchResult {
    let mut total = 0;
    let mut rows = Vec::new();
    for partial in partials {
        total += partial.total;
        rows.extend(partial.rows);
    }
    sort_rows(&mut rows, plan.order.as_ref());
    let rows = rows.into_iter().skip(plan.skip).take(plan.size).collect();
    SearchResult { rows, total }
}

fn sort_rows(rows: &mut [SearchRow], order: Option<&SortOrder>) {
    rows.sort_by(|a, b| {
        let primary = match order {
            Some(order) if order.field != ID_FIELD => {
                let ord = compare_missing_last(a.fields.get(&order.field), b.fields.get(&order.field));
                if order.descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
            Some(order) if order.descending => b.id.cmp(&a.id),
            _ => Ordering::Equal,
        };
        primary.then_with(|| a.id.cmp(&b.id)).then_with(|| a.shard.cmp(&b.shard))
    });
}

fn compare_missing_last(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
