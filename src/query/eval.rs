//! Executable queries.
//!
//! A `Query` is a `QueryExpr` whose link quantifiers have been resolved
//! against the x-shards. Evaluating it against one table of one cube never
//! leaves that cube: quantifiers become set-membership and count tests on
//! the precomputed `LinkSet`.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use super::ast::{CmpOp, QueryExpr};
use super::docset::DocSet;
use crate::error::{OlapError, Result};
use crate::schema::Link;
use crate::searcher::TableSearcher;
use crate::types::{JoinKey, Value, ID_FIELD};

#[derive(Debug, Clone)]
pub enum Query {
    MatchAll,
    Cmp {
        field: String,
        op: CmpOp,
        value: Value,
    },
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
    LinkAny(LinkSet),
    LinkAll(LinkSet),
    LinkCount { set: LinkSet, op: CmpOp, n: u64 },
}

impl Query {
    /// Convert a link-free expression.
    pub fn local(expr: &QueryExpr) -> Result<Query> {
        Ok(match expr {
            QueryExpr::MatchAll => Query::MatchAll,
            QueryExpr::Cmp { field, op, value } => Query::Cmp {
                field: field.clone(),
                op: *op,
                value: value.clone(),
            },
            QueryExpr::And(parts) => Query::And(parts.iter().map(Query::local).collect::<Result<_>>()?),
            QueryExpr::Or(parts) => Query::Or(parts.iter().map(Query::local).collect::<Result<_>>()?),
            QueryExpr::Not(inner) => Query::Not(Box::new(Query::local(inner)?)),
            QueryExpr::Link { link, .. } => {
                return Err(OlapError::InvalidQuery(format!(
                    "quantifier over '{}' needs link resolution",
                    link
                )))
            }
        })
    }

    /// Documents of `table` matching the query.
    pub fn evaluate(&self, table: &TableSearcher<'_>) -> Result<DocSet> {
        let len = table.doc_count()?;
        match self {
            Query::MatchAll => Ok(DocSet::full(len)),
            Query::Cmp { field, op, value } => {
                let column = table.column(field)?;
                Ok(DocSet::from_fn(len, |doc| {
                    column.get(doc).is_some_and(|stored| matches_literal(stored, *op, value))
                }))
            }
            Query::And(parts) => {
                let mut acc = DocSet::full(len);
                for part in parts {
                    if acc.is_empty() {
                        break;
                    }
                    acc.intersect(&part.evaluate(table)?);
                }
                Ok(acc)
            }
            Query::Or(parts) => {
                let mut acc = DocSet::empty(len);
                for part in parts {
                    acc.union(&part.evaluate(table)?);
                }
                Ok(acc)
            }
            Query::Not(inner) => {
                let mut set = inner.evaluate(table)?;
                set.negate();
                Ok(set)
            }
            Query::LinkAny(set) => {
                let column = table.column(set.local_field())?;
                Ok(DocSet::from_fn(len, |doc| set.any(column.get(doc))))
            }
            Query::LinkAll(set) => {
                let column = table.column(set.local_field())?;
                Ok(DocSet::from_fn(len, |doc| set.all(column.get(doc))))
            }
            Query::LinkCount { set, op, n } => {
                let column = table.column(set.local_field())?;
                Ok(DocSet::from_fn(len, |doc| op.test_count(set.count(column.get(doc)), *n)))
            }
        }
    }
}

/// Compare a stored value against a query literal. Multi-valued fields
/// match if any element does; `!=` matches only if none is equal. A string
/// field compares against the literal's text form.
pub fn matches_literal(stored: &Value, op: CmpOp, literal: &Value) -> bool {
    let compare = |scalar: &Value| -> Ordering {
        match (scalar, literal) {
            (Value::Str(s), Value::Str(l)) => s.as_str().cmp(l.as_str()),
            (Value::Str(s), other) => s.as_str().cmp(other.to_string().as_str()),
            (scalar, other) => scalar.cmp(other),
        }
    };
    let scalars = stored.scalars();
    match op {
        CmpOp::Ne => !scalars.is_empty() && scalars.iter().all(|s| compare(s) != Ordering::Equal),
        _ => scalars.iter().any(|s| op.test(compare(s))),
    }
}

// ── Link Sets ──────────────────────────────────────────────────────

/// Cross-shard precomputation for one quantifier.
///
/// Direct link: `matched` holds ids of target entities satisfying the inner
/// query and `allowed` the ids passing WHERE; a document is tested on its
/// own link values. Inverse link: `matched` counts satisfying referrers per
/// referenced id, `failed` holds ids with at least one failing referrer; a
/// document is tested on its own id.
#[derive(Debug, Clone)]
pub struct LinkSet {
    pub link: Link,
    pub matched: HashMap<JoinKey, u64>,
    pub failed: HashSet<JoinKey>,
    pub allowed: Option<HashSet<JoinKey>>,
}

impl LinkSet {
    pub fn new(link: Link) -> Self {
        Self {
            link,
            matched: HashMap::new(),
            failed: HashSet::new(),
            allowed: None,
        }
    }

    /// Local column holding the join keys to test.
    pub fn local_field(&self) -> &str {
        match &self.link {
            Link::Direct { field, .. } => field.as_str(),
            Link::Inverse { .. } => ID_FIELD,
        }
    }

    fn keys(&self, value: Option<&Value>) -> Vec<JoinKey> {
        let Some(value) = value else {
            return Vec::new();
        };
        value
            .scalars()
            .into_iter()
            .map(Value::join_key)
            .filter(|k| self.allowed.as_ref().map_or(true, |allowed| allowed.contains(k)))
            .collect()
    }

    pub fn any(&self, value: Option<&Value>) -> bool {
        self.keys(value).iter().any(|k| self.matched.contains_key(k))
    }

    /// Every reached entity satisfies the inner query, and at least one
    /// entity is reached.
    pub fn all(&self, value: Option<&Value>) -> bool {
        let keys = self.keys(value);
        !keys.is_empty()
            && keys
                .iter()
                .all(|k| self.matched.contains_key(k) && !self.failed.contains(k))
    }

    pub fn count(&self, value: Option<&Value>) -> u64 {
        self.keys(value)
            .iter()
            .map(|k| self.matched.get(k).copied().unwrap_or(0))
            .sum()
    }
}
