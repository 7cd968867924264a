//! Per-request XLink context.
//!
//! Holds the searchers of every x-shard, resolved once per request and
//! shared by all primary shards. Every cross-shard scan happens here, before
//! the per-shard pass; the per-shard pass only consults the precomputed
//! sets and maps.

use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::SearcherCache;
use crate::error::Result;
use crate::query::{DocSet, LinkSet, Quantifier, Query, QueryExpr};
use crate::schema::{Application, Link};
use crate::searcher::{CubeSearcher, TableSearcher};
use crate::types::Value;

pub struct XLinkContext {
    app: Arc<Application>,
    xshards: Vec<Arc<CubeSearcher>>,
}

impl XLinkContext {
    pub fn new(app: Arc<Application>, xshards: Vec<Arc<CubeSearcher>>) -> Self {
        Self { app, xshards }
    }

    /// Resolve the current cube of every x-shard.
    pub fn open(searchers: &SearcherCache, app: Arc<Application>, xshards: &[String]) -> Result<Self> {
        let cubes = xshards
            .iter()
            .map(|shard| searchers.current(&app.name, shard))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(app, cubes))
    }

    pub fn application(&self) -> &Application {
        &self.app
    }

    pub fn xshards(&self) -> &[Arc<CubeSearcher>] {
        &self.xshards
    }

    /// Resolve a link field of `table`; non-link fields fail here, before
    /// any scan.
    pub fn link(&self, table: &str, field: &str) -> Result<Link> {
        self.app.link(table, field)
    }

    // ── Query resolution ───────────────────────────────────────────

    /// Turn parsed query text on `table` into an executable query,
    /// precomputing every link quantifier across the x-shards.
    pub fn resolve(&self, table: &str, expr: &QueryExpr) -> Result<Query> {
        Ok(match expr {
            QueryExpr::MatchAll | QueryExpr::Cmp { .. } => Query::local(expr)?,
            QueryExpr::And(parts) => Query::And(
                parts
                    .iter()
                    .map(|p| self.resolve(table, p))
                    .collect::<Result<_>>()?,
            ),
            QueryExpr::Or(parts) => Query::Or(
                parts
                    .iter()
                    .map(|p| self.resolve(table, p))
                    .collect::<Result<_>>()?,
            ),
            QueryExpr::Not(inner) => Query::Not(Box::new(self.resolve(table, inner)?)),
            QueryExpr::Link {
                quantifier,
                link,
                inner,
                filter,
            } => {
                let link = self.link(table, link)?;
                let set = self.link_set(link, inner, filter.as_deref())?;
                match *quantifier {
                    Quantifier::Any => Query::LinkAny(set),
                    Quantifier::All => Query::LinkAll(set),
                    Quantifier::Count { op, n } => Query::LinkCount { set, op, n },
                }
            }
        })
    }

    /// Documents of the scanned table in one x-shard: those passing the
    /// optional filter, or all of them.
    pub(crate) fn scope(&self, table: &TableSearcher<'_>, filter: Option<&Query>) -> Result<DocSet> {
        match filter {
            Some(filter) => filter.evaluate(table),
            None => Ok(DocSet::full(table.doc_count()?)),
        }
    }

    fn link_set(&self, link: Link, inner: &QueryExpr, filter: Option<&QueryExpr>) -> Result<LinkSet> {
        let scanned = link.scanned_table().to_string();
        let inner = self.resolve(&scanned, inner)?;
        let filter = filter.map(|f| self.resolve(&scanned, f)).transpose()?;
        let via = match &link {
            Link::Direct { .. } => None,
            Link::Inverse { via, .. } => Some(via.clone()),
        };
        let mut set = LinkSet::new(link);

        for cube in &self.xshards {
            let table = cube.table(&scanned);
            match &via {
                None => {
                    let ids = table.ids()?;
                    for doc in inner.evaluate(&table)?.iter() {
                        if let Some(id) = ids.get(doc) {
                            set.matched.entry(id.join_key()).or_insert(1);
                        }
                    }
                    if let Some(filter) = &filter {
                        let allowed = set.allowed.get_or_insert_with(HashSet::new);
                        for doc in filter.evaluate(&table)?.iter() {
                            if let Some(id) = ids.get(doc) {
                                allowed.insert(id.join_key());
                            }
                        }
                    }
                }
                Some(via) => {
                    let scope = self.scope(&table, filter.as_ref())?;
                    let hits = inner.evaluate(&table)?;
                    let via = table.column(via)?;
                    for doc in scope.iter() {
                        let Some(value) = via.get(doc) else {
                            continue;
                        };
                        let satisfied = hits.contains(doc);
                        for key in value.scalars().into_iter().map(Value::join_key) {
                            if satisfied {
                                *set.matched.entry(key).or_insert(0) += 1;
                            } else {
                                set.failed.insert(key);
                            }
                        }
                    }
                }
            }
        }
        tracing::debug!(
            link = set.link.field(),
            matched = set.matched.len(),
            failed = set.failed.len(),
            xshards = self.xshards.len(),
            "resolved link quantifier"
        );
        Ok(set)
    }
}
