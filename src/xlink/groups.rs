//! Cross-shard grouping and metric maps.
//!
//! Both are keyed by binary join key. For a direct link the key is the id
//! of the referenced entity and a local document looks up each of its link
//! values; for an inverse link the key is the id the referrers point at and
//! a local document looks up its own id.

use std::collections::{BTreeSet, HashMap};

use super::codes::CodeTable;
use super::context::XLinkContext;
use crate::aggregate::{GroupCollector, MetricKind, MetricValue};
use crate::error::Result;
use crate::query::Query;
use crate::schema::Link;
use crate::types::{JoinKey, Value, ID_FIELD};

fn local_key_field(link: &Link) -> &str {
    match link {
        Link::Direct { field, .. } => field.as_str(),
        Link::Inverse { .. } => ID_FIELD,
    }
}

// ── XGroups ────────────────────────────────────────────────────────

/// Join key -> global group codes. Keys with no group are absent.
#[derive(Debug, Clone)]
pub struct XGroups {
    pub link: Link,
    pub groups: HashMap<JoinKey, BTreeSet<u32>>,
}

impl XGroups {
    /// Scan `group_field` of the linked table on every x-shard. Codes come
    /// from `codes`, which the caller shares across the whole item so that
    /// a name keeps its code across x-shards.
    pub fn build(
        ctx: &XLinkContext,
        link: Link,
        group_field: &str,
        filter: Option<&Query>,
        codes: &mut CodeTable,
    ) -> Result<Self> {
        let mut groups: HashMap<JoinKey, BTreeSet<u32>> = HashMap::new();
        let collector = GroupCollector::new(group_field);

        for cube in ctx.xshards() {
            let table = cube.table(link.scanned_table());
            let scope = ctx.scope(&table, filter)?;
            let local = collector.collect(&table, &scope)?;
            let remap = codes.remap(&local.names);
            let keys = table.column(match &link {
                Link::Direct { .. } => ID_FIELD,
                Link::Inverse { via, .. } => via.as_str(),
            })?;

            for (doc, numbers) in &local.docs {
                let Some(key_value) = keys.get(*doc) else {
                    continue;
                };
                let global: Vec<u32> = numbers.iter().map(|&n| remap[n as usize]).collect();
                for key in key_value.scalars().into_iter().map(Value::join_key) {
                    groups.entry(key).or_default().extend(global.iter().copied());
                }
            }
        }
        tracing::debug!(
            link = link.field(),
            field = group_field,
            keys = groups.len(),
            codes = codes.len(),
            "built xlink groups"
        );
        Ok(Self { link, groups })
    }

    /// Local column whose values are looked up.
    pub fn local_field(&self) -> &str {
        local_key_field(&self.link)
    }

    /// Union of the codes reached from a local value.
    pub fn codes_for(&self, value: Option<&Value>) -> BTreeSet<u32> {
        let mut out = BTreeSet::new();
        if let Some(value) = value {
            for key in value.scalars().into_iter().map(Value::join_key) {
                if let Some(codes) = self.groups.get(&key) {
                    out.extend(codes.iter().copied());
                }
            }
        }
        out
    }
}

// ── XMetrics ───────────────────────────────────────────────────────

/// Join key -> metric accumulated over everything the key reaches.
#[derive(Debug, Clone)]
pub struct XMetrics {
    pub link: Link,
    pub kind: MetricKind,
    pub values: HashMap<JoinKey, MetricValue>,
}

impl XMetrics {
    /// Fold `metric_field` of the linked table on every x-shard into one
    /// accumulator per join key. A key reached from several documents or
    /// x-shards combines with `MetricValue::add`.
    pub fn build(
        ctx: &XLinkContext,
        link: Link,
        kind: MetricKind,
        metric_field: &str,
        filter: Option<&Query>,
    ) -> Result<Self> {
        let mut values: HashMap<JoinKey, MetricValue> = HashMap::new();

        for cube in ctx.xshards() {
            let table = cube.table(link.scanned_table());
            let scope = ctx.scope(&table, filter)?;
            let column = table.column(metric_field)?;
            let keys = table.column(match &link {
                Link::Direct { .. } => ID_FIELD,
                Link::Inverse { via, .. } => via.as_str(),
            })?;

            for doc in scope.iter() {
                let (Some(value), Some(key_value)) = (column.get(doc), keys.get(doc)) else {
                    continue;
                };
                let mut partial = MetricValue::zero(kind);
                partial.observe_value(value);
                for key in key_value.scalars().into_iter().map(Value::join_key) {
                    values
                        .entry(key)
                        .or_insert_with(|| MetricValue::zero(kind))
                        .add(&partial);
                }
            }
        }
        tracing::debug!(link = link.field(), field = metric_field, keys = values.len(), "built xlink metrics");
        Ok(Self { link, kind, values })
    }

    pub fn local_field(&self) -> &str {
        local_key_field(&self.link)
    }

    /// Fold everything reached from a local value into `acc`.
    pub fn add_to(&self, acc: &mut MetricValue, value: Option<&Value>) {
        let Some(value) = value else {
            return;
        };
        for key in value.scalars().into_iter().map(Value::join_key) {
            if let Some(partial) = self.values.get(&key) {
                acc.add(partial);
            }
        }
    }
}
