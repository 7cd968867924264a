//! Per-part preparation and per-shard aggregation.
//!
//! Preparation runs once per part against the x-shards and produces every
//! cross-shard structure the part needs. The per-shard pass then only reads
//! its own cube.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::collector::GroupCollector;
use super::metric::{MetricKind, MetricSpec, MetricValue};
use super::request::{AggregatePart, AggregationRequestData};
use super::result::AggregationResult;
use crate::error::Result;
use crate::query::{parse_query, Query};
use crate::schema::Link;
use crate::searcher::CubeSearcher;
use crate::xlink::{CodeTable, XGroups, XLinkContext, XMetrics};

enum Grouper {
    Local(String),
    Linked { groups: XGroups, codes: CodeTable },
}

enum MetricSource {
    Documents,
    Local { kind: MetricKind, field: String },
    Linked(XMetrics),
}

/// A part with its query resolved and its cross-shard maps built.
pub struct PreparedPart {
    query: Query,
    group_by: Vec<String>,
    groupers: Vec<Grouper>,
    metrics: Vec<MetricSource>,
}

impl PreparedPart {
    pub fn prepare(ctx: &XLinkContext, data: &AggregationRequestData, part: &AggregatePart) -> Result<Self> {
        let table = data.table.as_str();

        // Every link resolves before the first x-shard scan.
        let mut group_links = Vec::with_capacity(part.group_by.len());
        for field in &part.group_by {
            group_links.push(resolve_link(ctx, table, field)?);
        }
        let mut metric_links = Vec::with_capacity(data.metrics.len());
        for spec in &data.metrics {
            metric_links.push(match spec.field.as_deref() {
                Some(field) => resolve_link(ctx, table, field)?,
                None => None,
            });
        }

        let query = ctx.resolve(table, &parse_query(&part.query)?)?;
        let mut filters: HashMap<String, Option<Query>> = HashMap::new();

        let mut groupers = Vec::with_capacity(part.group_by.len());
        for (field, link) in part.group_by.iter().zip(group_links) {
            match link {
                Some(linked) => {
                    let filter = link_filter(&mut filters, ctx, data, linked.name, linked.link.scanned_table())?;
                    let mut codes = CodeTable::new();
                    let groups = XGroups::build(ctx, linked.link, linked.target_field, filter, &mut codes)?;
                    groupers.push(Grouper::Linked { groups, codes });
                }
                None => groupers.push(Grouper::Local(field.clone())),
            }
        }

        let mut metrics = Vec::with_capacity(data.metrics.len());
        for (spec, link) in data.metrics.iter().zip(metric_links) {
            metrics.push(match (spec.kind, spec.field.as_deref(), link) {
                (kind, Some(_), Some(linked)) => {
                    let filter = link_filter(&mut filters, ctx, data, linked.name, linked.link.scanned_table())?;
                    MetricSource::Linked(XMetrics::build(ctx, linked.link, kind, linked.target_field, filter)?)
                }
                (MetricKind::Count, None, _) => MetricSource::Documents,
                (kind, field, _) => MetricSource::Local {
                    kind,
                    field: field.unwrap_or_default().to_string(),
                },
            });
        }

        Ok(Self {
            query,
            group_by: part.group_by.clone(),
            groupers,
            metrics,
        })
    }

    /// Aggregate the matching documents of one cube.
    pub fn aggregate(&self, cube: &Arc<CubeSearcher>, table: &str, specs: &[MetricSpec]) -> Result<AggregationResult> {
        let table = cube.table(table);
        let docs = self.query.evaluate(&table)?;

        // Group names per grouper per document.
        let mut names_per_grouper: Vec<HashMap<u32, Vec<String>>> = Vec::with_capacity(self.groupers.len());
        for grouper in &self.groupers {
            let mut per_doc: HashMap<u32, Vec<String>> = HashMap::new();
            match grouper {
                Grouper::Local(field) => {
                    let local = GroupCollector::new(field).collect(&table, &docs)?;
                    for (doc, numbers) in local.docs {
                        let names = numbers.iter().map(|&n| local.names[n as usize].clone()).collect();
                        per_doc.insert(doc, names);
                    }
                }
                Grouper::Linked { groups, codes } => {
                    let column = table.column(groups.local_field())?;
                    for doc in docs.iter() {
                        let names: Vec<String> = groups
                            .codes_for(column.get(doc))
                            .into_iter()
                            .filter_map(|code| codes.name(code).map(str::to_string))
                            .collect();
                        if !names.is_empty() {
                            per_doc.insert(doc, names);
                        }
                    }
                }
            }
            names_per_grouper.push(per_doc);
        }

        let mut columns = Vec::with_capacity(self.metrics.len());
        for source in &self.metrics {
            columns.push(match source {
                MetricSource::Documents => None,
                MetricSource::Local { field, .. } => Some(table.column(field)?),
                MetricSource::Linked(x) => Some(table.column(x.local_field())?),
            });
        }
        let zeros: Vec<MetricValue> = specs.iter().map(|s| MetricValue::zero(s.kind)).collect();

        let mut rows: BTreeMap<Vec<String>, Vec<MetricValue>> = BTreeMap::new();
        if self.groupers.is_empty() {
            rows.insert(Vec::new(), zeros.clone());
        }
        'docs: for doc in docs.iter() {
            let mut key_sets: Vec<&Vec<String>> = Vec::with_capacity(names_per_grouper.len());
            for per_doc in &names_per_grouper {
                match per_doc.get(&doc) {
                    Some(names) => key_sets.push(names),
                    None => continue 'docs,
                }
            }

            let mut values = zeros.clone();
            for ((acc, source), column) in values.iter_mut().zip(&self.metrics).zip(&columns) {
                let value = column.as_ref().and_then(|c| c.get(doc));
                match source {
                    MetricSource::Documents => acc.observe(1.0),
                    MetricSource::Local { .. } => {
                        if let Some(value) = value {
                            acc.observe_value(value);
                        }
                    }
                    MetricSource::Linked(x) => x.add_to(acc, value),
                }
            }

            for keys in cartesian(&key_sets) {
                let row = rows.entry(keys).or_insert_with(|| zeros.clone());
                for (acc, value) in row.iter_mut().zip(&values) {
                    acc.add(value);
                }
            }
        }

        Ok(AggregationResult::from_rows(&self.group_by, specs, rows))
    }
}

/// The x-filter of a link, resolved against the linked table once per part.
/// A `link.field` reference with its link resolved.
struct LinkedField<'a> {
    name: &'a str,
    target_field: &'a str,
    link: Link,
}

/// Resolve the link of a `link.field` reference; plain fields yield `None`.
fn resolve_link<'a>(ctx: &XLinkContext, table: &str, field: &'a str) -> Result<Option<LinkedField<'a>>> {
    match field.split_once('.') {
        Some((name, target_field)) => Ok(Some(LinkedField {
            name,
            target_field,
            link: ctx.link(table, name)?,
        })),
        None => Ok(None),
    }
}

fn link_filter<'m>(
    filters: &'m mut HashMap<String, Option<Query>>,
    ctx: &XLinkContext,
    data: &AggregationRequestData,
    link: &str,
    scanned: &str,
) -> Result<Option<&'m Query>> {
    if !filters.contains_key(link) {
        let filter = match data.x_filters.get(link) {
            Some(text) => Some(ctx.resolve(scanned, &parse_query(text)?)?),
            None => None,
        };
        filters.insert(link.to_string(), filter);
    }
    Ok(filters.get(link).and_then(Option::as_ref))
}

/// Every combination picking one name per grouping field.
fn cartesian(sets: &[&Vec<String>]) -> Vec<Vec<String>> {
    let mut combos: Vec<Vec<String>> = vec![Vec::new()];
    for names in sets {
        combos = combos
            .into_iter()
            .flat_map(|prefix| {
                names.iter().map(move |name| {
                    let mut next = prefix.clone();
                    next.push(name.clone());
                    next
                })
            })
            .collect();
    }
    combos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cartesian() {
        let a = vec!["x".to_string(), "y".to_string()];
        let b = vec!["1".to_string()];
        assert_eq!(
            cartesian(&[&a, &b]),
            vec![vec!["x".to_string(), "1".to_string()], vec!["y".to_string(), "1".to_string()]]
        );
        assert_eq!(cartesian(&[]), vec![Vec::<String>::new()]);
    }
}
