//! Aggregation requests and their pair-doubled form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::metric::MetricSpec;
use crate::error::{OlapError, Result};
use crate::query::pair::has_placeholders;
use crate::query::{get_shards_list, parse_query, Pair, ShardSelector};

/// An aggregation as received from the request layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OlapAggregate {
    pub query: String,
    /// Local fields or `link.field`.
    #[serde(alias = "grouping-fields")]
    pub group_by: Vec<String>,
    /// Metric texts such as `count` or `sum(orders.total)`.
    #[serde(alias = "metric")]
    pub metrics: Vec<String>,
    /// Link name -> query restricting the linked table scan.
    pub x_filters: BTreeMap<String, String>,
    /// Two comma-separated field names.
    pub pair: Option<String>,
    pub shards: Option<ShardSelector>,
    pub x_shards: Option<ShardSelector>,
}

impl OlapAggregate {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Self::default()
        }
    }

    pub fn group_by(mut self, field: &str) -> Self {
        self.group_by.push(field.to_string());
        self
    }

    pub fn metric(mut self, metric: &str) -> Self {
        self.metrics.push(metric.to_string());
        self
    }

    pub fn x_filter(mut self, link: &str, query: &str) -> Self {
        self.x_filters.insert(link.to_string(), query.to_string());
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

/// One pass of an aggregation: query and grouping text with pair
/// placeholders substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatePart {
    pub query: String,
    pub group_by: Vec<String>,
}

/// A validated aggregation, ready to dispatch. Holds one part, or two when a
/// pair doubles it.
#[derive(Debug, Clone)]
pub struct AggregationRequestData {
    pub table: String,
    pub parts: Vec<AggregatePart>,
    pub metrics: Vec<MetricSpec>,
    pub x_filters: BTreeMap<String, String>,
    pub shards: Vec<String>,
    pub x_shards: Vec<String>,
}

impl AggregationRequestData {
    /// Validate the request and resolve shard lists against the shards that
    /// exist. X-shards default to the primary shards.
    pub fn build(table: &str, request: &OlapAggregate, available: &[String]) -> Result<Self> {
        let metrics = if request.metrics.is_empty() {
            vec![MetricSpec::count()]
        } else {
            request
                .metrics
                .iter()
                .map(|m| MetricSpec::parse(m))
                .collect::<Result<Vec<_>>>()?
        };
        let pair = request.pair.as_deref().map(Pair::parse).transpose()?;

        let base = AggregatePart {
            query: request.query.clone(),
            group_by: request.group_by.clone(),
        };
        let doubled = has_placeholders(&base.query) || base.group_by.iter().any(|g| has_placeholders(g));
        let parts = match pair {
            Some(pair) if doubled => vec![substitute(&base, &pair, false), substitute(&base, &pair, true)],
            _ => vec![base],
        };
        for part in &parts {
            parse_query(&part.query)?;
        }
        for (link, text) in &request.x_filters {
            parse_query(text)
                .map_err(|e| OlapError::InvalidQuery(format!("x-filter for '{}': {}", link, e)))?;
        }

        let shards = get_shards_list(request.shards.as_ref(), available)?;
        let x_shards = match &request.x_shards {
            Some(selector) => get_shards_list(Some(selector), available)?,
            None => shards.clone(),
        };

        Ok(Self {
            table: table.to_string(),
            parts,
            metrics,
            x_filters: request.x_filters.clone(),
            shards,
            x_shards,
        })
    }

    /// Whether a part reaches across shards (quantifiers, linked groups or
    /// linked metrics).
    pub fn needs_xlink(&self, part: &AggregatePart) -> bool {
        let linked = |f: &str| f.contains('.');
        parse_query(&part.query).map(|q| q.has_links()).unwrap_or(false)
            || part.group_by.iter().any(|g| linked(g.as_str()))
            || self
                .metrics
                .iter()
                .any(|m| m.field.as_deref().is_some_and(linked))
    }
}

fn substitute(part: &AggregatePart, pair: &Pair, swapped: bool) -> AggregatePart {
    AggregatePart {
        query: pair.substitute(&part.query, swapped),
        group_by: part
            .group_by
            .iter()
            .map(|g| pair.substitute(g, swapped))
            .collect(),
    }
}
