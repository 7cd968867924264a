//! Aggregation results and their merge.

use std::collections::BTreeMap;

use serde::Serialize;

use super::metric::{MetricSpec, MetricValue};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationRow {
    /// One group name per grouping field.
    pub keys: Vec<String>,
    /// One accumulator per metric.
    pub metrics: Vec<MetricValue>,
}

impl AggregationRow {
    pub fn value(&self, metric: usize) -> Option<f64> {
        self.metrics.get(metric).and_then(MetricValue::value)
    }
}

/// Rows sorted by keys. Shard partials and pair parts merge by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregationResult {
    pub group_by: Vec<String>,
    pub metrics: Vec<String>,
    pub rows: Vec<AggregationRow>,
}

impl AggregationResult {
    pub fn empty(group_by: &[String], metrics: &[MetricSpec]) -> Self {
        Self {
            group_by: group_by.to_vec(),
            metrics: metrics.iter().map(|m| m.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn from_rows(
        group_by: &[String],
        metrics: &[MetricSpec],
        rows: BTreeMap<Vec<String>, Vec<MetricValue>>,
    ) -> Self {
        let mut result = Self::empty(group_by, metrics);
        result.rows = rows
            .into_iter()
            .map(|(keys, metrics)| AggregationRow { keys, metrics })
            .collect();
        result
    }

    /// Fold another partial in. Rows with equal keys combine through
    /// `MetricValue::add`.
    pub fn merge(&mut self, other: AggregationResult) {
        if other.rows.is_empty() {
            return;
        }
        let mut by_key: BTreeMap<Vec<String>, Vec<MetricValue>> = std::mem::take(&mut self.rows)
            .into_iter()
            .map(|row| (row.keys, row.metrics))
            .collect();
        for row in other.rows {
            match by_key.get_mut(&row.keys) {
                Some(existing) => {
                    for (acc, value) in existing.iter_mut().zip(&row.metrics) {
                        acc.add(value);
                    }
                }
                None => {
                    by_key.insert(row.keys, row.metrics);
                }
            }
        }
        self.rows = by_key
            .into_iter()
            .map(|(keys, metrics)| AggregationRow { keys, metrics })
            .collect();
    }

    pub fn row(&self, keys: &[&str]) -> Option<&AggregationRow> {
        self.rows
            .iter()
            .find(|row| row.keys.iter().map(String::as_str).eq(keys.iter().copied()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::MetricKind;

    fn partial(rows: &[(&str, f64)]) -> AggregationResult {
        let specs = [MetricSpec::of(MetricKind::Sum, "x")];
        let rows = rows
            .iter()
            .map(|(k, v)| (vec![k.to_string()], vec![MetricValue::Sum { sum: *v }]))
            .collect();
        AggregationResult::from_rows(&["g".to_string()], &specs, rows)
    }

    #[test]
    fn test_merge_adds_matching_keys_and_keeps_order() {
        let mut total = partial(&[("b", 1.0), ("c", 2.0)]);
        total.merge(partial(&[("a", 5.0), ("b", 3.0)]));

        let keys: Vec<&str> = total.rows.iter().map(|r| r.keys[0].as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(total.row(&["b"]).unwrap().value(0), Some(4.0));
        assert_eq!(total.metrics, vec!["sum(x)"]);
    }

    #[test]
    fn test_merge_into_empty() {
        let mut total = AggregationResult::default();
        total.merge(partial(&[("a", 1.0)]));
        assert_eq!(total.rows.len(), 1);
        assert!(total.row(&["z"]).is_none());
    }
}
