//! Metric specs and accumulators.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{OlapError, Result};
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl MetricKind {
    fn name(self) -> &'static str {
        match self {
            MetricKind::Count => "count",
            MetricKind::Sum => "sum",
            MetricKind::Min => "min",
            MetricKind::Max => "max",
            MetricKind::Avg => "avg",
        }
    }
}

/// `count`, `count(f)`, `sum(f)`, `min(f)`, `max(f)` or `avg(f)`, where `f`
/// is a local field or `link.field`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub kind: MetricKind,
    pub field: Option<String>,
}

impl MetricSpec {
    pub fn count() -> Self {
        Self {
            kind: MetricKind::Count,
            field: None,
        }
    }

    pub fn of(kind: MetricKind, field: &str) -> Self {
        Self {
            kind,
            field: Some(field.to_string()),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let invalid = || OlapError::InvalidRequest(format!("bad metric '{}'", text));
        let (name, field) = match text.split_once('(') {
            Some((name, rest)) => {
                let field = rest.strip_suffix(')').ok_or_else(invalid)?.trim();
                if field.is_empty() {
                    return Err(invalid());
                }
                (name.trim(), Some(field.to_string()))
            }
            None => (text, None),
        };
        let kind = match name.to_ascii_lowercase().as_str() {
            "count" => MetricKind::Count,
            "sum" => MetricKind::Sum,
            "min" => MetricKind::Min,
            "max" => MetricKind::Max,
            "avg" => MetricKind::Avg,
            _ => return Err(invalid()),
        };
        if kind != MetricKind::Count && field.is_none() {
            return Err(invalid());
        }
        Ok(Self { kind, field })
    }
}

impl fmt::Display for MetricSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}({})", self.kind.name(), field),
            None => f.write_str(self.kind.name()),
        }
    }
}

// ── Accumulators ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricValue {
    Count { count: u64 },
    Sum { sum: f64 },
    Min { min: Option<f64> },
    Max { max: Option<f64> },
    Avg { sum: f64, count: u64 },
}

impl MetricValue {
    /// Accumulator with nothing observed.
    pub fn zero(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Count => MetricValue::Count { count: 0 },
            MetricKind::Sum => MetricValue::Sum { sum: 0.0 },
            MetricKind::Min => MetricValue::Min { min: None },
            MetricKind::Max => MetricValue::Max { max: None },
            MetricKind::Avg => MetricValue::Avg { sum: 0.0, count: 0 },
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Count { .. } => MetricKind::Count,
            MetricValue::Sum { .. } => MetricKind::Sum,
            MetricValue::Min { .. } => MetricKind::Min,
            MetricValue::Max { .. } => MetricKind::Max,
            MetricValue::Avg { .. } => MetricKind::Avg,
        }
    }

    /// Fold one observation in. Count ignores the value.
    pub fn observe(&mut self, x: f64) {
        match self {
            MetricValue::Count { count } => *count += 1,
            MetricValue::Sum { sum } => *sum += x,
            MetricValue::Min { min } => *min = Some(min.map_or(x, |m| m.min(x))),
            MetricValue::Max { max } => *max = Some(max.map_or(x, |m| m.max(x))),
            MetricValue::Avg { sum, count } => {
                *sum += x;
                *count += 1;
            }
        }
    }

    /// Observe every numeric scalar of a value. Count counts all scalars.
    pub fn observe_value(&mut self, value: &Value) {
        for scalar in value.scalars() {
            match (self.kind(), scalar.as_f64()) {
                (MetricKind::Count, _) => self.observe(0.0),
                (_, Some(x)) => self.observe(x),
                (_, None) => {}
            }
        }
    }

    /// Combine two partial accumulators of the same kind. Mismatched kinds
    /// leave `self` unchanged.
    pub fn add(&mut self, other: &MetricValue) {
        match (self, other) {
            (MetricValue::Count { count }, MetricValue::Count { count: o }) => *count += o,
            (MetricValue::Sum { sum }, MetricValue::Sum { sum: o }) => *sum += o,
            (MetricValue::Min { min }, MetricValue::Min { min: o }) => {
                *min = match (*min, *o) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                }
            }
            (MetricValue::Max { max }, MetricValue::Max { max: o }) => {
                *max = match (*max, *o) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                }
            }
            (MetricValue::Avg { sum, count }, MetricValue::Avg { sum: s, count: c }) => {
                *sum += s;
                *count += c;
            }
            (this, other) => {
                tracing::warn!(?this, ?other, "ignoring metric of a different kind");
            }
        }
    }

    /// Final value; None for min/max/avg over nothing.
    pub fn value(&self) -> Option<f64> {
        match *self {
            MetricValue::Count { count } => Some(count as f64),
            MetricValue::Sum { sum } => Some(sum),
            MetricValue::Min { min } => min,
            MetricValue::Max { max } => max,
            MetricValue::Avg { sum, count } => (count > 0).then(|| sum / count as f64),
        }
    }
}
