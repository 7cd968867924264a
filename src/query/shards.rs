//! Shard list resolution.
//!
//! A request names its shards either as an explicit list or as an inclusive
//! lexicographic range over the shards that exist. Supplying both is a
//! configuration error; supplying neither selects every shard.

use serde::{Deserialize, Serialize};

use crate::error::{OlapError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardSelector {
    List(Vec<String>),
    Range { start: String, end: String },
}

impl ShardSelector {
    /// Build from the `shards` / `shards-range` parameter pair. Both take
    /// comma-separated text; a range is exactly `start,end`.
    pub fn from_params(shards: Option<&str>, range: Option<&str>) -> Result<Option<Self>> {
        match (shards, range) {
            (Some(_), Some(_)) => Err(OlapError::InvalidShardSpec(
                "shards and shards-range are mutually exclusive".to_string(),
            )),
            (Some(list), None) => {
                let names: Vec<String> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if names.is_empty() {
                    return Err(OlapError::InvalidShardSpec("empty shard list".to_string()));
                }
                Ok(Some(ShardSelector::List(names)))
            }
            (None, Some(range)) => {
                let bounds: Vec<&str> = range.split(',').map(str::trim).collect();
                match bounds.as_slice() {
                    [start, end] if !start.is_empty() && !end.is_empty() => {
                        Ok(Some(ShardSelector::Range {
                            start: start.to_string(),
                            end: end.to_string(),
                        }))
                    }
                    _ => Err(OlapError::InvalidShardSpec(format!(
                        "shard range must be 'start,end', got '{}'",
                        range
                    ))),
                }
            }
            (None, None) => Ok(None),
        }
    }
}

/// Resolve a selector against the shards that exist. Lists keep their
/// order (duplicates dropped); ranges come back sorted.
pub fn get_shards_list(selector: Option<&ShardSelector>, available: &[String]) -> Result<Vec<String>> {
    match selector {
        None => {
            let mut all = available.to_vec();
            all.sort();
            Ok(all)
        }
        Some(ShardSelector::List(names)) => {
            let mut out: Vec<String> = Vec::with_capacity(names.len());
            for name in names {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Ok(out)
        }
        Some(ShardSelector::Range { start, end }) => {
            if start > end {
                return Err(OlapError::InvalidShardSpec(format!(
                    "shard range start '{}' is after end '{}'",
                    start, end
                )));
            }
            let mut out: Vec<String> = available
                .iter()
                .filter(|s| s.as_str() >= start.as_str() && s.as_str() <= end.as_str())
                .cloned()
                .collect();
            out.sort();
            Ok(out)
        }
    }
}
