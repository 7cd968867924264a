//! Types for shard merges.
//!
//! A merge folds every segment of a shard into one new cube, publishes it
//! through the cube pointer and reclaims the inputs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-call merge options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MergeOptions {
    /// Retention date written to the shard; None clears it.
    pub expire_date: Option<NaiveDate>,
    /// Grace period in seconds before superseded segments are deleted.
    pub timeout: u64,
    /// Rewrite even a shard that already consists of a single cube.
    pub force_merge: bool,
}

impl MergeOptions {
    pub fn forced() -> Self {
        Self {
            force_merge: true,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = secs;
        self
    }

    pub fn with_expire_date(mut self, date: NaiveDate) -> Self {
        self.expire_date = Some(date);
        self
    }
}

/// Stats of a merge that produced a cube.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Name of the new cube.
    pub cube: String,
    /// Input segments, in the order they were applied.
    pub merged_segments: Vec<String>,
    /// Documents in the new cube across all tables.
    pub documents: usize,
    /// Inputs that could not be deleted after publishing.
    pub reclaim_failures: usize,
    /// Merge duration in milliseconds, grace period included.
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// The shard has no segments.
    NothingToMerge,
    /// The shard is a single cube and the merge was not forced.
    AlreadyMerged { cube: String },
    Merged(MergeReport),
}

impl MergeOutcome {
    pub fn is_merged(&self) -> bool {
        matches!(self, MergeOutcome::Merged(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_options_default() {
        let options = MergeOptions::default();
        assert_eq!(options.timeout, 0);
        assert!(!options.force_merge);
        assert!(options.expire_date.is_none());
    }

    #[test]
    fn test_merge_options_json_keys() {
        let options: MergeOptions =
            serde_json::from_str(r#"{"expire-date":"2030-01-31","timeout":5,"force-merge":true}"#)
                .unwrap();
        assert_eq!(options.timeout, 5);
        assert!(options.force_merge);
        assert_eq!(options.expire_date, NaiveDate::from_ymd_opt(2030, 1, 31));
    }

    #[test]
    fn test_outcome_json_tag() {
        let json = serde_json::to_string(&MergeOutcome::NothingToMerge).unwrap();
        assert_eq!(json, r#"{"outcome":"nothing_to_merge"}"#);
    }
}
