//! Error types for the cube store

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OlapError>;

#[derive(Error, Debug)]
pub enum OlapError {
    // ── Not found ──────────────────────────────────────────────────
    #[error("Application '{0}' not found")]
    ApplicationNotFound(String),

    #[error("Table '{table}' not found in application '{app}'")]
    TableNotFound { app: String, table: String },

    #[error("Shard '{shard}' not found in application '{app}'")]
    ShardNotFound { app: String, shard: String },

    #[error("Segment '{segment}' not found in {app}/{shard}")]
    SegmentNotFound {
        app: String,
        shard: String,
        segment: String,
    },

    #[error("No cube for {app}/{shard}: shard has never been merged")]
    CubeNotFound { app: String, shard: String },

    // ── Races and conflicts ────────────────────────────────────────
    #[error("Segment {app}/{shard}/{segment} was deleted by a concurrent merge")]
    SegmentDeleted {
        app: String,
        shard: String,
        segment: String,
    },

    #[error("Merge already in progress for {app}/{shard}")]
    MergeInProgress { app: String, shard: String },

    // ── Configuration ──────────────────────────────────────────────
    #[error("Invalid shard specification: {0}")]
    InvalidShardSpec(String),

    #[error("Invalid pair specification: {0}")]
    InvalidPair(String),

    #[error("Field '{field}' of table '{table}' is not a link")]
    NotALink { table: String, field: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Wrapped ────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OlapError {
    /// Get error code for request-level reporting
    pub fn code(&self) -> &'static str {
        match self {
            OlapError::ApplicationNotFound(_) => "APPLICATION_NOT_FOUND",
            OlapError::TableNotFound { .. } => "TABLE_NOT_FOUND",
            OlapError::ShardNotFound { .. } => "SHARD_NOT_FOUND",
            OlapError::SegmentNotFound { .. } => "SEGMENT_NOT_FOUND",
            OlapError::CubeNotFound { .. } => "CUBE_NOT_FOUND",
            OlapError::SegmentDeleted { .. } => "SEGMENT_DELETED",
            OlapError::MergeInProgress { .. } => "MERGE_IN_PROGRESS",
            OlapError::InvalidShardSpec(_) => "INVALID_SHARD_SPEC",
            OlapError::InvalidPair(_) => "INVALID_PAIR",
            OlapError::NotALink { .. } => "NOT_A_LINK",
            OlapError::InvalidQuery(_) => "INVALID_QUERY",
            OlapError::InvalidRequest(_) => "INVALID_REQUEST",
            OlapError::InvalidConfig(_) => "INVALID_CONFIG",
            _ => "INTERNAL_ERROR",
        }
    }

    /// True for the delete-under-reader race, which a fresh pointer
    /// resolution may clear.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OlapError::SegmentDeleted { .. })
    }

    /// True for the not-found family ("nothing to search").
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            OlapError::ApplicationNotFound(_)
                | OlapError::TableNotFound { .. }
                | OlapError::ShardNotFound { .. }
                | OlapError::SegmentNotFound { .. }
                | OlapError::CubeNotFound { .. }
        )
    }
}
