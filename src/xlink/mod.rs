//! Cross-shard link (XLink) resolution.
//!
//! A link field may reach entities stored in other shards (the x-shards).
//! Everything that needs them (quantifier sets, group codes, metrics) is
//! built here in a pre-pass over the x-shards, once per request.

pub mod codes;
pub mod context;
pub mod groups;

pub use codes::CodeTable;
pub use context::XLinkContext;
pub use groups::{XGroups, XMetrics};
