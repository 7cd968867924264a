//! Shard merges: fold a shard's segments into one consolidated cube.

pub mod types;
pub mod engine;

pub use types::*;
pub use engine::{MergeEngine, MergeGuard};
