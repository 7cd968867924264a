//! Segment storage: directory abstraction, segment naming, the per-shard
//! segment store and the columnar cube format.

pub mod directory;
pub mod segment_name;
pub mod segment_store;
pub mod columnar;

pub use directory::{Directory, FsDirectory};
pub use segment_name::{SegmentIdGenerator, SegmentKind, SegmentName, BEFORE_PREFIX, CUBE_PREFIX};
pub use segment_store::SegmentStore;
pub use columnar::{Column, CubeContent};
