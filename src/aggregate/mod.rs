//! Grouped aggregation over the cubes of many shards.
//!
//! ```text
//! OlapAggregate --build--> AggregationRequestData (1 or 2 parts)
//!   per part:  XLink pre-pass over x-shards -> PreparedPart
//!   per shard: PreparedPart::aggregate(cube) -> AggregationResult
//!   merge all partials by group key
//! ```

pub mod collector;
pub mod executor;
pub mod metric;
pub mod request;
pub mod result;

pub use collector::{GroupCollector, LocalGroups};
pub use executor::PreparedPart;
pub use metric::{MetricKind, MetricSpec, MetricValue};
pub use request::{AggregatePart, AggregationRequestData, OlapAggregate};
pub use result::{AggregationResult, AggregationRow};
