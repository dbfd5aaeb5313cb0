//! Bounded-memory top-k counting for tally.
//!
//! - [`StreamSummary`] - Space-Saving counter with ordered count buckets
//! - [`CategoryAggregator`] - one counter per category, safe to share across workers
//!
//! Estimates never undercount: for every tracked key,
//! `count - error <= true_count <= count`.

mod aggregator;
mod stream_summary;

pub use aggregator::{AggregateReport, AggregatorConfig, CategoryAggregator};
pub use stream_summary::{StreamSummary, TopEntry};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SummaryError {
    #[error("stream summary capacity must be at least 1")]
    ZeroCapacity,
}
