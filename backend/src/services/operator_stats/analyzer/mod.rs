//! Operator statistics analyzer module
//!
//! Reduces parsed operators into `SummaryMetrics` and classifies the result
//! against per-family performance bands.

pub mod summary;
pub mod thresholds;

pub use summary::SummaryAggregator;
pub use thresholds::{Classification, PerformanceBand};
