//! Operator statistics parser module
//!
//! Turns raw profiler rows into a validated operator graph with typed views
//! over the nested statistics blobs.

pub mod core;

// Re-export commonly used items
pub use core::{GraphParser, StatsParser, ValueParser};
