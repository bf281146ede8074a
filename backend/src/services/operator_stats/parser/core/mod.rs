//! Core parsing components for operator statistics analysis

pub mod graph_parser;
pub mod stats_parser;
pub mod value_parser;

pub use graph_parser::GraphParser;
pub use stats_parser::StatsParser;
pub use value_parser::ValueParser;
