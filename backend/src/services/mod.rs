pub mod operator_stats;

pub use operator_stats::{AnalysisOptions, analyze_operator_stats, analyze_to_json};
