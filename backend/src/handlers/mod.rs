pub mod operator_stats;

pub use operator_stats::ApiDoc;
