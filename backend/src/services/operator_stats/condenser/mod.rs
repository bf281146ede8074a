//! Operator condenser
//!
//! Produces one bounded `CondensedOperator` per parsed operator: execution
//! share, row counts, formatted byte metrics and the per-kind attributes.

pub mod attributes;
pub mod format;

pub use attributes::{ATTRIBUTE_REGISTRY, AttributeExtractor, AttributeRegistry};
pub use format::{format_byte_count, format_bytes, truncate_expression};

use crate::services::operator_stats::models::constants::detection::TIME_CATEGORY_MIN_PERCENTAGE;
use crate::services::operator_stats::models::{CondensedOperator, ParsedOperator, round_to};

pub struct OperatorCondenser;

impl OperatorCondenser {
    pub fn condense(parsed: &ParsedOperator<'_>) -> CondensedOperator {
        let operator = parsed.operator;
        let stats = &parsed.statistics;
        let mut condensed = CondensedOperator::new(operator.id, operator.operator_type.clone());

        condensed.parent_ids = operator
            .parent_ids
            .as_ref()
            .filter(|parents| !parents.is_empty())
            .map(|parents| parents.iter().copied().collect());

        // Execution time
        if let Some(breakdown) = &parsed.time_breakdown
            && let Some(overall) = breakdown.overall_percentage.filter(|pct| *pct > 0.0)
        {
            condensed.execution_percentage = Some(round_to(overall, 2));
            if overall > TIME_CATEGORY_MIN_PERCENTAGE
                && let Some((name, value)) = breakdown.primary_category()
            {
                condensed.primary_time_category = Some(format!("{}:{:.1}%", name, value));
            }
        }

        // Statistics
        condensed.input_rows = stats.input_rows.filter(|rows| *rows > 0);
        condensed.output_rows = stats.output_rows.filter(|rows| *rows > 0);
        condensed.bytes_scanned = non_zero_bytes(stats.bytes_scanned_total());
        condensed.bytes_written = non_zero_bytes(stats.bytes_written_total());
        condensed.network_bytes = stats.network_bytes.and_then(non_zero_bytes);
        condensed.cache_hit_percentage = stats.io.percentage_scanned_from_cache;
        condensed.pruning_efficiency = stats.pruning_efficiency();
        condensed.bytes_spilled = non_zero_bytes(stats.spilled_local().saturating_add(stats.spilled_remote()));
        condensed.dml_rows_affected = Some(stats.dml_rows()).filter(|rows| *rows > 0);

        // Attributes
        if let Some(attributes) = &operator.attributes {
            condensed.attributes = ATTRIBUTE_REGISTRY.extract(&operator.operator_type, attributes);
        }

        condensed
    }

    /// Condense every operator, preserving order
    pub fn condense_all(parsed: &[ParsedOperator<'_>]) -> Vec<CondensedOperator> {
        let condensed: Vec<CondensedOperator> = parsed.iter().map(Self::condense).collect();
        tracing::debug!("Condensed {} operators", condensed.len());
        condensed
    }
}

fn non_zero_bytes(bytes: u64) -> Option<String> {
    (bytes > 0).then(|| format_byte_count(bytes))
}
