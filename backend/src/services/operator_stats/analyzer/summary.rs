//! Whole-query summary aggregation
//!
//! One pass over every parsed operator accumulates totals and averages,
//! detects performance issues and resolves the statement kind.

use crate::services::operator_stats::condenser::format_byte_count;
use crate::services::operator_stats::models::constants::detection::{
    EXPLODING_JOIN_FACTOR, HIGH_EXECUTION_TIME_PERCENTAGE,
};
use crate::services::operator_stats::models::constants::limits::MAX_TOP_OPERATORS;
use crate::services::operator_stats::models::{
    IssueCounts, OperatorType, ParsedOperator, PerformanceIssue, QueryType, SummaryMetrics,
    TopOperator, round_to,
};

/// Summary aggregator
pub struct SummaryAggregator;

/// Running mean over the operators that reported a value
#[derive(Debug, Default)]
struct Mean {
    sum: f64,
    samples: usize,
}

impl Mean {
    fn add(&mut self, value: Option<f64>) {
        if let Some(value) = value.filter(|v| v.is_finite()) {
            self.sum += value;
            self.samples += 1;
        }
    }

    fn value(&self) -> f64 {
        if self.samples == 0 { 0.0 } else { round_to(self.sum / self.samples as f64, 2) }
    }
}

#[derive(Debug, Default)]
struct ExternalFunctionTotals {
    invocations: u64,
    failures: u64,
    weighted_latency: f64,
    latency_invocations: u64,
}

impl SummaryAggregator {
    pub fn aggregate(operators: &[ParsedOperator<'_>], graph_warnings: Vec<String>) -> SummaryMetrics {
        let mut summary = SummaryMetrics {
            operator_count: operators.len(),
            query_type: Self::resolve_query_type(operators),
            graph_warnings,
            ..Default::default()
        };

        let mut cache = Mean::default();
        let mut pruning = Mean::default();
        let mut external = ExternalFunctionTotals::default();
        let mut final_output_rows = None;

        for parsed in operators {
            let operator = parsed.operator;
            let stats = &parsed.statistics;

            summary.total_bytes_scanned =
                summary.total_bytes_scanned.saturating_add(stats.bytes_scanned_total());
            summary.total_bytes_written =
                summary.total_bytes_written.saturating_add(stats.bytes_written_total());
            summary.dml_rows_affected = summary.dml_rows_affected.saturating_add(stats.dml_rows());

            // The Result operator's input is what the client receives
            if operator.operator_type == OperatorType::Result && final_output_rows.is_none() {
                final_output_rows = stats.input_rows;
            }

            cache.add(stats.io.percentage_scanned_from_cache);
            pruning.add(stats.pruning_efficiency());

            let local = stats.spilled_local();
            let remote = stats.spilled_remote();
            let spilled = local.saturating_add(remote);
            if spilled > 0 {
                summary.total_bytes_spilled = summary.total_bytes_spilled.saturating_add(spilled);
                summary.spilling_operators.push(PerformanceIssue::Spilling {
                    operator_id: operator.id,
                    operator_type: operator.operator_type.clone(),
                    local_bytes: local,
                    remote_bytes: remote,
                    total_bytes: spilled,
                });
            }

            if operator.operator_type.is_join()
                && let (Some(input), Some(output)) = (stats.input_rows, stats.output_rows)
                && input > 0
            {
                let factor = round_to(output as f64 / input as f64, 2);
                summary.peak_join_factor =
                    Some(summary.peak_join_factor.map_or(factor, |peak| peak.max(factor)));

                if output as f64 > input as f64 * EXPLODING_JOIN_FACTOR {
                    summary.exploding_joins.push(PerformanceIssue::ExplodingJoin {
                        operator_id: operator.id,
                        operator_type: operator.operator_type.clone(),
                        input_rows: input,
                        output_rows: output,
                        factor,
                    });
                }
            }

            if let Some(pct) = parsed
                .time_breakdown
                .as_ref()
                .and_then(|t| t.overall_percentage)
                .filter(|pct| pct.is_finite())
            {
                summary.peak_execution_percentage =
                    Some(summary.peak_execution_percentage.map_or(pct, |peak| peak.max(pct)));

                if pct > HIGH_EXECUTION_TIME_PERCENTAGE {
                    summary.high_execution_time_operators.push(PerformanceIssue::HighExecutionTime {
                        operator_id: operator.id,
                        operator_type: operator.operator_type.clone(),
                        percentage: round_to(pct, 2),
                    });
                }
            }

            if let Some(ext) = &stats.external_functions {
                let invocations = ext.total_invocations.unwrap_or(0);
                external.invocations = external.invocations.saturating_add(invocations);
                external.failures = external.failures.saturating_add(
                    ext.http_4xx_errors.unwrap_or(0).saturating_add(ext.http_5xx_errors.unwrap_or(0)),
                );
                if let Some(latency) = ext.average_latency_ms.filter(|l| l.is_finite())
                    && invocations > 0
                {
                    external.weighted_latency += latency * invocations as f64;
                    external.latency_invocations =
                        external.latency_invocations.saturating_add(invocations);
                }
            }
        }

        summary.final_output_rows = final_output_rows.unwrap_or(0);
        summary.average_cache_hit_rate = cache.value();
        summary.cache_hit_samples = cache.samples;
        summary.average_pruning_efficiency = pruning.value();
        summary.pruning_samples = pruning.samples;
        summary.peak_execution_percentage = summary.peak_execution_percentage.map(|p| round_to(p, 2));

        if external.latency_invocations > 0 {
            summary.external_function_latency_ms = Some(round_to(
                external.weighted_latency / external.latency_invocations as f64,
                2,
            ));
        }
        if external.invocations > 0 {
            let succeeded = external.invocations.saturating_sub(external.failures);
            summary.external_function_success_rate =
                Some(round_to(succeeded as f64 / external.invocations as f64 * 100.0, 2));
        }

        summary.total_bytes_scanned_display = format_byte_count(summary.total_bytes_scanned);
        summary.total_bytes_written_display = format_byte_count(summary.total_bytes_written);
        summary.total_bytes_spilled_display = format_byte_count(summary.total_bytes_spilled);

        summary.top_operators = Self::top_operators(operators);
        summary.issue_counts = IssueCounts {
            high_execution_time: summary.high_execution_time_operators.len(),
            exploding_joins: summary.exploding_joins.len(),
            spilling: summary.spilling_operators.len(),
        };

        tracing::debug!(
            "Aggregated {} operators: query_type={}, scanned={}, spilled={}, issues={:?}",
            summary.operator_count,
            summary.query_type.as_str(),
            summary.total_bytes_scanned_display,
            summary.total_bytes_spilled_display,
            summary.issue_counts
        );

        summary
    }

    /// Resolve the statement kind by tier, earliest row first within a tier
    ///
    /// A CTAS plan may also contain an Insert operator, so CTAS outranks
    /// Insert, which outranks the other DML kinds.
    pub fn resolve_query_type(operators: &[ParsedOperator<'_>]) -> QueryType {
        operators
            .iter()
            .filter_map(|parsed| Self::query_type_tier(&parsed.operator.operator_type))
            .min_by_key(|(tier, _)| *tier)
            .map(|(_, query_type)| query_type)
            .unwrap_or_default()
    }

    fn query_type_tier(operator_type: &OperatorType) -> Option<(u8, QueryType)> {
        match operator_type {
            OperatorType::CreateTableAsSelect => Some((0, QueryType::CreateTableAsSelect)),
            OperatorType::Insert => Some((1, QueryType::Insert)),
            OperatorType::Update => Some((2, QueryType::Update)),
            OperatorType::Delete => Some((2, QueryType::Delete)),
            OperatorType::Merge => Some((2, QueryType::Merge)),
            _ => None,
        }
    }

    /// Operators ranked by execution share, ties in row order
    fn top_operators(operators: &[ParsedOperator<'_>]) -> Vec<TopOperator> {
        let mut ranked: Vec<(u64, &OperatorType, f64)> = operators
            .iter()
            .filter_map(|parsed| {
                let pct = parsed.time_breakdown.as_ref()?.overall_percentage?;
                (pct > 0.0 && pct.is_finite())
                    .then_some((parsed.operator.id, &parsed.operator.operator_type, pct))
            })
            .collect();

        ranked.sort_by(|a, b| b.2.total_cmp(&a.2));

        ranked
            .into_iter()
            .take(MAX_TOP_OPERATORS)
            .enumerate()
            .map(|(index, (operator_id, operator_type, pct))| TopOperator {
                rank: index as u32 + 1,
                operator_id,
                operator_type: operator_type.clone(),
                execution_percentage: round_to(pct, 2),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::operator_stats::models::Operator;
    use crate::services::operator_stats::parser::StatsParser;
    use serde_json::{Value, json};

    fn op(id: u64, kind: &str, stats: Value, time: Option<Value>) -> Operator {
        Operator {
            id,
            operator_type: OperatorType::from_name(kind),
            parent_ids: None,
            statistics: Some(stats),
            time_breakdown: time,
            attributes: None,
        }
    }

    fn aggregate(ops: &[Operator]) -> SummaryMetrics {
        let parsed: Vec<_> = ops.iter().map(StatsParser::parse_operator).collect();
        SummaryAggregator::aggregate(&parsed, Vec::new())
    }

    #[test]
    fn test_totals_and_final_output_rows() {
        let ops = vec![
            op(0, "Result", json!({"input_rows": 1234, "output_rows": 1}), None),
            op(
                1,
                "TableScan",
                json!({"io": {"bytes_scanned": 1000, "external_bytes_scanned": 500, "bytes_written_to_result": 20}}),
                None,
            ),
            op(2, "Insert", json!({"io": {"bytes_written": 80}, "dml": {"number_of_rows_inserted": 9}}), None),
        ];
        let summary = aggregate(&ops);

        assert_eq!(summary.operator_count, 3);
        assert_eq!(summary.final_output_rows, 1234);
        assert_eq!(summary.total_bytes_scanned, 1500);
        assert_eq!(summary.total_bytes_written, 100);
        assert_eq!(summary.dml_rows_affected, 9);
        assert_eq!(summary.total_bytes_scanned_display, "0.00 MB");
        assert_eq!(summary.query_type, QueryType::Insert);
    }

    #[test]
    fn test_averages_default_to_zero_without_samples() {
        let summary = aggregate(&[op(0, "Result", json!({}), None)]);
        assert_eq!(summary.average_cache_hit_rate, 0.0);
        assert_eq!(summary.cache_hit_samples, 0);
        assert_eq!(summary.average_pruning_efficiency, 0.0);
        assert_eq!(summary.pruning_samples, 0);
        assert!(!summary.has_issues());
    }

    #[test]
    fn test_averages_only_count_reporting_operators() {
        let ops = vec![
            op(1, "TableScan", json!({"io": {"percentage_scanned_from_cache": 90.0},
                "pruning": {"partitions_scanned": 20, "partitions_total": 100}}), None),
            op(2, "TableScan", json!({"io": {"percentage_scanned_from_cache": 60.0},
                "pruning": {"partitions_scanned": 0, "partitions_total": 0}}), None),
            op(3, "Filter", json!({}), None),
        ];
        let summary = aggregate(&ops);
        assert_eq!(summary.average_cache_hit_rate, 75.0);
        assert_eq!(summary.cache_hit_samples, 2);
        assert_eq!(summary.average_pruning_efficiency, 80.0);
        assert_eq!(summary.pruning_samples, 1);
    }

    #[test]
    fn test_exploding_join_detection() {
        let ops = vec![
            op(1, "Join", json!({"input_rows": 100, "output_rows": 1500}), None),
            op(2, "CartesianJoin", json!({"input_rows": 100, "output_rows": 1000}), None),
            op(3, "Filter", json!({"input_rows": 1, "output_rows": 1000}), None),
            op(4, "Join", json!({"input_rows": 0, "output_rows": 1000}), None),
        ];
        let summary = aggregate(&ops);

        assert_eq!(summary.exploding_joins.len(), 1);
        assert_eq!(
            summary.exploding_joins[0],
            PerformanceIssue::ExplodingJoin {
                operator_id: 1,
                operator_type: OperatorType::Join,
                input_rows: 100,
                output_rows: 1500,
                factor: 15.0,
            }
        );
        assert_eq!(summary.peak_join_factor, Some(15.0));
        assert_eq!(summary.issue_counts.exploding_joins, 1);
    }

    #[test]
    fn test_spilling_and_high_execution_time() {
        let ops = vec![
            op(
                1,
                "Sort",
                json!({"spilling": {"bytes_spilled_local_storage": 500, "bytes_spilled_remote_storage": 25}}),
                Some(json!({"overall_percentage": 15.0})),
            ),
            op(2, "Aggregate", json!({}), Some(json!({"overall_percentage": 15.01}))),
        ];
        let summary = aggregate(&ops);

        assert_eq!(summary.total_bytes_spilled, 525);
        assert_eq!(summary.spill_split(), (500, 25));
        assert_eq!(summary.high_execution_time_operators.len(), 1);
        assert!(matches!(
            summary.high_execution_time_operators[0],
            PerformanceIssue::HighExecutionTime { operator_id: 2, .. }
        ));
        assert_eq!(summary.peak_execution_percentage, Some(15.01));
    }

    #[test]
    fn test_query_type_priority() {
        let ops = vec![
            op(1, "Insert", json!({}), None),
            op(2, "CreateTableAsSelect", json!({}), None),
        ];
        assert_eq!(aggregate(&ops).query_type, QueryType::CreateTableAsSelect);

        let ops = vec![op(1, "Delete", json!({}), None), op(2, "Update", json!({}), None)];
        assert_eq!(aggregate(&ops).query_type, QueryType::Delete);

        let ops = vec![op(1, "Merge", json!({}), None), op(2, "Insert", json!({}), None)];
        assert_eq!(aggregate(&ops).query_type, QueryType::Insert);

        assert_eq!(aggregate(&[op(1, "TableScan", json!({}), None)]).query_type, QueryType::Select);
    }

    #[test]
    fn test_top_operators_ranked() {
        let ops: Vec<Operator> = [5.0, 30.0, 12.5, 30.0, 1.0, 0.0, 8.0]
            .iter()
            .enumerate()
            .map(|(i, pct)| op(i as u64, "Filter", json!({}), Some(json!({"overall_percentage": pct}))))
            .collect();
        let summary = aggregate(&ops);

        let ids: Vec<u64> = summary.top_operators.iter().map(|t| t.operator_id).collect();
        assert_eq!(ids, vec![1, 3, 2, 6, 0]);
        assert_eq!(summary.top_operators[0].rank, 1);
        assert_eq!(summary.top_operators[4].rank, 5);
    }

    #[test]
    fn test_external_function_metrics() {
        let ops = vec![
            op(1, "ExternalFunction", json!({"external_functions": {
                "total_invocations": 90, "http_4xx_errors": 2, "http_5xx_errors": 3, "average_latency": 10.0}}), None),
            op(2, "ExternalFunction", json!({"external_functions": {
                "total_invocations": 10, "average_latency": 110.0}}), None),
        ];
        let summary = aggregate(&ops);
        assert_eq!(summary.external_function_latency_ms, Some(20.0));
        assert_eq!(summary.external_function_success_rate, Some(95.0));
    }
}
