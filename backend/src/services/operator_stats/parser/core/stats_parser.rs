//! Statistics parser for operator blobs
//!
//! Builds the typed `OperatorStatistics` and `TimeBreakdown` views from the
//! normalized JSON blobs. Missing or malformed fields stay `None`.

use crate::services::operator_stats::models::{
    DmlStatistics, ExternalFunctionStatistics, IoStatistics, Operator, OperatorStatistics,
    ParsedOperator, PruningStatistics, SpillStatistics, TimeBreakdown,
};
use crate::services::operator_stats::parser::core::ValueParser;
use serde_json::Value;

/// Parser for `operator_statistics` and `execution_time_breakdown`
pub struct StatsParser;

impl StatsParser {
    /// Parse both blobs of one operator
    ///
    /// An absent statistics blob yields all-`None` statistics; an absent time
    /// breakdown stays `None` so no execution share is reported.
    pub fn parse_operator(operator: &Operator) -> ParsedOperator<'_> {
        ParsedOperator {
            operator,
            statistics: operator
                .statistics
                .as_ref()
                .map(Self::parse_statistics)
                .unwrap_or_default(),
            time_breakdown: operator.time_breakdown.as_ref().map(Self::parse_time_breakdown),
        }
    }

    pub fn parse_statistics(blob: &Value) -> OperatorStatistics {
        OperatorStatistics {
            input_rows: ValueParser::u64_at(blob, &["input_rows"]),
            output_rows: ValueParser::u64_at(blob, &["output_rows"]),
            io: IoStatistics {
                bytes_scanned: ValueParser::u64_at(blob, &["io", "bytes_scanned"]),
                external_bytes_scanned: ValueParser::u64_at(blob, &["io", "external_bytes_scanned"]),
                bytes_written: ValueParser::u64_at(blob, &["io", "bytes_written"]),
                bytes_written_to_result: ValueParser::u64_at(blob, &["io", "bytes_written_to_result"]),
                percentage_scanned_from_cache: ValueParser::f64_at(
                    blob,
                    &["io", "percentage_scanned_from_cache"],
                ),
            },
            pruning: PruningStatistics {
                partitions_scanned: ValueParser::u64_at(blob, &["pruning", "partitions_scanned"]),
                partitions_total: ValueParser::u64_at(blob, &["pruning", "partitions_total"]),
            },
            spilling: SpillStatistics {
                bytes_spilled_local_storage: ValueParser::u64_at(
                    blob,
                    &["spilling", "bytes_spilled_local_storage"],
                ),
                bytes_spilled_remote_storage: ValueParser::u64_at(
                    blob,
                    &["spilling", "bytes_spilled_remote_storage"],
                ),
            },
            dml: DmlStatistics {
                number_of_rows_inserted: ValueParser::u64_at(blob, &["dml", "number_of_rows_inserted"]),
                number_of_rows_updated: ValueParser::u64_at(blob, &["dml", "number_of_rows_updated"]),
                number_of_rows_deleted: ValueParser::u64_at(blob, &["dml", "number_of_rows_deleted"]),
            },
            network_bytes: ValueParser::u64_at(blob, &["network", "network_bytes"]),
            external_functions: Self::parse_external_functions(blob),
        }
    }

    fn parse_external_functions(blob: &Value) -> Option<ExternalFunctionStatistics> {
        let section = blob.get("external_functions").filter(|v| v.is_object())?;
        Some(ExternalFunctionStatistics {
            total_invocations: ValueParser::u64_at(section, &["total_invocations"]),
            http_4xx_errors: ValueParser::u64_at(section, &["http_4xx_errors"]),
            http_5xx_errors: ValueParser::u64_at(section, &["http_5xx_errors"]),
            average_latency_ms: ValueParser::f64_at(section, &["average_latency"]),
        })
    }

    pub fn parse_time_breakdown(blob: &Value) -> TimeBreakdown {
        TimeBreakdown {
            overall_percentage: ValueParser::f64_at(blob, &["overall_percentage"]),
            processing: ValueParser::f64_at(blob, &["processing"]),
            synchronization: ValueParser::f64_at(blob, &["synchronization"]),
            local_disk_io: ValueParser::f64_at(blob, &["local_disk_io"]),
            remote_disk_io: ValueParser::f64_at(blob, &["remote_disk_io"]),
            network_communication: ValueParser::f64_at(blob, &["network_communication"]),
            other: ValueParser::f64_at(blob, &["other"]),
        }
    }
}

impl TimeBreakdown {
    /// Categories considered for the primary time category, in tie-break order
    pub fn categories(&self) -> [(&'static str, Option<f64>); 6] {
        [
            ("processing", self.processing),
            ("synchronization", self.synchronization),
            ("local_disk_io", self.local_disk_io),
            ("remote_disk_io", self.remote_disk_io),
            ("network_communication", self.network_communication),
            ("other", self.other),
        ]
    }

    /// Largest reported category; the first in enumeration order wins ties
    pub fn primary_category(&self) -> Option<(&'static str, f64)> {
        let mut best: Option<(&'static str, f64)> = None;
        for (name, value) in self.categories() {
            let Some(value) = value else { continue };
            match best {
                Some((_, current)) if value <= current => {}
                _ => best = Some((name, value)),
            }
        }
        best.filter(|(_, value)| *value > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_statistics() {
        let blob = json!({
            "input_rows": 100,
            "output_rows": 1500,
            "io": {
                "bytes_scanned": 1000,
                "external_bytes_scanned": 24,
                "bytes_written": 10,
                "bytes_written_to_result": 5,
                "percentage_scanned_from_cache": 95.0
            },
            "pruning": {"partitions_scanned": 20, "partitions_total": 100},
            "spilling": {"bytes_spilled_local_storage": 300, "bytes_spilled_remote_storage": 0},
            "dml": {"number_of_rows_inserted": 7, "number_of_rows_deleted": 3},
            "network": {"network_bytes": 4096},
            "external_functions": {"total_invocations": 10, "http_4xx_errors": 1, "average_latency": 12.5}
        });

        let stats = StatsParser::parse_statistics(&blob);
        assert_eq!(stats.input_rows, Some(100));
        assert_eq!(stats.output_rows, Some(1500));
        assert_eq!(stats.bytes_scanned_total(), 1024);
        assert_eq!(stats.bytes_written_total(), 15);
        assert_eq!(stats.io.percentage_scanned_from_cache, Some(95.0));
        assert_eq!(stats.pruning_efficiency(), Some(80.0));
        assert_eq!(stats.spilled_local(), 300);
        assert_eq!(stats.spilled_remote(), 0);
        assert_eq!(stats.dml_rows(), 10);
        assert_eq!(stats.network_bytes, Some(4096));

        let ext = stats.external_functions.unwrap();
        assert_eq!(ext.total_invocations, Some(10));
        assert_eq!(ext.http_4xx_errors, Some(1));
        assert_eq!(ext.http_5xx_errors, None);
        assert_eq!(ext.average_latency_ms, Some(12.5));
    }

    #[test]
    fn test_malformed_fields_are_dropped_individually() {
        let blob = json!({
            "input_rows": "lots",
            "output_rows": 42,
            "io": "not an object",
            "pruning": {"partitions_scanned": 1, "partitions_total": [3]}
        });

        let stats = StatsParser::parse_statistics(&blob);
        assert_eq!(stats.input_rows, None);
        assert_eq!(stats.output_rows, Some(42));
        assert_eq!(stats.io, IoStatistics::default());
        assert_eq!(stats.pruning.partitions_scanned, Some(1));
        assert_eq!(stats.pruning.partitions_total, None);
        assert_eq!(stats.pruning_efficiency(), None);
        assert!(stats.external_functions.is_none());
    }

    #[test]
    fn test_primary_category_picks_largest() {
        let breakdown = StatsParser::parse_time_breakdown(&json!({
            "overall_percentage": 40.0,
            "processing": 10.0,
            "local_disk_io": 25.5,
            "network_communication": 4.5
        }));
        assert_eq!(breakdown.overall_percentage, Some(40.0));
        assert_eq!(breakdown.primary_category(), Some(("local_disk_io", 25.5)));
    }

    #[test]
    fn test_primary_category_ties_break_by_enumeration_order() {
        let breakdown = StatsParser::parse_time_breakdown(&json!({
            "overall_percentage": 20.0,
            "network_communication": 10.0,
            "synchronization": 10.0
        }));
        assert_eq!(breakdown.primary_category(), Some(("synchronization", 10.0)));
    }

    #[test]
    fn test_primary_category_absent_when_all_zero() {
        let breakdown = StatsParser::parse_time_breakdown(&json!({
            "overall_percentage": 20.0,
            "processing": 0.0
        }));
        assert_eq!(breakdown.primary_category(), None);
    }
}
