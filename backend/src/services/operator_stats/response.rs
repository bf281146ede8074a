//! Response assembly
//!
//! Combines condensed operators, the summary and its classification into one
//! payload and keeps the serialized form within the configured byte budget.

use crate::services::operator_stats::analyzer::Classification;
use crate::services::operator_stats::models::{CondensedOperator, PerformanceIssue, SummaryMetrics};
use crate::utils::{ApiError, ApiErrorResponse, ApiResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

/// Default payload budget in bytes
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 100_000;

/// Envelope layout; both variants carry identical data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Single line, no whitespace
    #[default]
    Compact,
    /// Indented envelope
    Expanded,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Compact => "compact",
            OutputFormat::Expanded => "expanded",
        }
    }

    pub fn render<T: Serialize>(&self, value: &T) -> ApiResult<String> {
        Ok(match self {
            OutputFormat::Compact => serde_json::to_string(value)?,
            OutputFormat::Expanded => serde_json::to_string_pretty(value)?,
        })
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(OutputFormat::Compact),
            "expanded" | "pretty" => Ok(OutputFormat::Expanded),
            other => Err(format!("unknown output format '{}', expected compact or expanded", other)),
        }
    }
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Successful analysis payload
///
/// `issues` and `operators` hold one single-line JSON document per entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    pub status: String,
    pub query_id: String,
    pub timestamp: String,
    pub summary_metrics: SummaryMetrics,
    pub issues: Vec<String>,
    pub classification: Classification,
    pub operators: Vec<String>,
    #[serde(skip_serializing_if = "is_zero", default)]
    pub omitted_operators: usize,
    #[serde(skip_serializing_if = "is_zero", default)]
    pub omitted_issues: usize,
    #[serde(skip_serializing_if = "is_false", default)]
    pub truncated: bool,
}

/// Payload plus its rendered body
#[derive(Debug, Clone)]
pub struct RenderedPayload {
    pub payload: AnalysisPayload,
    pub body: String,
}

pub struct ResponseAssembler {
    format: OutputFormat,
    max_payload_bytes: usize,
}

impl ResponseAssembler {
    pub fn new(format: OutputFormat, max_payload_bytes: usize) -> Self {
        Self { format, max_payload_bytes }
    }

    pub fn assemble(
        &self,
        query_id: &str,
        condensed: &[CondensedOperator],
        mut summary: SummaryMetrics,
    ) -> ApiResult<RenderedPayload> {
        let classification = Classification::from_summary(&summary);

        // Issues travel as separate entries, not inside the summary
        let issues = [
            std::mem::take(&mut summary.high_execution_time_operators),
            std::mem::take(&mut summary.exploding_joins),
            std::mem::take(&mut summary.spilling_operators),
        ]
        .into_iter()
        .flatten()
        .map(|issue| serde_json::to_string(&issue))
        .collect::<Result<Vec<_>, _>>()?;

        let operators = condensed
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;

        let template = AnalysisPayload {
            status: "success".to_string(),
            query_id: query_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            summary_metrics: summary,
            issues: Vec::new(),
            classification,
            operators: Vec::new(),
            omitted_operators: 0,
            omitted_issues: 0,
            truncated: false,
        };

        self.fit(template, &issues, &operators, condensed)
    }

    /// Shrink the payload until its rendered form fits the budget
    ///
    /// Operators go first, lowest execution share first and later rows first
    /// on ties; issues are dropped from the tail only once no operator is left.
    fn fit(
        &self,
        template: AnalysisPayload,
        issues: &[String],
        operators: &[String],
        condensed: &[CondensedOperator],
    ) -> ApiResult<RenderedPayload> {
        let all_operators: Vec<usize> = (0..operators.len()).collect();
        let full = self.build(&template, issues, operators, &all_operators, issues.len())?;
        if full.body.len() <= self.max_payload_bytes {
            return Ok(full);
        }

        let mut removal_order = all_operators;
        removal_order.sort_by(|a, b| {
            let share = |i: usize| condensed[i].execution_percentage.unwrap_or(0.0);
            share(*a).total_cmp(&share(*b)).then_with(|| b.cmp(a))
        });

        let kept_operators = |count: usize| -> Vec<usize> {
            let mut kept = removal_order[operators.len() - count..].to_vec();
            kept.sort_unstable();
            kept
        };

        let operator_count = Self::largest_fitting(operators.len(), |count| {
            let body = self.build(&template, issues, operators, &kept_operators(count), issues.len())?.body;
            Ok(body.len() <= self.max_payload_bytes)
        })?;

        let rendered = match operator_count {
            Some(count) => {
                self.build(&template, issues, operators, &kept_operators(count), issues.len())?
            }
            None => {
                let issue_count = Self::largest_fitting(issues.len(), |count| {
                    let body = self.build(&template, issues, operators, &[], count)?.body;
                    Ok(body.len() <= self.max_payload_bytes)
                })?
                .ok_or_else(|| {
                    ApiError::internal_error(format!(
                        "Payload budget of {} bytes is too small for the query summary",
                        self.max_payload_bytes
                    ))
                })?;
                self.build(&template, issues, operators, &[], issue_count)?
            }
        };

        tracing::warn!(
            "Payload for query {} truncated to {} bytes: omitted {} operators and {} issues",
            template.query_id,
            rendered.body.len(),
            rendered.payload.omitted_operators,
            rendered.payload.omitted_issues
        );

        Ok(rendered)
    }

    fn build(
        &self,
        template: &AnalysisPayload,
        issues: &[String],
        operators: &[String],
        kept_operators: &[usize],
        kept_issues: usize,
    ) -> ApiResult<RenderedPayload> {
        let mut payload = template.clone();
        payload.operators = kept_operators.iter().map(|i| operators[*i].clone()).collect();
        payload.issues = issues[..kept_issues].to_vec();
        payload.omitted_operators = operators.len() - kept_operators.len();
        payload.omitted_issues = issues.len() - kept_issues;
        payload.truncated = payload.omitted_operators > 0 || payload.omitted_issues > 0;

        let body = self.format.render(&payload)?;
        Ok(RenderedPayload { payload, body })
    }

    /// Largest count in `0..=max` accepted by `fits`, assuming fewer entries
    /// never produce a larger body
    fn largest_fitting(
        max: usize,
        fits: impl Fn(usize) -> ApiResult<bool>,
    ) -> ApiResult<Option<usize>> {
        if !fits(0)? {
            return Ok(None);
        }
        let (mut low, mut high) = (0, max);
        while low < high {
            let mid = low + (high - low).div_ceil(2);
            if fits(mid)? {
                low = mid;
            } else {
                high = mid - 1;
            }
        }
        Ok(Some(low))
    }
}

/// Render an error payload in the requested layout
pub fn render_error(err: &ApiError, query_id: Option<&str>, format: OutputFormat) -> String {
    let body = ApiErrorResponse::from_error(err, query_id);
    format.render(&body).unwrap_or_else(|_| {
        r#"{"status":"error","error":"failed to serialize error payload"}"#.to_string()
    })
}

/// Issue entries decoded back from their serialized form
pub fn decode_issues(payload: &AnalysisPayload) -> ApiResult<Vec<PerformanceIssue>> {
    payload
        .issues
        .iter()
        .map(|entry| serde_json::from_str(entry).map_err(ApiError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::operator_stats::models::OperatorType;

    const QUERY_ID: &str = "01b2c3d4-0000-1111-2222-333344445555";

    fn condensed(count: usize) -> Vec<CondensedOperator> {
        (0..count)
            .map(|i| {
                let mut op = CondensedOperator::new(i as u64, OperatorType::Filter);
                op.execution_percentage = Some((i % 7) as f64);
                op.parent_ids = Some(vec![0]);
                op
            })
            .collect()
    }

    fn summary_with_issues(count: usize) -> SummaryMetrics {
        let mut summary = SummaryMetrics::default();
        for i in 0..count {
            summary.spilling_operators.push(PerformanceIssue::Spilling {
                operator_id: i as u64,
                operator_type: OperatorType::Sort,
                local_bytes: 1_000,
                remote_bytes: 0,
                total_bytes: 1_000,
            });
        }
        summary
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("compact".parse::<OutputFormat>().unwrap(), OutputFormat::Compact);
        assert_eq!(" Expanded ".parse::<OutputFormat>().unwrap(), OutputFormat::Expanded);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_payload_within_budget_is_untouched() {
        let assembler = ResponseAssembler::new(OutputFormat::Compact, DEFAULT_MAX_PAYLOAD_BYTES);
        let rendered = assembler.assemble(QUERY_ID, &condensed(3), summary_with_issues(2)).unwrap();

        assert_eq!(rendered.payload.status, "success");
        assert_eq!(rendered.payload.operators.len(), 3);
        assert_eq!(rendered.payload.issues.len(), 2);
        assert!(!rendered.payload.truncated);
        assert!(rendered.payload.summary_metrics.spilling_operators.is_empty());
        assert_eq!(decode_issues(&rendered.payload).unwrap().len(), 2);
        assert!(!rendered.body.contains('\n'));
        assert!(!rendered.body.contains("omitted_operators"));
    }

    #[test]
    fn test_operator_entries_are_single_line() {
        let assembler = ResponseAssembler::new(OutputFormat::Expanded, DEFAULT_MAX_PAYLOAD_BYTES);
        let rendered = assembler.assemble(QUERY_ID, &condensed(2), SummaryMetrics::default()).unwrap();
        assert!(rendered.body.contains('\n'));
        for entry in &rendered.payload.operators {
            assert!(!entry.contains('\n'));
            let decoded: CondensedOperator = serde_json::from_str(entry).unwrap();
            assert_eq!(decoded.operator_type, OperatorType::Filter);
        }
    }

    #[test]
    fn test_over_budget_drops_lowest_share_operators() {
        let operators = condensed(200);
        let budget = 4_000;
        let assembler = ResponseAssembler::new(OutputFormat::Compact, budget);
        let rendered = assembler.assemble(QUERY_ID, &operators, SummaryMetrics::default()).unwrap();

        assert!(rendered.body.len() <= budget);
        assert!(rendered.payload.truncated);
        assert!(rendered.payload.omitted_operators > 0);
        assert_eq!(
            rendered.payload.operators.len() + rendered.payload.omitted_operators,
            200
        );

        // Every kept operator has at least the share of every dropped one
        let kept: Vec<CondensedOperator> = rendered
            .payload
            .operators
            .iter()
            .map(|entry| serde_json::from_str(entry).unwrap())
            .collect();
        let min_kept = kept
            .iter()
            .filter_map(|op| op.execution_percentage)
            .fold(f64::INFINITY, f64::min);
        assert!(min_kept >= 5.0);

        // Kept entries stay in row order
        let ids: Vec<u64> = kept.iter().map(|op| op.id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);

        let body: serde_json::Value = serde_json::from_str(&rendered.body).unwrap();
        assert_eq!(body["truncated"], true);
    }

    #[test]
    fn test_issues_dropped_after_operators() {
        let budget = 2_500;
        let assembler = ResponseAssembler::new(OutputFormat::Compact, budget);
        let rendered = assembler.assemble(QUERY_ID, &condensed(50), summary_with_issues(40)).unwrap();

        assert!(rendered.body.len() <= budget);
        assert!(rendered.payload.operators.is_empty());
        assert_eq!(rendered.payload.omitted_operators, 50);
        assert!(rendered.payload.omitted_issues > 0);
        assert_eq!(rendered.payload.issues.len() + rendered.payload.omitted_issues, 40);

        // Issues are dropped from the tail
        let decoded = decode_issues(&rendered.payload).unwrap();
        assert!(matches!(decoded[0], PerformanceIssue::Spilling { operator_id: 0, .. }));
    }

    #[test]
    fn test_budget_too_small_for_summary_is_internal_error() {
        let assembler = ResponseAssembler::new(OutputFormat::Compact, 100);
        let err = assembler.assemble(QUERY_ID, &condensed(1), SummaryMetrics::default()).unwrap_err();
        assert_eq!(err.kind(), crate::utils::ErrorKind::Internal);
    }

    #[test]
    fn test_compact_and_expanded_decode_equal() {
        let summary = summary_with_issues(1);
        let compact = OutputFormat::Compact.render(&summary).unwrap();
        let expanded = OutputFormat::Expanded.render(&summary).unwrap();
        assert_ne!(compact, expanded);

        let a: SummaryMetrics = serde_json::from_str(&compact).unwrap();
        let b: SummaryMetrics = serde_json::from_str(&expanded).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, summary);
    }

    #[test]
    fn test_error_rendering() {
        let body = render_error(&ApiError::not_found(QUERY_ID), Some(QUERY_ID), OutputFormat::Compact);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["kind"], "not_found");
        assert!(value["error"].as_str().unwrap().starts_with("No operator statistics found"));
    }
}
