//! Operator Statistics Diagnostic Engine
//!
//! Turns the per-operator statistics of one executed query into a bounded,
//! classified diagnostic payload.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                   analyze_operator_stats()                    │
//! │                              │                                │
//! │   raw rows ──► GraphParser ──► StatsParser (per operator)     │
//! │                              │                                │
//! │              ┌───────────────┴───────────────┐                │
//! │              ▼                               ▼                │
//! │    ┌───────────────────┐          ┌────────────────────┐      │
//! │    │ OperatorCondenser │          │ SummaryAggregator  │      │
//! │    │  format/truncate  │          │  issues, averages  │      │
//! │    │  attribute registry│         │  query type        │      │
//! │    └─────────┬─────────┘          └─────────┬──────────┘      │
//! │              │                    Classification (bands)      │
//! │              └──────────────┬───────────────┘                 │
//! │                             ▼                                 │
//! │                    ResponseAssembler (budget)                 │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use profile_diagnostics::services::operator_stats::{analyze_operator_stats, AnalysisOptions};
//!
//! let rows: Vec<serde_json::Value> = serde_json::from_str(&raw)?;
//! let rendered = analyze_operator_stats(query_id, &rows, &AnalysisOptions::default())?;
//! println!("{}", rendered.body);
//! ```

pub mod analyzer;
pub mod condenser;
pub mod models;
pub mod parser;
pub mod response;


pub use analyzer::{Classification, PerformanceBand, SummaryAggregator};
pub use condenser::OperatorCondenser;
pub use models::*;
pub use parser::{GraphParser, StatsParser};
pub use response::{
    AnalysisPayload, DEFAULT_MAX_PAYLOAD_BYTES, OutputFormat, RenderedPayload, ResponseAssembler,
};

use crate::utils::{ApiError, ApiResult};
use axum::http::StatusCode;
use serde_json::Value;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Per-request analysis settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisOptions {
    pub format: OutputFormat,
    pub max_payload_bytes: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self { format: OutputFormat::default(), max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES }
    }
}

/// Analyze the operator statistics rows of one query
///
/// This is the main entry point. It:
/// 1. Validates the query id and assembles the operator graph
/// 2. Parses each operator's statistics once
/// 3. Condenses every operator and aggregates the whole-query summary
/// 4. Classifies the summary and renders a payload within the byte budget
pub fn analyze_operator_stats(
    query_id: &str,
    rows: &[Value],
    options: &AnalysisOptions,
) -> ApiResult<RenderedPayload> {
    let graph = GraphParser::parse(query_id, rows)?;
    let parsed: Vec<ParsedOperator<'_>> =
        graph.operators.iter().map(StatsParser::parse_operator).collect();

    let condensed = OperatorCondenser::condense_all(&parsed);
    let summary = SummaryAggregator::aggregate(&parsed, graph.warnings.clone());

    let rendered = ResponseAssembler::new(options.format, options.max_payload_bytes)
        .assemble(query_id, &condensed, summary)?;

    tracing::info!(
        "Analyzed query {}: {} operators, {} issues, overall {}, {} bytes",
        query_id,
        rendered.payload.summary_metrics.operator_count,
        rendered.payload.issues.len() + rendered.payload.omitted_issues,
        rendered.payload.classification.overall,
        rendered.body.len()
    );

    Ok(rendered)
}

/// Run an analysis and always produce a JSON body
///
/// Errors and panics raised inside the engine are rendered as the error
/// payload; the status code follows the error kind.
pub fn analyze_to_json(
    query_id: &str,
    rows: &[Value],
    options: &AnalysisOptions,
) -> (StatusCode, String) {
    render_guarded(query_id, options.format, || analyze_operator_stats(query_id, rows, options))
}

/// Render the outcome of `analysis`, turning a panic into an internal error
fn render_guarded<F>(query_id: &str, format: OutputFormat, analysis: F) -> (StatusCode, String)
where
    F: FnOnce() -> ApiResult<RenderedPayload>,
{
    let outcome = catch_unwind(AssertUnwindSafe(analysis)).unwrap_or_else(|panic| {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Err(ApiError::internal_with_details("Analysis aborted unexpectedly", message))
    });

    match outcome {
        Ok(rendered) => (StatusCode::OK, rendered.body),
        Err(err) => {
            match err.status_code() {
                StatusCode::INTERNAL_SERVER_ERROR => {
                    tracing::error!("Analysis of query {} failed: {}", query_id, err)
                }
                _ => tracing::debug!("Analysis of query {} rejected: {}", query_id, err),
            }
            (err.status_code(), response::render_error(&err, Some(query_id), format))
        }
    }
}
