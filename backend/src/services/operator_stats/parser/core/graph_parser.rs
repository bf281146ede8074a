//! Graph parser for operator statistics rows
//!
//! Validates the query identifier, decodes each raw row and normalizes the
//! parent references into an operator DAG. Topology problems are recorded as
//! warnings; only structural faults abort parsing.

use crate::services::operator_stats::models::{Operator, OperatorGraph, OperatorType, RawOperatorRow};
use crate::services::operator_stats::parser::core::ValueParser;
use crate::utils::{ApiError, ApiResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

static QUERY_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("query id pattern is valid")
});

/// Parser for the operator graph
pub struct GraphParser;

impl GraphParser {
    /// Reject identifiers that are not UUID-shaped
    pub fn validate_query_id(query_id: &str) -> ApiResult<()> {
        if QUERY_ID_REGEX.is_match(query_id) {
            Ok(())
        } else {
            Err(ApiError::invalid_query_id(query_id))
        }
    }

    /// Parse raw JSON rows into an ordered operator graph
    pub fn parse(query_id: &str, rows: &[Value]) -> ApiResult<OperatorGraph> {
        Self::validate_query_id(query_id)?;
        if rows.is_empty() {
            return Err(ApiError::not_found(query_id));
        }

        let raw_rows = rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                serde_json::from_value::<RawOperatorRow>(row.clone()).map_err(|e| {
                    ApiError::internal_with_details(
                        format!("Malformed operator row at index {}", index),
                        e.to_string(),
                    )
                })
            })
            .collect::<ApiResult<Vec<_>>>()?;

        Self::parse_rows(query_id, raw_rows)
    }

    /// Parse already-decoded rows into an ordered operator graph
    pub fn parse_rows(query_id: &str, rows: Vec<RawOperatorRow>) -> ApiResult<OperatorGraph> {
        Self::validate_query_id(query_id)?;
        if rows.is_empty() {
            return Err(ApiError::not_found(query_id));
        }

        let mut warnings = Vec::new();
        let mut operators = Vec::with_capacity(rows.len());
        for (index, row) in rows.into_iter().enumerate() {
            operators.push(Self::build_operator(index, row, &mut warnings)?);
        }

        let mut graph = OperatorGraph { operators, warnings };
        let topology_warnings = Self::validate(&graph);
        graph.warnings.extend(topology_warnings);

        for warning in &graph.warnings {
            tracing::warn!("Query {}: {}", query_id, warning);
        }
        tracing::debug!(
            "Parsed {} operators for query {} ({} warnings)",
            graph.operators.len(),
            query_id,
            graph.warnings.len()
        );

        Ok(graph)
    }

    fn build_operator(
        index: usize,
        row: RawOperatorRow,
        warnings: &mut Vec<String>,
    ) -> ApiResult<Operator> {
        let id = u64::try_from(row.operator_id).map_err(|_| {
            ApiError::internal_with_details(
                format!("Malformed operator row at index {}", index),
                format!("negative operator_id {}", row.operator_id),
            )
        })?;

        let parent_ids = ValueParser::parse_parent_ids(row.parent_operators.as_ref());
        let had_parent_field = row.parent_operators.as_ref().is_some_and(|v| !v.is_null());
        if parent_ids.is_none() && had_parent_field {
            warnings.push(format!("operator {} has an unparseable parent reference", id));
        }

        Ok(Operator {
            id,
            operator_type: OperatorType::from_name(row.operator_type.trim()),
            parent_ids,
            statistics: ValueParser::normalize_blob(
                row.operator_statistics.as_ref(),
                "operator_statistics",
            ),
            time_breakdown: ValueParser::normalize_blob(
                row.execution_time_breakdown.as_ref(),
                "execution_time_breakdown",
            ),
            attributes: ValueParser::normalize_blob(
                row.operator_attributes.as_ref(),
                "operator_attributes",
            ),
        })
    }

    /// Check topology in flat passes; never recurses, so cycles are harmless
    pub fn validate(graph: &OperatorGraph) -> Vec<String> {
        let mut warnings = Vec::new();
        let mut seen = HashSet::new();
        for op in &graph.operators {
            if !seen.insert(op.id) {
                warnings.push(format!("duplicate operator id {}", op.id));
            }
        }

        for op in &graph.operators {
            let Some(parents) = &op.parent_ids else { continue };
            for parent in parents {
                if *parent == op.id {
                    warnings.push(format!("operator {} references itself as parent", op.id));
                } else if !seen.contains(parent) {
                    warnings.push(format!(
                        "operator {} references missing parent {}",
                        op.id, parent
                    ));
                }
            }
        }

        let roots = Self::root_ids(graph);
        match roots.len() {
            0 => warnings.push("no parent-less operator found".to_string()),
            1 => {}
            n => warnings.push(format!(
                "{} parent-less operators found: {:?}",
                n, roots
            )),
        }

        warnings
    }

    /// Operators without parents, in row order
    pub fn root_ids(graph: &OperatorGraph) -> Vec<u64> {
        graph.operators.iter().filter(|op| op.is_root()).map(|op| op.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ErrorKind;
    use serde_json::json;

    const QUERY_ID: &str = "01b2c3d4-0000-1111-2222-333344445555";

    #[test]
    fn test_validate_query_id() {
        assert!(GraphParser::validate_query_id(QUERY_ID).is_ok());
        assert!(GraphParser::validate_query_id("01B2C3D4-0000-1111-2222-33334444AAAA").is_ok());
        assert!(GraphParser::validate_query_id("not-a-uuid").is_err());
        assert!(GraphParser::validate_query_id("01b2c3d400001111222233334444555").is_err());
        assert!(GraphParser::validate_query_id(" 01b2c3d4-0000-1111-2222-333344445555").is_err());
    }

    #[test]
    fn test_invalid_id_is_checked_before_rows() {
        let err = GraphParser::parse("bogus", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_empty_rows_is_not_found() {
        let err = GraphParser::parse(QUERY_ID, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_parse_preserves_row_order_and_edges() {
        let rows = vec![
            json!({"operator_id": 0, "operator_type": "Result", "parent_operators": null}),
            json!({"operator_id": 1, "operator_type": "Join", "parent_operators": [0]}),
            json!({"operator_id": 2, "operator_type": "TableScan", "parent_operators": "[1]"}),
            json!({"OPERATOR_ID": 3, "OPERATOR_TYPE": "TableScan", "PARENT_OPERATORS": "[1]"}),
        ];

        let graph = GraphParser::parse(QUERY_ID, &rows).unwrap();
        let ids: Vec<u64> = graph.operators.iter().map(|op| op.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(graph.operators[1].operator_type, OperatorType::Join);
        assert!(graph.operators[0].is_root());
        assert!(graph.warnings.is_empty());
        assert_eq!(graph.operators[3].parent_ids, Some(std::collections::BTreeSet::from([1])));
    }

    #[test]
    fn test_unparseable_parents_become_absent_with_warning() {
        let rows = vec![
            json!({"operator_id": 0, "operator_type": "Result"}),
            json!({"operator_id": 1, "operator_type": "Filter", "parent_operators": "[0, oops]"}),
        ];

        let graph = GraphParser::parse(QUERY_ID, &rows).unwrap();
        assert!(graph.operators[1].parent_ids.is_none());
        assert!(graph.warnings.iter().any(|w| w.contains("unparseable parent")));
        assert!(graph.warnings.iter().any(|w| w.contains("2 parent-less operators")));
    }

    #[test]
    fn test_tolerates_dangling_and_cyclic_edges() {
        let rows = vec![
            json!({"operator_id": 0, "operator_type": "Result"}),
            json!({"operator_id": 1, "operator_type": "Filter", "parent_operators": [2]}),
            json!({"operator_id": 2, "operator_type": "Filter", "parent_operators": [1, 9]}),
        ];

        let graph = GraphParser::parse(QUERY_ID, &rows).unwrap();
        assert_eq!(graph.operators.len(), 3);
        assert!(graph.warnings.iter().any(|w| w.contains("missing parent 9")));
    }

    #[test]
    fn test_structural_faults_are_internal_errors() {
        let missing_id = vec![json!({"operator_type": "Result"})];
        let err = GraphParser::parse(QUERY_ID, &missing_id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("index 0"));

        let negative_id = vec![json!({"operator_id": -1, "operator_type": "Result"})];
        let err = GraphParser::parse(QUERY_ID, &negative_id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.details().unwrap().contains("negative"));
    }
}
