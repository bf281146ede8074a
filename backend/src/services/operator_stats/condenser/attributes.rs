//! Per-kind attribute extraction
//!
//! Each operator kind has a fixed set of attributes worth keeping. Extractors
//! are registered by kind; kinds without an extractor contribute nothing.

use crate::services::operator_stats::condenser::format::truncate_expression;
use crate::services::operator_stats::models::constants::limits::*;
use crate::services::operator_stats::models::{AttributeValue, OperatorType};
use crate::services::operator_stats::parser::ValueParser;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

pub type Attributes = BTreeMap<String, AttributeValue>;

/// Trait for attribute extractors
pub trait AttributeExtractor: Send + Sync {
    /// Operator kinds this extractor is registered for
    fn kinds(&self) -> &'static [OperatorType];

    /// Pull the bounded attributes out of a normalized attribute blob
    fn extract(&self, attributes: &Value) -> Attributes;
}

// ============================================================================
// Helpers
// ============================================================================

fn put_text(out: &mut Attributes, key: &str, value: Option<String>) {
    if let Some(value) = value {
        out.insert(key.to_string(), AttributeValue::Text(value));
    }
}

fn put_count(out: &mut Attributes, key: &str, value: Option<u64>) {
    if let Some(value) = value {
        out.insert(key.to_string(), AttributeValue::Count(value));
    }
}

/// Join the first `limit` entries of a list attribute
fn joined_list(attributes: &Value, key: &str, limit: usize) -> Option<String> {
    let items = ValueParser::str_list_at(attributes, &[key])?;
    if items.is_empty() {
        return None;
    }
    Some(items.into_iter().take(limit).collect::<Vec<_>>().join(", "))
}

fn truncated(attributes: &Value, key: &str, limit: usize) -> Option<String> {
    ValueParser::str_at(attributes, &[key]).map(|s| truncate_expression(&s, limit))
}

// ============================================================================
// Extractors
// ============================================================================

/// TableScan: table name and number of columns read
pub struct TableScanExtractor;

impl AttributeExtractor for TableScanExtractor {
    fn kinds(&self) -> &'static [OperatorType] {
        &[OperatorType::TableScan]
    }

    fn extract(&self, attributes: &Value) -> Attributes {
        let mut out = Attributes::new();
        put_text(&mut out, "table_name", ValueParser::str_at(attributes, &["table_name"]));
        put_count(
            &mut out,
            "columns",
            ValueParser::len_at(attributes, &["columns"]).map(|n| n as u64),
        );
        out
    }
}

/// Join family: equality condition
pub struct JoinExtractor;

impl AttributeExtractor for JoinExtractor {
    fn kinds(&self) -> &'static [OperatorType] {
        &[OperatorType::Join, OperatorType::CartesianJoin]
    }

    fn extract(&self, attributes: &Value) -> Attributes {
        let mut out = Attributes::new();
        put_text(
            &mut out,
            "join_condition",
            truncated(attributes, "equality_join_condition", JOIN_CONDITION_MAX_CHARS),
        );
        out
    }
}

pub struct FilterExtractor;

impl AttributeExtractor for FilterExtractor {
    fn kinds(&self) -> &'static [OperatorType] {
        &[OperatorType::Filter]
    }

    fn extract(&self, attributes: &Value) -> Attributes {
        let mut out = Attributes::new();
        put_text(
            &mut out,
            "filter_condition",
            truncated(attributes, "filter_condition", FILTER_CONDITION_MAX_CHARS),
        );
        out
    }
}

/// Aggregate and GroupingSets: leading functions and grouping keys
pub struct AggregateExtractor;

impl AttributeExtractor for AggregateExtractor {
    fn kinds(&self) -> &'static [OperatorType] {
        &[OperatorType::Aggregate, OperatorType::GroupingSets]
    }

    fn extract(&self, attributes: &Value) -> Attributes {
        let mut out = Attributes::new();
        put_text(
            &mut out,
            "functions",
            joined_list(attributes, "functions", MAX_AGGREGATE_FUNCTIONS),
        );
        let keys = joined_list(attributes, "grouping_keys", MAX_GROUPING_KEYS)
            .or_else(|| joined_list(attributes, "key_sets", MAX_GROUPING_KEYS));
        put_text(&mut out, "grouping_keys", keys);
        out
    }
}

/// Sort and SortWithLimit: leading sort keys and row limit
pub struct SortExtractor;

impl AttributeExtractor for SortExtractor {
    fn kinds(&self) -> &'static [OperatorType] {
        &[OperatorType::Sort, OperatorType::SortWithLimit]
    }

    fn extract(&self, attributes: &Value) -> Attributes {
        let mut out = Attributes::new();
        put_text(&mut out, "sort_keys", joined_list(attributes, "sort_keys", MAX_SORT_KEYS));
        put_count(&mut out, "limit", ValueParser::u64_at(attributes, &["rows"]));
        out
    }
}

/// CreateTableAsSelect: target table and its input expressions
pub struct CreateTableAsSelectExtractor;

impl AttributeExtractor for CreateTableAsSelectExtractor {
    fn kinds(&self) -> &'static [OperatorType] {
        &[OperatorType::CreateTableAsSelect]
    }

    fn extract(&self, attributes: &Value) -> Attributes {
        let mut out = Attributes::new();
        put_text(&mut out, "target_table", ValueParser::str_at(attributes, &["table_name"]));

        if let Some(expressions) = ValueParser::str_list_at(attributes, &["input_expressions"]) {
            put_count(&mut out, "expression_count", Some(expressions.len() as u64));
            put_text(
                &mut out,
                "first_expression",
                expressions
                    .first()
                    .map(|e| truncate_expression(e, EXPRESSION_MAX_CHARS)),
            );
        }
        out
    }
}

/// Insert/Update/Delete/Merge: target table
pub struct DmlTargetExtractor;

impl AttributeExtractor for DmlTargetExtractor {
    fn kinds(&self) -> &'static [OperatorType] {
        &[
            OperatorType::Insert,
            OperatorType::Update,
            OperatorType::Delete,
            OperatorType::Merge,
        ]
    }

    fn extract(&self, attributes: &Value) -> Attributes {
        let mut out = Attributes::new();
        // Multi-table inserts report `table_names`
        let target = ValueParser::str_at(attributes, &["table_name"]).or_else(|| {
            ValueParser::str_list_at(attributes, &["table_names"])
                .and_then(|names| (!names.is_empty()).then(|| names.join(", ")))
        });
        put_text(&mut out, "target_table", target);
        out
    }
}

pub struct ResultExtractor;

impl AttributeExtractor for ResultExtractor {
    fn kinds(&self) -> &'static [OperatorType] {
        &[OperatorType::Result]
    }

    fn extract(&self, attributes: &Value) -> Attributes {
        let mut out = Attributes::new();
        put_count(
            &mut out,
            "output_columns",
            ValueParser::len_at(attributes, &["expressions"]).map(|n| n as u64),
        );
        out
    }
}

pub struct WindowFunctionExtractor;

impl AttributeExtractor for WindowFunctionExtractor {
    fn kinds(&self) -> &'static [OperatorType] {
        &[OperatorType::WindowFunction]
    }

    fn extract(&self, attributes: &Value) -> Attributes {
        let mut out = Attributes::new();
        put_text(
            &mut out,
            "window_functions",
            joined_list(attributes, "functions", MAX_WINDOW_FUNCTIONS),
        );
        out
    }
}

pub struct FlattenExtractor;

impl AttributeExtractor for FlattenExtractor {
    fn kinds(&self) -> &'static [OperatorType] {
        &[OperatorType::Flatten]
    }

    fn extract(&self, attributes: &Value) -> Attributes {
        let mut out = Attributes::new();
        put_text(&mut out, "input", truncated(attributes, "input", FLATTEN_INPUT_MAX_CHARS));
        out
    }
}

pub struct LimitExtractor;

impl AttributeExtractor for LimitExtractor {
    fn kinds(&self) -> &'static [OperatorType] {
        &[OperatorType::Limit]
    }

    fn extract(&self, attributes: &Value) -> Attributes {
        let mut out = Attributes::new();
        put_count(&mut out, "limit", ValueParser::u64_at(attributes, &["rows"]));
        put_count(&mut out, "offset", ValueParser::u64_at(attributes, &["offset"]));
        out
    }
}

/// Kinds whose only useful attribute is a single name-like field
pub struct NamedSourceExtractor;

impl AttributeExtractor for NamedSourceExtractor {
    fn kinds(&self) -> &'static [OperatorType] {
        &[
            OperatorType::ExternalScan,
            OperatorType::Unload,
            OperatorType::WithClause,
            OperatorType::WithReference,
            OperatorType::ExternalFunction,
        ]
    }

    fn extract(&self, attributes: &Value) -> Attributes {
        let mut out = Attributes::new();
        put_text(&mut out, "stage_name", ValueParser::str_at(attributes, &["stage_name"]));
        put_text(&mut out, "location", ValueParser::str_at(attributes, &["location"]));
        put_text(&mut out, "name", ValueParser::str_at(attributes, &["name"]));
        put_text(&mut out, "function_name", ValueParser::str_at(attributes, &["function_name"]));
        out
    }
}

// ============================================================================
// Extractor Registry
// ============================================================================

/// Get all registered extractors
pub fn get_all_extractors() -> Vec<Box<dyn AttributeExtractor>> {
    vec![
        Box::new(TableScanExtractor),
        Box::new(JoinExtractor),
        Box::new(FilterExtractor),
        Box::new(AggregateExtractor),
        Box::new(SortExtractor),
        Box::new(CreateTableAsSelectExtractor),
        Box::new(DmlTargetExtractor),
        Box::new(ResultExtractor),
        Box::new(WindowFunctionExtractor),
        Box::new(FlattenExtractor),
        Box::new(LimitExtractor),
        Box::new(NamedSourceExtractor),
    ]
}

/// Kind -> extractor lookup
pub struct AttributeRegistry {
    extractors: Vec<Box<dyn AttributeExtractor>>,
    by_kind: HashMap<OperatorType, usize>,
}

impl AttributeRegistry {
    pub fn new() -> Self {
        Self::with_extractors(get_all_extractors())
    }

    fn with_extractors(extractors: Vec<Box<dyn AttributeExtractor>>) -> Self {
        let mut by_kind = HashMap::new();
        for (index, extractor) in extractors.iter().enumerate() {
            for kind in extractor.kinds() {
                if by_kind.insert(kind.clone(), index).is_some() {
                    tracing::warn!("Attribute extractor for {} registered twice", kind);
                }
            }
        }
        Self { extractors, by_kind }
    }

    /// Extract attributes for `kind`; unregistered kinds yield nothing
    pub fn extract(&self, kind: &OperatorType, attributes: &Value) -> Attributes {
        match self.by_kind.get(kind) {
            Some(index) => self.extractors[*index].extract(attributes),
            None => Attributes::new(),
        }
    }

    pub fn is_registered(&self, kind: &OperatorType) -> bool {
        self.by_kind.contains_key(kind)
    }
}

impl Default for AttributeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared registry; extractors are stateless
pub static ATTRIBUTE_REGISTRY: Lazy<AttributeRegistry> = Lazy::new(AttributeRegistry::new);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(value: &str) -> AttributeValue {
        AttributeValue::Text(value.to_string())
    }

    #[test]
    fn test_table_scan_attributes() {
        let attrs = ATTRIBUTE_REGISTRY.extract(
            &OperatorType::TableScan,
            &json!({"table_name": "SALES.PUBLIC.ORDERS", "columns": ["A", "B", "C"]}),
        );
        assert_eq!(attrs["table_name"], text("SALES.PUBLIC.ORDERS"));
        assert_eq!(attrs["columns"], AttributeValue::Count(3));
    }

    #[test]
    fn test_join_condition_truncated_to_100() {
        let condition = format!("(O.ID = L.ORDER_ID) AND {}", "X".repeat(200));
        let attrs = ATTRIBUTE_REGISTRY.extract(
            &OperatorType::Join,
            &json!({"equality_join_condition": condition, "join_type": "INNER"}),
        );
        match &attrs["join_condition"] {
            AttributeValue::Text(s) => {
                assert!(s.starts_with("(O.ID = L.ORDER_ID)"));
                assert!(s.contains("...[truncated]..."));
                assert_eq!(s.chars().count(), 97);
            }
            other => panic!("unexpected attribute {:?}", other),
        }
        assert_eq!(attrs.len(), 1);
    }

    #[test]
    fn test_cartesian_join_without_condition_yields_nothing() {
        let attrs = ATTRIBUTE_REGISTRY.extract(&OperatorType::CartesianJoin, &json!({}));
        assert!(attrs.is_empty());
    }

    #[test]
    fn test_aggregate_limits_functions_and_keys() {
        let attrs = ATTRIBUTE_REGISTRY.extract(
            &OperatorType::Aggregate,
            &json!({
                "functions": ["sum(a)", "sum(b)", "sum(c)", "sum(d)", "sum(e)", "sum(f)"],
                "grouping_keys": ["k1", "k2", "k3", "k4"]
            }),
        );
        assert_eq!(attrs["functions"], text("sum(a), sum(b), sum(c), sum(d), sum(e)"));
        assert_eq!(attrs["grouping_keys"], text("k1, k2, k3"));
    }

    #[test]
    fn test_grouping_sets_reads_key_sets() {
        let attrs = ATTRIBUTE_REGISTRY.extract(
            &OperatorType::GroupingSets,
            &json!({"functions": ["count(*)"], "key_sets": ["(a)", "(a, b)"]}),
        );
        assert_eq!(attrs["grouping_keys"], text("(a), (a, b)"));
    }

    #[test]
    fn test_sort_with_limit() {
        let attrs = ATTRIBUTE_REGISTRY.extract(
            &OperatorType::SortWithLimit,
            &json!({"sort_keys": ["a ASC", "b DESC", "c ASC", "d ASC"], "rows": 10, "offset": 0}),
        );
        assert_eq!(attrs["sort_keys"], text("a ASC, b DESC, c ASC"));
        assert_eq!(attrs["limit"], AttributeValue::Count(10));
    }

    #[test]
    fn test_ctas_attributes() {
        let first = "CAST(".to_string() + &"Y".repeat(300) + ")";
        let attrs = ATTRIBUTE_REGISTRY.extract(
            &OperatorType::CreateTableAsSelect,
            &json!({"table_name": "DB.S.T", "input_expressions": [first, "B"]}),
        );
        assert_eq!(attrs["target_table"], text("DB.S.T"));
        assert_eq!(attrs["expression_count"], AttributeValue::Count(2));
        match &attrs["first_expression"] {
            AttributeValue::Text(s) => assert_eq!(s.chars().count(), 65 + 65 + 17),
            other => panic!("unexpected attribute {:?}", other),
        }
    }

    #[test]
    fn test_dml_targets() {
        for kind in [OperatorType::Update, OperatorType::Delete, OperatorType::Merge] {
            let attrs = ATTRIBUTE_REGISTRY.extract(&kind, &json!({"table_name": "T"}));
            assert_eq!(attrs["target_table"], text("T"));
        }
        let attrs = ATTRIBUTE_REGISTRY
            .extract(&OperatorType::Insert, &json!({"table_names": ["T1", "T2"]}));
        assert_eq!(attrs["target_table"], text("T1, T2"));
    }

    #[test]
    fn test_result_column_count() {
        let attrs = ATTRIBUTE_REGISTRY
            .extract(&OperatorType::Result, &json!({"expressions": ["A", "B", "SUM(C)"]}));
        assert_eq!(attrs["output_columns"], AttributeValue::Count(3));
    }

    #[test]
    fn test_unknown_kind_yields_nothing() {
        let kind = OperatorType::Unknown("Telepathy".to_string());
        assert!(!ATTRIBUTE_REGISTRY.is_registered(&kind));
        assert!(ATTRIBUTE_REGISTRY.extract(&kind, &json!({"table_name": "T"})).is_empty());
    }

    #[test]
    fn test_malformed_fields_are_skipped() {
        let attrs = ATTRIBUTE_REGISTRY.extract(
            &OperatorType::TableScan,
            &json!({"table_name": {"nested": true}, "columns": "A,B"}),
        );
        assert!(attrs.is_empty());
    }

    #[test]
    fn test_each_known_kind_registered_once() {
        let registry = AttributeRegistry::new();
        for extractor in get_all_extractors() {
            for kind in extractor.kinds() {
                assert!(registry.is_registered(kind));
            }
        }
    }
}
