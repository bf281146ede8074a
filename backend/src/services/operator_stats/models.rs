//! Operator statistics data models
//!
//! These models represent the raw profiler rows, the typed operator graph built
//! from them, and the condensed diagnostic summary produced for API responses.
//! Everything here is built once per analysis and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Raw Input
// ============================================================================

/// One row as returned by the profiler's operator statistics table function.
///
/// Nested columns are VARIANT-typed upstream, so each of them may arrive as a
/// native JSON value or as a JSON document encoded in a string.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOperatorRow {
    #[serde(alias = "OPERATOR_ID")]
    pub operator_id: i64,
    #[serde(alias = "OPERATOR_TYPE")]
    pub operator_type: String,
    #[serde(default, alias = "PARENT_OPERATORS")]
    pub parent_operators: Option<serde_json::Value>,
    #[serde(default, alias = "OPERATOR_STATISTICS")]
    pub operator_statistics: Option<serde_json::Value>,
    #[serde(default, alias = "EXECUTION_TIME_BREAKDOWN")]
    pub execution_time_breakdown: Option<serde_json::Value>,
    #[serde(default, alias = "OPERATOR_ATTRIBUTES")]
    pub operator_attributes: Option<serde_json::Value>,
}

// ============================================================================
// Operator Graph
// ============================================================================

/// Operator kind classification
///
/// Closed set of the kinds the condenser knows how to read attributes for.
/// Anything else is kept verbatim in `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperatorType {
    Aggregate,
    CartesianJoin,
    CreateTableAsSelect,
    Delete,
    ExternalFunction,
    ExternalScan,
    Filter,
    Flatten,
    Generator,
    GroupingSets,
    Insert,
    InternalObject,
    Join,
    JoinFilter,
    Limit,
    Merge,
    Pivot,
    Result,
    Sort,
    SortWithLimit,
    TableScan,
    UnionAll,
    Unload,
    Unpivot,
    Update,
    ValuesClause,
    WindowFunction,
    WithClause,
    WithReference,
    Unknown(String),
}

impl OperatorType {
    /// All known kinds, used for name lookup
    pub const KNOWN: &'static [OperatorType] = &[
        OperatorType::Aggregate,
        OperatorType::CartesianJoin,
        OperatorType::CreateTableAsSelect,
        OperatorType::Delete,
        OperatorType::ExternalFunction,
        OperatorType::ExternalScan,
        OperatorType::Filter,
        OperatorType::Flatten,
        OperatorType::Generator,
        OperatorType::GroupingSets,
        OperatorType::Insert,
        OperatorType::InternalObject,
        OperatorType::Join,
        OperatorType::JoinFilter,
        OperatorType::Limit,
        OperatorType::Merge,
        OperatorType::Pivot,
        OperatorType::Result,
        OperatorType::Sort,
        OperatorType::SortWithLimit,
        OperatorType::TableScan,
        OperatorType::UnionAll,
        OperatorType::Unload,
        OperatorType::Unpivot,
        OperatorType::Update,
        OperatorType::ValuesClause,
        OperatorType::WindowFunction,
        OperatorType::WithClause,
        OperatorType::WithReference,
    ];

    /// Map the profiler's type name to a kind (exact, case-sensitive match)
    pub fn from_name(name: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|kind| kind.as_str() == name)
            .cloned()
            .unwrap_or_else(|| OperatorType::Unknown(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            OperatorType::Aggregate => "Aggregate",
            OperatorType::CartesianJoin => "CartesianJoin",
            OperatorType::CreateTableAsSelect => "CreateTableAsSelect",
            OperatorType::Delete => "Delete",
            OperatorType::ExternalFunction => "ExternalFunction",
            OperatorType::ExternalScan => "ExternalScan",
            OperatorType::Filter => "Filter",
            OperatorType::Flatten => "Flatten",
            OperatorType::Generator => "Generator",
            OperatorType::GroupingSets => "GroupingSets",
            OperatorType::Insert => "Insert",
            OperatorType::InternalObject => "InternalObject",
            OperatorType::Join => "Join",
            OperatorType::JoinFilter => "JoinFilter",
            OperatorType::Limit => "Limit",
            OperatorType::Merge => "Merge",
            OperatorType::Pivot => "Pivot",
            OperatorType::Result => "Result",
            OperatorType::Sort => "Sort",
            OperatorType::SortWithLimit => "SortWithLimit",
            OperatorType::TableScan => "TableScan",
            OperatorType::UnionAll => "UnionAll",
            OperatorType::Unload => "Unload",
            OperatorType::Unpivot => "Unpivot",
            OperatorType::Update => "Update",
            OperatorType::ValuesClause => "ValuesClause",
            OperatorType::WindowFunction => "WindowFunction",
            OperatorType::WithClause => "WithClause",
            OperatorType::WithReference => "WithReference",
            OperatorType::Unknown(name) => name,
        }
    }

    /// Join family used for row-multiplication checks
    pub fn is_join(&self) -> bool {
        matches!(self, OperatorType::Join | OperatorType::CartesianJoin)
    }
}

impl std::fmt::Display for OperatorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OperatorType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OperatorType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(OperatorType::from_name(&name))
    }
}

/// A validated operator node
///
/// Nested blobs are already normalized to JSON values; a blob that could not
/// be decoded is `None`.
#[derive(Debug, Clone)]
pub struct Operator {
    pub id: u64,
    pub operator_type: OperatorType,
    pub parent_ids: Option<BTreeSet<u64>>,
    pub statistics: Option<serde_json::Value>,
    pub time_breakdown: Option<serde_json::Value>,
    pub attributes: Option<serde_json::Value>,
}

impl Operator {
    pub fn is_root(&self) -> bool {
        self.parent_ids.as_ref().is_none_or(|parents| parents.is_empty())
    }
}

/// Operator paired with its typed statistics, parsed once per analysis
#[derive(Debug, Clone)]
pub struct ParsedOperator<'a> {
    pub operator: &'a Operator,
    pub statistics: OperatorStatistics,
    pub time_breakdown: Option<TimeBreakdown>,
}

/// Ordered operator set plus the non-fatal findings collected while building it
#[derive(Debug, Clone, Default)]
pub struct OperatorGraph {
    pub operators: Vec<Operator>,
    pub warnings: Vec<String>,
}

// ============================================================================
// Typed Statistics
// ============================================================================

/// Execution time breakdown of one operator
///
/// `overall_percentage` is the share of total query time; the categories
/// split that share by activity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeBreakdown {
    pub overall_percentage: Option<f64>,
    pub processing: Option<f64>,
    pub synchronization: Option<f64>,
    pub local_disk_io: Option<f64>,
    pub remote_disk_io: Option<f64>,
    pub network_communication: Option<f64>,
    pub other: Option<f64>,
}

/// Typed view over `operator_statistics`
///
/// Every field is optional: profilers only report what applies to the kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperatorStatistics {
    pub input_rows: Option<u64>,
    pub output_rows: Option<u64>,
    pub io: IoStatistics,
    pub pruning: PruningStatistics,
    pub spilling: SpillStatistics,
    pub dml: DmlStatistics,
    pub network_bytes: Option<u64>,
    pub external_functions: Option<ExternalFunctionStatistics>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IoStatistics {
    pub bytes_scanned: Option<u64>,
    pub external_bytes_scanned: Option<u64>,
    pub bytes_written: Option<u64>,
    pub bytes_written_to_result: Option<u64>,
    pub percentage_scanned_from_cache: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PruningStatistics {
    pub partitions_scanned: Option<u64>,
    pub partitions_total: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpillStatistics {
    pub bytes_spilled_local_storage: Option<u64>,
    pub bytes_spilled_remote_storage: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DmlStatistics {
    pub number_of_rows_inserted: Option<u64>,
    pub number_of_rows_updated: Option<u64>,
    pub number_of_rows_deleted: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalFunctionStatistics {
    pub total_invocations: Option<u64>,
    pub http_4xx_errors: Option<u64>,
    pub http_5xx_errors: Option<u64>,
    pub average_latency_ms: Option<f64>,
}

impl OperatorStatistics {
    pub fn bytes_scanned_total(&self) -> u64 {
        self.io.bytes_scanned.unwrap_or(0).saturating_add(self.io.external_bytes_scanned.unwrap_or(0))
    }

    pub fn bytes_written_total(&self) -> u64 {
        self.io.bytes_written.unwrap_or(0).saturating_add(self.io.bytes_written_to_result.unwrap_or(0))
    }

    pub fn spilled_local(&self) -> u64 {
        self.spilling.bytes_spilled_local_storage.unwrap_or(0)
    }

    pub fn spilled_remote(&self) -> u64 {
        self.spilling.bytes_spilled_remote_storage.unwrap_or(0)
    }

    pub fn dml_rows(&self) -> u64 {
        self.dml
            .number_of_rows_inserted
            .unwrap_or(0)
            .saturating_add(self.dml.number_of_rows_updated.unwrap_or(0))
            .saturating_add(self.dml.number_of_rows_deleted.unwrap_or(0))
    }

    /// Share of partitions skipped, rounded to one decimal
    pub fn pruning_efficiency(&self) -> Option<f64> {
        let total = self.pruning.partitions_total.filter(|t| *t > 0)?;
        let scanned = self.pruning.partitions_scanned.unwrap_or(0);
        let efficiency = (1.0 - scanned as f64 / total as f64) * 100.0;
        Some(round_to(efficiency, 1))
    }
}

// ============================================================================
// Condensed Output
// ============================================================================

/// Bounded attribute value kept on a condensed operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Count(u64),
    Text(String),
}

/// Size-bounded, field-selected representation of one operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CondensedOperator {
    pub id: u64,
    #[serde(rename = "type")]
    pub operator_type: OperatorType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_ids: Option<Vec<u64>>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub execution_percentage: Option<f64>,
    /// Largest time category rendered as `name:value%`
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub primary_time_category: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub input_rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output_rows: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub bytes_scanned: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub bytes_written: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub network_bytes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cache_hit_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pruning_efficiency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub bytes_spilled: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dml_rows_affected: Option<u64>,

    #[serde(flatten)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl CondensedOperator {
    pub fn new(id: u64, operator_type: OperatorType) -> Self {
        Self {
            id,
            operator_type,
            parent_ids: None,
            execution_percentage: None,
            primary_time_category: None,
            input_rows: None,
            output_rows: None,
            bytes_scanned: None,
            bytes_written: None,
            network_bytes: None,
            cache_hit_percentage: None,
            pruning_efficiency: None,
            bytes_spilled: None,
            dml_rows_affected: None,
            attributes: BTreeMap::new(),
        }
    }
}

// ============================================================================
// Analysis Results
// ============================================================================

/// A detected performance issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum PerformanceIssue {
    HighExecutionTime {
        operator_id: u64,
        operator_type: OperatorType,
        percentage: f64,
    },
    ExplodingJoin {
        operator_id: u64,
        operator_type: OperatorType,
        input_rows: u64,
        output_rows: u64,
        factor: f64,
    },
    Spilling {
        operator_id: u64,
        operator_type: OperatorType,
        local_bytes: u64,
        remote_bytes: u64,
        total_bytes: u64,
    },
}

/// Statement kind resolved from the operator set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueryType {
    #[default]
    #[serde(rename = "SELECT")]
    Select,
    #[serde(rename = "CREATE TABLE AS SELECT")]
    CreateTableAsSelect,
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "MERGE")]
    Merge,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Select => "SELECT",
            QueryType::CreateTableAsSelect => "CREATE TABLE AS SELECT",
            QueryType::Insert => "INSERT",
            QueryType::Update => "UPDATE",
            QueryType::Delete => "DELETE",
            QueryType::Merge => "MERGE",
        }
    }
}

/// Top time-consuming operator for quick performance overview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopOperator {
    pub rank: u32,
    pub operator_id: u64,
    pub operator_type: OperatorType,
    pub execution_percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueCounts {
    pub high_execution_time: usize,
    pub exploding_joins: usize,
    pub spilling: usize,
}

/// Whole-query reduction over every operator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub query_type: QueryType,
    pub operator_count: usize,

    pub total_bytes_scanned: u64,
    pub total_bytes_scanned_display: String,
    pub total_bytes_written: u64,
    pub total_bytes_written_display: String,
    pub total_bytes_spilled: u64,
    pub total_bytes_spilled_display: String,

    /// Rows delivered to the client, read from the Result operator's input
    pub final_output_rows: u64,
    pub dml_rows_affected: u64,

    pub average_cache_hit_rate: f64,
    pub cache_hit_samples: usize,
    pub average_pruning_efficiency: f64,
    pub pruning_samples: usize,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub peak_execution_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub peak_join_factor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub external_function_latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub external_function_success_rate: Option<f64>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub top_operators: Vec<TopOperator>,

    pub issue_counts: IssueCounts,
    /// Issue collections. The payload moves these into its own `issues`
    /// entries, so a rendered summary carries only `issue_counts`.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub high_execution_time_operators: Vec<PerformanceIssue>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub exploding_joins: Vec<PerformanceIssue>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub spilling_operators: Vec<PerformanceIssue>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub graph_warnings: Vec<String>,
}

impl SummaryMetrics {
    pub fn has_issues(&self) -> bool {
        !(self.high_execution_time_operators.is_empty()
            && self.exploding_joins.is_empty()
            && self.spilling_operators.is_empty())
    }

    /// Largest spill recorded on a single operator
    pub fn largest_spill_bytes(&self) -> u64 {
        self.spilling_operators
            .iter()
            .filter_map(|issue| match issue {
                PerformanceIssue::Spilling { total_bytes, .. } => Some(*total_bytes),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Local and remote spill totals across the query
    pub fn spill_split(&self) -> (u64, u64) {
        self.spilling_operators.iter().fold((0, 0), |(local, remote), issue| match issue {
            PerformanceIssue::Spilling { local_bytes, remote_bytes, .. } => {
                (local.saturating_add(*local_bytes), remote.saturating_add(*remote_bytes))
            }
            _ => (local, remote),
        })
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// ============================================================================
// Constants
// ============================================================================

pub mod constants {
    /// Limits applied while condensing operator attributes
    pub mod limits {
        pub const JOIN_CONDITION_MAX_CHARS: usize = 100;
        pub const FILTER_CONDITION_MAX_CHARS: usize = 150;
        pub const EXPRESSION_MAX_CHARS: usize = 150;
        pub const FLATTEN_INPUT_MAX_CHARS: usize = 100;
        pub const MAX_AGGREGATE_FUNCTIONS: usize = 5;
        pub const MAX_GROUPING_KEYS: usize = 3;
        pub const MAX_SORT_KEYS: usize = 3;
        pub const MAX_WINDOW_FUNCTIONS: usize = 3;
        pub const MAX_TOP_OPERATORS: usize = 5;
    }

    /// Detection thresholds used by the summary aggregator
    pub mod detection {
        /// Operators above this share of query time are flagged (> 15%)
        pub const HIGH_EXECUTION_TIME_PERCENTAGE: f64 = 15.0;
        /// Joins producing more than this many rows per input row are flagged
        pub const EXPLODING_JOIN_FACTOR: f64 = 10.0;
        /// Only operators above this share report their primary time category
        pub const TIME_CATEGORY_MIN_PERCENTAGE: f64 = 5.0;
    }
}
