//! Threshold classification
//!
//! Each metric family maps its value(s) to a four-band label through an
//! ordered rule table; the first rule that applies wins. Bands are recomputed
//! on every call and never stored.

use crate::services::operator_stats::models::SummaryMetrics;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PerformanceBand {
    Great,
    Good,
    Poor,
    Critical,
}

impl PerformanceBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceBand::Great => "GREAT",
            PerformanceBand::Good => "GOOD",
            PerformanceBand::Poor => "POOR",
            PerformanceBand::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for PerformanceBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a band table
pub struct BandRule<M> {
    pub band: PerformanceBand,
    pub applies: fn(&M) -> bool,
}

/// First matching rule wins; a value no rule covers is CRITICAL
pub fn evaluate<M>(rules: &[BandRule<M>], metric: &M) -> PerformanceBand {
    rules
        .iter()
        .find(|rule| (rule.applies)(metric))
        .map(|rule| rule.band)
        .unwrap_or(PerformanceBand::Critical)
}

// ============================================================================
// Band Boundaries
// ============================================================================

pub mod bounds {
    const MB: f64 = 1e6;
    const GB: f64 = 1e9;

    pub const EXECUTION_GREAT_BELOW: f64 = 5.0;
    /// Lower edge of the POOR execution band; kept apart from the
    /// high-execution-time detection threshold
    pub const EXECUTION_POOR_FROM: f64 = 15.0;
    pub const EXECUTION_CRITICAL_ABOVE: f64 = 30.0;

    pub const PRUNING_GREAT_FROM: f64 = 80.0;
    pub const PRUNING_GOOD_FROM: f64 = 60.0;
    pub const PRUNING_POOR_FROM: f64 = 30.0;

    pub const CACHE_GREAT_ABOVE: f64 = 90.0;
    pub const CACHE_GOOD_FROM: f64 = 70.0;
    pub const CACHE_POOR_FROM: f64 = 40.0;

    pub const JOIN_GREAT_BELOW: f64 = 1.2;
    pub const JOIN_POOR_FROM: f64 = 1.5;
    pub const JOIN_CRITICAL_ABOVE: f64 = 2.0;

    pub const IO_GREAT_BELOW: f64 = 100.0 * MB;
    pub const IO_POOR_FROM: f64 = GB;
    pub const IO_CRITICAL_ABOVE: f64 = 10.0 * GB;

    pub const SPILL_POOR_FROM: f64 = 100.0 * MB;
    pub const SPILL_CRITICAL_ABOVE: f64 = GB;

    pub const EXTERNAL_GREAT_BELOW_MS: f64 = 10.0;
    pub const EXTERNAL_GOOD_MAX_MS: f64 = 50.0;
    pub const EXTERNAL_POOR_MAX_MS: f64 = 200.0;
    pub const EXTERNAL_GOOD_SUCCESS_ABOVE: f64 = 95.0;
    pub const EXTERNAL_POOR_SUCCESS_FROM: f64 = 90.0;

    // Whole-query band
    pub const OVERALL_CRITICAL_SINGLE_SPILL: f64 = 100.0 * GB;
    pub const OVERALL_POOR_TOTAL_SPILL_FROM: f64 = 10.0 * GB;
    pub const OVERALL_POOR_CACHE_BELOW: f64 = 50.0;
}

use bounds::*;

// ============================================================================
// Family Metrics
// ============================================================================

/// Pruning and cache readings; a missing reading does not constrain the band
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScanMetrics {
    pub pruning_efficiency: Option<f64>,
    pub cache_hit_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IoMetrics {
    pub bytes_scanned: f64,
    pub cache_hit_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpillMetrics {
    pub local_bytes: f64,
    pub remote_bytes: f64,
}

impl SpillMetrics {
    fn total(&self) -> f64 {
        self.local_bytes + self.remote_bytes
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExternalFunctionMetrics {
    pub latency_ms: f64,
    pub success_rate: f64,
}

fn within(value: Option<f64>, from: f64, to: f64) -> bool {
    value.is_some_and(|v| v >= from && v < to)
}

fn within_inclusive(value: Option<f64>, from: f64, to: f64) -> bool {
    value.is_some_and(|v| v >= from && v <= to)
}

// ============================================================================
// Rule Tables
// ============================================================================

const EXECUTION_RULES: &[BandRule<f64>] = &[
    BandRule { band: PerformanceBand::Great, applies: |pct| *pct < EXECUTION_GREAT_BELOW },
    BandRule { band: PerformanceBand::Good, applies: |pct| *pct < EXECUTION_POOR_FROM },
    BandRule { band: PerformanceBand::Poor, applies: |pct| *pct <= EXECUTION_CRITICAL_ABOVE },
    BandRule { band: PerformanceBand::Critical, applies: |_| true },
];

const SCAN_RULES: &[BandRule<ScanMetrics>] = &[
    BandRule {
        band: PerformanceBand::Great,
        applies: |m| {
            m.pruning_efficiency.is_none_or(|p| p >= PRUNING_GREAT_FROM)
                && m.cache_hit_rate.is_none_or(|c| c > CACHE_GREAT_ABOVE)
        },
    },
    BandRule {
        band: PerformanceBand::Good,
        applies: |m| {
            within(m.pruning_efficiency, PRUNING_GOOD_FROM, PRUNING_GREAT_FROM)
                || within_inclusive(m.cache_hit_rate, CACHE_GOOD_FROM, CACHE_GREAT_ABOVE)
        },
    },
    BandRule {
        band: PerformanceBand::Poor,
        applies: |m| {
            within(m.pruning_efficiency, PRUNING_POOR_FROM, PRUNING_GOOD_FROM)
                || within(m.cache_hit_rate, CACHE_POOR_FROM, CACHE_GOOD_FROM)
        },
    },
    BandRule {
        band: PerformanceBand::Critical,
        applies: |m| {
            m.pruning_efficiency.is_some_and(|p| p < PRUNING_POOR_FROM)
                || m.cache_hit_rate.is_some_and(|c| c < CACHE_POOR_FROM)
        },
    },
];

const JOIN_RULES: &[BandRule<f64>] = &[
    BandRule { band: PerformanceBand::Great, applies: |f| *f < JOIN_GREAT_BELOW },
    BandRule { band: PerformanceBand::Good, applies: |f| *f < JOIN_POOR_FROM },
    BandRule { band: PerformanceBand::Poor, applies: |f| *f <= JOIN_CRITICAL_ABOVE },
    BandRule { band: PerformanceBand::Critical, applies: |_| true },
];

const IO_RULES: &[BandRule<IoMetrics>] = &[
    BandRule {
        band: PerformanceBand::Great,
        applies: |m| {
            m.bytes_scanned < IO_GREAT_BELOW
                && m.cache_hit_rate.is_none_or(|c| c > CACHE_GREAT_ABOVE)
        },
    },
    BandRule {
        band: PerformanceBand::Good,
        applies: |m| {
            within(Some(m.bytes_scanned), IO_GREAT_BELOW, IO_POOR_FROM)
                || within_inclusive(m.cache_hit_rate, CACHE_GOOD_FROM, CACHE_GREAT_ABOVE)
        },
    },
    BandRule {
        band: PerformanceBand::Poor,
        applies: |m| {
            within_inclusive(Some(m.bytes_scanned), IO_POOR_FROM, IO_CRITICAL_ABOVE)
                || within(m.cache_hit_rate, CACHE_POOR_FROM, CACHE_GOOD_FROM)
        },
    },
    BandRule {
        band: PerformanceBand::Critical,
        applies: |m| {
            m.bytes_scanned > IO_CRITICAL_ABOVE
                || m.cache_hit_rate.is_some_and(|c| c < CACHE_POOR_FROM)
        },
    },
];

const SPILL_RULES: &[BandRule<SpillMetrics>] = &[
    BandRule { band: PerformanceBand::Great, applies: |m| m.total() <= 0.0 },
    BandRule {
        band: PerformanceBand::Good,
        applies: |m| m.remote_bytes <= 0.0 && m.local_bytes < SPILL_POOR_FROM,
    },
    BandRule {
        band: PerformanceBand::Poor,
        applies: |m| m.remote_bytes <= 0.0 && m.local_bytes <= SPILL_CRITICAL_ABOVE,
    },
    BandRule { band: PerformanceBand::Critical, applies: |_| true },
];

const EXTERNAL_FUNCTION_RULES: &[BandRule<ExternalFunctionMetrics>] = &[
    BandRule {
        band: PerformanceBand::Great,
        applies: |m| m.latency_ms < EXTERNAL_GREAT_BELOW_MS && m.success_rate >= 100.0,
    },
    BandRule {
        band: PerformanceBand::Good,
        applies: |m| {
            m.latency_ms <= EXTERNAL_GOOD_MAX_MS && m.success_rate > EXTERNAL_GOOD_SUCCESS_ABOVE
        },
    },
    BandRule {
        band: PerformanceBand::Poor,
        applies: |m| {
            m.latency_ms <= EXTERNAL_POOR_MAX_MS && m.success_rate >= EXTERNAL_POOR_SUCCESS_FROM
        },
    },
    BandRule { band: PerformanceBand::Critical, applies: |_| true },
];

// ============================================================================
// Family Classifiers
// ============================================================================

pub fn execution_time_band(percentage: f64) -> PerformanceBand {
    evaluate(EXECUTION_RULES, &percentage)
}

/// `None` when neither reading is available
pub fn scan_efficiency_band(
    pruning_efficiency: Option<f64>,
    cache_hit_rate: Option<f64>,
) -> Option<PerformanceBand> {
    if pruning_efficiency.is_none() && cache_hit_rate.is_none() {
        return None;
    }
    Some(evaluate(SCAN_RULES, &ScanMetrics { pruning_efficiency, cache_hit_rate }))
}

pub fn join_multiplication_band(factor: f64) -> PerformanceBand {
    evaluate(JOIN_RULES, &factor)
}

pub fn io_volume_band(bytes_scanned: u64, cache_hit_rate: Option<f64>) -> PerformanceBand {
    evaluate(IO_RULES, &IoMetrics { bytes_scanned: bytes_scanned as f64, cache_hit_rate })
}

pub fn spilling_band(local_bytes: u64, remote_bytes: u64) -> PerformanceBand {
    evaluate(
        SPILL_RULES,
        &SpillMetrics { local_bytes: local_bytes as f64, remote_bytes: remote_bytes as f64 },
    )
}

pub fn external_function_band(latency_ms: f64, success_rate: f64) -> PerformanceBand {
    evaluate(EXTERNAL_FUNCTION_RULES, &ExternalFunctionMetrics { latency_ms, success_rate })
}

/// Whole-query band, checked from CRITICAL down to GREAT
///
/// Averages only participate when at least one operator reported them.
pub fn overall_band(summary: &SummaryMetrics) -> PerformanceBand {
    let pruning = (summary.pruning_samples > 0).then_some(summary.average_pruning_efficiency);
    let cache = (summary.cache_hit_samples > 0).then_some(summary.average_cache_hit_rate);
    let total_spill = summary.total_bytes_spilled as f64;

    let critical = !summary.high_execution_time_operators.is_empty()
        || summary.largest_spill_bytes() as f64 > OVERALL_CRITICAL_SINGLE_SPILL
        || pruning.is_some_and(|p| p < PRUNING_POOR_FROM);
    if critical {
        return PerformanceBand::Critical;
    }

    let poor = within_inclusive(
        summary.peak_execution_percentage,
        EXECUTION_POOR_FROM,
        EXECUTION_CRITICAL_ABOVE,
    ) || total_spill >= OVERALL_POOR_TOTAL_SPILL_FROM
        || within(pruning, PRUNING_POOR_FROM, PRUNING_GOOD_FROM)
        || cache.is_some_and(|c| c < OVERALL_POOR_CACHE_BELOW);
    if poor {
        return PerformanceBand::Poor;
    }

    if summary.has_issues() { PerformanceBand::Good } else { PerformanceBand::Great }
}

/// Bands attached to an analysis payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub overall: PerformanceBand,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub execution_time: Option<PerformanceBand>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub scan_efficiency: Option<PerformanceBand>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub join_multiplication: Option<PerformanceBand>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub io_volume: Option<PerformanceBand>,
    pub spilling: PerformanceBand,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub external_function: Option<PerformanceBand>,
}

impl Classification {
    pub fn from_summary(summary: &SummaryMetrics) -> Self {
        let pruning = (summary.pruning_samples > 0).then_some(summary.average_pruning_efficiency);
        let cache = (summary.cache_hit_samples > 0).then_some(summary.average_cache_hit_rate);
        let (local_spill, remote_spill) = summary.spill_split();

        let io_volume = (summary.total_bytes_scanned > 0 || cache.is_some())
            .then(|| io_volume_band(summary.total_bytes_scanned, cache));

        let external_function = summary
            .external_function_latency_ms
            .zip(summary.external_function_success_rate)
            .map(|(latency, success)| external_function_band(latency, success));

        Self {
            overall: overall_band(summary),
            execution_time: summary.peak_execution_percentage.map(execution_time_band),
            scan_efficiency: scan_efficiency_band(pruning, cache),
            join_multiplication: summary.peak_join_factor.map(join_multiplication_band),
            io_volume,
            spilling: spilling_band(local_spill, remote_spill),
            external_function,
        }
    }
}
