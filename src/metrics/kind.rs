//! Aggregation kinds and their output suffixes.

use crate::core::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quantiles reported for `Quantile` metrics, in output order.
pub const REPORTED_QUANTILES: [f64; 4] = [0.50, 0.90, 0.95, 0.99];

/// How a persistent metric combines values and how many outputs it renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    /// Plain sum, same as `Sum`
    Base,
    /// Sum of all values
    Sum,
    /// Mean of all values
    Avg,
    /// Number of observations, values ignored
    Count,
    /// Count and sum
    CountSum,
    /// Count and mean
    CountAvg,
    /// Streaming quantile estimate
    Quantile,
}

impl AggregationKind {
    /// All kinds, in code order
    pub const ALL: [AggregationKind; 7] = [
        AggregationKind::Base,
        AggregationKind::Sum,
        AggregationKind::Avg,
        AggregationKind::Count,
        AggregationKind::CountSum,
        AggregationKind::CountAvg,
        AggregationKind::Quantile,
    ];

    /// Output suffixes, one per rendered value
    pub fn suffixes(self) -> &'static [&'static str] {
        match self {
            AggregationKind::Base | AggregationKind::Sum => &["_Sum"],
            AggregationKind::Count => &["_Count"],
            AggregationKind::Avg => &["_Avg"],
            AggregationKind::CountSum => &["_Count", "_Sum"],
            AggregationKind::CountAvg => &["_Count", "_Avg"],
            AggregationKind::Quantile => &["_MinP50", "_MinP90", "_MinP95", "_MinP99"],
        }
    }

    /// Whether `overwrite` is allowed
    pub fn supports_overwrite(self) -> bool {
        self != AggregationKind::Quantile
    }

    /// Stable name used in config files and logs
    pub fn as_str(self) -> &'static str {
        match self {
            AggregationKind::Base => "base",
            AggregationKind::Sum => "sum",
            AggregationKind::Avg => "avg",
            AggregationKind::Count => "count",
            AggregationKind::CountSum => "count_sum",
            AggregationKind::CountAvg => "count_avg",
            AggregationKind::Quantile => "quantile",
        }
    }
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationKind {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "base" => Ok(AggregationKind::Base),
            "sum" => Ok(AggregationKind::Sum),
            "avg" | "average" => Ok(AggregationKind::Avg),
            "count" => Ok(AggregationKind::Count),
            "count_sum" | "countsum" => Ok(AggregationKind::CountSum),
            "count_avg" | "countavg" => Ok(AggregationKind::CountAvg),
            "quantile" => Ok(AggregationKind::Quantile),
            _ => Err(MonitorError::UnsupportedKind(s.to_string())),
        }
    }
}

impl TryFrom<u8> for AggregationKind {
    type Error = MonitorError;

    fn try_from(code: u8) -> Result<Self> {
        AggregationKind::ALL
            .get(usize::from(code))
            .copied()
            .ok_or_else(|| MonitorError::UnsupportedKind(format!("code {}", code)))
    }
}
