//! Per-metric accumulator with kind-specific combine and overwrite rules.

use crate::core::{MonitorError, Result};
use crate::metrics::kind::{AggregationKind, REPORTED_QUANTILES};
use quantiles::ckms::CKMS;

/// Error bound handed to the CKMS sketch
const SKETCH_ERROR: f64 = 0.001;

/// Mutable accumulator for one persistent metric inside one bucket.
///
/// Only `Quantile` values carry a sketch; every other kind works on
/// `sum`/`count`.
#[derive(Debug, Clone)]
pub struct AggregatorValue {
    kind: AggregationKind,
    sum: f64,
    count: i64,
    sketch: Option<CKMS<f64>>,
}

/// One output of a rendered value before formatting
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Observation count
    Count(i64),
    /// Sum, mean or quantile estimate
    Float(f64),
}

impl Reading {
    /// Numeric value, counts widened to f64
    pub fn as_f64(self) -> f64 {
        match self {
            Reading::Count(c) => c as f64,
            Reading::Float(v) => v,
        }
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Reading::Count(c) => write!(f, "{}", c),
            Reading::Float(v) => f.write_str(&format_float(v)),
        }
    }
}

/// Format a float with five decimals, spelling out NaN and infinities.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        format!("{:.5}", value)
    }
}

impl AggregatorValue {
    /// Zeroed accumulator for `kind`
    pub fn new(kind: AggregationKind) -> Self {
        let sketch = match kind {
            AggregationKind::Quantile => Some(CKMS::<f64>::new(SKETCH_ERROR)),
            _ => None,
        };

        Self {
            kind,
            sum: 0.0,
            count: 0,
            sketch,
        }
    }

    /// Kind this accumulator was created for
    pub fn kind(&self) -> AggregationKind {
        self.kind
    }

    /// Running sum
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Running count
    pub fn count(&self) -> i64 {
        self.count
    }

    /// Number of samples held by the sketch, zero for non-quantile kinds
    pub fn sketch_len(&self) -> usize {
        self.sketch.as_ref().map_or(0, CKMS::count)
    }

    /// Accumulate `value` according to `kind`.
    pub fn combine(&mut self, kind: AggregationKind, value: f64) -> Result<()> {
        self.check_kind(kind)?;

        match kind {
            AggregationKind::Base | AggregationKind::Sum => self.sum += value,
            AggregationKind::Count => self.count += 1,
            AggregationKind::Avg | AggregationKind::CountSum | AggregationKind::CountAvg => {
                self.sum += value;
                self.count += 1;
            },
            AggregationKind::Quantile => match self.sketch.as_mut() {
                // NaN has no rank and would corrupt the sketch ordering
                Some(_) if !value.is_finite() => {
                    return Err(MonitorError::invalid_operation(format!(
                        "quantile sample must be finite (got {})",
                        value
                    )))
                },
                Some(sketch) => sketch.insert(value),
                None => {
                    return Err(MonitorError::invalid_operation(
                        "quantile value has no sketch",
                    ))
                },
            },
        }

        Ok(())
    }

    /// Replace the accumulated state with a single observation.
    ///
    /// Quantile sketches cannot be overwritten.
    pub fn overwrite(&mut self, kind: AggregationKind, value: f64) -> Result<()> {
        self.check_kind(kind)?;

        match kind {
            AggregationKind::Base | AggregationKind::Sum => self.sum = value,
            AggregationKind::Count => self.count = 1,
            AggregationKind::Avg | AggregationKind::CountSum | AggregationKind::CountAvg => {
                self.sum = value;
                self.count = 1;
            },
            AggregationKind::Quantile => {
                return Err(MonitorError::invalid_operation(
                    "quantile metrics cannot be overwritten",
                ))
            },
        }

        Ok(())
    }

    /// Output values in suffix order.
    ///
    /// Averages divide without guarding, so an empty `Avg` reads NaN. An
    /// empty sketch reads NaN for every quantile.
    pub fn readings(&self) -> Vec<Reading> {
        match self.kind {
            AggregationKind::Base | AggregationKind::Sum => vec![Reading::Float(self.sum)],
            AggregationKind::Count => vec![Reading::Count(self.count)],
            AggregationKind::Avg => vec![Reading::Float(self.mean())],
            AggregationKind::CountSum => {
                vec![Reading::Count(self.count), Reading::Float(self.sum)]
            },
            AggregationKind::CountAvg => {
                vec![Reading::Count(self.count), Reading::Float(self.mean())]
            },
            AggregationKind::Quantile => REPORTED_QUANTILES
                .iter()
                .map(|&q| Reading::Float(self.quantile(q)))
                .collect(),
        }
    }

    /// Ordered `(suffix, formatted value)` pairs
    pub fn render(&self) -> Vec<(&'static str, String)> {
        self.kind
            .suffixes()
            .iter()
            .copied()
            .zip(self.readings().into_iter().map(|r| r.to_string()))
            .collect()
    }

    fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }

    fn quantile(&self, q: f64) -> f64 {
        self.sketch
            .as_ref()
            .and_then(|sketch| sketch.query(q))
            .map_or(f64::NAN, |(_, estimate)| estimate)
    }

    fn check_kind(&self, kind: AggregationKind) -> Result<()> {
        if kind == self.kind {
            Ok(())
        } else {
            Err(MonitorError::invalid_operation(format!(
                "{} value addressed as {}",
                self.kind, kind
            )))
        }
    }
}
