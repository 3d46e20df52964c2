//! # Point
//!
//! Metric points handed to the serializer by whatever collects them, either the bundled
//! [Collector](super::Collector) or an adapter for another metrics SDK.

use std::fmt;

/// Whether a reported value is the change since the last report or the running total
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Temporality {
    Delta,
    Cumulative,
}

impl fmt::Display for Temporality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Temporality::Delta => f.write_str("Delta"),
            Temporality::Cumulative => f.write_str("Cumulative"),
        }
    }
}

/// Instrument kinds an upstream SDK asks the exporter about when picking a temporality
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    Counter,
    UpDownCounter,
    Histogram,
    ObservableCounter,
    ObservableUpDownCounter,
    ObservableGauge,
}

/// A single numeric value, integers are kept apart so they render without a decimal point
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn is_finite(&self) -> bool {
        match self {
            Number::Int(_) => true,
            Number::Float(value) => value.is_finite(),
        }
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number::Int(value)
    }
}

impl From<u64> for Number {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(value) => Number::Int(value),
            Err(_) => Number::Float(value as f64),
        }
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::Float(value)
    }
}

/// Floats at or beyond these magnitudes are written in exponent form
const EXPONENT_ABOVE: f64 = 1e16;
const EXPONENT_BELOW: f64 = 1e-4;

impl fmt::Display for Number {
    /// Shortest digits that round-trip, switching to exponent form for very large or very small
    /// magnitudes where positional notation would spell out every zero
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Number::Int(value) => write!(f, "{value}"),
            Number::Float(value) if value != 0.0 && (value.abs() >= EXPONENT_ABOVE || value.abs() < EXPONENT_BELOW) => {
                write!(f, "{value:e}")
            }
            Number::Float(value) => write!(f, "{value}"),
        }
    }
}

/// Bucketed histogram data as produced by an aggregating SDK
///
/// `bucket_counts` has one more entry than `explicit_bounds`: the first bucket is
/// `(-inf, bounds[0]]` and the last is `(bounds[n-1], +inf)`.
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramData {
    pub explicit_bounds: Vec<f64>,
    pub bucket_counts: Vec<u64>,
    pub sum: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub temporality: Temporality,
}

impl HistogramData {
    /// Total number of recorded values across all buckets
    pub fn count(&self) -> u64 {
        self.bucket_counts.iter().sum()
    }

    /// `sum / count`, only meaningful when `count() > 0`
    pub(crate) fn mean(&self) -> f64 {
        self.sum / self.count() as f64
    }
}

/// The shape and value of a metric point
#[derive(Clone, Debug, PartialEq)]
pub enum MetricValue {
    /// Last observed value
    Gauge(Number),
    Sum {
        value: Number,
        monotonic: bool,
        temporality: Temporality,
    },
    Histogram(HistogramData),
}

/// One measurement with its attributes, immutable once handed to the exporter
#[derive(Clone, Debug, PartialEq)]
pub struct MetricPoint {
    pub name: String,
    /// Attribute keys are unique within a point, order is preserved on the wire
    pub attributes: Vec<(String, String)>,
    pub value: MetricValue,
    /// Nanoseconds since the unix epoch
    pub timestamp_nanos: Option<u64>,
}

impl MetricPoint {
    pub fn new(name: impl Into<String>, value: MetricValue) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            value,
            timestamp_nanos: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_timestamp_nanos(mut self, timestamp_nanos: u64) -> Self {
        self.timestamp_nanos = Some(timestamp_nanos);
        self
    }

    /// Monotonic delta sum, the only counter flavor the ingest endpoint accepts
    pub fn counter(name: impl Into<String>, value: impl Into<Number>) -> Self {
        Self::new(
            name,
            MetricValue::Sum {
                value: value.into(),
                monotonic: true,
                temporality: Temporality::Delta,
            },
        )
    }

    pub fn gauge(name: impl Into<String>, value: impl Into<Number>) -> Self {
        Self::new(name, MetricValue::Gauge(value.into()))
    }
}
