//! # Serializer
//!
//! Renders metric points into lines of the Dynatrace metrics ingest protocol
//!
//! ```plaintext
//! <metric.key>[,<dim>=<val>,...] <value clause> [<timestamp ms>]
//! ```
//!
//! <https://docs.dynatrace.com/docs/extend-dynatrace/extend-metrics/reference/metric-ingestion-protocol>

use super::classify::{classify, ValueClause};
use super::dimensions::{self, DimensionSet};
use super::normalize::normalize_metric_key;
use super::point::{MetricPoint, MetricValue, Number};
use tracing::{debug, warn};

/// The ingest endpoint accepts at most this many dimensions per line
pub const MAX_DIMENSIONS: usize = 50;

const NANOS_PER_MILLI: u64 = 1_000_000;

/// A point that can't be serialized because its data is malformed
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MetricError {
    #[error("value {0} is not finite")]
    NonFinite(f64),
    #[error("histogram has {counts} bucket counts for {bounds} explicit bounds")]
    BucketMismatch { bounds: usize, counts: usize },
    #[error("summary min {min} is greater than max {max}")]
    MinGreaterThanMax { min: f64, max: f64 },
    #[error("{count} dimensions exceed the limit of {limit}", limit = MAX_DIMENSIONS)]
    TooManyDimensions { count: usize },
}

/// Line serializer holding the configuration shared by every line
///
/// Static and enrichment dimensions are normalized once on construction.
#[derive(Clone, Debug, Default)]
pub struct Serializer {
    prefix: Option<String>,
    static_dimensions: DimensionSet,
    enrichment: DimensionSet,
}

impl Serializer {
    pub fn new(prefix: Option<String>, static_dimensions: DimensionSet, enrichment: DimensionSet) -> Self {
        Self {
            prefix: prefix.filter(|prefix| !prefix.is_empty()),
            static_dimensions,
            enrichment,
        }
    }

    /// Normalized key for an instrument name, with the prefix applied
    pub fn metric_key(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => normalize_metric_key(&format!("{prefix}.{name}")),
            None => normalize_metric_key(name),
        }
    }

    /// Serialize one point into a line without terminator
    ///
    /// Returns `Ok(None)` for points that are dropped by design: an empty normalized key or a shape
    /// and temporality the endpoint doesn't support. Malformed data is an `Err`.
    pub fn encode(&self, point: &MetricPoint) -> Result<Option<String>, MetricError> {
        let key = self.metric_key(&point.name);
        if key.is_empty() {
            debug!("Dropping metric {:?} as its key normalizes to nothing", point.name);
            return Ok(None);
        }

        let clause = match classify(point) {
            Ok(clause) => clause,
            Err(rejection) => {
                warn!("Dropping metric {key}: {rejection}");
                return Ok(None);
            }
        };

        validate(&point.value)?;

        if let ValueClause::Summary { min, max, .. } = clause {
            if min > max {
                return Err(MetricError::MinGreaterThanMax { min, max });
            }
        }

        let dimensions = dimensions::merge(&self.static_dimensions, &point.attributes, &self.enrichment);
        if dimensions.len() > MAX_DIMENSIONS {
            return Err(MetricError::TooManyDimensions {
                count: dimensions.len(),
            });
        }

        let mut line = key;
        for (key, value) in dimensions.iter() {
            line.push(',');
            line.push_str(key);
            line.push('=');
            line.push_str(value);
        }

        line.push(' ');
        line.push_str(&clause.to_string());

        if let Some(timestamp) = point.timestamp_nanos {
            line.push(' ');
            line.push_str(&(timestamp / NANOS_PER_MILLI).to_string());
        }

        Ok(Some(line))
    }
}

/// Reject data that has no meaningful line representation
fn validate(value: &MetricValue) -> Result<(), MetricError> {
    match value {
        MetricValue::Gauge(number) | MetricValue::Sum { value: number, .. } => finite_number(number),
        MetricValue::Histogram(data) => {
            if data.bucket_counts.len() != data.explicit_bounds.len() + 1 {
                return Err(MetricError::BucketMismatch {
                    bounds: data.explicit_bounds.len(),
                    counts: data.bucket_counts.len(),
                });
            }
            finite(data.sum)
        }
    }
}

fn finite_number(number: &Number) -> Result<(), MetricError> {
    match number {
        Number::Int(_) => Ok(()),
        Number::Float(value) => finite(*value),
    }
}

fn finite(value: f64) -> Result<(), MetricError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(MetricError::NonFinite(value))
    }
}
