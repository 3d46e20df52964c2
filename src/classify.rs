//! # Classify
//!
//! Maps the shape of a metric point onto the value clause of the ingest line protocol

use super::histogram;
use super::point::{MetricPoint, MetricValue, Number, Temporality};
use std::fmt;

/// The typed value part of a serialized line
#[derive(Clone, Debug, PartialEq)]
pub enum ValueClause {
    /// `count,delta=<value>`
    CounterDelta(Number),
    /// `gauge,<value>`
    Gauge(Number),
    /// `gauge,min=<min>,max=<max>,sum=<sum>,count=<count>`
    Summary { min: f64, max: f64, sum: f64, count: u64 },
}

impl fmt::Display for ValueClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueClause::CounterDelta(value) => write!(f, "count,delta={value}"),
            ValueClause::Gauge(value) => write!(f, "gauge,{value}"),
            ValueClause::Summary { min, max, sum, count } => {
                let (min, max, sum) = (Number::Float(*min), Number::Float(*max), Number::Float(*sum));
                write!(f, "gauge,min={min},max={max},sum={sum},count={count}")
            }
        }
    }
}

/// Why a point can't be represented on the wire, rejected points are dropped
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("received {shape} with {temporality} temporality, but only {supported} is supported")]
    Temporality {
        shape: &'static str,
        temporality: Temporality,
        supported: Temporality,
    },
}

/// Decide the wire value clause for a point
///
/// * monotonic sums are delta counters, cumulative ones have no counterpart on the endpoint
/// * non-monotonic sums are gauges, but only when cumulative
/// * gauges are gauges
/// * histograms become summaries, only when delta, with min/max estimated if unknown
pub fn classify(point: &MetricPoint) -> Result<ValueClause, Rejection> {
    match &point.value {
        MetricValue::Sum {
            value,
            monotonic: true,
            temporality,
        } => {
            require("monotonic sum", *temporality, Temporality::Delta)?;
            Ok(ValueClause::CounterDelta(*value))
        }
        MetricValue::Sum {
            value,
            monotonic: false,
            temporality,
        } => {
            require("non-monotonic sum", *temporality, Temporality::Cumulative)?;
            Ok(ValueClause::Gauge(*value))
        }
        MetricValue::Gauge(value) => Ok(ValueClause::Gauge(*value)),
        MetricValue::Histogram(data) => {
            require("histogram", data.temporality, Temporality::Delta)?;
            Ok(ValueClause::Summary {
                min: histogram::min(data),
                max: histogram::max(data),
                sum: data.sum,
                count: data.count(),
            })
        }
    }
}

fn require(shape: &'static str, temporality: Temporality, supported: Temporality) -> Result<(), Rejection> {
    if temporality == supported {
        Ok(())
    } else {
        Err(Rejection::Temporality {
            shape,
            temporality,
            supported,
        })
    }
}
