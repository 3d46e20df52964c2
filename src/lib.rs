//! Export [metrics] to Dynatrace through the metrics ingest line protocol
//!
//! Either install the [Collector] as the global recorder with [Builder::init], or build a
//! standalone [Exporter] with [Builder::build_exporter] and feed it [MetricPoint]s produced by
//! another metrics SDK.

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

pub use {
    builder::{Builder, Config},
    classify::{classify, Rejection, ValueClause},
    collector::{Collector, Recorder},
    exporter::{ExportError, Exporter, DEFAULT_ENDPOINT, DEFAULT_MAX_LINES_PER_REQUEST, DEFAULT_USER_AGENT},
    point::{HistogramData, InstrumentKind, MetricPoint, MetricValue, Number, Temporality},
    serializer::{MetricError, Serializer, MAX_DIMENSIONS},
    transport::Transport,
};

#[cfg(feature = "reqwest")]
pub use transport::HttpTransport;

pub mod dimensions;
pub mod histogram;
pub mod metadata;
pub mod normalize;

mod builder;
mod classify;
mod collector;
mod exporter;
mod point;
mod serializer;
mod transport;
