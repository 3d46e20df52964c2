//! # Collector
//!
//! Metrics Collector + Exporter returned from metrics_dynatrace::Builder
//!
//! Bridges the [metrics] facade to [MetricPoint]s: counters are reported as deltas since the last
//! flush, gauges as their last value and histograms as exact summaries of the values recorded
//! since the last flush.

use super::exporter::{ExportError, Exporter};
use super::point::{HistogramData, InstrumentKind, MetricPoint, MetricValue, Number};
use super::serializer::MAX_DIMENSIONS;
use metrics::SharedString;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::error;

const NANOS_PER_MILLI: u64 = 1_000_000;

/// Configuration via Builder
pub struct Config {
    /// Fixed timestamp in milliseconds
    pub timestamp: Option<u64>,
}

/// Exact summary of the values recorded since the last flush
#[derive(Clone, Copy, Debug, PartialEq)]
struct Summary {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Default for Summary {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

/// Histogram Handler accumulating a [Summary]
#[derive(Default)]
struct HistogramHandle {
    summary: Mutex<Summary>,
}

impl HistogramHandle {
    fn take(&self) -> Summary {
        std::mem::take(&mut *self.summary.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl metrics::HistogramFn for HistogramHandle {
    fn record(&self, value: f64) {
        let mut summary = self.summary.lock().unwrap_or_else(PoisonError::into_inner);
        summary.count += 1;
        summary.sum += value;
        summary.min = summary.min.min(value);
        summary.max = summary.max.max(value);
    }
}

// Metric information stored in the registry
enum MetricInfo {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<AtomicU64>),
    Histogram(Arc<HistogramHandle>),
}

impl MetricInfo {
    fn kind(&self) -> &'static str {
        match self {
            MetricInfo::Counter(_) => "counter",
            MetricInfo::Gauge(_) => "gauge",
            MetricInfo::Histogram(_) => "histogram",
        }
    }
}

/// Collector state used to register new metrics and flush
/// This lives within a mutex
#[derive(Default)]
struct CollectorState {
    registry: BTreeMap<metrics::Key, MetricInfo>,
}

/// Dynatrace Metrics Collector + Exporter
///
/// Use [Builder](super::Builder) to construct
///
/// # Example
/// ```no_run
/// let metrics = metrics_dynatrace::Builder::new()
///      .prefix("shop")
///      .init()
///      .unwrap();
///
///  metrics::counter!("requests", "method" => "GET").increment(1);
///
///  metrics.flush().unwrap();
/// ```
pub struct Collector {
    state: Mutex<CollectorState>,
    config: Config,
    exporter: Exporter,
}

impl Collector {
    pub fn new(config: Config, exporter: Exporter) -> Self {
        Self {
            state: Mutex::new(CollectorState::default()),
            config,
            exporter,
        }
    }

    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    fn lock(&self) -> MutexGuard<'_, CollectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Compute the timestamp unless it was set via [Builder::with_timestamp](super::Builder::with_timestamp)
    fn timestamp_nanos(&self) -> u64 {
        match self.config.timestamp {
            Some(millis) => millis.saturating_mul(NANOS_PER_MILLI),
            None => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_nanos() as u64)
                .unwrap_or_default(),
        }
    }

    /// Take the points accumulated since the last collection
    ///
    /// Counters are reset, counters without increments and histograms without records are
    /// omitted.
    pub fn collect(&self) -> Vec<MetricPoint> {
        let timestamp_nanos = self.timestamp_nanos();
        let state = self.lock();

        let mut points = Vec::with_capacity(state.registry.len());
        for (key, info) in &state.registry {
            let value = match info {
                MetricInfo::Counter(counter) => {
                    let delta = counter.swap(0, Ordering::Relaxed);

                    // Omit this metric if there is no delta since last flushed
                    if delta == 0 {
                        continue;
                    }
                    MetricValue::Sum {
                        value: Number::from(delta),
                        monotonic: true,
                        temporality: self.exporter.preferred_temporality(InstrumentKind::Counter),
                    }
                }
                MetricInfo::Gauge(gauge) => MetricValue::Gauge(Number::Float(f64::from_bits(gauge.load(Ordering::Relaxed)))),
                MetricInfo::Histogram(histogram) => {
                    let summary = histogram.take();

                    // Omit this metric if there is no new values since last flushed
                    if summary.count == 0 {
                        continue;
                    }
                    MetricValue::Histogram(HistogramData {
                        explicit_bounds: Vec::new(),
                        bucket_counts: vec![summary.count],
                        sum: summary.sum,
                        min: Some(summary.min),
                        max: Some(summary.max),
                        temporality: self.exporter.preferred_temporality(InstrumentKind::Histogram),
                    })
                }
            };

            points.push(MetricPoint {
                name: key.name().to_string(),
                attributes: key
                    .labels()
                    .map(|label| (label.key().to_string(), label.value().to_string()))
                    .collect(),
                value,
                timestamp_nanos: Some(timestamp_nanos),
            });
        }

        points
    }

    /// Collect and export everything accumulated since the last flush
    ///
    /// Blocks on the network, see [spawn_periodic_flush](Self::spawn_periodic_flush) for async
    /// applications.
    pub fn flush(&self) -> Result<(), ExportError> {
        self.exporter.export(&self.collect())
    }

    /// Flush on a fixed period from a tokio task, the blocking export runs on the blocking pool
    ///
    /// Must be called from within a tokio runtime. Failed exports are logged and the next period
    /// carries on with fresh values.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero.
    pub fn spawn_periodic_flush(&'static self, period: Duration) -> tokio::task::JoinHandle<()> {
        assert!(!period.is_zero(), "metrics flush period must be non-zero");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            // The first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                if let Err(err) = tokio::task::spawn_blocking(move || self.flush()).await {
                    error!("Metrics flush task failed: {err}");
                }
            }
        })
    }

    #[allow(clippy::mutable_key_type)] // metrics::Key has interior mutability
    fn register(&self, key: &metrics::Key, kind: &'static str, create: impl FnOnce() -> MetricInfo) -> Option<MetricInfo> {
        let labels = key.labels().len();
        if labels > MAX_DIMENSIONS {
            error!("Unable to register {kind} {key} as it has more than {MAX_DIMENSIONS} labels ({labels})");
            return None;
        }

        let mut state = self.lock();
        let info = match state.registry.entry(key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(create()),
        };

        let registered = match info {
            MetricInfo::Counter(counter) => MetricInfo::Counter(counter.clone()),
            MetricInfo::Gauge(gauge) => MetricInfo::Gauge(gauge.clone()),
            MetricInfo::Histogram(histogram) => MetricInfo::Histogram(histogram.clone()),
        };
        if registered.kind() != kind {
            error!(
                "Unable to register {kind} {key} as it was already registered as a {}",
                registered.kind()
            );
            return None;
        }

        Some(registered)
    }
}

pub struct Recorder {
    collector: &'static Collector,
}

impl From<&'static Collector> for Recorder {
    fn from(collector: &'static Collector) -> Self {
        Self { collector }
    }
}

impl metrics::Recorder for Recorder {
    // Units and descriptions have no place in the line protocol
    fn describe_counter(&self, _key: metrics::KeyName, _unit: Option<metrics::Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: metrics::KeyName, _unit: Option<metrics::Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: metrics::KeyName, _unit: Option<metrics::Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &metrics::Key, _metadata: &metrics::Metadata<'_>) -> metrics::Counter {
        match self
            .collector
            .register(key, "counter", || MetricInfo::Counter(Arc::new(AtomicU64::new(0))))
        {
            Some(MetricInfo::Counter(counter)) => metrics::Counter::from_arc(counter),
            _ => metrics::Counter::noop(),
        }
    }

    fn register_gauge(&self, key: &metrics::Key, _metadata: &metrics::Metadata<'_>) -> metrics::Gauge {
        match self
            .collector
            .register(key, "gauge", || MetricInfo::Gauge(Arc::new(AtomicU64::new(0f64.to_bits()))))
        {
            Some(MetricInfo::Gauge(gauge)) => metrics::Gauge::from_arc(gauge),
            _ => metrics::Gauge::noop(),
        }
    }

    fn register_histogram(&self, key: &metrics::Key, _metadata: &metrics::Metadata<'_>) -> metrics::Histogram {
        match self
            .collector
            .register(key, "histogram", || MetricInfo::Histogram(Arc::default()))
        {
            Some(MetricInfo::Histogram(histogram)) => metrics::Histogram::from_arc(histogram),
            _ => metrics::Histogram::noop(),
        }
    }
}
