//! # Exporter
//!
//! Serializes metric points and posts them to the ingest endpoint in bounded chunks
//!
//! Delivery is synchronous and sequential: one request per chunk, the first failing chunk ends
//! the export. Chunks already sent stay sent, nothing is retried.

use super::point::{InstrumentKind, MetricPoint, Temporality};
use super::serializer::Serializer;
use super::transport::Transport;
use super::Error;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use http::{Method, StatusCode, Uri};
use serde::Deserialize;
use tracing::{debug, warn};

/// Ingest endpoint of a OneAgent running on the local host
pub const DEFAULT_ENDPOINT: &str = "http://localhost:14499/metrics/ingest";

/// The ingest endpoint accepts at most this many lines per request
pub const DEFAULT_MAX_LINES_PER_REQUEST: usize = 1000;

pub const DEFAULT_USER_AGENT: &str = concat!("metrics-dynatrace/", env!("CARGO_PKG_VERSION"));

/// Why an export did not deliver every chunk
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to send metrics: {0}")]
    Transport(#[source] Error),
    #[error("ingest endpoint responded with {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Body of an ingest response
///
/// ```json
/// {"linesOk": 2, "linesInvalid": 1, "error": {"code": 400, "message": "1 invalid line"}}
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct IngestResponse {
    lines_ok: u64,
    lines_invalid: u64,
    error: Option<serde_json::Value>,
}

/// Posts serialized metric lines to the ingest endpoint
///
/// Use [Builder](super::Builder) to construct
pub struct Exporter {
    endpoint: Uri,
    headers: HeaderMap,
    serializer: Serializer,
    max_lines_per_request: usize,
    transport: Box<dyn Transport>,
}

impl Exporter {
    pub(crate) fn new(
        endpoint: Uri,
        headers: HeaderMap,
        serializer: Serializer,
        max_lines_per_request: usize,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            endpoint,
            headers,
            serializer,
            max_lines_per_request: max_lines_per_request.max(1),
            transport,
        }
    }

    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    pub fn serializer(&self) -> &Serializer {
        &self.serializer
    }

    /// Temporality the ingest endpoint needs for each kind of instrument
    ///
    /// Counters and histograms must be reported as deltas, everything that can go down as
    /// cumulative values.
    pub fn preferred_temporality(&self, kind: InstrumentKind) -> Temporality {
        match kind {
            InstrumentKind::Counter | InstrumentKind::ObservableCounter | InstrumentKind::Histogram => Temporality::Delta,
            InstrumentKind::UpDownCounter
            | InstrumentKind::ObservableUpDownCounter
            | InstrumentKind::ObservableGauge => Temporality::Cumulative,
        }
    }

    /// Serialize points into lines, skipping the ones that can't be represented
    pub fn serialize(&self, points: &[MetricPoint]) -> Vec<String> {
        points
            .iter()
            .filter_map(|point| match self.serializer.encode(point) {
                Ok(line) => line,
                Err(err) => {
                    warn!("Failed to serialize metric {}, skipping: {err}", point.name);
                    None
                }
            })
            .collect()
    }

    /// Export points, succeeding only if every chunk was accepted
    ///
    /// Nothing is sent when no point survives serialization, that still counts as success.
    pub fn export(&self, points: &[MetricPoint]) -> Result<(), ExportError> {
        let lines = self.serialize(points);
        if lines.is_empty() {
            debug!("No metric lines to export");
            return Ok(());
        }

        for chunk in lines.chunks(self.max_lines_per_request) {
            if let Err(err) = self.send_chunk(chunk.join("\n")) {
                warn!("Failed to export metrics: {err}");
                return Err(err);
            }
        }

        Ok(())
    }

    fn send_chunk(&self, payload: String) -> Result<(), ExportError> {
        debug!("Sending lines:\n{payload}");

        let mut request = http::Request::new(Bytes::from(payload));
        *request.method_mut() = Method::POST;
        *request.uri_mut() = self.endpoint.clone();
        *request.headers_mut() = self.headers.clone();

        let response = self.transport.send(request).map_err(ExportError::Transport)?;
        let status = response.status();
        let body = response.into_body();

        if !status.is_success() {
            return Err(ExportError::Status { status, body });
        }

        inspect_response(&body);
        Ok(())
    }
}

/// Headers sent with every request
pub(crate) fn headers(api_token: Option<&str>, user_agent: &str) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*; q=0"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);

    if let Some(token) = api_token {
        let mut authorization = HeaderValue::from_str(&format!("Api-Token {token}"))?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);
    }

    Ok(headers)
}

/// Lines the endpoint refused don't fail the export, but they are worth a warning
fn inspect_response(body: &str) {
    match serde_json::from_str::<IngestResponse>(body) {
        Ok(response) if response.lines_invalid > 0 => warn!(
            lines_ok = response.lines_ok,
            lines_invalid = response.lines_invalid,
            error = ?response.error,
            "Ingest endpoint rejected metric lines"
        ),
        Ok(response) => debug!(lines_ok = response.lines_ok, "Metric lines accepted"),
        Err(_) => debug!("Got response: {body}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::{MetricValue, Number};
    use crate::test::RecordingTransport;
    use std::sync::Arc;

    // 01/01/2021 00:00:00 in nanoseconds
    const TIMESTAMP_NANOS: u64 = 1_609_455_600_000_000_000;

    fn exporter(transport: &Arc<RecordingTransport>, max_lines_per_request: usize) -> Exporter {
        Exporter::new(
            DEFAULT_ENDPOINT.parse().unwrap(),
            headers(None, DEFAULT_USER_AGENT).unwrap(),
            Serializer::default(),
            max_lines_per_request,
            Box::new(Arc::clone(transport)),
        )
    }

    fn counter(value: i64) -> MetricPoint {
        MetricPoint::counter("my.instr", value)
            .with_attribute("l1", "v1")
            .with_attribute("l2", "v2")
            .with_timestamp_nanos(TIMESTAMP_NANOS)
    }

    fn line(value: i64) -> String {
        format!("my.instr,l1=v1,l2=v2 count,delta={value} 1609455600000")
    }

    #[test]
    fn empty_export_sends_nothing() {
        let transport = Arc::new(RecordingTransport::default());
        assert!(exporter(&transport, 2).export(&[]).is_ok());
        assert!(transport.bodies().is_empty());
    }

    #[test]
    fn all_rejected_sends_nothing() {
        let transport = Arc::new(RecordingTransport::default());
        let points = [
            MetricPoint::new(
                "my.instr",
                MetricValue::Sum {
                    value: Number::Int(1),
                    monotonic: false,
                    temporality: Temporality::Delta,
                },
            ),
            MetricPoint::counter(".", 1i64),
            MetricPoint::gauge("nan", f64::NAN),
        ];
        assert!(exporter(&transport, 2).export(&points).is_ok());
        assert!(transport.bodies().is_empty());
    }

    #[test]
    fn single_request() {
        let transport = Arc::new(RecordingTransport::default());
        exporter(&transport, 1000).export(&[counter(10)]).unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.uri, DEFAULT_ENDPOINT);
        assert_eq!(request.headers[ACCEPT], "*/*; q=0");
        assert_eq!(request.headers[CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(request.headers[USER_AGENT], DEFAULT_USER_AGENT);
        assert!(request.headers.get(AUTHORIZATION).is_none());
        assert_eq!(request.body, line(10));
    }

    #[test]
    fn invalid_points_skipped() {
        let transport = Arc::new(RecordingTransport::default());
        let mut points: Vec<_> = (0..3).map(counter).collect();
        points.push(MetricPoint { name: ".".into(), ..counter(3) });
        points.push(MetricPoint { name: String::new(), ..counter(4) });

        exporter(&transport, 1000).export(&points).unwrap();
        assert_eq!(transport.bodies(), vec![[line(0), line(1), line(2)].join("\n")]);
    }

    #[test]
    fn chunks() {
        let transport = Arc::new(RecordingTransport::default());
        let points: Vec<_> = (0..5).map(counter).collect();

        exporter(&transport, 2).export(&points).unwrap();
        assert_eq!(
            transport.bodies(),
            vec![
                [line(0), line(1)].join("\n"),
                [line(2), line(3)].join("\n"),
                line(4),
            ]
        );
    }

    #[test]
    fn failing_chunk_stops_export() {
        let transport = Arc::new(RecordingTransport::failing_from(1, StatusCode::INTERNAL_SERVER_ERROR));
        let points: Vec<_> = (0..6).map(counter).collect();

        let err = exporter(&transport, 2).export(&points).unwrap_err();
        assert!(matches!(err, ExportError::Status { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR));

        let bodies = transport.bodies();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0], [line(0), line(1)].join("\n"));
        assert_eq!(bodies[1], [line(2), line(3)].join("\n"));
    }

    #[test]
    fn transport_error_fails_export() {
        let transport = Arc::new(RecordingTransport::unreachable());
        let err = exporter(&transport, 2).export(&[counter(1)]).unwrap_err();
        assert!(matches!(err, ExportError::Transport(_)));
        assert_eq!(transport.bodies().len(), 1);
    }

    #[test]
    fn zero_chunk_size_clamped() {
        let transport = Arc::new(RecordingTransport::default());
        exporter(&transport, 0).export(&[counter(1), counter(2)]).unwrap();
        assert_eq!(transport.bodies().len(), 2);
    }

    #[test]
    fn authorization_header() {
        let headers = headers(Some("my.secret.token"), "agent").unwrap();
        assert_eq!(headers[AUTHORIZATION], "Api-Token my.secret.token");
        assert!(headers[AUTHORIZATION].is_sensitive());
        assert!(super::headers(Some("bad\ntoken"), "agent").is_err());
    }

    #[test]
    fn temporality_preferences() {
        let transport = Arc::new(RecordingTransport::default());
        let exporter = exporter(&transport, 1);
        assert_eq!(exporter.preferred_temporality(InstrumentKind::Counter), Temporality::Delta);
        assert_eq!(exporter.preferred_temporality(InstrumentKind::Histogram), Temporality::Delta);
        assert_eq!(exporter.preferred_temporality(InstrumentKind::ObservableCounter), Temporality::Delta);
        assert_eq!(exporter.preferred_temporality(InstrumentKind::UpDownCounter), Temporality::Cumulative);
        assert_eq!(exporter.preferred_temporality(InstrumentKind::ObservableGauge), Temporality::Cumulative);
    }

    #[test]
    fn response_bodies() {
        let response: IngestResponse =
            serde_json::from_str(r#"{"linesOk":2,"linesInvalid":1,"error":{"code":400,"message":"1 invalid line"}}"#)
                .unwrap();
        assert_eq!(response.lines_ok, 2);
        assert_eq!(response.lines_invalid, 1);
        assert!(response.error.is_some());

        let response: IngestResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.lines_invalid, 0);
    }
}
