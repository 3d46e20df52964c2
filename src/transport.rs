//! # Transport
//!
//! The single request/response contract the exporter needs from an HTTP client

use super::Error;
use bytes::Bytes;
use std::sync::Arc;

/// Sends one fully built request and hands back the response, whatever its status
///
/// Only a failure to get any response at all is an `Err`, status handling is left to the
/// exporter. Timeouts are the transport's business.
pub trait Transport: Send + Sync {
    fn send(&self, request: http::Request<Bytes>) -> Result<http::Response<String>, Error>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, request: http::Request<Bytes>) -> Result<http::Response<String>, Error> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, request: http::Request<Bytes>) -> Result<http::Response<String>, Error> {
        (**self).send(request)
    }
}

/// Blocking [reqwest] transport
///
/// The client is created on first use, so building an exporter inside an async runtime is fine
/// as long as exports themselves run on a blocking thread.
///
/// *requires the `reqwest` feature*
#[cfg(feature = "reqwest")]
pub struct HttpTransport {
    timeout: Option<std::time::Duration>,
    client: std::sync::OnceLock<reqwest::blocking::Client>,
}

#[cfg(feature = "reqwest")]
impl HttpTransport {
    /// `timeout` bounds each request, not a whole multi-request export
    pub fn new(timeout: Option<std::time::Duration>) -> Self {
        Self {
            timeout,
            client: std::sync::OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&reqwest::blocking::Client, Error> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }

        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        // Losing a race to another thread just drops our client
        let _ = self.client.set(builder.build()?);

        self.client.get().ok_or_else(|| "http client unavailable".into())
    }
}

#[cfg(feature = "reqwest")]
impl Transport for HttpTransport {
    fn send(&self, request: http::Request<Bytes>) -> Result<http::Response<String>, Error> {
        let (parts, body) = request.into_parts();

        let response = self
            .client()?
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers)
            .body(body.to_vec())
            .send()?;

        let status = response.status();
        let mut converted = http::Response::new(response.text()?);
        *converted.status_mut() = status;

        Ok(converted)
    }
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
    use crate::{Builder, ExportError, MetricPoint};
    use http::StatusCode;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    /// Serves a single request on a loopback port, returning the endpoint and the raw request
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/api/v2/metrics/ingest", listener.local_addr().unwrap());

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();

            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            let header_end = loop {
                let read = stream.read(&mut buf).unwrap();
                assert!(read > 0, "connection closed before the request was complete");
                request.extend_from_slice(&buf[..read]);
                if let Some(pos) = request.windows(4).position(|window| window == b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let head = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();
            let content_length: usize = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .map(|value| value.trim().parse().unwrap())
                .unwrap_or(0);
            while request.len() < header_end + content_length {
                let read = stream.read(&mut buf).unwrap();
                assert!(read > 0, "connection closed before the body was complete");
                request.extend_from_slice(&buf[..read]);
            }

            write!(
                stream,
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();

            String::from_utf8(request).unwrap()
        });

        (endpoint, server)
    }

    #[test]
    fn posts_lines_with_headers() {
        let (endpoint, server) = serve_once("HTTP/1.1 202 Accepted", r#"{"linesOk":1,"linesInvalid":0,"error":null}"#);
        let exporter = Builder::new()
            .endpoint(endpoint)
            .api_token("my.secret.token")
            .build_exporter()
            .unwrap();

        exporter
            .export(&[MetricPoint::counter("my.instr", 10i64)
                .with_attribute("l1", "v1")
                .with_timestamp_nanos(1_609_455_600_000_000_000)])
            .unwrap();

        let request = server.join().unwrap();
        let (head, body) = request.split_once("\r\n\r\n").unwrap();
        let head = head.to_ascii_lowercase();
        assert!(head.starts_with("post /api/v2/metrics/ingest http/1.1"), "{head}");
        assert!(head.contains("\r\naccept: */*; q=0\r\n"), "{head}");
        assert!(head.contains("\r\ncontent-type: text/plain; charset=utf-8\r\n"), "{head}");
        assert!(head.contains("\r\nauthorization: api-token my.secret.token\r\n"), "{head}");
        assert!(head.contains("\r\nuser-agent: metrics-dynatrace/"), "{head}");
        assert_eq!(body, "my.instr,l1=v1 count,delta=10 1609455600000");
    }

    #[test]
    fn error_status_fails_export() {
        let (endpoint, server) = serve_once(
            "HTTP/1.1 400 Bad Request",
            r#"{"error":{"code":400,"message":"1 invalid line"}}"#,
        );
        let exporter = Builder::new().endpoint(endpoint).build_exporter().unwrap();

        let err = exporter.export(&[MetricPoint::gauge("g", 1i64)]).unwrap_err();
        server.join().unwrap();

        match err {
            ExportError::Status { status, body } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert!(body.contains("1 invalid line"), "{body}");
            }
            other => panic!("expected a status error, got {other:?}"),
        }
    }

    #[test]
    fn unreachable_endpoint_fails_export() {
        // Bind then drop to get a port nothing listens on
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let exporter = Builder::new()
            .endpoint(format!("http://127.0.0.1:{port}/api/v2/metrics/ingest"))
            .build_exporter()
            .unwrap();

        let err = exporter.export(&[MetricPoint::gauge("g", 1i64)]).unwrap_err();
        assert!(matches!(err, ExportError::Transport(_)), "{err:?}");
    }
}
