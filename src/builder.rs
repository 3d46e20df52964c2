use super::dimensions::DimensionSet;
use super::exporter::{self, Exporter, DEFAULT_ENDPOINT, DEFAULT_MAX_LINES_PER_REQUEST, DEFAULT_USER_AGENT};
use super::serializer::Serializer;
use super::transport::Transport;
use super::{collector, metadata, Error};
use indexmap::IndexMap;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

/// Exporter settings for file or environment driven setups, see [Builder::from_config]
///
/// ```
/// let config: metrics_dynatrace::Config = serde_json::from_str(
///     r#"{"endpoint": "https://abc123.live.dynatrace.com/api/v2/metrics/ingest", "prefix": "shop"}"#,
/// )
/// .unwrap();
/// let builder = metrics_dynatrace::Builder::from_config(config);
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoint: Option<String>,
    pub api_token: Option<String>,
    pub prefix: Option<String>,
    pub default_dimensions: IndexMap<String, String>,
    pub export_metadata: bool,
    pub max_lines_per_request: Option<usize>,
    pub user_agent: Option<String>,
    pub request_timeout_ms: Option<u64>,
}

/// Builder for the Dynatrace metrics exporter and collector
///
/// # Example
/// ```
///  let exporter = metrics_dynatrace::Builder::new()
///      .endpoint("https://abc123.live.dynatrace.com/api/v2/metrics/ingest")
///      .api_token("my.secret.token")
///      .prefix("shop")
///      .with_dimension("service", "checkout")
///      .build_exporter()
///      .unwrap();
/// ```
pub struct Builder {
    endpoint: Option<String>,
    api_token: Option<String>,
    prefix: Option<String>,
    default_dimensions: Vec<(String, String)>,
    export_metadata: bool,
    max_lines_per_request: usize,
    user_agent: Option<String>,
    request_timeout: Option<Duration>,
    timestamp: Option<u64>,
    transport: Option<Box<dyn Transport>>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Builder {
            endpoint: None,
            api_token: None,
            prefix: None,
            default_dimensions: Vec::new(),
            export_metadata: false,
            max_lines_per_request: DEFAULT_MAX_LINES_PER_REQUEST,
            user_agent: None,
            request_timeout: None,
            timestamp: None,
            transport: None,
        }
    }

    /// Start from deserialized settings, builder methods can still override them
    pub fn from_config(config: Config) -> Self {
        let mut builder = Self::new();
        builder.endpoint = config.endpoint;
        builder.api_token = config.api_token;
        builder.prefix = config.prefix;
        builder.default_dimensions = config.default_dimensions.into_iter().collect();
        builder.export_metadata = config.export_metadata;
        builder.user_agent = config.user_agent;
        builder.request_timeout = config.request_timeout_ms.map(Duration::from_millis);
        if let Some(max_lines_per_request) = config.max_lines_per_request {
            builder.max_lines_per_request = max_lines_per_request;
        }
        builder
    }

    /// Sets the ingest endpoint, e.g. `https://{env-id}.live.dynatrace.com/api/v2/metrics/ingest`
    /// * Defaults to the local OneAgent endpoint
    pub fn endpoint(self, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..self
        }
    }

    /// Sets the API token, needs the `metrics.ingest` scope
    /// * Only sent when an endpoint is set, the local OneAgent endpoint needs no token
    pub fn api_token(self, token: impl Into<String>) -> Self {
        Self {
            api_token: Some(token.into()),
            ..self
        }
    }

    /// Prepends `<prefix>.` to every metric key
    pub fn prefix(self, prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..self
        }
    }

    /// Adds a static dimension (name, value), that will be sent with each metric line.
    /// * This method can be called multiple times with distinct names
    /// * Metric attributes with the same (normalized) name take precedence
    pub fn with_dimension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_dimensions.push((name.into(), value.into()));
        self
    }

    /// Adds the metadata of a local OneAgent to every line, taking precedence over all other
    /// dimensions
    pub fn export_metadata(mut self, enabled: bool) -> Self {
        self.export_metadata = enabled;
        self
    }

    /// Maximum number of lines per request, defaults to 1000
    /// * Must be greater than zero or the build will fail
    pub fn max_lines_per_request(mut self, lines: usize) -> Self {
        self.max_lines_per_request = lines;
        self
    }

    pub fn user_agent(self, user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: Some(user_agent.into()),
            ..self
        }
    }

    /// Timeout for each individual request, there is none by default
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Stamps every collected metric with a fixed timestamp in milliseconds instead of the
    /// current time
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Replaces the HTTP transport
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Build a standalone exporter for points produced elsewhere
    pub fn build_exporter(self) -> Result<Exporter, Error> {
        if self.max_lines_per_request == 0 {
            return Err("max_lines_per_request must be greater than zero".into());
        }

        let (endpoint, api_token) = match self.endpoint {
            Some(endpoint) => (endpoint, self.api_token),
            None => {
                info!("No endpoint specified, exporting to the local OneAgent endpoint {DEFAULT_ENDPOINT}");
                if self.api_token.is_some() {
                    warn!("API token given without an endpoint, skipping token authentication for the local OneAgent endpoint");
                }
                (DEFAULT_ENDPOINT.to_string(), None)
            }
        };

        let user_agent = self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
        let headers = exporter::headers(api_token.as_deref(), user_agent)?;

        let enrichment = if self.export_metadata {
            DimensionSet::normalized(metadata::read_enrichment_dimensions())
        } else {
            DimensionSet::new()
        };
        let serializer = Serializer::new(self.prefix, DimensionSet::normalized(self.default_dimensions), enrichment);

        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport(self.request_timeout)?,
        };

        Ok(Exporter::new(
            endpoint.parse()?,
            headers,
            serializer,
            self.max_lines_per_request,
            transport,
        ))
    }

    /// Build a collector without installing it as the global recorder
    pub fn build(self) -> Result<collector::Collector, Error> {
        let config = collector::Config {
            timestamp: self.timestamp,
        };
        Ok(collector::Collector::new(config, self.build_exporter()?))
    }

    /// Initialize the metrics collector including the call to metrics::set_global_recorder
    pub fn init(self) -> Result<&'static collector::Collector, Error> {
        let collector: &'static collector::Collector = Box::leak(Box::new(self.build()?));
        metrics::set_global_recorder(collector::Recorder::from(collector))
            .map_err(|_| "a global metrics recorder is already installed")?;
        Ok(collector)
    }
}

#[cfg(feature = "reqwest")]
fn default_transport(timeout: Option<Duration>) -> Result<Box<dyn Transport>, Error> {
    Ok(Box::new(super::transport::HttpTransport::new(timeout)))
}

#[cfg(not(feature = "reqwest"))]
fn default_transport(_timeout: Option<Duration>) -> Result<Box<dyn Transport>, Error> {
    Err("no transport configured, enable the `reqwest` feature or call Builder::transport".into())
}
