//! Counts fake requests and flushes them to Dynatrace every 10 seconds
//!
//! ```sh
//! DT_METRICS_ENDPOINT=https://{env-id}.live.dynatrace.com/api/v2/metrics/ingest \
//! DT_API_TOKEN=... RUST_LOG=debug cargo run --example periodic
//! ```
//! Without `DT_METRICS_ENDPOINT` the lines go to a local OneAgent.

use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), metrics_dynatrace::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .with_target(false)
        .without_time()
        .compact()
        .init();

    let mut builder = metrics_dynatrace::Builder::new()
        .prefix("demo")
        .with_dimension("service", "periodic")
        .export_metadata(true);
    if let Ok(endpoint) = std::env::var("DT_METRICS_ENDPOINT") {
        builder = builder.endpoint(endpoint);
    }
    if let Ok(token) = std::env::var("DT_API_TOKEN") {
        builder = builder.api_token(token);
    }
    let metrics = builder.request_timeout(Duration::from_secs(5)).init()?;

    let flusher = metrics.spawn_periodic_flush(Duration::from_secs(10));

    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    for request in 0u64..400 {
        ticker.tick().await;
        let method = if request % 3 == 0 { "POST" } else { "GET" };
        metrics::counter!("requests", "method" => method).increment(1);
        metrics::histogram!("request.duration").record((request % 17) as f64 * 1.5);
        metrics::gauge!("in_flight").set((request % 5) as f64);
    }

    flusher.abort();
    tokio::task::spawn_blocking(move || metrics.flush()).await??;
    Ok(())
}
