use criterion::{criterion_group, criterion_main, Criterion};
use metrics_dynatrace::{HistogramData, MetricPoint, MetricValue, Temporality};

struct NullTransport;

impl metrics_dynatrace::Transport for NullTransport {
    fn send(
        &self,
        _request: http::Request<bytes::Bytes>,
    ) -> Result<http::Response<String>, metrics_dynatrace::Error> {
        Ok(http::Response::new(String::new()))
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    let exporter = metrics_dynatrace::Builder::new()
        .prefix("MyApplication")
        .with_dimension("Function", "My_Function_Name")
        .transport(NullTransport)
        .build_exporter()
        .unwrap();

    let points: Vec<_> = (0..100)
        .map(|i| match i % 3 {
            0 => MetricPoint::counter(format!("requests {i}"), i as i64).with_attribute("Method", "Default"),
            1 => MetricPoint::gauge("score", i as f64 * 0.5).with_attribute("Method", "Another, one"),
            _ => MetricPoint::new(
                "latency",
                MetricValue::Histogram(HistogramData {
                    explicit_bounds: vec![1.0, 5.0, 10.0],
                    bucket_counts: vec![1, i, 2, 0],
                    sum: i as f64 * 4.0,
                    min: None,
                    max: None,
                    temporality: Temporality::Delta,
                }),
            )
            .with_attribute("Method", "YetAnother"),
        })
        .collect();

    c.bench_function("serialize", |b| b.iter(|| exporter.serialize(&points)));
    c.bench_function("export", |b| b.iter(|| exporter.export(&points)));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
