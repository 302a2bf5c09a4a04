use crate::sender::{DeliveryFailureKind, DeliverySnapshot, DeliveryStats};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use warp::{Filter, Reply};

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("Failed to bind metrics server: {0}")]
    Bind(#[from] warp::Error),
}

/// Mirrors [`DeliveryStats`] into Prometheus counters on every scrape.
#[derive(Clone)]
pub struct PrometheusExporter {
    registry: Registry,
    stats: Arc<DeliveryStats>,
    batches_delivered: IntCounter,
    batches_failed: IntCounterVec,
    records_delivered: IntCounter,
    records_dropped: IntCounter,
    bytes_delivered: IntCounter,
    compression_failures: IntCounter,
    queue_rejected: IntCounter,
    p95_latency_ms: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, MetricsError> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

/// Advances a monotonic counter to `target`.
fn advance(counter: &IntCounter, target: u64) {
    let current = counter.get();
    if target > current {
        counter.inc_by(target - current);
    }
}

impl PrometheusExporter {
    pub fn new(stats: Arc<DeliveryStats>) -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let batches_failed = IntCounterVec::new(
            Opts::new(
                "logfwrd_batches_failed_total",
                "Batches dropped after a failed delivery, by failure kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(batches_failed.clone()))?;

        let p95_latency_ms = IntGauge::with_opts(Opts::new(
            "logfwrd_delivery_latency_p95_milliseconds",
            "95th percentile of recent delivery latencies",
        ))?;
        registry.register(Box::new(p95_latency_ms.clone()))?;

        Ok(Self {
            batches_delivered: counter(
                &registry,
                "logfwrd_batches_delivered_total",
                "Batches accepted by the sink",
            )?,
            records_delivered: counter(
                &registry,
                "logfwrd_records_delivered_total",
                "Records inside delivered batches",
            )?,
            records_dropped: counter(
                &registry,
                "logfwrd_records_dropped_total",
                "Records inside batches that failed delivery",
            )?,
            bytes_delivered: counter(
                &registry,
                "logfwrd_bytes_delivered_total",
                "Compressed bytes accepted by the sink",
            )?,
            compression_failures: counter(
                &registry,
                "logfwrd_compression_failures_total",
                "Records rejected because they could not be compressed",
            )?,
            queue_rejected: counter(
                &registry,
                "logfwrd_records_queue_rejected_total",
                "Records dropped because the intake queue was full",
            )?,
            batches_failed,
            p95_latency_ms,
            registry,
            stats,
        })
    }

    fn refresh(&self, snapshot: &DeliverySnapshot) {
        advance(&self.batches_delivered, snapshot.batches_delivered);
        advance(&self.records_delivered, snapshot.records_delivered);
        advance(&self.records_dropped, snapshot.records_dropped);
        advance(&self.bytes_delivered, snapshot.bytes_delivered);
        advance(&self.compression_failures, snapshot.compression_failures);
        advance(&self.queue_rejected, snapshot.records_queue_rejected);
        for kind in DeliveryFailureKind::ALL {
            advance(
                &self.batches_failed.with_label_values(&[kind.as_str()]),
                snapshot.failed_of(kind),
            );
        }
        self.p95_latency_ms
            .set(i64::try_from(snapshot.p95_latency.as_millis()).unwrap_or(i64::MAX));
    }

    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        self.refresh(&self.stats.snapshot());

        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8_lossy(&buffer).to_string())
    }

    /// Serves `/metrics` and `/health` until `cancel` fires.
    pub async fn serve(self, port: u16, cancel: CancellationToken) -> Result<(), MetricsError> {
        let exporter = self.clone();
        let metrics = warp::path!("metrics")
            .and(warp::get())
            .map(move || match exporter.export_metrics() {
                Ok(metrics_text) => warp::reply::with_header(
                    metrics_text,
                    "content-type",
                    "text/plain; version=0.0.4",
                )
                .into_response(),
                Err(_) => warp::reply::with_status(
                    "Internal Server Error",
                    warp::http::StatusCode::INTERNAL_SERVER_ERROR,
                )
                .into_response(),
            });

        let health = warp::path!("health").and(warp::get()).map(|| "OK");
        let routes = metrics.or(health);

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let (bound, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, async move { cancel.cancelled().await })?;

        tracing::info!(addr = %bound, "Starting Prometheus metrics server");
        server.await;
        Ok(())
    }
}
