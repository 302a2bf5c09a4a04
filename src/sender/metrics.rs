use super::error::DeliveryFailureKind;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const MAX_LATENCY_SAMPLES: usize = 1000;

/// Safely calculate percentile from sorted samples with bounds checking
fn calculate_percentile(sorted_samples: &[Duration], percentile: f64) -> Duration {
    if sorted_samples.is_empty() {
        return Duration::ZERO;
    }

    let percentile = percentile.clamp(0.0, 1.0);
    let last = sorted_samples.len() - 1;
    let index = (percentile * last as f64).floor() as usize;

    sorted_samples
        .get(index.min(last))
        .copied()
        .unwrap_or(Duration::ZERO)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliverySnapshot {
    pub batches_delivered: u64,
    pub batches_timed_out: u64,
    pub batches_transport_failed: u64,
    pub batches_rejected: u64,
    pub records_delivered: u64,
    pub records_dropped: u64,
    pub bytes_delivered: u64,
    pub compression_failures: u64,
    pub records_queue_rejected: u64,
    pub average_latency: Duration,
    pub p95_latency: Duration,
}

impl DeliverySnapshot {
    pub fn batches_failed(&self) -> u64 {
        self.batches_timed_out + self.batches_transport_failed + self.batches_rejected
    }

    pub fn failed_of(&self, kind: DeliveryFailureKind) -> u64 {
        match kind {
            DeliveryFailureKind::Timeout => self.batches_timed_out,
            DeliveryFailureKind::Transport => self.batches_transport_failed,
            DeliveryFailureKind::Status => self.batches_rejected,
        }
    }
}

/// Operator-facing counters for the best-effort delivery path.
///
/// Failed batches are dropped, so these counters are the only place a
/// sustained sink outage becomes visible.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    batches_delivered: AtomicU64,
    batches_timed_out: AtomicU64,
    batches_transport_failed: AtomicU64,
    batches_rejected: AtomicU64,
    records_delivered: AtomicU64,
    records_dropped: AtomicU64,
    bytes_delivered: AtomicU64,
    compression_failures: AtomicU64,
    records_queue_rejected: AtomicU64,
    total_latency_ms: AtomicU64,
    latency_samples: Mutex<VecDeque<Duration>>,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_delivery(&self, entries: usize, bytes: usize, latency: Duration) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
        self.records_delivered
            .fetch_add(entries as u64, Ordering::Relaxed);
        self.bytes_delivered.fetch_add(bytes as u64, Ordering::Relaxed);
        self.record_latency(latency);
    }

    pub fn record_failure(&self, kind: DeliveryFailureKind, entries: usize, latency: Duration) {
        let counter = match kind {
            DeliveryFailureKind::Timeout => &self.batches_timed_out,
            DeliveryFailureKind::Transport => &self.batches_transport_failed,
            DeliveryFailureKind::Status => &self.batches_rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.records_dropped
            .fetch_add(entries as u64, Ordering::Relaxed);
        self.record_latency(latency);
    }

    pub fn record_compression_failure(&self) {
        self.compression_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queue_rejection(&self) {
        self.records_queue_rejected.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, latency: Duration) {
        self.total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);

        let mut samples = self.latency_samples.lock();
        if samples.len() == MAX_LATENCY_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(latency);
    }

    pub fn snapshot(&self) -> DeliverySnapshot {
        let batches_delivered = self.batches_delivered.load(Ordering::Relaxed);
        let batches_timed_out = self.batches_timed_out.load(Ordering::Relaxed);
        let batches_transport_failed = self.batches_transport_failed.load(Ordering::Relaxed);
        let batches_rejected = self.batches_rejected.load(Ordering::Relaxed);

        let attempts =
            batches_delivered + batches_timed_out + batches_transport_failed + batches_rejected;
        let average_latency = if attempts > 0 {
            Duration::from_millis(self.total_latency_ms.load(Ordering::Relaxed) / attempts)
        } else {
            Duration::ZERO
        };

        let p95_latency = {
            let mut sorted: Vec<Duration> = self.latency_samples.lock().iter().copied().collect();
            sorted.sort_unstable();
            calculate_percentile(&sorted, 0.95)
        };

        DeliverySnapshot {
            batches_delivered,
            batches_timed_out,
            batches_transport_failed,
            batches_rejected,
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            bytes_delivered: self.bytes_delivered.load(Ordering::Relaxed),
            compression_failures: self.compression_failures.load(Ordering::Relaxed),
            records_queue_rejected: self.records_queue_rejected.load(Ordering::Relaxed),
            average_latency,
            p95_latency,
        }
    }
}
