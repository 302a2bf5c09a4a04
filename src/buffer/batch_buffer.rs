use super::batch::{Batch, FlushTrigger, WindowBounds};
use super::compressor::{Accumulator, Compressor};
use super::error::BufferError;
use crate::sender::{DeliveryError, DeliveryReceipt, DeliveryStats, Sink};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub const DEFAULT_MAX_ENTRIES: usize = 5000;
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub max_entries: usize,
    pub max_age: Duration,
    /// Opaque tag attached to every delivered batch.
    pub label: Option<String>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_age: DEFAULT_MAX_AGE,
            label: None,
        }
    }
}

impl BufferConfig {
    pub fn validate(&self) -> Result<(), BufferError> {
        if self.max_entries == 0 {
            return Err(BufferError::InvalidConfig {
                reason: "max_entries must be greater than 0".to_string(),
            });
        }
        if self.max_age.is_zero() {
            return Err(BufferError::InvalidConfig {
                reason: "max_age must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Result of one `add` call.
#[derive(Debug)]
pub enum AddOutcome {
    /// The record joined the open window, which now holds `entries` records.
    Buffered { entries: usize },
    /// The record closed the window and the batch was handed to the sink.
    Flushed(FlushReport),
}

impl AddOutcome {
    pub fn is_flushed(&self) -> bool {
        matches!(self, AddOutcome::Flushed(_))
    }

    pub fn flush_report(&self) -> Option<&FlushReport> {
        match self {
            AddOutcome::Flushed(report) => Some(report),
            AddOutcome::Buffered { .. } => None,
        }
    }
}

/// What happened to a closed window. The window is gone either way.
#[derive(Debug)]
pub struct FlushReport {
    pub trigger: FlushTrigger,
    pub entries: usize,
    pub bytes: usize,
    pub window: WindowBounds,
    pub result: Result<DeliveryReceipt, DeliveryError>,
}

impl FlushReport {
    pub fn is_delivered(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Default)]
struct WindowState {
    accumulator: Accumulator,
    entries: usize,
    opened_at: Option<Instant>,
    bounds: Option<WindowBounds>,
}

struct ClosedWindow {
    payload: Vec<u8>,
    entries: usize,
    bounds: WindowBounds,
}

impl WindowState {
    /// Hands out the window's contents and leaves the state empty.
    fn close(&mut self) -> Option<ClosedWindow> {
        let taken = std::mem::take(self);
        let bounds = taken.bounds?;
        if taken.entries == 0 {
            return None;
        }
        Some(ClosedWindow {
            payload: taken.accumulator.into_vec(),
            entries: taken.entries,
            bounds,
        })
    }

    fn is_expired(&self, max_age: Duration) -> bool {
        self.entries > 0 && self.opened_at.is_some_and(|t| t.elapsed() > max_age)
    }
}

/// Accumulates compressed records into a window and ships the window to a
/// sink when it grows to `max_entries` or outlives `max_age`.
///
/// Every mutation, including the delivery that a full window triggers, runs
/// under one lock, so concurrent producers are serialized and at most one
/// flush is in flight.
pub struct BatchBuffer<S> {
    state: Mutex<WindowState>,
    config: BufferConfig,
    compressor: Compressor,
    sink: S,
    stats: Arc<DeliveryStats>,
}

impl<S: Sink> BatchBuffer<S> {
    pub fn new(config: BufferConfig, sink: S) -> Result<Self, BufferError> {
        Self::with_stats(config, sink, Arc::new(DeliveryStats::new()))
    }

    pub fn with_stats(
        config: BufferConfig,
        sink: S,
        stats: Arc<DeliveryStats>,
    ) -> Result<Self, BufferError> {
        config.validate()?;
        Ok(Self {
            state: Mutex::new(WindowState::default()),
            config,
            compressor: Compressor::new(),
            sink,
            stats,
        })
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn stats(&self) -> &Arc<DeliveryStats> {
        &self.stats
    }

    /// Compresses `record` into the open window, then flushes if the window
    /// is full (checked first) or older than `max_age`.
    ///
    /// Only a compression failure is returned as `Err`; delivery failures are
    /// reported inside [`AddOutcome::Flushed`] and through the stats.
    pub async fn add(&self, record: &str) -> Result<AddOutcome, BufferError> {
        let mut state = self.state.lock().await;

        if let Err(e) = self
            .compressor
            .write_record(&mut state.accumulator, record)
        {
            self.stats.record_compression_failure();
            return Err(e);
        }

        let now = Utc::now();
        state.entries += 1;
        match state.bounds.as_mut() {
            Some(bounds) => bounds.end = now,
            None => {
                state.bounds = Some(WindowBounds::starting_at(now));
                state.opened_at = Some(Instant::now());
            }
        }

        let trigger = if state.entries >= self.config.max_entries {
            Some(FlushTrigger::SizeBased)
        } else if state.is_expired(self.config.max_age) {
            Some(FlushTrigger::TimeBased)
        } else {
            None
        };

        if let Some(trigger) = trigger {
            match trigger {
                FlushTrigger::SizeBased => {
                    debug!(entries = state.entries, "Maximum number of records reached")
                }
                _ => debug!(entries = state.entries, "Maximum window age reached"),
            }
            if let Some(closed) = state.close() {
                return Ok(AddOutcome::Flushed(self.ship(closed, trigger).await));
            }
        }

        Ok(AddOutcome::Buffered {
            entries: state.entries,
        })
    }

    /// Flushes the open window regardless of size or age. No-op when empty.
    pub async fn flush(&self) -> Option<FlushReport> {
        let mut state = self.state.lock().await;
        let closed = state.close()?;
        Some(self.ship(closed, FlushTrigger::Manual).await)
    }

    /// Flushes only if the open window has outlived `max_age`.
    pub async fn flush_if_expired(&self) -> Option<FlushReport> {
        let mut state = self.state.lock().await;
        if !state.is_expired(self.config.max_age) {
            return None;
        }
        let closed = state.close()?;
        Some(self.ship(closed, FlushTrigger::TimeBased).await)
    }

    pub async fn entry_count(&self) -> usize {
        self.state.lock().await.entries
    }

    pub async fn compressed_len(&self) -> usize {
        self.state.lock().await.accumulator.len()
    }

    pub async fn window(&self) -> Option<WindowBounds> {
        self.state.lock().await.bounds
    }

    /// Delivers a closed window. Called with the state lock held and the
    /// state already reset.
    async fn ship(&self, closed: ClosedWindow, trigger: FlushTrigger) -> FlushReport {
        let ClosedWindow {
            payload,
            entries,
            bounds,
        } = closed;
        let bytes = payload.len();

        let batch = Batch::new(
            Bytes::from(payload),
            bounds,
            entries,
            self.config.label.clone(),
            trigger,
        );

        let batch_id = batch.id();
        let started = Instant::now();
        let result = self.sink.deliver(batch).await;
        let latency = started.elapsed();

        match &result {
            Ok(receipt) => {
                self.stats.record_delivery(entries, bytes, latency);
                info!(
                    sink = self.sink.name(),
                    batch_id = %batch_id,
                    location = %receipt.location,
                    entries,
                    bytes,
                    trigger = %trigger,
                    latency_ms = latency.as_millis() as u64,
                    "Successfully sent batch"
                );
            }
            Err(e) => {
                self.stats.record_failure(e.kind(), entries, latency);
                if e.is_timeout() {
                    warn!(
                        sink = self.sink.name(),
                        batch_id = %batch_id,
                        entries,
                        bytes,
                        trigger = %trigger,
                        error = %e,
                        "Upload canceled due to timeout, batch dropped"
                    );
                } else {
                    error!(
                        sink = self.sink.name(),
                        batch_id = %batch_id,
                        entries,
                        bytes,
                        trigger = %trigger,
                        error = %e,
                        "Failed to deliver batch, batch dropped"
                    );
                }
            }
        }

        FlushReport {
            trigger,
            entries,
            bytes,
            window: bounds,
            result,
        }
    }
}
