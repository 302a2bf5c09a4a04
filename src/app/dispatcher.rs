use crate::buffer::{AddOutcome, BatchBuffer};
use crate::sender::Sink;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherOptions {
    /// When set, the window age is also checked on this tick.
    pub idle_check_interval: Option<Duration>,
    pub flush_on_shutdown: bool,
}

/// Counts kept by one dispatcher run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub records: u64,
    pub rejected: u64,
    pub flushes: u64,
}

/// Single consumer between the record queue and the batch buffer.
pub struct Dispatcher<S> {
    buffer: Arc<BatchBuffer<S>>,
    options: DispatcherOptions,
}

impl<S: Sink> Dispatcher<S> {
    pub fn new(buffer: Arc<BatchBuffer<S>>) -> Self {
        Self::with_options(buffer, DispatcherOptions::default())
    }

    pub fn with_options(buffer: Arc<BatchBuffer<S>>, options: DispatcherOptions) -> Self {
        Self { buffer, options }
    }

    /// Feeds records into the buffer until the queue closes or `cancel`
    /// fires. Delivery and compression failures are logged and never end
    /// the loop.
    pub async fn run(
        self,
        mut rx: mpsc::Receiver<String>,
        cancel: CancellationToken,
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        let mut idle_tick = self.options.idle_check_interval.map(|period| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        info!(
            max_records = self.buffer.config().max_entries,
            max_interval = ?self.buffer.config().max_age,
            idle_check = ?self.options.idle_check_interval,
            "Dispatcher started"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Dispatcher received shutdown");
                    break;
                }
                record = rx.recv() => match record {
                    Some(record) => self.dispatch(&record, &mut summary).await,
                    None => {
                        debug!("Record queue closed");
                        break;
                    }
                },
                _ = tick(&mut idle_tick) => {
                    if self.buffer.flush_if_expired().await.is_some() {
                        summary.flushes += 1;
                    }
                }
            }
        }

        if self.options.flush_on_shutdown {
            if self.buffer.flush().await.is_some() {
                summary.flushes += 1;
            }
        } else {
            let pending = self.buffer.entry_count().await;
            if pending > 0 {
                warn!(entries = pending, "Discarding open batch on shutdown");
            }
        }

        info!(
            records = summary.records,
            rejected = summary.rejected,
            flushes = summary.flushes,
            "Dispatcher stopped"
        );
        summary
    }

    async fn dispatch(&self, record: &str, summary: &mut DispatchSummary) {
        summary.records += 1;
        match self.buffer.add(record).await {
            Ok(AddOutcome::Flushed(_)) => summary.flushes += 1,
            Ok(AddOutcome::Buffered { .. }) => {}
            Err(e) => {
                summary.rejected += 1;
                warn!(error = %e, "Failed to add record to buffer");
            }
        }
    }
}

async fn tick(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
