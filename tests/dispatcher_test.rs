use logfwrd::app::{Dispatcher, DispatcherOptions};
use logfwrd::buffer::{Batch, BatchBuffer, BufferConfig, FlushTrigger, decompress};
use logfwrd::sender::{DeliveryError, DeliveryReceipt, Sink};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RecordingSink {
    batches: Mutex<Vec<Batch>>,
    delivered: Notify,
}

impl Sink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, batch: Batch) -> Result<DeliveryReceipt, DeliveryError> {
        let bytes = batch.len();
        self.batches.lock().push(batch);
        self.delivered.notify_one();
        Ok(DeliveryReceipt {
            location: "memory".to_string(),
            status: None,
            bytes,
        })
    }
}

fn buffer(max_entries: usize, max_age: Duration) -> Arc<BatchBuffer<RecordingSink>> {
    Arc::new(
        BatchBuffer::new(
            BufferConfig {
                max_entries,
                max_age,
                label: None,
            },
            RecordingSink::default(),
        )
        .unwrap(),
    )
}

#[tokio::test]
async fn test_records_flow_into_batches() {
    let buffer = buffer(2, Duration::from_secs(3600));
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    for i in 0..5 {
        tx.send(format!("record-{i}")).await.unwrap();
    }
    drop(tx);

    let summary = Dispatcher::new(buffer.clone()).run(rx, cancel).await;

    assert_eq!(summary.records, 5);
    assert_eq!(summary.flushes, 2);
    assert_eq!(buffer.sink().batches.lock().len(), 2);
    // The fifth record is still in the open window; it is discarded by default.
    assert_eq!(buffer.entry_count().await, 1);
}

#[tokio::test]
async fn test_flush_on_shutdown_delivers_partial_window() {
    let buffer = buffer(100, Duration::from_secs(3600));
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let dispatcher = Dispatcher::with_options(
        buffer.clone(),
        DispatcherOptions {
            idle_check_interval: None,
            flush_on_shutdown: true,
        },
    );
    let handle = tokio::spawn(dispatcher.run(rx, cancel.clone()));

    tx.send("partial-1".to_string()).await.unwrap();
    tx.send("partial-2".to_string()).await.unwrap();
    while buffer.entry_count().await < 2 {
        tokio::task::yield_now().await;
    }

    cancel.cancel();
    let summary = handle.await.unwrap();
    assert_eq!(summary.flushes, 1);

    let batches = buffer.sink().batches.lock();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].trigger(), FlushTrigger::Manual);
    assert_eq!(
        decompress(batches[0].payload()).unwrap(),
        "partial-1\npartial-2\n"
    );
}

#[tokio::test(start_paused = true)]
async fn test_idle_sweep_flushes_aged_window() {
    let buffer = buffer(100, Duration::from_secs(1));
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let dispatcher = Dispatcher::with_options(
        buffer.clone(),
        DispatcherOptions {
            idle_check_interval: Some(Duration::from_millis(100)),
            flush_on_shutdown: false,
        },
    );
    let handle = tokio::spawn(dispatcher.run(rx, cancel.clone()));

    tx.send("lonely".to_string()).await.unwrap();

    tokio::time::timeout(Duration::from_secs(10), buffer.sink().delivered.notified())
        .await
        .unwrap();

    {
        let batches = buffer.sink().batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].trigger(), FlushTrigger::TimeBased);
    }

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_without_idle_sweep_age_waits_for_next_record() {
    let buffer = buffer(100, Duration::from_secs(1));
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(Dispatcher::new(buffer.clone()).run(rx, cancel.clone()));

    tx.send("first".to_string()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(buffer.sink().batches.lock().is_empty());

    tx.send("second".to_string()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), buffer.sink().delivered.notified())
        .await
        .unwrap();
    assert_eq!(
        decompress(buffer.sink().batches.lock()[0].payload()).unwrap(),
        "first\nsecond\n"
    );

    cancel.cancel();
    handle.await.unwrap();
}
