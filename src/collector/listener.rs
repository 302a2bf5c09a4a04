use super::CollectorError;
use super::syslog::parse_syslog;
use crate::sender::DeliveryStats;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Largest UDP payload accepted; longer datagrams are truncated by the OS.
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// Receives syslog datagrams over UDP and queues each one as a JSON record.
///
/// The listener never waits on the queue: when it is full the record is
/// dropped and counted.
pub struct SyslogListener {
    socket: UdpSocket,
    tx: mpsc::Sender<String>,
    stats: Arc<DeliveryStats>,
}

impl SyslogListener {
    pub async fn bind(
        addr: &str,
        tx: mpsc::Sender<String>,
        stats: Arc<DeliveryStats>,
    ) -> Result<Self, CollectorError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| CollectorError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        Ok(Self { socket, tx, stats })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, CollectorError> {
        self.socket.local_addr().map_err(CollectorError::Receive)
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<(), CollectorError> {
        if let Ok(addr) = self.socket.local_addr() {
            info!(%addr, "Syslog server listening");
        }

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (len, peer) = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Syslog listener stopping");
                    return Ok(());
                }
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        // ICMP port unreachable and friends surface here on some platforms.
                        warn!(error = %e, "Failed to receive syslog datagram");
                        continue;
                    }
                },
            };

            let text = String::from_utf8_lossy(&buf[..len]);
            let record = match parse_syslog(&text, peer).to_json_line() {
                Ok(record) => record,
                Err(e) => {
                    error!(client = %peer, error = %e, "Failed to create JSON from syslog message");
                    continue;
                }
            };

            match self.tx.try_send(record) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.stats.record_queue_rejection();
                    warn!(client = %peer, "Record queue full, dropping syslog message");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Record queue closed, syslog listener stopping");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn listener(
        capacity: usize,
    ) -> (SyslogListener, mpsc::Receiver<String>, Arc<DeliveryStats>) {
        let (tx, rx) = mpsc::channel(capacity);
        let stats = Arc::new(DeliveryStats::new());
        let listener = SyslogListener::bind("127.0.0.1:0", tx, stats.clone())
            .await
            .unwrap();
        (listener, rx, stats)
    }

    #[tokio::test]
    async fn test_datagram_becomes_json_record() {
        let (listener, mut rx, _) = listener(8).await;
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(listener.run(cancel.clone()));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client
            .send_to(b"<13>Feb  5 01:02:03 host app: hello", addr)
            .await
            .unwrap();

        let record = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&record).unwrap();
        assert_eq!(json["content"], "hello");
        assert_eq!(json["tag"], "app");

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_full_queue_drops_and_counts() {
        let (listener, mut rx, stats) = listener(1).await;
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(listener.run(cancel.clone()));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for i in 0..3 {
            client
                .send_to(format!("message {i}").as_bytes(), addr)
                .await
                .unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while stats.snapshot().records_queue_rejected < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let first: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["content"], "message 0");
        assert_eq!(first["client"], client.local_addr().unwrap().to_string());

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let (tx, _rx) = mpsc::channel(1);
        let err = SyslogListener::bind("not-an-address", tx, Arc::new(DeliveryStats::new()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CollectorError::Bind { .. }));
    }
}
