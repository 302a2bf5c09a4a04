use logfwrd::buffer::{BatchBuffer, BufferConfig, decompress};
use logfwrd::sender::{DeliveryError, HttpSink, HttpSinkConfig, Sink};
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

fn sink_for(server: &MockServer, timeout: Duration) -> HttpSink {
    HttpSink::new(HttpSinkConfig {
        endpoint: format!("{}/ingest", server.uri()),
        authorization: Some("Bearer test-token".to_string()),
        timeout,
        connection_timeout: timeout,
        ..Default::default()
    })
    .unwrap()
}

fn buffer_config(max_entries: usize) -> BufferConfig {
    BufferConfig {
        max_entries,
        max_age: Duration::from_secs(3600),
        label: Some("edge-eu".to_string()),
    }
}

#[tokio::test]
async fn test_batch_is_posted_as_gzip() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ingest"))
        .and(header("content-type", "application/gzip"))
        .and(header("authorization", "Bearer test-token"))
        .and(header("x-log-tag", "edge-eu"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mock_server)
        .await;

    let buffer = BatchBuffer::new(
        buffer_config(2),
        sink_for(&mock_server, Duration::from_secs(5)),
    )
    .unwrap();

    buffer.add(r#"{"msg":"one"}"#).await.unwrap();
    let outcome = buffer.add(r#"{"msg":"two"}"#).await.unwrap();

    let report = outcome.flush_report().unwrap();
    let receipt = report.result.as_ref().unwrap();
    assert_eq!(receipt.status, Some(202));
    assert!(receipt.location.ends_with("/ingest"));

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("content-encoding"));
    assert_eq!(
        decompress(&requests[0].body).unwrap(),
        "{\"msg\":\"one\"}\n{\"msg\":\"two\"}\n"
    );
    assert_eq!(buffer.stats().snapshot().batches_delivered, 1);
}

#[tokio::test]
async fn test_server_error_drops_batch_and_resets() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ingest"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let buffer = BatchBuffer::new(
        buffer_config(2),
        sink_for(&mock_server, Duration::from_secs(5)),
    )
    .unwrap();

    buffer.add("a").await.unwrap();
    let outcome = buffer.add("b").await.unwrap();

    match &outcome.flush_report().unwrap().result {
        Err(DeliveryError::Status { status, body }) => {
            assert_eq!(*status, 500);
            assert_eq!(body, "Internal Server Error");
        }
        other => panic!("Expected status error, got {other:?}"),
    }

    assert_eq!(buffer.entry_count().await, 0);
    assert_eq!(buffer.compressed_len().await, 0);

    let snapshot = buffer.stats().snapshot();
    assert_eq!(snapshot.batches_rejected, 1);
    assert_eq!(snapshot.records_dropped, 2);
}

#[tokio::test]
async fn test_slow_collector_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let buffer = BatchBuffer::new(
        buffer_config(1),
        sink_for(&mock_server, Duration::from_millis(200)),
    )
    .unwrap();

    let outcome = buffer.add("slow").await.unwrap();
    let err = outcome
        .flush_report()
        .unwrap()
        .result
        .as_ref()
        .unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {err}");

    assert_eq!(buffer.entry_count().await, 0);
    assert_eq!(buffer.stats().snapshot().batches_timed_out, 1);
}

#[tokio::test]
async fn test_unreachable_collector_is_transport_error() {
    let sink = HttpSink::new(HttpSinkConfig {
        endpoint: "http://127.0.0.1:1/ingest".to_string(),
        timeout: Duration::from_secs(2),
        connection_timeout: Duration::from_secs(1),
        ..Default::default()
    })
    .unwrap();

    let buffer = BatchBuffer::new(buffer_config(1), sink).unwrap();
    let outcome = buffer.add("nowhere").await.unwrap();
    let err = outcome
        .flush_report()
        .unwrap()
        .result
        .as_ref()
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Transport(_)), "{err}");
}

#[tokio::test]
async fn test_no_tag_header_without_label() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let sink = HttpSink::new(HttpSinkConfig {
        endpoint: mock_server.uri(),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(sink.name(), "http");

    let buffer = BatchBuffer::new(
        BufferConfig {
            max_entries: 1,
            ..Default::default()
        },
        sink,
    )
    .unwrap();
    assert!(
        buffer
            .add("untagged")
            .await
            .unwrap()
            .flush_report()
            .unwrap()
            .is_delivered()
    );

    let requests = mock_server.received_requests().await.unwrap();
    assert!(!requests[0].headers.contains_key("x-log-tag"));
    assert!(!requests[0].headers.contains_key("authorization"));
}
