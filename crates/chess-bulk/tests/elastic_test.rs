//! Elasticsearch bulk client tests against a mock HTTP server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{basic_auth, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chess_bulk::{BulkError, BulkIndexer, BulkItem, ElasticBulkIndexer, ElasticConfig};
use chess_types::OpType;

fn item(n: usize) -> BulkItem {
    BulkItem::new(
        "chess-summaries",
        OpType::Create,
        format!(r#"{{"game_id":"g{}"}}"#, n).into_bytes(),
    )
    .with_id(format!("g{}", n))
}

fn config(server: &MockServer) -> ElasticConfig {
    ElasticConfig::new(server.uri(), "chess-summaries")
        .with_num_workers(2)
        .with_initial_backoff(Duration::from_millis(10))
}

fn created(count: usize) -> serde_json::Value {
    let items: Vec<_> = (0..count)
        .map(|n| json!({"create": {"_id": format!("g{}", n), "status": 201}}))
        .collect();
    json!({"took": 3, "errors": false, "items": items})
}

#[tokio::test]
async fn test_flushes_when_threshold_crossed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .and(header("content-type", "application/x-ndjson"))
        .respond_with(ResponseTemplate::new(200).set_body_json(created(1)))
        .expect(3)
        .mount(&server)
        .await;

    // Every item crosses a one-byte threshold
    let mut indexer = ElasticBulkIndexer::open(config(&server).with_flush_bytes(1)).unwrap();
    for n in 0..3 {
        indexer.submit(item(n)).await.unwrap();
        assert_eq!(indexer.buffered_bytes(), 0);
    }

    let stats = indexer.close().await.unwrap();
    assert_eq!(stats.added, 3);
    assert_eq!(stats.requests, 3);
    assert_eq!(stats.flushed, 3);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn test_buffers_until_close() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .and(body_string_contains(r#""_id":"g2""#))
        .and(body_string_contains(r#""_index":"chess-summaries""#))
        .and(body_string_contains(r#"{"game_id":"g2"}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(created(3)))
        .expect(1)
        .mount(&server)
        .await;

    let mut indexer = ElasticBulkIndexer::open(config(&server).with_flush_bytes(1 << 20)).unwrap();
    for n in 0..3 {
        indexer.submit(item(n)).await.unwrap();
    }
    assert!(indexer.buffered_bytes() > 0);

    let stats = indexer.close().await.unwrap();
    assert_eq!(stats.requests, 1);
    assert_eq!(stats.flushed, 3);
    assert!(stats.flushed_bytes > 0);
}

#[tokio::test]
async fn test_sends_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .and(basic_auth("elastic", "changeme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(created(1)))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server)
        .with_credentials("elastic", SecretString::from("changeme".to_string()));
    let mut indexer = ElasticBulkIndexer::open(config).unwrap();
    indexer.submit(item(0)).await.unwrap();

    let stats = indexer.close().await.unwrap();
    assert_eq!(stats.flushed, 1);
}

#[tokio::test]
async fn test_item_failures_are_reported_not_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": true,
            "items": [
                {"create": {"_id": "g0", "status": 201}},
                {"create": {"_id": "g1", "status": 400,
                    "error": {"type": "mapper_parsing_exception", "reason": "bad field"}}},
                {"create": {"_id": "g2", "status": 409,
                    "error": {"type": "version_conflict_engine_exception", "reason": "exists"}}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reported = Arc::new(AtomicUsize::new(0));
    let counter = reported.clone();
    let config = config(&server).with_on_error(move |err| {
        assert!(matches!(err, BulkError::Item { status: 400, .. }));
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let mut indexer = ElasticBulkIndexer::open(config).unwrap();
    for n in 0..3 {
        indexer.submit(item(n)).await.unwrap();
    }

    let stats = indexer.close().await.unwrap();
    assert_eq!(stats.flushed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(reported.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retries_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(created(1)))
        .expect(1)
        .mount(&server)
        .await;

    let mut indexer = ElasticBulkIndexer::open(config(&server).with_max_retries(3)).unwrap();
    indexer.submit(item(0)).await.unwrap();

    let stats = indexer.close().await.unwrap();
    assert_eq!(stats.requests, 1);
    assert_eq!(stats.flushed, 1);
    assert_eq!(stats.failed_requests, 0);
}

#[tokio::test]
async fn test_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let reported = Arc::new(AtomicUsize::new(0));
    let counter = reported.clone();
    let config = config(&server)
        .with_max_retries(2)
        .with_on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    let mut indexer = ElasticBulkIndexer::open(config).unwrap();
    indexer.submit(item(0)).await.unwrap();
    indexer.submit(item(1)).await.unwrap();

    match indexer.close().await {
        Err(BulkError::Flush {
            failed_requests,
            stats,
        }) => {
            assert_eq!(failed_requests, 1);
            assert_eq!(stats.added, 2);
            assert_eq!(stats.requests, 1);
            assert_eq!(stats.failed, 2);
            assert_eq!(stats.flushed, 0);
        }
        other => panic!("expected flush failure, got {:?}", other),
    }
    assert_eq!(reported.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_zero_retries_sends_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let mut indexer = ElasticBulkIndexer::open(config(&server).with_max_retries(0)).unwrap();
    indexer.submit(item(0)).await.unwrap();

    assert!(matches!(
        indexer.close().await,
        Err(BulkError::Flush {
            failed_requests: 1,
            ..
        })
    ));
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let mut indexer = ElasticBulkIndexer::open(config(&server).with_max_retries(5)).unwrap();
    indexer.submit(item(0)).await.unwrap();

    assert!(matches!(
        indexer.close().await,
        Err(BulkError::Flush {
            failed_requests: 1,
            ..
        })
    ));
}

#[tokio::test]
async fn test_submit_after_close_is_rejected() {
    let server = MockServer::start().await;

    let mut indexer = ElasticBulkIndexer::open(config(&server)).unwrap();
    let stats = indexer.close().await.unwrap();
    assert_eq!(stats.requests, 0);

    assert!(matches!(
        indexer.submit(item(0)).await,
        Err(BulkError::Closed)
    ));
    assert!(matches!(indexer.close().await, Err(BulkError::Closed)));
}

#[tokio::test]
async fn test_rejects_multiline_body() {
    let server = MockServer::start().await;

    let mut indexer = ElasticBulkIndexer::open(config(&server)).unwrap();
    let bad = BulkItem::new("chess-summaries", OpType::Create, b"{\n}".to_vec());
    assert!(matches!(indexer.submit(bad).await, Err(BulkError::Parse(_))));

    let stats = indexer.close().await.unwrap();
    assert_eq!(stats.added, 0);
}
