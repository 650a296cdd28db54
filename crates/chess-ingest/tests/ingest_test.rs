//! End-to-end ingestion against a mock Elasticsearch cluster.

use std::io::Write;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::NamedTempFile;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chess_ingest::ingest;
use chess_types::Settings;

fn archive(count: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for n in 0..count {
        write!(
            file,
            "[Event \"Rated Blitz game\"]\n\
             [Site \"https://lichess.org/game{n:04}\"]\n\
             [White \"white{n}\"]\n\
             [Black \"black{n}\"]\n\
             [Result \"0-1\"]\n\
             [UTCDate \"2013.01.01\"]\n\
             [UTCTime \"00:00:{n:02}\"]\n\
             \n\
             1. f3 e5 2. g4 Qh4# 0-1\n\n"
        )
        .unwrap();
    }
    file.flush().unwrap();
    file
}

fn settings(server: &MockServer) -> Settings {
    let mut settings = Settings::default();
    settings.batch_size = 2;
    settings.workers = Some(2);
    settings.index_name = "chess-test".to_string();
    settings.elastic.url = Some(server.uri());
    settings.elastic.num_workers = Some(1);
    settings.elastic.max_retries = 1;
    settings
}

#[tokio::test]
async fn test_ingest_archive_into_cluster() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .and(body_string_contains(r#""create""#))
        .and(body_string_contains(r#""_index":"chess-test""#))
        .and(body_string_contains("https://lichess.org/game0004"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"errors": false, "items": []})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let file = archive(5);
    let stats = ingest(&settings(&server), file.path()).await.unwrap();

    assert_eq!(stats.records_scanned, 5);
    assert_eq!(stats.batches_dispatched, 3);
    assert_eq!(stats.writer.submitted, 5);

    let indexer = stats.writer.indexer.unwrap();
    assert_eq!(indexer.added, 5);
    assert_eq!(indexer.flushed, 5);
    assert_eq!(indexer.requests, 1);
}

#[tokio::test]
async fn test_flush_threshold_splits_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"errors": false, "items": []})),
        )
        .expect(4)
        .mount(&server)
        .await;

    let mut settings = settings(&server);
    settings.elastic.flush_bytes = 1;

    let file = archive(4);
    let stats = ingest(&settings, file.path()).await.unwrap();

    assert_eq!(stats.writer.indexer.map(|s| s.requests), Some(4));
}

#[tokio::test]
async fn test_cluster_failure_does_not_abort_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let file = archive(3);
    let stats = ingest(&settings(&server), file.path()).await.unwrap();

    // Close failure is logged; the run itself completes with its counters
    assert_eq!(stats.writer.submitted, 3);
    let indexer = stats.writer.indexer.unwrap();
    assert_eq!(indexer.added, 3);
    assert_eq!(indexer.failed, 3);
    assert_eq!(indexer.failed_requests, 1);
    assert_eq!(indexer.requests, 1);
}

#[tokio::test]
async fn test_missing_archive_fails() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let err = ingest(&settings(&server), &dir.path().join("nope.pgn"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Failed to ingest"));
}
