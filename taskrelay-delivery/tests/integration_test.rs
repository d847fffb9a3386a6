use std::sync::Arc;
use std::time::Duration;

use taskrelay_config::{DeliveryConfig, MasterConfig, PathsConfig, TaskRelayConfig};
use taskrelay_core::{ExecutionOutcome, ExecutionRecord, TaskDefinition};
use taskrelay_delivery::{
    DeliveryError, DeliveryPipeline, HttpSender, RecordSender, ReportOutcome, ResultBuffer, SweepSummary,
};
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_record(id: &str) -> ExecutionRecord {
    ExecutionRecord::new(id, TaskDefinition::new("db-export").with_cmd("export.sh")).with_outcome(ExecutionOutcome {
        hostname: "worker-3".to_string(),
        started: "20240505010000".to_string(),
        completed: "20240505010203".to_string(),
        exit_code: 0,
        output: "exported 42 rows".to_string(),
        ..Default::default()
    })
}

fn fast_delivery() -> DeliveryConfig {
    DeliveryConfig {
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(5),
        item_delay: Duration::ZERO,
        ..Default::default()
    }
}

fn pipeline_for(server: &MockServer, staging: &TempDir) -> DeliveryPipeline {
    let sender = HttpSender::new(format!("{}/logger", server.uri()), &fast_delivery()).unwrap();
    DeliveryPipeline::new(
        ResultBuffer::new(staging.path()),
        Arc::new(sender),
        Duration::from_secs(900),
        Duration::ZERO,
    )
}

#[tokio::test]
async fn test_http_sender_posts_json_to_logger() {
    let mock_server = MockServer::start().await;
    let record = create_test_record("run-1");

    Mock::given(method("POST"))
        .and(path("/logger"))
        .and(header("content-type", "application/json; charset=utf-8"))
        .and(body_json(serde_json::to_value(&record).unwrap()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let sender = HttpSender::new(format!("{}/logger", mock_server.uri()), &fast_delivery()).unwrap();
    sender.send(&record.to_json().unwrap()).await.unwrap();
}

#[tokio::test]
async fn test_non_200_status_is_a_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/logger"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&mock_server)
        .await;

    let sender = HttpSender::new(format!("{}/logger", mock_server.uri()), &fast_delivery()).unwrap();
    let err = sender.send(b"{}").await.unwrap_err();

    assert!(matches!(err, DeliveryError::Rejected { status: 201, .. }));
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_unreachable_master_is_a_network_failure() {
    // Port 9 (discard) on localhost is closed in test environments
    let sender = HttpSender::new("http://127.0.0.1:9/logger", &fast_delivery()).unwrap();
    let err = sender.send(b"{}").await.unwrap_err();
    assert!(matches!(err, DeliveryError::Network { .. }));
}

#[tokio::test]
async fn test_report_delivers_and_unstages() {
    let mock_server = MockServer::start().await;
    let staging = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/logger"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let pipeline = pipeline_for(&mock_server, &staging);
    let outcome = pipeline.report(&create_test_record("run-2")).await.unwrap();

    assert_eq!(outcome, ReportOutcome::Delivered);
    assert!(pipeline.pending().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_report_is_resent_by_sweep() {
    let mock_server = MockServer::start().await;
    let staging = TempDir::new().unwrap();

    // First call returns 500, second call returns 200
    Mock::given(method("POST"))
        .and(path("/logger"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/logger"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let pipeline = pipeline_for(&mock_server, &staging);
    let record = create_test_record("run-3");

    let outcome = pipeline.report(&record).await.unwrap();
    let ReportOutcome::Buffered { name } = outcome else {
        panic!("expected the record to be buffered after a 500");
    };
    assert_eq!(pipeline.buffer().load(&name).unwrap(), record);

    let summary = pipeline.sweep_once().await;
    assert_eq!(summary, SweepSummary { sent: 1, failed: 0, skipped: 0 });
    assert!(pipeline.pending().unwrap().is_empty());

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].body, received[1].body);
}

#[tokio::test]
async fn test_sweep_picks_up_legacy_staged_files() {
    let mock_server = MockServer::start().await;
    let staging = TempDir::new().unwrap();
    let record = create_test_record("legacy-1");
    std::fs::write(staging.path().join("20230101000000"), record.to_json().unwrap()).unwrap();

    Mock::given(method("POST"))
        .and(path("/logger"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let pipeline = pipeline_for(&mock_server, &staging);
    assert_eq!(pipeline.sweep_once().await.sent, 1);
    assert!(!staging.path().join("20230101000000").exists());
}

#[tokio::test]
async fn test_pipeline_from_config_targets_master() {
    let mock_server = MockServer::start().await;
    let staging = TempDir::new().unwrap();
    let address = mock_server.address();

    Mock::given(method("POST"))
        .and(path("/logger"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TaskRelayConfig {
        master: MasterConfig {
            host: address.ip().to_string(),
            port: address.port(),
            ..Default::default()
        },
        paths: PathsConfig {
            staging_dir: staging.path().to_path_buf(),
            ..Default::default()
        },
        delivery: fast_delivery(),
        ..Default::default()
    };

    let pipeline = DeliveryPipeline::from_config(&config).unwrap();
    let outcome = pipeline.report(&create_test_record("run-4")).await.unwrap();
    assert_eq!(outcome, ReportOutcome::Delivered);
}

#[tokio::test]
async fn test_sweep_ignores_foreign_files() {
    let mock_server = MockServer::start().await;
    let staging = TempDir::new().unwrap();
    std::fs::write(
        staging.path().join("20240101120000"),
        create_test_record("run-5").to_json().unwrap(),
    )
    .unwrap();
    std::fs::write(staging.path().join("notes.txt"), "operator notes").unwrap();

    Mock::given(method("POST"))
        .and(path("/logger"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let pipeline = pipeline_for(&mock_server, &staging);
    let summary = pipeline.sweep_once().await;

    assert_eq!(summary, SweepSummary { sent: 1, failed: 0, skipped: 0 });
    assert!(!staging.path().join("20240101120000").exists());
    assert_eq!(
        std::fs::read_to_string(staging.path().join("notes.txt")).unwrap(),
        "operator notes"
    );
}
