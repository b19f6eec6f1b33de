use base64::Engine;
use drive_etl::config::{AppConfig, ChainMode, Endpoints, RetryPolicy};
use drive_etl::core::sanitize::sanitize;
use drive_etl::{EtlEngine, EtlError, TaskState};
use httpmock::prelude::*;
use httpmock::Mock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const PROJECT: &str = "analytics-prod";
const BUCKET: &str = "staging-bucket";
const FOLDER: &str = "folder-123";
const TEST_PRIVATE_KEY: &str = include_str!("fixtures/test_rsa_key.pem");

fn sample(file_name: &str) -> Vec<u8> {
    std::fs::read(
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures/samples")
            .join(file_name),
    )
    .unwrap()
}

fn config(server: &MockServer) -> Arc<AppConfig> {
    let mut config = AppConfig::new(PROJECT, BUCKET, FOLDER);
    config.endpoints = Endpoints::all(&server.base_url());
    config.access_token = Some("ambient-token".to_string());
    config.retry = RetryPolicy {
        retries: 1,
        delay: Duration::ZERO,
    };
    config.load_poll_interval = Duration::from_millis(5);
    Arc::new(config)
}

struct AuthMocks<'a> {
    secret: Mock<'a>,
    token: Mock<'a>,
}

async fn mock_auth(server: &MockServer) -> AuthMocks<'_> {
    let key = serde_json::json!({
        "type": "service_account",
        "project_id": PROJECT,
        "private_key_id": "key-1",
        "private_key": TEST_PRIVATE_KEY,
        "client_email": "etl@analytics-prod.iam.gserviceaccount.com",
        "token_uri": server.url("/token"),
    });
    let payload = base64::engine::general_purpose::STANDARD.encode(key.to_string());

    let secret = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/projects/analytics-prod/secrets/ecommerce_elt_pipeline_service_account/versions/latest:access")
                .header("Authorization", "Bearer ambient-token");
            then.status(200).json_body(serde_json::json!({
                "name": "projects/analytics-prod/secrets/ecommerce_elt_pipeline_service_account/versions/3",
                "payload": {"data": payload}
            }));
        })
        .await;
    let token = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/token")
                .body_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer");
            then.status(200).json_body(serde_json::json!({
                "access_token": "drive-token",
                "expires_in": 3599,
                "token_type": "Bearer"
            }));
        })
        .await;

    AuthMocks { secret, token }
}

fn drive_query(file_name: &str) -> String {
    format!("'{}' in parents and name = '{}' and trashed = false", FOLDER, file_name)
}

struct TableMocks<'a> {
    upload: Mock<'a>,
    load: Mock<'a>,
}

/// Drive listing and download, the staging upload of the sanitized text and
/// a load job that finishes immediately.
async fn mock_table<'a>(server: &'a MockServer, table: &str) -> TableMocks<'a> {
    let file_name = format!("{table}.csv");
    let raw = sample(&file_name);
    let expected = sanitize(&raw).unwrap().text;
    let file_id = format!("id-{table}");

    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/drive/v3/files")
                .header("Authorization", "Bearer drive-token")
                .query_param("q", drive_query(&file_name));
            then.status(200).json_body(serde_json::json!({
                "files": [{"id": file_id, "name": file_name, "modifiedTime": "2024-11-15T08:00:00Z"}]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path(format!("/drive/v3/files/{file_id}"))
                .query_param("alt", "media");
            then.status(200).body(raw.clone());
        })
        .await;
    let upload = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(format!("/upload/storage/v1/b/{BUCKET}/o"))
                .query_param("name", format!("data/{file_name}"))
                .header("Authorization", "Bearer ambient-token")
                .header("Content-Type", "text/csv")
                .body(expected.clone());
            then.status(200).json_body(serde_json::json!({
                "name": format!("data/{file_name}"),
                "bucket": BUCKET,
                "generation": "1731657600000000"
            }));
        })
        .await;
    let load = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(format!("/bigquery/v2/projects/{PROJECT}/jobs"))
                .json_body_partial(
                    serde_json::json!({
                        "configuration": {"load": {
                            "sourceUris": [format!("gs://{BUCKET}/data/{file_name}")],
                            "destinationTable": {"projectId": PROJECT, "datasetId": "ecommerce_data", "tableId": table},
                            "writeDisposition": "WRITE_TRUNCATE",
                            "skipLeadingRows": 1
                        }}
                    })
                    .to_string(),
                );
            then.status(200).json_body(serde_json::json!({
                "jobReference": {"projectId": PROJECT, "jobId": format!("job-{table}")},
                "status": {"state": "DONE"},
                "statistics": {"load": {"outputRows": "2"}}
            }));
        })
        .await;

    TableMocks { upload, load }
}

async fn mock_missing(server: &MockServer, table: &str) {
    let file_name = format!("{table}.csv");
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/drive/v3/files")
                .query_param("q", drive_query(&file_name));
            then.status(200).json_body(serde_json::json!({"files": []}));
        })
        .await;
}

fn only(tables: &[&str]) -> Vec<String> {
    tables.iter().map(|t| t.to_string()).collect()
}

fn state<'r>(report: &'r drive_etl::RunReport, task_id: &str) -> &'r TaskState {
    &report.task(task_id).unwrap().state
}

#[tokio::test]
async fn test_run_stages_and_loads_each_table() {
    let server = MockServer::start_async().await;
    let auth = mock_auth(&server).await;
    let customers = mock_table(&server, "olist_customers").await;
    let orders = mock_table(&server, "olist_orders").await;

    let engine = EtlEngine::connect(config(&server)).await.unwrap();
    let report = engine
        .run(&only(&["olist_customers", "olist_orders"]), None)
        .await
        .unwrap();

    assert!(report.is_success(), "{:?}", report.tasks);
    assert_eq!(report.tasks.len(), 4);
    assert_eq!(report.dropped_rows(), 1);
    assert_eq!(
        report.task("stage_olist_customers").unwrap().output.dropped_rows,
        Some(1)
    );
    assert_eq!(
        report.task("load_olist_orders").unwrap().output.job_id.as_deref(),
        Some("job-olist_orders")
    );

    customers.upload.assert_async().await;
    customers.load.assert_async().await;
    orders.upload.assert_async().await;
    orders.load.assert_async().await;
    auth.secret.assert_hits_async(1).await;
    auth.token.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_second_run_overwrites_with_identical_content() {
    let server = MockServer::start_async().await;
    mock_auth(&server).await;
    let customers = mock_table(&server, "olist_customers").await;

    let engine = EtlEngine::connect(config(&server)).await.unwrap();
    let tables = only(&["olist_customers"]);
    let first = engine.run(&tables, None).await.unwrap();
    let second = engine.run(&tables, None).await.unwrap();

    assert!(first.is_success() && second.is_success());
    assert_ne!(first.run_id, second.run_id);
    customers.upload.assert_hits_async(2).await;
    customers.load.assert_hits_async(2).await;
}

#[tokio::test]
async fn test_missing_file_only_fails_its_own_table() {
    let server = MockServer::start_async().await;
    mock_auth(&server).await;
    let customers = mock_table(&server, "olist_customers").await;
    mock_missing(&server, "olist_orders").await;
    let sellers = mock_table(&server, "olist_sellers").await;

    let engine = EtlEngine::connect(config(&server)).await.unwrap();
    let report = engine
        .run(
            &only(&["olist_customers", "olist_orders", "olist_sellers"]),
            Some(ChainMode::Independent),
        )
        .await
        .unwrap();

    assert!(matches!(
        state(&report, "stage_olist_orders"),
        TaskState::Failed(msg) if msg.contains("olist_orders.csv")
    ));
    assert_eq!(report.task("stage_olist_orders").unwrap().attempts, 1);
    assert_eq!(state(&report, "load_olist_orders"), &TaskState::UpstreamFailed);
    assert!(state(&report, "load_olist_customers").is_success());
    assert!(state(&report, "load_olist_sellers").is_success());
    customers.load.assert_async().await;
    sellers.load.assert_async().await;
}

#[tokio::test]
async fn test_linear_chain_stops_at_first_failure() {
    let server = MockServer::start_async().await;
    mock_auth(&server).await;
    let customers = mock_table(&server, "olist_customers").await;
    mock_missing(&server, "olist_orders").await;
    let sellers = mock_table(&server, "olist_sellers").await;

    let engine = EtlEngine::connect(config(&server)).await.unwrap();
    let report = engine
        .run(
            &only(&["olist_customers", "olist_orders", "olist_sellers"]),
            Some(ChainMode::Linear),
        )
        .await
        .unwrap();

    assert!(state(&report, "load_olist_customers").is_success());
    assert_eq!(state(&report, "stage_olist_sellers"), &TaskState::UpstreamFailed);
    assert_eq!(state(&report, "load_olist_sellers"), &TaskState::UpstreamFailed);
    customers.load.assert_async().await;
    sellers.upload.assert_hits_async(0).await;
    sellers.load.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_unavailable_storage_is_retried_then_reported() {
    let server = MockServer::start_async().await;
    mock_auth(&server).await;
    let file_name = "olist_sellers.csv";
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/drive/v3/files")
                .query_param("q", drive_query(file_name));
            then.status(200).json_body(serde_json::json!({
                "files": [{"id": "id-sellers", "name": file_name}]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/drive/v3/files/id-sellers");
            then.status(200).body(sample(file_name));
        })
        .await;
    let upload = server
        .mock_async(|when, then| {
            when.method(POST).path(format!("/upload/storage/v1/b/{BUCKET}/o"));
            then.status(503)
                .json_body(serde_json::json!({"error": {"code": 503, "message": "Backend Error"}}));
        })
        .await;
    let load = server
        .mock_async(|when, then| {
            when.method(POST).path(format!("/bigquery/v2/projects/{PROJECT}/jobs"));
            then.status(200).json_body(serde_json::json!({}));
        })
        .await;

    let engine = EtlEngine::connect(config(&server)).await.unwrap();
    let report = engine.run(&only(&["olist_sellers"]), None).await.unwrap();

    let stage = report.task("stage_olist_sellers").unwrap();
    assert!(matches!(stage.state, TaskState::Failed(_)));
    assert_eq!(stage.attempts, 2);
    upload.assert_hits_async(2).await;
    load.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_failed_load_job_is_not_retried() {
    let server = MockServer::start_async().await;
    mock_auth(&server).await;
    let file_name = "olist_products.csv";
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/drive/v3/files")
                .query_param("q", drive_query(file_name));
            then.status(200).json_body(serde_json::json!({
                "files": [{"id": "id-products", "name": file_name}]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/drive/v3/files/id-products");
            then.status(200).body(sample(file_name));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(format!("/upload/storage/v1/b/{BUCKET}/o"));
            then.status(200)
                .json_body(serde_json::json!({"name": "data/olist_products.csv"}));
        })
        .await;
    let load = server
        .mock_async(|when, then| {
            when.method(POST).path(format!("/bigquery/v2/projects/{PROJECT}/jobs"));
            then.status(200).json_body(serde_json::json!({
                "jobReference": {"projectId": PROJECT, "jobId": "job-products"},
                "status": {
                    "state": "DONE",
                    "errorResult": {"reason": "invalid", "message": "Error while reading data"}
                }
            }));
        })
        .await;

    let engine = EtlEngine::connect(config(&server)).await.unwrap();
    let report = engine.run(&only(&["olist_products"]), None).await.unwrap();

    let task = report.task("load_olist_products").unwrap();
    assert!(matches!(&task.state, TaskState::Failed(msg) if msg.contains("Error while reading data")));
    assert_eq!(task.attempts, 1);
    load.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_missing_secret_aborts_before_any_table() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/secrets/");
            then.status(404)
                .json_body(serde_json::json!({"error": {"code": 404, "message": "Secret not found"}}));
        })
        .await;
    let drive = server
        .mock_async(|when, then| {
            when.path_contains("/drive/");
            then.status(500);
        })
        .await;

    let result = EtlEngine::connect(config(&server)).await;

    assert!(matches!(result, Err(EtlError::NotFound { .. })));
    drive.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_summary_file_records_task_states() {
    let server = MockServer::start_async().await;
    mock_auth(&server).await;
    mock_table(&server, "olist_geolocation").await;
    mock_missing(&server, "olist_sellers").await;

    let engine = EtlEngine::connect(config(&server)).await.unwrap();
    let report = engine
        .run(&only(&["olist_geolocation", "olist_sellers"]), None)
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("summary.json");
    report.write_json(&path).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["chain_mode"], "independent");
    let tasks = json["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 4);
    assert_eq!(tasks[0]["task_id"], "stage_olist_geolocation");
    assert_eq!(tasks[0]["state"]["status"], "success");
    assert_eq!(tasks[0]["output"]["dropped_rows"], 0);
    assert_eq!(tasks[2]["state"]["status"], "failed");
    assert_eq!(tasks[3]["state"]["status"], "upstream_failed");
    assert_eq!(report.summary()["failed_tasks"], 2);
}
