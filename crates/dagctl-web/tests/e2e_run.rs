//! End-to-end tests for the HTTP front end.
//!
//! These tests spin up the **real** dagctl router on an OS-assigned ephemeral
//! port, backed by a real [`AirflowClient`] that talks to a fake Airflow
//! served on a second ephemeral port.  Requests go through `reqwest`.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use dagctl_adapters::{AirflowClient, ClientConfig};
use dagctl_web::{WebConfig, WebServer};

// ── fake upstream ────────────────────────────────────────────────────────────

type Dags = Arc<Mutex<BTreeMap<String, bool>>>;

fn dag_json(id: &str, paused: bool) -> Value {
    json!({
        "dag_id": id,
        "is_paused": paused,
        "is_active": true,
        "schedule_interval": { "__type": "CronExpression", "value": "0 2 * * *" },
        "tags": [{ "name": "nightly" }],
        "owners": ["data"]
    })
}

async fn list_dags(State(dags): State<Dags>) -> Json<Value> {
    let dags: Vec<Value> = dags
        .lock()
        .unwrap()
        .iter()
        .map(|(id, paused)| dag_json(id, *paused))
        .collect();
    Json(json!({ "total_entries": dags.len(), "dags": dags }))
}

async fn get_dag(State(dags): State<Dags>, Path(id): Path<String>) -> (StatusCode, Json<Value>) {
    match dags.lock().unwrap().get(&id) {
        Some(paused) => (StatusCode::OK, Json(dag_json(&id, *paused))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "title": "DAG not found" })),
        ),
    }
}

async fn patch_dag(
    State(dags): State<Dags>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let paused = body["is_paused"].as_bool().unwrap_or(false);
    dags.lock().unwrap().insert(id.clone(), paused);
    Json(dag_json(&id, paused))
}

async fn dag_runs(Path(_id): Path<String>) -> Json<Value> {
    Json(json!({ "dag_runs": [], "total_entries": 0 }))
}

async fn trigger(Path(id): Path<String>) -> Json<Value> {
    Json(json!({
        "dag_id": id,
        "dag_run_id": "manual__2024-05-02T12:00:00+00:00",
        "state": "queued",
        "execution_date": "2024-05-02T12:00:00+00:00"
    }))
}

async fn start_fake_airflow() -> String {
    let dags: Dags = Arc::new(Mutex::new(BTreeMap::from([
        ("etl_daily".to_string(), false),
        ("reporting_weekly".to_string(), true),
    ])));
    let app = Router::new()
        .route("/api/v1/dags", get(list_dags))
        .route("/api/v1/dags/{dag_id}", get(get_dag).patch(patch_dag))
        .route("/api/v1/dags/{dag_id}/dagRuns", get(dag_runs).post(trigger))
        .route(
            "/api/v1/health",
            get(|| async { Json(json!({ "metadatabase": { "status": "healthy" } })) }),
        )
        .with_state(dags);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind to port 0");
    let addr: SocketAddr = listener.local_addr().expect("get local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://127.0.0.1:{}/api/v1", addr.port())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn fast_config(base_url: String) -> ClientConfig {
    ClientConfig {
        backoff_base_ms: 5,
        page_delay_ms: 1,
        timeout_secs: 5,
        ..ClientConfig::new(base_url)
    }
}

struct TestServer {
    base: String,
    client: Arc<AirflowClient>,
    shutdown: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

/// Start the dagctl server in front of `upstream`.
async fn start_test_server(upstream: String) -> TestServer {
    let client = Arc::new(AirflowClient::new(fast_config(upstream)).expect("client"));
    let server = WebServer::new(WebConfig::default(), Arc::clone(&client)).expect("server");

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind to port 0");
    let addr: SocketAddr = listener.local_addr().expect("get local addr");
    let (tx, rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        server
            .serve(listener, async {
                rx.await.ok();
            })
            .await
            .ok();
    });

    // Small yield so the listener is ready.
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    TestServer {
        base: format!("http://127.0.0.1:{}", addr.port()),
        client,
        shutdown: tx,
        handle,
    }
}

async fn run_query(base: &str, query: &str) -> Value {
    let resp = reqwest::Client::new()
        .post(format!("{base}/run"))
        .json(&json!({ "query": query }))
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), 200);
    resp.json().await.expect("invalid JSON")
}

// ── GET / ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn root_returns_ready_payload() {
    let srv = start_test_server(start_fake_airflow().await).await;

    let json: Value = reqwest::get(format!("{}/", srv.base))
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid JSON");

    assert_eq!(json["server"], "dagctl");
    assert_eq!(json["status"], "ready");
    assert!(json["version"].is_string());
}

// ── POST /run ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn run_lists_every_dag() {
    let srv = start_test_server(start_fake_airflow().await).await;

    let json = run_query(&srv.base, "list all dags").await;
    assert_eq!(json["success"], true);
    assert!(json.get("error").is_none());
    assert_eq!(json["output"]["count"], 2);
    assert_eq!(json["output"]["dags"][0]["dag_id"], "etl_daily");
    assert_eq!(json["output"]["dags"][0]["schedule_interval"], "0 2 * * *");
    assert_eq!(json["output"]["dags"][0]["tags"], json!(["nightly"]));
}

#[tokio::test]
async fn run_pause_is_idempotent_and_verified() {
    let srv = start_test_server(start_fake_airflow().await).await;

    let first = run_query(&srv.base, "pause etl_daily").await;
    assert_eq!(first["success"], true);
    assert_eq!(first["output"]["was_paused"], false);
    assert_eq!(first["output"]["is_now_paused"], true);
    assert_eq!(first["output"]["changed"], true);

    let second = run_query(&srv.base, "pause etl_daily").await;
    assert_eq!(second["output"]["was_paused"], true);
    assert_eq!(second["output"]["is_now_paused"], true);
    assert_eq!(second["output"]["changed"], false);
    assert_eq!(
        second["output"]["message"],
        "DAG 'etl_daily' was already paused"
    );
}

#[tokio::test]
async fn run_trigger_and_latest_run() {
    let srv = start_test_server(start_fake_airflow().await).await;

    let json = run_query(&srv.base, "trigger etl_daily").await;
    assert_eq!(json["success"], true);
    assert_eq!(json["output"]["state"], "queued");

    let json = run_query(&srv.base, "latest run for etl_daily").await;
    assert_eq!(json["success"], true);
    assert_eq!(
        json["output"]["message"],
        "No runs found for DAG 'etl_daily'"
    );
}

#[tokio::test]
async fn run_search_matches_substring() {
    let srv = start_test_server(start_fake_airflow().await).await;

    let json = run_query(&srv.base, "search for WEEKLY").await;
    assert_eq!(json["output"]["matches"], 1);
    assert_eq!(json["output"]["dags"][0]["dag_id"], "reporting_weekly");
}

#[tokio::test]
async fn run_unknown_query_is_failure_envelope() {
    let srv = start_test_server(start_fake_airflow().await).await;

    let json = run_query(&srv.base, "what is the weather").await;
    assert_eq!(json["success"], false);
    assert!(json.get("output").is_none());
    assert!(
        json["error"]
            .as_str()
            .unwrap()
            .starts_with("Could not understand query: 'what is the weather'")
    );
}

#[tokio::test]
async fn run_missing_query_reads_as_empty() {
    let srv = start_test_server(start_fake_airflow().await).await;

    let json: Value = reqwest::Client::new()
        .post(format!("{}/run", srv.base))
        .json(&json!({}))
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid JSON");
    assert_eq!(json["success"], false);
    assert!(
        json["error"]
            .as_str()
            .unwrap()
            .starts_with("Could not understand query: ''")
    );
}

#[tokio::test]
async fn run_rejects_non_json_body() {
    let srv = start_test_server(start_fake_airflow().await).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/run", srv.base))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), 400);
    let json: Value = resp.json().await.expect("invalid JSON");
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn run_upstream_unreachable_is_failure_envelope() {
    let srv = start_test_server("http://127.0.0.1:9/api/v1".to_string()).await;

    let json = run_query(&srv.base, "details of etl_daily").await;
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().starts_with("Airflow error:"));
}

// ── GET /api/status ──────────────────────────────────────────────────────────

#[tokio::test]
async fn status_reports_upstream_health() {
    let srv = start_test_server(start_fake_airflow().await).await;

    let json: Value = reqwest::get(format!("{}/api/status", srv.base))
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid JSON");
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["upstream"]["metadatabase"]["status"], "healthy");
}

// ── POST /mcp ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn mcp_tools_call_over_http() {
    let srv = start_test_server(start_fake_airflow().await).await;

    let json: Value = reqwest::Client::new()
        .post(format!("{}/mcp", srv.base))
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": "unpause_dag", "arguments": { "dag_id": "reporting_weekly" } }
        }))
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid JSON");

    assert_eq!(json["id"], 1);
    let text = json["result"]["content"][0]["text"].as_str().unwrap();
    let output: Value = serde_json::from_str(text).expect("text is JSON");
    assert_eq!(output["message"], "DAG 'reporting_weekly' is now active");
}

#[tokio::test]
async fn mcp_notification_is_accepted_without_body() {
    let srv = start_test_server(start_fake_airflow().await).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/mcp", srv.base))
        .json(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), 202);
}

// ── shutdown ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn shutdown_closes_upstream_client() {
    let srv = start_test_server(start_fake_airflow().await).await;
    assert!(!srv.client.is_closed());

    srv.shutdown.send(()).expect("server still running");
    srv.handle.await.expect("server task");

    assert!(srv.client.is_closed());
}
