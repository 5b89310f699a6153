use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use spool_lite::config::ServerConfig;
use spool_lite::dashboard::{router, DashboardState};
use spool_lite::scheduler::{ClientId, JobStatus, Submission};
use spool_lite::Spooler;

/// Helper to create a spooler that is not yet listening
fn create_test_spooler(logs: &tempfile::TempDir) -> Arc<Spooler> {
    let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
        .with_quantum(Duration::from_millis(10))
        .with_logs_dir(logs.path());
    Arc::new(Spooler::new(config))
}

fn create_test_app(spooler: Arc<Spooler>) -> Router {
    router(DashboardState { spooler })
}

async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_status_endpoint_when_stopped() {
    let logs = tempfile::tempdir().unwrap();
    let app = create_test_app(create_test_spooler(&logs));

    let (status, json) = send(app, "GET", "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["running"], false);
    assert_eq!(json["processing"], false);
    assert_eq!(json["quantum"], 0);
    assert_eq!(json["pool"]["available_paper"], 2);
    assert_eq!(json["pool"]["available_printer"], 1);
    assert!(json["admission"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_start_and_stop_endpoints() {
    let logs = tempfile::tempdir().unwrap();
    let spooler = create_test_spooler(&logs);

    let (status, json) = send(create_test_app(spooler.clone()), "POST", "/api/server/start").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["running"], true);
    assert!(json["addr"].as_str().unwrap().starts_with("127.0.0.1:"));
    assert!(spooler.is_running().await);

    let (_, json) = send(create_test_app(spooler.clone()), "GET", "/api/status").await;
    assert_eq!(json["running"], true);

    let (status, json) = send(create_test_app(spooler.clone()), "POST", "/api/server/stop").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["running"], false);
    let saved = json["session_log"].as_str().unwrap().to_string();
    assert!(std::path::Path::new(&saved).exists());

    // A second stop is a no-op
    let (_, json) = send(create_test_app(spooler.clone()), "POST", "/api/server/stop").await;
    assert_eq!(json["success"], true);
    assert!(json["session_log"].is_null());
}

#[tokio::test]
async fn test_begin_endpoint_starts_processing() {
    let logs = tempfile::tempdir().unwrap();
    let spooler = create_test_spooler(&logs);
    spooler.start_server().await.unwrap();

    let (status, json) = send(create_test_app(spooler.clone()), "POST", "/api/begin").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["processing"], true);
    assert!(spooler.status().await.processing);

    let _ = spooler.stop_server().await;
}

#[tokio::test]
async fn test_resolve_endpoint_reports_counters() {
    let logs = tempfile::tempdir().unwrap();
    let spooler = create_test_spooler(&logs);

    {
        let state = spooler.state();
        let mut state = state.lock().await;
        let submission = Submission::parse("paper|1\nstuck").unwrap();
        let n = state.admit(ClientId(7), "simulated", submission);
        let state = &mut *state;
        let job = state.jobs.get_mut(n).unwrap();
        state.pool.try_acquire_paper(job);
        job.set_status(JobStatus::Blocked);
    }

    let (status, json) = send(create_test_app(spooler.clone()), "POST", "/api/resolve").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["preempted"], serde_json::json!([1]));
    assert_eq!(json["promoted"], serde_json::json!([1]));
    assert_eq!(json["released_paper"], 1);
    assert_eq!(json["granted_paper"], 1);
    assert_eq!(json["granted_printer"], 1);

    let (_, json) = send(create_test_app(spooler), "GET", "/api/status").await;
    assert_eq!(json["processing"], true);
    assert_eq!(json["ready"].as_array().unwrap().len(), 1);
    assert_eq!(json["pool"]["available_printer"], 0);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let logs = tempfile::tempdir().unwrap();
    let app = create_test_app(create_test_spooler(&logs));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/jobs")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
