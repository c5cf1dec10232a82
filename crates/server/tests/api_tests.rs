//! Router tests against a real orchestrator with mocked engine and host.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use tempfile::TempDir;

use common::{fixtures, TestFixture};
use mediaflow_core::JobState;

#[tokio::test]
async fn test_root_status() {
    let fixture = TestFixture::new();
    let response = fixture.get("/").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "success");
}

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/v1/health").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_hides_secrets() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/v1/config").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["engine"]["password_configured"], true);
    assert_eq!(response.body["remote"]["auth"], "password");

    let text = response.body.to_string();
    assert!(!text.contains("secret"));
    assert!(!text.contains("hunter2"));
}

#[tokio::test]
async fn test_create_and_get_pipeline() {
    let fixture = TestFixture::new();
    fixture
        .engine
        .appear_on_submit(fixtures::named_job(
            "abc",
            "Some Film",
            0.25,
            JobState::Downloading,
        ))
        .await;

    let response = fixture
        .post(
            "/api/v1/pipelines",
            json!({
                "magnet_uri": "magnet:?xt=urn:btih:abc",
                "destination": "films",
                "title": "Some Film"
            }),
        )
        .await;
    assert_status!(response, StatusCode::CREATED);
    let id = response.body["id"].as_u64().unwrap();

    let submissions = fixture.engine.submissions().await;
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].destination, "/data/scratch/films");

    // Wait for the acquisition loop to latch the job and report progress
    let mut summary = serde_json::Value::Null;
    for _ in 0..100 {
        summary = fixture.get(&format!("/api/v1/pipelines/{}", id)).await.body;
        if summary["acquisition_percent"] == 25 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(summary["target"], "abc");
    assert_eq!(summary["title"], "Some Film");
    assert_eq!(summary["destination"], "/data/scratch/films");
    assert_eq!(summary["acquisition_percent"], 25);

    let list = fixture.get("/api/v1/pipelines").await;
    assert_status!(list, StatusCode::OK);
    assert_eq!(list.body["total"], 1);

    fixture.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_create_from_torrent_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("movie.torrent"), b"d4:infod4:name4:testee").unwrap();
    let fixture = TestFixture::with_torrent_dir(dir.path());

    let response = fixture
        .post(
            "/api/v1/pipelines",
            json!({
                "torrent_path": "movie.torrent",
                "destination": ""
            }),
        )
        .await;
    assert_status!(response, StatusCode::CREATED);

    let submissions = fixture.engine.submissions().await;
    assert_eq!(submissions[0].destination, "/data/scratch");
    assert!(submissions[0].payload.starts_with("torrent file"));

    fixture.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_torrent_path_disabled_without_torrent_dir() {
    let fixture = TestFixture::new();
    let response = fixture
        .post(
            "/api/v1/pipelines",
            json!({ "torrent_path": "movie.torrent" }),
        )
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("disabled"));
    assert!(fixture.engine.submissions().await.is_empty());
}

#[tokio::test]
async fn test_torrent_path_confined_to_torrent_dir() {
    let dir = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"not a torrent").unwrap();
    let secret = outside.path().join("secret.torrent");
    std::fs::write(&secret, b"d4:infod4:name6:secretee").unwrap();
    let fixture = TestFixture::with_torrent_dir(dir.path());

    let mut rejected = vec![
        secret.to_string_lossy().into_owned(),
        "../secret.torrent".to_string(),
        "notes.txt".to_string(),
        "missing.torrent".to_string(),
    ];
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(&secret, dir.path().join("link.torrent")).unwrap();
        rejected.push("link.torrent".to_string());
    }

    let mut messages = Vec::new();
    for path in &rejected {
        let response = fixture
            .post("/api/v1/pipelines", json!({ "torrent_path": path }))
            .await;
        assert_status!(response, StatusCode::BAD_REQUEST);
        messages.push(response.body["error"].as_str().unwrap().to_string());
    }

    // Same answer whether or not the file exists, never echoing the path
    assert!(messages.iter().all(|m| m == &messages[0]));
    assert!(!messages[0].contains("secret"));
    assert!(fixture.engine.submissions().await.is_empty());
}

#[tokio::test]
async fn test_create_requires_exactly_one_source() {
    let fixture = TestFixture::new();

    let neither = fixture
        .post("/api/v1/pipelines", json!({ "destination": "x" }))
        .await;
    assert_status!(neither, StatusCode::BAD_REQUEST);

    let both = fixture
        .post(
            "/api/v1/pipelines",
            json!({
                "magnet_uri": "magnet:?xt=urn:btih:abc",
                "torrent_path": "/tmp/a.torrent",
                "destination": "x"
            }),
        )
        .await;
    assert_status!(both, StatusCode::BAD_REQUEST);

    let not_magnet = fixture
        .post(
            "/api/v1/pipelines",
            json!({ "magnet_uri": "http://example.com/a.torrent" }),
        )
        .await;
    assert_status!(not_magnet, StatusCode::BAD_REQUEST);

    assert!(fixture.engine.submissions().await.is_empty());
}

#[tokio::test]
async fn test_create_rejects_escaping_destination() {
    let fixture = TestFixture::new();
    let response = fixture
        .post(
            "/api/v1/pipelines",
            json!({
                "magnet_uri": "magnet:?xt=urn:btih:abc",
                "destination": "../outside"
            }),
        )
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_engine_failure_is_bad_gateway() {
    let fixture = TestFixture::new();
    fixture.engine.set_auth_failure("wrong password").await;

    let response = fixture
        .post(
            "/api/v1/pipelines",
            json!({ "magnet_uri": "magnet:?xt=urn:btih:abc", "destination": "x" }),
        )
        .await;

    assert_status!(response, StatusCode::BAD_GATEWAY);
    assert_eq!(fixture.orchestrator.active_count().await, 0);

    // Once the engine accepts the credentials again, submissions go through
    fixture.engine.clear_auth_failure().await;
    let response = fixture
        .post(
            "/api/v1/pipelines",
            json!({ "magnet_uri": "magnet:?xt=urn:btih:abc", "destination": "x" }),
        )
        .await;
    assert_status!(response, StatusCode::CREATED);
    fixture.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_stop_pipeline_is_idempotent() {
    let fixture = TestFixture::new();
    let created = fixture
        .post(
            "/api/v1/pipelines",
            json!({ "magnet_uri": "magnet:?xt=urn:btih:abc", "destination": "x" }),
        )
        .await;
    let id = created.body["id"].as_u64().unwrap();
    let path = format!("/api/v1/pipelines/{}", id);

    assert_status!(fixture.delete(&path).await, StatusCode::NO_CONTENT);
    assert_status!(fixture.delete(&path).await, StatusCode::NO_CONTENT);
    assert_status!(fixture.get(&path).await, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_pipeline() {
    let fixture = TestFixture::new();

    assert_status!(
        fixture.get("/api/v1/pipelines/77").await,
        StatusCode::NOT_FOUND
    );
    assert_status!(
        fixture.delete("/api/v1/pipelines/77").await,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new();
    fixture.get("/api/v1/health").await;

    let (status, body) = fixture.get_text("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("mediaflow_http_requests_total"));
    assert!(body.contains("mediaflow_pipelines_active"));
}
