//! HTTP API tests

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use shipyard::app::state::AppState;
use shipyard::server::serve::router;
use shipyard::server::state::ServerState;

use crate::support::{free_port, Harness, REPO_URL};

fn app_router(h: &Harness) -> Router {
    let state = AppState::with_components(h.settings.clone(), h.store.clone(), h.executor.clone());
    router(Arc::new(ServerState::new(state.orchestrator, state.store)))
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, String) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_health() {
    let h = Harness::new().await;
    let router = app_router(&h);

    let (status, body) = send(&router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "shipyard");

    h.cleanup().await;
}

#[tokio::test]
async fn test_create_and_fetch_stack() {
    let h = Harness::new().await;
    let router = app_router(&h);

    let request = json!({"type": "nodejs", "repo_url": REPO_URL, "port": free_port(), "name": "sample-app"});
    let (status, body) = send(&router, "POST", "/api/v1/stacks", Some(request)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let created: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(created["type"], "nodejs");
    assert_eq!(created["branch"], "master");
    assert_eq!(created["created_successfully"], true);

    let id = created["id"].as_i64().unwrap();
    let (status, body) = send(&router, "GET", &format!("/api/v1/stacks/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    let fetched: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(fetched["uuid"], created["uuid"]);

    let (status, body) = send(&router, "GET", &format!("/api/v1/stacks/{}/deployments", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");

    h.cleanup().await;
}

#[tokio::test]
async fn test_error_status_codes() {
    let h = Harness::new().await;
    let router = app_router(&h);

    let bad_type = json!({"type": "cobol", "repo_url": REPO_URL, "port": free_port()});
    let (status, body) = send(&router, "POST", "/api/v1/stacks", Some(bad_type)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("unsupported stack type"));

    h.executor.fail("git ls-remote", "fatal: repository not found");
    let unreachable = json!({"type": "nodejs", "repo_url": REPO_URL, "port": free_port()});
    let (status, _) = send(&router, "POST", "/api/v1/stacks", Some(unreachable)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&router, "GET", "/api/v1/stacks/42", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&router, "POST", "/api/v1/stacks/42/deploy", Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&router, "GET", "/api/v1/deployments/42/log", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    h.cleanup().await;
}

#[tokio::test]
async fn test_deploy_streams_events_and_saves_log() {
    let h = Harness::new().await;
    let app = h.deployable_app("sample-app").await;
    let router = app_router(&h);

    let (status, body) = send(
        &router,
        "POST",
        &format!("/api/v1/stacks/{}/deploy", app.id),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("data: Checking git status..."));
    assert!(body.contains("data: Deployment completed successfully."));
    assert!(!body.contains("__ERROR__"));

    let (status, body) = send(&router, "GET", "/api/v1/deployments/1/log", None).await;
    assert_eq!(status, StatusCode::OK);
    let log: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(log["deployment_id"], 1);
    assert!(log["log"].as_str().unwrap().contains("Process sample-app is online"));

    h.cleanup().await;
}

#[tokio::test]
async fn test_failed_deploy_ends_with_error_sentinel() {
    let h = Harness::new().await;
    let app = h.deployable_app("sample-app").await;
    h.executor.pm2_status("sample-app", "errored");
    let router = app_router(&h);

    let (status, body) = send(
        &router,
        "POST",
        &format!("/api/v1/stacks/{}/deploy", app.id),
        Some(json!({"git_reset": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let last = body
        .lines()
        .filter(|l| l.starts_with("data: "))
        .last()
        .unwrap();
    assert!(last.starts_with("data: __ERROR__: Process error"), "{}", last);

    let (status, body) = send(&router, "GET", "/api/v1/stacks/1/deployments", None).await;
    assert_eq!(status, StatusCode::OK);
    let deployments: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(deployments[0]["status"], "failed");

    // the transcript is kept for failed attempts too
    let (status, body) = send(&router, "GET", "/api/v1/deployments/1/log", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("__ERROR__"));

    h.cleanup().await;
}
