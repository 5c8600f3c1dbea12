use axum::http::StatusCode;
use flow_core::testing::{services_in, CannedLlm, HostCall, RecordingHost};
use flow_server::{build_router, AppState};
use http_body_util::BodyExt;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn app_with(dir: &TempDir, llm: CannedLlm, host: Arc<RecordingHost>) -> (axum::Router, AppState) {
    let state = AppState::new(services_in(dir.path(), llm), host);
    (build_router(state.clone()), state)
}

fn app(dir: &TempDir) -> axum::Router {
    app_with(dir, CannedLlm::new("# Generated"), Arc::new(RecordingHost::new())).0
}

async fn send(app: axum::Router, req: axum::http::Request<axum::body::Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

fn json(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap_or(serde_json::Value::Null)
}

/// Send a GET request via `oneshot` and return (status, parsed JSON body).
async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = send(app, req).await;
    (status, json(&body))
}

/// POST an urlencoded form and return (status, parsed JSON body).
async fn post_form(app: axum::Router, uri: &str, form: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(axum::body::Body::from(form.to_string()))
        .unwrap();
    let (status, body) = send(app, req).await;
    (status, json(&body))
}

async fn post_json(app: axum::Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let (status, body) = send(app, req).await;
    (status, json(&body))
}

const BOUNDARY: &str = "flowtestboundary";

/// Multipart body with text fields and one file field named `file`.
fn multipart(fields: &[(&str, &str)], file: (&str, &[u8])) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: text/markdown\r\n\r\n",
            file.0
        )
        .as_bytes(),
    );
    body.extend_from_slice(file.1);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_ok() {
    let dir = TempDir::new().unwrap();
    let (status, body) = get(app(&dir), "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn lists_seeded_agents() {
    let dir = TempDir::new().unwrap();
    let (status, body) = get(app(&dir), "/api/agents").await;
    assert_eq!(status, StatusCode::OK);
    let agents = body.as_array().unwrap();
    assert_eq!(agents.len(), 7);
    assert_eq!(agents[1]["name"], "Architecture Agent");
}

#[tokio::test]
async fn get_agent_by_id() {
    let dir = TempDir::new().unwrap();
    let (status, body) = get(app(&dir), "/api/agents/4").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Coding Agent");

    let (status, body) = get(app(&dir), "/api/agents/99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("99"));

    let (status, _) = get(app(&dir), "/api/agents/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_then_delete_agent() {
    let dir = TempDir::new().unwrap();
    let router = app(&dir);

    let (status, body) = post_json(
        router.clone(),
        "/api/agents/create",
        serde_json::json!({ "name": "Docs Agent", "system_prompt": "Write docs." }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 8);

    let req = axum::http::Request::builder()
        .method("DELETE")
        .uri("/api/agents/8")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = send(router.clone(), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "Agent decommissioned successfully");

    let (status, _) = get(router, "/api/agents/8").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_without_name_is_400() {
    let dir = TempDir::new().unwrap();
    let (status, _) = post_json(app(&dir), "/api/agents/create", serde_json::json!({ "name": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn pipeline_status_is_idle() {
    let dir = TempDir::new().unwrap();
    let (status, body) = get(app(&dir), "/api/agents/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], true);
    assert_eq!(body["current_agent"], "Idle");
    assert_eq!(body["queue_depth"], 0);
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chat_requires_query() {
    let dir = TempDir::new().unwrap();
    let (status, body) = post_form(app(&dir), "/api/agents/chat", "query=&agent_id=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "error");
    assert_eq!(body["response"], "Query is required");
}

#[tokio::test]
async fn chat_with_known_agent() {
    let dir = TempDir::new().unwrap();
    let (router, _) = app_with(&dir, CannedLlm::new("Use bcrypt."), Arc::new(RecordingHost::new()));
    let (_, body) = post_form(router, "/api/agents/chat", "query=How+to+store+passwords%3F&agent_id=6").await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["agent"], "Security Scanning Agent");
    assert_eq!(body["response"], "Use bcrypt.");
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_step_number_is_reported_not_rejected() {
    let dir = TempDir::new().unwrap();
    let host = Arc::new(RecordingHost::new());
    let (router, _) = app_with(&dir, CannedLlm::new("x"), host.clone());
    let (status, body) = post_form(router, "/api/agents/orchestrate-sdlc", "step=9&query=hi").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Invalid step number");
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn non_integer_step_is_400() {
    let dir = TempDir::new().unwrap();
    let (status, body) = post_form(app(&dir), "/api/agents/orchestrate-sdlc", "step=two&query=hi").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("step must be an integer"));
}

#[tokio::test]
async fn step_one_creates_repository() {
    let dir = TempDir::new().unwrap();
    let host = Arc::new(RecordingHost::creating("https://github.com/me/sdlc-project-1"));
    let (router, _) = app_with(&dir, CannedLlm::new("# UI/UX Specification: Todo"), host.clone());

    let (status, body) = post_form(
        router,
        "/api/agents/orchestrate-sdlc",
        "step=1&query=Build+a+todo+app&github_url=&github_token=ghp_test",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["step"], 1);
    assert_eq!(body["next_step"], 2);
    assert_eq!(body["agent"], "UI/UX Agent");
    assert_eq!(body["output"], "# UI/UX Specification: Todo");
    assert_eq!(body["github_repo"], "https://github.com/me/sdlc-project-1");

    let calls = host.calls();
    assert_eq!(calls[0], HostCall::SetToken("ghp_test".into()));
    assert!(matches!(calls[1], HostCall::Create { .. }));
}

#[tokio::test]
async fn step_defaults_to_one_and_accepts_multipart_uploads() {
    let dir = TempDir::new().unwrap();
    let host = Arc::new(RecordingHost::new());
    let (router, _) = app_with(&dir, CannedLlm::new("# Spec"), host);

    let body = multipart(&[("query", "")], ("prd.md", b"# Todo\nUsers add tasks"));
    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/api/agents/orchestrate-sdlc")
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(axum::body::Body::from(body))
        .unwrap();
    let (status, body) = send(router, req).await;
    let body = json(&body);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["step"], 1);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("GitHub repository creation skipped"));
}

#[tokio::test]
async fn step_failure_is_200_with_error_status() {
    let dir = TempDir::new().unwrap();
    let (router, _) = app_with(&dir, CannedLlm::failing(), Arc::new(RecordingHost::new()));
    let (status, body) = post_form(router, "/api/agents/orchestrate-sdlc", "step=1&query=Build+a+todo+app").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().starts_with("Step 1 failed: "));
}

// ---------------------------------------------------------------------------
// Downloads & export
// ---------------------------------------------------------------------------

#[tokio::test]
async fn download_registered_report() {
    let dir = TempDir::new().unwrap();
    let (router, state) = app_with(&dir, CannedLlm::new("x"), Arc::new(RecordingHost::new()));
    let path = dir.path().join("impact_analysis_abc.md");
    std::fs::write(&path, "# Impact").unwrap();
    state.registry.register("abc", &path);

    let req = axum::http::Request::builder()
        .uri("/api/agents/download/impact/abc")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("impact_analysis_abc.md"));
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"# Impact");
}

#[tokio::test]
async fn download_unknown_or_deleted_is_404() {
    let dir = TempDir::new().unwrap();
    let (router, state) = app_with(&dir, CannedLlm::new("x"), Arc::new(RecordingHost::new()));

    let (status, body) = get(router.clone(), "/api/agents/download/testing/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Requested report file not found or expired.");

    let path = dir.path().join("gone.pdf");
    std::fs::write(&path, b"%PDF").unwrap();
    state.registry.register("gone", &path);
    std::fs::remove_file(&path).unwrap();
    let (status, _) = get(router, "/api/agents/download/testing/gone").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn export_workflow_json_and_text() {
    let dir = TempDir::new().unwrap();
    let (status, body) = get(app(&dir), "/api/agents/export/workflow/42").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["workflow_id"], "42");
    assert_eq!(body["agents"].as_array().unwrap().len(), 7);

    let req = axum::http::Request::builder()
        .uri("/api/agents/export/workflow/42?format=text")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = send(app(&dir), req).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.starts_with("SDLC Workflow Results\n\nWorkflow ID: 42"));

    let (status, _) = get(app(&dir), "/api/agents/export/workflow/42?format=xml").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
