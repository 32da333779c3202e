use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use devpilot::deploy::config::ProjectType;
use devpilot::projects::store::ProjectStore;
use devpilot::server::caller::CALLER_HEADER;
use devpilot::server::serve::router;
use devpilot::server::state::ServerState;
use serde_json::{json, Value};
use tokio_test::assert_ok;
use tower::ServiceExt;

use crate::support::{harness, line_value, project, Harness, ScriptedExecutor, OWNER};

fn app(h: &Harness) -> Router {
    router(
        Arc::new(ServerState::new(h.orchestrator.clone())),
        Some("http://localhost:5173"),
    )
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(CALLER_HEADER, OWNER);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let h = harness(ScriptedExecutor::exiting("", 0));
    let response = app(&h)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "devpilot");
}

#[tokio::test]
async fn test_deploy_streams_plain_text() {
    let h = harness(ScriptedExecutor::exiting("building\n", 0));
    let body = json!({
        "name": "demo",
        "repo": "https://example.com/demo.git",
        "type": "static",
        "pkg": "npm",
        "main_dir": "./"
    });

    let response = app(&h)
        .oneshot(request(Method::POST, "/deploy", Some(body)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    let text = body_text(response).await;
    assert!(text.starts_with("Connected to server...\nbuilding\n"));
    assert_eq!(line_value(&text, "DEPLOY_STATUS:"), Some("SUCCESS"));
    let id = line_value(&text, "PROJECT_ID:").unwrap();
    assert_eq!(
        line_value(&text, "REDIRECT_URL:"),
        Some(format!("http://localhost:5173/project/{}", id).as_str())
    );
}

#[tokio::test]
async fn test_invalid_deploy_is_rejected_before_streaming() {
    let h = harness(ScriptedExecutor::exiting("", 0));
    let body = json!({ "name": " ", "repo": "https://example.com/x.git", "envVars": "1BAD=x" });

    let response = app(&h)
        .oneshot(request(Method::POST, "/deploy", Some(body)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["name", "type", "envVars"]);
    assert!(h.executor.commands().is_empty());
}

#[tokio::test]
async fn test_unknown_project_type_is_rejected() {
    let h = harness(ScriptedExecutor::exiting("", 0));
    let body = json!({ "name": "x", "repo": "https://example.com/x.git", "type": "django" });

    let response = app(&h)
        .oneshot(request(Method::POST, "/deploy", Some(body)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(h.executor.commands().is_empty());
}

#[tokio::test]
async fn test_missing_caller_is_unauthorized() {
    let h = harness(ScriptedExecutor::exiting("", 0));

    let response = app(&h)
        .oneshot(Request::get("/project").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_project_read_api() {
    let h = harness(ScriptedExecutor::exiting("", 0));
    let mine = assert_ok!(h.store.insert(project("mine", ProjectType::Nest, OWNER, 3000)).await);
    let theirs = assert_ok!(h.store.insert(project("theirs", ProjectType::Nest, "other", 3001)).await);

    let response = app(&h)
        .oneshot(request(Method::GET, "/project", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["total"], 1);
    assert_eq!(body["projects"][0]["name"], "mine");
    assert_eq!(body["projects"][0]["type"], "nest");

    let response = app(&h)
        .oneshot(request(Method::GET, &format!("/project/{}", mine.id), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(&h)
        .oneshot(request(Method::GET, &format!("/project/{}", theirs.id), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app(&h)
        .oneshot(request(Method::GET, "/project/nope", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_restart_static_over_http() {
    let h = harness(ScriptedExecutor::exiting("", 0));
    let site = assert_ok!(h.store.insert(project("site", ProjectType::Static, OWNER, 3000)).await);

    let response = app(&h)
        .oneshot(request(
            Method::POST,
            &format!("/project/{}/restart", site.id),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(
        body["error"],
        "Operation 'restart' is not supported for project type 'static'"
    );
    assert!(h.executor.commands().is_empty());
}

#[tokio::test]
async fn test_delete_route() {
    let h = harness(ScriptedExecutor::exiting("bye\n", 0));
    let api = assert_ok!(h.store.insert(project("api", ProjectType::Express, OWNER, 3000)).await);

    let response = app(&h)
        .oneshot(request(
            Method::DELETE,
            &format!("/project/{}/delete", api.id),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(text.contains("bye\nCommand finished (exit=0, signal=none)\n"));
    assert!(assert_ok!(h.store.get(&api.id).await).is_none());
}
