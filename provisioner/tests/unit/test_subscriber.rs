//! Push endpoint tests

use std::sync::{Arc, Mutex};

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use tower::ServiceExt;

use provisioner::models::deployment::{DeploymentAction, DeploymentRequest};
use provisioner::pubsub::subscriber::{Dispatch, Subscriber};
use provisioner::server::serve::router;
use provisioner::server::state::ServerState;

const SUBSCRIPTION: &str = "projects/canvas/subscriptions/provisioner";

#[derive(Default)]
struct RecordingDispatch {
    dispatched: Mutex<Vec<(String, DeploymentRequest)>>,
}

impl RecordingDispatch {
    fn message_ids(&self) -> Vec<String> {
        self.dispatched
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl Dispatch for RecordingDispatch {
    fn dispatch(&self, request: DeploymentRequest, message_id: String) {
        self.dispatched.lock().unwrap().push((message_id, request));
    }
}

fn app() -> (Router, Arc<RecordingDispatch>) {
    let dispatch = Arc::new(RecordingDispatch::default());
    let subscriber = Arc::new(Subscriber::new(dispatch.clone(), SUBSCRIPTION));
    (router(Arc::new(ServerState::new(subscriber))), dispatch)
}

fn push_body(message_id: &str, subscription: &str) -> String {
    let payload = json!({
        "project_id": "p1",
        "package_id": "pkg1",
        "package": {
            "type": "bucket",
            "parameter_data": {"size": "10"},
            "outputs": ["url"]
        },
        "connected_input_data": {},
        "action": "DEPLOY",
        "secrets": {"token": "abc"}
    });
    json!({
        "message": {
            "data": STANDARD.encode(payload.to_string()),
            "messageId": message_id,
            "publishTime": "2026-01-01T00:00:00Z"
        },
        "subscription": subscription
    })
    .to_string()
}

async fn send(app: Router, method: Method, uri: &str, body: String) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

#[tokio::test]
async fn test_valid_push_is_accepted_and_dispatched() {
    let (app, dispatch) = app();

    let (status, body) = send(app, Method::POST, "/push", push_body("m-42", SUBSCRIPTION)).await;

    assert_eq!(status, StatusCode::OK);
    let ack: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(ack, json!({"message_id": "m-42", "status": "accepted"}));

    assert_eq!(dispatch.message_ids(), vec!["m-42"]);
    let dispatched = dispatch.dispatched.lock().unwrap();
    let request = &dispatched[0].1;
    assert_eq!(request.project_id, "p1");
    assert_eq!(request.package.module_type, "bucket");
    assert_eq!(request.action, DeploymentAction::Deploy);
    assert_eq!(request.secrets.get("token").map(String::as_str), Some("abc"));
}

#[tokio::test]
async fn test_malformed_push_is_rejected() {
    let (app, dispatch) = app();

    let (status, body) = send(app, Method::POST, "/push", "{not json".to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"], "invalid_message");
    assert!(dispatch.message_ids().is_empty());
}

#[tokio::test]
async fn test_push_with_invalid_request_is_rejected() {
    let (app, dispatch) = app();
    let body = json!({
        "message": {
            "data": STANDARD.encode(r#"{"project_id":"p1","package_id":"../etc","package":{"type":"bucket"},"action":"DEPLOY"}"#),
            "messageId": "m1"
        },
        "subscription": SUBSCRIPTION
    });

    let (status, _) = send(app, Method::POST, "/push", body.to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(dispatch.message_ids().is_empty());
}

#[tokio::test]
async fn test_push_from_other_subscription_is_still_accepted() {
    let (app, dispatch) = app();

    let (status, _) = send(
        app,
        Method::POST,
        "/push",
        push_body("m1", "projects/other/subscriptions/elsewhere"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(dispatch.message_ids(), vec!["m1"]);
}

#[tokio::test]
async fn test_push_only_accepts_post() {
    let (app, _) = app();

    let (status, _) = send(app, Method::GET, "/push", String::new()).await;

    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_root_and_health() {
    let (app, _) = app();

    let (status, body) = send(app.clone(), Method::GET, "/", String::new()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap(), "Provisioner is running");

    let (status, body) = send(app, Method::GET, "/health", String::new()).await;
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_push_with_null_fields_is_accepted() {
    let (app, dispatch) = app();
    let mut body: Value = serde_json::from_str(&push_body("m1", SUBSCRIPTION)).unwrap();
    body["message"]["attributes"] = Value::Null;
    body["subscription"] = Value::Null;

    let (status, _) = send(app, Method::POST, "/push", body.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(dispatch.message_ids(), vec!["m1"]);
}
