//! Canvas status reporter tests

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use canvas_client::DeployStatus;
use secrecy::SecretString;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use provisioner::http::client::HttpClient;
use provisioner::http::status::{CanvasStatusReporter, ReporterOptions, StatusReporter};
use provisioner::models::deployment::OutputData;
use provisioner::utils::CooldownOptions;

use crate::common::{object, FakeCanvas};

fn reporter(base_url: &str, max_attempts: u32) -> CanvasStatusReporter {
    let client = HttpClient::new(
        base_url,
        SecretString::from("canvas-secret".to_string()),
        Duration::from_secs(5),
    )
    .unwrap();
    CanvasStatusReporter::new(
        Arc::new(client),
        ReporterOptions {
            max_attempts,
            cooldown: CooldownOptions {
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
                multiplier: 2.0,
            },
        },
    )
}

#[tokio::test]
async fn test_report_sends_patch_with_token() {
    let (canvas, base_url) = FakeCanvas::start(&[]).await;
    let reporter = reporter(&base_url, 3);

    let outputs = object(json!({"url": "https://bucket.example"}));
    assert_ok!(
        reporter
            .report("p1", "pkg1", DeployStatus::Deployed, &outputs)
            .await
    );

    let requests = canvas.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::PATCH);
    assert_eq!(requests[0].path, "/provisioner/projects/p1/packages/pkg1");
    assert_eq!(requests[0].token.as_deref(), Some("canvas-secret"));
    assert_eq!(
        requests[0].body,
        json!({"deploy_status": "DEPLOYED", "output_data": {"url": "https://bucket.example"}})
    );
}

#[tokio::test]
async fn test_start_report_omits_empty_output_data() {
    let (canvas, base_url) = FakeCanvas::start(&[]).await;
    let reporter = reporter(&base_url, 3);

    assert_ok!(
        reporter
            .report("p1", "pkg1", DeployStatus::Destroying, &OutputData::new())
            .await
    );

    assert_eq!(
        canvas.requests()[0].body,
        json!({"deploy_status": "DESTROYING"})
    );
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let (canvas, base_url) = FakeCanvas::start(&[404]).await;
    let reporter = reporter(&base_url, 3);

    let err = assert_err!(
        reporter
            .report("p1", "pkg1", DeployStatus::Failed, &OutputData::new())
            .await
    );

    assert!(err.to_string().contains("404"));
    assert_eq!(canvas.requests().len(), 1);
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let (canvas, base_url) = FakeCanvas::start(&[500, 503]).await;
    let reporter = reporter(&base_url, 3);

    assert_ok!(
        reporter
            .report("p1", "pkg1", DeployStatus::Deploying, &OutputData::new())
            .await
    );

    assert_eq!(canvas.requests().len(), 3);
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let (canvas, base_url) = FakeCanvas::start(&[500, 500, 500, 500]).await;
    let reporter = reporter(&base_url, 2);

    let err = assert_err!(
        reporter
            .report("p1", "pkg1", DeployStatus::Deploying, &OutputData::new())
            .await
    );

    assert!(err.to_string().contains("500"));
    assert_eq!(canvas.requests().len(), 2);
}

#[tokio::test]
async fn test_unreachable_api_fails() {
    // Nothing listens on the discard port
    let reporter = reporter("http://127.0.0.1:9", 1);

    assert_err!(
        reporter
            .report("p1", "pkg1", DeployStatus::Deploying, &OutputData::new())
            .await
    );
}
