//! Shared test fixtures

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    Router,
};
use canvas_client::DeployStatus;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use provisioner::deploy::deployer::Deployer;
use provisioner::deploy::executor::{Executor, ExecutorKind, RunContext};
use provisioner::deploy::staging;
use provisioner::deploy::terraform::render_backend_config;
use provisioner::errors::ProvisionerError;
use provisioner::filesys::dir::Dir;
use provisioner::http::status::StatusReporter;
use provisioner::models::deployment::{
    DeploymentAction, DeploymentRequest, OutputData, PackageDescriptor,
};
use provisioner::storage::layout::{backend_file, StorageLayout};

pub fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

// ================================ WORKSPACE ===================================== //

/// Temporary module root with a `bucket` module, plus a deployments dir
pub struct Workspace {
    pub root: Dir,
    pub modules: Dir,
    pub deployments: Dir,
}

impl Workspace {
    pub async fn new() -> Self {
        let root = Dir::create_temp_dir("provisioner-test").await.unwrap();
        let modules = root.subdir("modules");
        modules
            .subdir("bucket")
            .file("main.tf")
            .write_string("resource \"null_resource\" \"bucket\" {}\n")
            .await
            .unwrap();
        let deployments = root.subdir("deployments");
        deployments.create().await.unwrap();

        Self {
            root,
            modules,
            deployments,
        }
    }

    pub fn layout(&self) -> StorageLayout {
        StorageLayout::new(self.deployments.path())
    }

    pub fn run_dir(&self, package_id: &str) -> Dir {
        self.layout().run_dir(package_id)
    }

    pub async fn cleanup(self) {
        let _ = self.root.delete().await;
    }
}

/// A request for the `bucket` module
pub fn request(package_id: &str, action: DeploymentAction) -> DeploymentRequest {
    let mut request = DeploymentRequest {
        project_id: "p1".to_string(),
        package_id: package_id.to_string(),
        package: PackageDescriptor {
            module_type: "bucket".to_string(),
            parameter_data: object(json!({"size": "10", "name": "a"})),
            outputs: ["url"].into_iter().collect(),
        },
        connected_input_data: object(json!({"name": "b"})),
        action,
        ..Default::default()
    };
    request.secrets.insert("token".to_string(), "abc".to_string());
    request
        .secrets
        .insert("config".to_string(), "{\"x\":1}".to_string());
    request
}

// ================================= EXECUTOR ===================================== //

/// Executor that stages for real but fakes the backend
pub struct StubExecutor {
    module_root: PathBuf,
    calls: Mutex<Vec<String>>,
    raw_outputs: OutputData,
    fail_invoke: bool,
    invoke_delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl StubExecutor {
    pub fn new(module_root: &Path) -> Self {
        Self {
            module_root: module_root.to_path_buf(),
            calls: Mutex::new(Vec::new()),
            raw_outputs: object(json!({
                "url": {"value": "https://bucket.example", "type": "string"},
                "internal_id": {"value": "abc-123"}
            })),
            fail_invoke: false,
            invoke_delay: Duration::ZERO,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn failing_invoke(mut self) -> Self {
        self.fail_invoke = true;
        self
    }

    /// Invocations block this long, or until cancelled
    pub fn with_invoke_delay(mut self, delay: Duration) -> Self {
        self.invoke_delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Most invocations ever running at once
    pub fn max_concurrent_invocations(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl Executor for StubExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Terraform
    }

    fn module_root(&self) -> &Path {
        &self.module_root
    }

    async fn stage_module(&self, module_type: &str, target: &Dir) -> Result<(), ProvisionerError> {
        self.record("stage_module");
        staging::copy_module(&self.module_root, module_type, target).await?;
        Ok(())
    }

    async fn write_parameters(
        &self,
        request: &DeploymentRequest,
        target: &Dir,
    ) -> Result<(), ProvisionerError> {
        self.record("write_parameters");
        staging::write_parameters(request, target).await?;
        Ok(())
    }

    async fn write_secrets(
        &self,
        request: &DeploymentRequest,
        target: &Dir,
    ) -> Result<(), ProvisionerError> {
        self.record("write_secrets");
        staging::write_secrets(request, target).await?;
        Ok(())
    }

    async fn write_backend_config(
        &self,
        request: &DeploymentRequest,
        target: &Dir,
    ) -> Result<(), ProvisionerError> {
        self.record("write_backend_config");
        backend_file(target)
            .write_string(&render_backend_config(
                "test-bucket",
                &request.project_id,
                &request.package_id,
            ))
            .await
    }

    async fn invoke(
        &self,
        _run: &RunContext,
        action: &DeploymentAction,
        cancel: &CancellationToken,
    ) -> Result<(), ProvisionerError> {
        self.record(format!("invoke {}", action));
        if let DeploymentAction::Unsupported(other) = action {
            return Err(ProvisionerError::UnsupportedAction(other.clone()));
        }

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        let result = tokio::select! {
            _ = tokio::time::sleep(self.invoke_delay) => Ok(()),
            _ = cancel.cancelled() => Err(ProvisionerError::Cancelled("invoke".to_string())),
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        result?;

        if self.fail_invoke {
            return Err(ProvisionerError::InvocationError {
                command: "terraform apply".to_string(),
                reason: "exit status: 1".to_string(),
                output: "Error: quota exceeded".to_string(),
            });
        }
        Ok(())
    }

    async fn query_outputs(
        &self,
        _run: &RunContext,
        _cancel: &CancellationToken,
    ) -> Result<OutputData, ProvisionerError> {
        self.record("query_outputs");
        Ok(self.raw_outputs.clone())
    }

    async fn persist_outputs(
        &self,
        package_id: &str,
        target: &Dir,
        outputs: &OutputData,
    ) -> Result<(), ProvisionerError> {
        self.record("persist_outputs");
        staging::persist_outputs(package_id, target, outputs).await?;
        Ok(())
    }
}

// ================================= REPORTER ===================================== //

#[derive(Debug, Clone)]
pub struct Report {
    pub project_id: String,
    pub package_id: String,
    pub status: DeployStatus,
    pub output_data: OutputData,
}

/// Records delivered reports; reports of chosen statuses fail or are slow
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<Report>>,
    failing: Vec<DeployStatus>,
    delays: Vec<(DeployStatus, Duration)>,
    attempts: AtomicUsize,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(statuses: &[DeployStatus]) -> Self {
        Self {
            failing: statuses.to_vec(),
            ..Default::default()
        }
    }

    /// Reports of `status` take `delay` before they are delivered
    pub fn delaying(mut self, status: DeployStatus, delay: Duration) -> Self {
        self.delays.push((status, delay));
        self
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<DeployStatus> {
        self.reports().into_iter().map(|r| r.status).collect()
    }

    /// Delivered and failed reports
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusReporter for RecordingReporter {
    async fn report(
        &self,
        project_id: &str,
        package_id: &str,
        status: DeployStatus,
        output_data: &OutputData,
    ) -> Result<(), ProvisionerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some((_, delay)) = self.delays.iter().find(|(s, _)| *s == status) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&status) {
            return Err(ProvisionerError::ReportingError(format!(
                "PATCH returned 503 for {}",
                status
            )));
        }
        self.reports.lock().unwrap().push(Report {
            project_id: project_id.to_string(),
            package_id: package_id.to_string(),
            status,
            output_data: output_data.clone(),
        });
        Ok(())
    }
}

pub fn deployer(
    workspace: &Workspace,
    executor: Arc<StubExecutor>,
    reporter: Arc<RecordingReporter>,
) -> Deployer {
    Deployer::new(executor, workspace.layout(), reporter)
}

// =============================== FAKE CANVAS API ================================= //

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub token: Option<String>,
    pub body: Value,
}

/// In-process stand-in for the Canvas API.
///
/// Answers with the queued status codes in order, then 200.
#[derive(Clone, Default)]
pub struct FakeCanvas {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    responses: Arc<Mutex<VecDeque<u16>>>,
}

impl FakeCanvas {
    /// Start serving on an ephemeral port; returns the base URL
    pub async fn start(responses: &[u16]) -> (Self, String) {
        let fake = Self {
            responses: Arc::new(Mutex::new(responses.iter().copied().collect())),
            ..Default::default()
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback(record).with_state(fake.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        (fake, format!("http://{}", addr))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn record(
    State(fake): State<FakeCanvas>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    fake.requests.lock().unwrap().push(RecordedRequest {
        method,
        path: uri.path().to_string(),
        token: headers
            .get("x-canvas-token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    let code = fake.responses.lock().unwrap().pop_front().unwrap_or(200);
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
