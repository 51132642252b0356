//! Deployment pipeline

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::deploy::executor::{Executor, RunContext};
use crate::deploy::lifecycle::StatusTracker;
use crate::errors::{PipelineStep, ProvisionerError};
use crate::http::status::StatusReporter;
use crate::models::deployment::{DeploymentRequest, OutputData};
use crate::storage::layout::StorageLayout;

/// Drives one request through the pipeline with an executor.
///
/// Steps run strictly in order and the first failure stops the run. The
/// deployer reports the start and success statuses only; reporting `FAILED`
/// is up to the caller.
pub struct Deployer {
    executor: Arc<dyn Executor>,
    layout: StorageLayout,
    reporter: Arc<dyn StatusReporter>,
}

impl Deployer {
    pub fn new(
        executor: Arc<dyn Executor>,
        layout: StorageLayout,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        Self {
            executor,
            layout,
            reporter,
        }
    }

    /// Fresh status tracker for a request
    pub fn tracker_for(&self, request: &DeploymentRequest) -> StatusTracker {
        StatusTracker::new(
            self.reporter.clone(),
            request.project_id.clone(),
            request.package_id.clone(),
        )
    }

    /// Run the pipeline with its own status tracker
    pub async fn run_deployment(
        &self,
        request: &DeploymentRequest,
        cancel: &CancellationToken,
    ) -> Result<OutputData, ProvisionerError> {
        let tracker = self.tracker_for(request);
        self.run(request, &tracker, cancel).await
    }

    /// Run the pipeline, reporting through `tracker`
    pub async fn run(
        &self,
        request: &DeploymentRequest,
        tracker: &StatusTracker,
        cancel: &CancellationToken,
    ) -> Result<OutputData, ProvisionerError> {
        let action = &request.action;
        info!(
            project_id = %request.project_id,
            package_id = %request.package_id,
            action = %action,
            executor = %self.executor.kind(),
            "starting deployment"
        );

        step(
            PipelineStep::ReportStart,
            cancel,
            tracker.start(action.start_status()),
        )
        .await?;

        let dir = self.layout.run_dir(&request.package_id);
        step(PipelineStep::PrepareWorkspace, cancel, async {
            request.validate()?;
            dir.create().await
        })
        .await?;
        let run = RunContext::new(request, dir.clone());

        step(
            PipelineStep::StageModule,
            cancel,
            self.executor.stage_module(&request.package.module_type, &dir),
        )
        .await?;
        step(
            PipelineStep::WriteParameters,
            cancel,
            self.executor.write_parameters(request, &dir),
        )
        .await?;
        step(
            PipelineStep::WriteSecrets,
            cancel,
            self.executor.write_secrets(request, &dir),
        )
        .await?;
        step(
            PipelineStep::WriteBackendConfig,
            cancel,
            self.executor.write_backend_config(request, &dir),
        )
        .await?;
        step(
            PipelineStep::Invoke,
            cancel,
            self.executor.invoke(&run, action, cancel),
        )
        .await?;

        let outputs = step(
            PipelineStep::ExtractOutputs,
            cancel,
            self.executor.extract_outputs(request, &run, cancel),
        )
        .await?;
        step(
            PipelineStep::PersistOutputs,
            cancel,
            self.executor
                .persist_outputs(&request.package_id, &dir, &outputs),
        )
        .await?;

        step(
            PipelineStep::ReportResult,
            cancel,
            tracker.finish(action.success_status(), &outputs),
        )
        .await?;

        info!(
            project_id = %request.project_id,
            package_id = %request.package_id,
            outputs = outputs.len(),
            "deployment finished"
        );
        Ok(outputs)
    }
}

/// Run one step until it finishes or the run is cancelled, tagging any error
/// with the step. A cancelled step is dropped mid-flight, status reports
/// included.
async fn step<T, F>(
    step: PipelineStep,
    cancel: &CancellationToken,
    work: F,
) -> Result<T, ProvisionerError>
where
    F: Future<Output = Result<T, ProvisionerError>>,
{
    if cancel.is_cancelled() {
        return Err(ProvisionerError::Cancelled(format!("before {}", step)).in_step(step));
    }
    debug!(step = %step, "running step");
    tokio::select! {
        result = work => result.map_err(|e| e.in_step(step)),
        _ = cancel.cancelled() => {
            Err(ProvisionerError::Cancelled(format!("during {}", step)).in_step(step))
        }
    }
}
