//! Deployment worker: one task per accepted request

use std::sync::Arc;

use canvas_client::DeployStatus;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info_span, warn, Instrument};
use uuid::Uuid;

use crate::deploy::deployer::Deployer;
use crate::deploy::locks::PackageLocks;
use crate::models::deployment::{DeploymentRequest, OutputData};
use crate::pubsub::subscriber::Dispatch;
use crate::workers::outcomes::RunOutcome;

/// Runs accepted requests in the background and owns their failure reports
#[derive(Clone)]
pub struct DeploymentWorker {
    deployer: Arc<Deployer>,
    locks: PackageLocks,
    tracker: TaskTracker,
    cancel: CancellationToken,
    outcomes: mpsc::Sender<RunOutcome>,
}

impl DeploymentWorker {
    pub fn new(
        deployer: Arc<Deployer>,
        tracker: TaskTracker,
        cancel: CancellationToken,
        outcomes: mpsc::Sender<RunOutcome>,
    ) -> Self {
        Self {
            deployer,
            locks: PackageLocks::new(),
            tracker,
            cancel,
            outcomes,
        }
    }

    /// Start a run on the task tracker
    pub fn spawn(&self, request: DeploymentRequest, message_id: String) -> JoinHandle<RunOutcome> {
        let worker = self.clone();
        let cancel = self.cancel.child_token();
        let span = info_span!(
            "run",
            message_id = %message_id,
            project_id = %request.project_id,
            package_id = %request.package_id
        );

        self.tracker.spawn(
            async move {
                let outcome = worker.execute(request, message_id, cancel).await;
                if let Err(e) = worker.outcomes.try_send(outcome.clone()) {
                    warn!("dropping run outcome: {}", e);
                }
                outcome
            }
            .instrument(span),
        )
    }

    /// Run one request to completion, reporting `FAILED` on any error
    pub async fn execute(
        &self,
        request: DeploymentRequest,
        message_id: String,
        cancel: CancellationToken,
    ) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let tracker = self.deployer.tracker_for(&request);

        // Held until the FAILED report is out so a queued run cannot overtake it
        let (guard, result) = match self.locks.acquire(&request.package_id, &cancel).await {
            Ok(guard) => {
                let result = self.deployer.run(&request, &tracker, &cancel).await;
                (Some(guard), result)
            }
            Err(e) => (None, Err(e)),
        };

        let (status, error) = match result {
            Ok(_) => (request.action.success_status(), None),
            Err(err) => {
                error!(run_id = %run_id, step = ?err.step(), "deployment failed: {}", err);

                let mut output_data = OutputData::new();
                output_data.insert("error".to_string(), Value::String(err.to_string()));
                if let Err(report_err) = tracker.fail(&output_data).await {
                    error!(run_id = %run_id, "failed to report FAILED status: {}", report_err);
                }
                (DeployStatus::Failed, Some(err.to_string()))
            }
        };
        drop(guard);

        RunOutcome {
            run_id,
            message_id,
            project_id: request.project_id,
            package_id: request.package_id,
            action: request.action.to_string(),
            status,
            error,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

impl Dispatch for DeploymentWorker {
    fn dispatch(&self, request: DeploymentRequest, message_id: String) {
        // Fire and forget; the outcome goes to the outcome worker
        let _ = self.spawn(request, message_id);
    }
}
