//! Status lifecycle of a single run

use std::sync::Arc;

use canvas_client::DeployStatus;
use tokio::sync::Mutex;

use crate::errors::ProvisionerError;
use crate::http::status::StatusReporter;
use crate::models::deployment::OutputData;

/// Reported state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLifecycle {
    /// Nothing reported yet
    Pending,

    /// Start status delivered
    Started(DeployStatus),

    /// Terminal status delivered; no further reports allowed
    Finished(DeployStatus),
}

/// Lifecycle event
#[derive(Debug, Clone, Copy)]
pub enum LifecycleEvent {
    Start(DeployStatus),
    Finish(DeployStatus),
}

impl LifecycleEvent {
    pub fn status(&self) -> DeployStatus {
        match self {
            LifecycleEvent::Start(status) | LifecycleEvent::Finish(status) => *status,
        }
    }
}

impl RunLifecycle {
    pub fn new() -> Self {
        RunLifecycle::Pending
    }

    /// State after `event`, if the transition is allowed
    pub fn next(&self, event: LifecycleEvent) -> Result<RunLifecycle, String> {
        match (self, event) {
            (RunLifecycle::Pending, LifecycleEvent::Start(status)) if !status.is_terminal() => {
                Ok(RunLifecycle::Started(status))
            }
            (RunLifecycle::Started(_), LifecycleEvent::Finish(status)) if status.is_terminal() => {
                Ok(RunLifecycle::Finished(status))
            }
            // The start report itself could not be delivered
            (RunLifecycle::Pending, LifecycleEvent::Finish(DeployStatus::Failed)) => {
                Ok(RunLifecycle::Finished(DeployStatus::Failed))
            }
            (state, event) => Err(format!("Invalid transition: {:?} -> {:?}", state, event)),
        }
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: LifecycleEvent) -> Result<(), String> {
        *self = self.next(event)?;
        Ok(())
    }
}

impl Default for RunLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Reports a run's statuses, advancing its lifecycle only on delivery
pub struct StatusTracker {
    reporter: Arc<dyn StatusReporter>,
    project_id: String,
    package_id: String,
    lifecycle: Mutex<RunLifecycle>,
}

impl StatusTracker {
    pub fn new(
        reporter: Arc<dyn StatusReporter>,
        project_id: impl Into<String>,
        package_id: impl Into<String>,
    ) -> Self {
        Self {
            reporter,
            project_id: project_id.into(),
            package_id: package_id.into(),
            lifecycle: Mutex::new(RunLifecycle::Pending),
        }
    }

    pub async fn state(&self) -> RunLifecycle {
        *self.lifecycle.lock().await
    }

    /// Report the start status with empty output data
    pub async fn start(&self, status: DeployStatus) -> Result<(), ProvisionerError> {
        self.advance(LifecycleEvent::Start(status), &OutputData::new())
            .await
    }

    /// Report a terminal status
    pub async fn finish(
        &self,
        status: DeployStatus,
        output_data: &OutputData,
    ) -> Result<(), ProvisionerError> {
        self.advance(LifecycleEvent::Finish(status), output_data)
            .await
    }

    /// Report `FAILED`
    pub async fn fail(&self, output_data: &OutputData) -> Result<(), ProvisionerError> {
        self.finish(DeployStatus::Failed, output_data).await
    }

    async fn advance(
        &self,
        event: LifecycleEvent,
        output_data: &OutputData,
    ) -> Result<(), ProvisionerError> {
        // Held across the report so two reports can never race
        let mut lifecycle = self.lifecycle.lock().await;
        let next = lifecycle.next(event).map_err(ProvisionerError::Internal)?;

        self.reporter
            .report(&self.project_id, &self.package_id, event.status(), output_data)
            .await?;

        *lifecycle = next;
        Ok(())
    }
}
