//! Package status reporting

use std::sync::Arc;

use async_trait::async_trait;
use canvas_client::{DeployStatus, PackageStatusUpdate};
use reqwest::StatusCode;
use tracing::{info, warn};

use crate::errors::ProvisionerError;
use crate::http::client::HttpClient;
use crate::models::deployment::OutputData;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Sends a package's deploy status to the control plane
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(
        &self,
        project_id: &str,
        package_id: &str,
        status: DeployStatus,
        output_data: &OutputData,
    ) -> Result<(), ProvisionerError>;
}

/// Reporter options
#[derive(Debug, Clone)]
pub struct ReporterOptions {
    /// Attempts per report, including the first
    pub max_attempts: u32,

    /// Delay between attempts
    pub cooldown: CooldownOptions,
}

impl Default for ReporterOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            cooldown: CooldownOptions::default(),
        }
    }
}

/// Status path for a package
pub fn status_path(project_id: &str, package_id: &str) -> String {
    format!("/provisioner/projects/{}/packages/{}", project_id, package_id)
}

/// Reports through the Canvas API `PATCH` endpoint
pub struct CanvasStatusReporter {
    client: Arc<HttpClient>,
    options: ReporterOptions,
}

impl CanvasStatusReporter {
    pub fn new(client: Arc<HttpClient>, options: ReporterOptions) -> Self {
        Self { client, options }
    }

    async fn attempt(
        &self,
        path: &str,
        body: &PackageStatusUpdate,
    ) -> Result<(), AttemptError> {
        match self.client.send_patch(path, body).await {
            Ok((StatusCode::OK, _)) => Ok(()),
            Ok((status, response_body)) => {
                let err = ProvisionerError::ReportingError(format!(
                    "PATCH {} returned {}: {}",
                    path, status, response_body
                ));
                if status.is_server_error() {
                    Err(AttemptError::Retryable(err))
                } else {
                    Err(AttemptError::Fatal(err))
                }
            }
            Err(e) => Err(AttemptError::Retryable(ProvisionerError::ReportingError(
                format!("PATCH {}: {}", path, e),
            ))),
        }
    }
}

enum AttemptError {
    Retryable(ProvisionerError),
    Fatal(ProvisionerError),
}

#[async_trait]
impl StatusReporter for CanvasStatusReporter {
    async fn report(
        &self,
        project_id: &str,
        package_id: &str,
        status: DeployStatus,
        output_data: &OutputData,
    ) -> Result<(), ProvisionerError> {
        let path = status_path(project_id, package_id);
        let body = PackageStatusUpdate::new(status, output_data.clone());
        let max_attempts = self.options.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(&path, &body).await {
                Ok(()) => {
                    info!(project_id, package_id, status = %status, "reported status");
                    return Ok(());
                }
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Retryable(err)) if attempt >= max_attempts => return Err(err),
                Err(AttemptError::Retryable(err)) => {
                    let delay = calc_exp_backoff(&self.options.cooldown, attempt - 1);
                    warn!(
                        project_id,
                        package_id,
                        attempt,
                        "status report failed, retrying in {:?}: {}",
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
