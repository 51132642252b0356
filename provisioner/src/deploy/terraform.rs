//! Terraform and OpenTofu executor

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::deploy::command::{run_checked, run_command, CliBinary};
use crate::deploy::executor::{Executor, ExecutorKind, RunContext};
use crate::errors::ProvisionerError;
use crate::filesys::dir::Dir;
use crate::models::deployment::{state_prefix, DeploymentAction, DeploymentRequest, OutputData};
use crate::storage::layout::backend_file;

/// Render the GCS backend block for a package
pub fn render_backend_config(bucket: &str, project_id: &str, package_id: &str) -> String {
    format!(
        "\nterraform {{\n  backend \"gcs\" {{\n    bucket = \"{}\"\n    prefix = \"{}\"\n  }}\n}}\n",
        bucket,
        state_prefix(project_id, package_id)
    )
}

/// Runs `init`, `plan` and `apply`/`destroy` against GCS remote state
pub struct TerraformExecutor {
    kind: ExecutorKind,
    binary: CliBinary,
    module_root: PathBuf,
    bucket: String,
    command_timeout: Duration,
}

impl TerraformExecutor {
    pub fn new(
        kind: ExecutorKind,
        binary: CliBinary,
        module_root: PathBuf,
        bucket: String,
        command_timeout: Duration,
    ) -> Self {
        Self {
            kind,
            binary,
            module_root,
            bucket,
            command_timeout,
        }
    }

    /// Sub-commands for an action, in order
    fn converge_steps(action: &DeploymentAction) -> Result<Vec<Vec<&'static str>>, ProvisionerError> {
        let init = vec!["init", "-input=false", "-no-color"];
        match action {
            DeploymentAction::Deploy => Ok(vec![
                init,
                vec!["plan", "-input=false", "-no-color"],
                vec!["apply", "-auto-approve", "-input=false", "-no-color"],
            ]),
            DeploymentAction::Destroy => Ok(vec![
                init,
                vec!["plan", "-destroy", "-input=false", "-no-color"],
                vec!["destroy", "-auto-approve", "-input=false", "-no-color"],
            ]),
            DeploymentAction::Unsupported(other) => {
                Err(ProvisionerError::UnsupportedAction(other.clone()))
            }
        }
    }

    fn envs() -> [(&'static str, String); 1] {
        [("TF_IN_AUTOMATION", "1".to_string())]
    }
}

#[async_trait]
impl Executor for TerraformExecutor {
    fn kind(&self) -> ExecutorKind {
        self.kind
    }

    fn module_root(&self) -> &Path {
        &self.module_root
    }

    async fn write_backend_config(
        &self,
        request: &DeploymentRequest,
        target: &Dir,
    ) -> Result<(), ProvisionerError> {
        let contents =
            render_backend_config(&self.bucket, &request.project_id, &request.package_id);
        backend_file(target).write_string(&contents).await
    }

    async fn invoke(
        &self,
        run: &RunContext,
        action: &DeploymentAction,
        cancel: &CancellationToken,
    ) -> Result<(), ProvisionerError> {
        let steps = Self::converge_steps(action)?;
        for args in steps {
            info!(
                package_id = %run.package_id,
                "{} {}",
                self.kind,
                args.join(" ")
            );
            run_checked(
                &self.binary,
                &args,
                run.dir.path(),
                &Self::envs(),
                self.command_timeout,
                cancel,
            )
            .await?;
        }
        Ok(())
    }

    async fn query_outputs(
        &self,
        run: &RunContext,
        cancel: &CancellationToken,
    ) -> Result<OutputData, ProvisionerError> {
        let args = ["output", "-json", "-no-color"];
        let output = run_command(
            &self.binary,
            &args,
            run.dir.path(),
            &Self::envs(),
            self.command_timeout,
            cancel,
        )
        .await?;

        if !output.status.success() {
            return Err(ProvisionerError::OutputQueryError(format!(
                "{} exited with {}: {}",
                self.binary.command_line(&args),
                output.status,
                output.stderr.trim()
            )));
        }

        debug!(package_id = %run.package_id, "raw outputs: {} bytes", output.stdout.len());
        match serde_json::from_str::<Value>(&output.stdout) {
            Ok(Value::Object(outputs)) => Ok(outputs),
            Ok(other) => Err(ProvisionerError::OutputParseError(format!(
                "expected a JSON object, got {}",
                other
            ))),
            Err(e) => Err(ProvisionerError::OutputParseError(e.to_string())),
        }
    }
}
