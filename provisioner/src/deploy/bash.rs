//! Bash script executor

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::deploy::command::{run_checked, CliBinary};
use crate::deploy::executor::{Executor, ExecutorKind, RunContext};
use crate::errors::ProvisionerError;
use crate::filesys::dir::Dir;
use crate::models::deployment::{DeploymentAction, DeploymentRequest, OutputData};
use crate::storage::layout::{inputs_file, secrets_file};

pub const APPLY_SCRIPT: &str = "apply.sh";
pub const DESTROY_SCRIPT: &str = "destroy.sh";

/// Runs the module's `apply.sh` or `destroy.sh`.
///
/// Scripts find their inputs through `PROJECT_ID`, `PACKAGE_ID`,
/// `INPUTS_FILE`, `SECRETS_FILE` and `STATE_PREFIX`.
pub struct BashExecutor {
    binary: CliBinary,
    module_root: PathBuf,
    command_timeout: Duration,
}

impl BashExecutor {
    pub fn new(binary: CliBinary, module_root: PathBuf, command_timeout: Duration) -> Self {
        Self {
            binary,
            module_root,
            command_timeout,
        }
    }

    fn script_for(action: &DeploymentAction) -> Result<&'static str, ProvisionerError> {
        match action {
            DeploymentAction::Deploy => Ok(APPLY_SCRIPT),
            DeploymentAction::Destroy => Ok(DESTROY_SCRIPT),
            DeploymentAction::Unsupported(other) => {
                Err(ProvisionerError::UnsupportedAction(other.clone()))
            }
        }
    }

    fn envs(run: &RunContext) -> Vec<(&'static str, String)> {
        vec![
            ("PROJECT_ID", run.project_id.clone()),
            ("PACKAGE_ID", run.package_id.clone()),
            (
                "INPUTS_FILE",
                inputs_file(&run.dir, &run.package_id).path().display().to_string(),
            ),
            (
                "SECRETS_FILE",
                secrets_file(&run.dir, &run.package_id).path().display().to_string(),
            ),
            ("STATE_PREFIX", run.state_prefix()),
        ]
    }
}

#[async_trait]
impl Executor for BashExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Bash
    }

    fn module_root(&self) -> &Path {
        &self.module_root
    }

    async fn write_backend_config(
        &self,
        _request: &DeploymentRequest,
        _target: &Dir,
    ) -> Result<(), ProvisionerError> {
        Ok(())
    }

    async fn invoke(
        &self,
        run: &RunContext,
        action: &DeploymentAction,
        cancel: &CancellationToken,
    ) -> Result<(), ProvisionerError> {
        let script = Self::script_for(action)?;
        info!(package_id = %run.package_id, "running {}", script);

        run_checked(
            &self.binary,
            &[script],
            run.dir.path(),
            &Self::envs(run),
            self.command_timeout,
            cancel,
        )
        .await?;
        Ok(())
    }

    async fn query_outputs(
        &self,
        _run: &RunContext,
        _cancel: &CancellationToken,
    ) -> Result<OutputData, ProvisionerError> {
        Ok(OutputData::new())
    }
}
