//! Helm executor

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

/// Installs the staged chart as a release named after the package.
///
/// Release state lives in the cluster, so there is no backend file and no
/// outputs are exposed.
pub struct HelmExecutor {
    binary: CliBinary,
    module_root: PathBuf,
    namespace: Option<String>,
    command_timeout: Duration,
}

impl HelmExecutor {
    pub fn new(
        binary: CliBinary,
        module_root: PathBuf,
        namespace: Option<String>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            binary,
            module_root,
            namespace,
            command_timeout,
        }
    }

    /// Release names must be lowercase DNS labels
    pub fn release_name(package_id: &str) -> String {
        package_id.to_lowercase()
    }

    pub fn command_args(&self, run: &RunContext, action: &DeploymentAction) -> Result<Vec<String>, ProvisionerError> {
        let release = Self::release_name(&run.package_id);
        let mut args: Vec<String> = match action {
            DeploymentAction::Deploy => vec![
                "upgrade".into(),
                "--install".into(),
                release,
                ".".into(),
                "--values".into(),
                inputs_file(&run.dir, &run.package_id).path().display().to_string(),
                "--values".into(),
                secrets_file(&run.dir, &run.package_id).path().display().to_string(),
            ],
            DeploymentAction::Destroy => vec!["uninstall".into(), release],
            DeploymentAction::Unsupported(other) => {
                return Err(ProvisionerError::UnsupportedAction(other.clone()))
            }
        };

        if let Some(namespace) = &self.namespace {
            args.push("--namespace".into());
            args.push(namespace.clone());
            if matches!(action, DeploymentAction::Deploy) {
                args.push("--create-namespace".into());
            }
        }
        Ok(args)
    }
}

#[async_trait]
impl Executor for HelmExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Helm
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
        let args = self.command_args(run, action)?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        info!(package_id = %run.package_id, "helm {}", args.join(" "));
        run_checked(
            &self.binary,
            &args,
            run.dir.path(),
            &[],
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
