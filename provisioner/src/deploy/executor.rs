//! Executor contract and backend selection

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::deploy::bash::BashExecutor;
use crate::deploy::command::CliBinary;
use crate::deploy::helm::HelmExecutor;
use crate::deploy::staging;
use crate::deploy::terraform::TerraformExecutor;
use crate::errors::ProvisionerError;
use crate::filesys::dir::Dir;
use crate::models::deployment::{state_prefix, DeploymentAction, DeploymentRequest, OutputData};

/// The working directory of one run plus the identifiers it is keyed by
#[derive(Debug, Clone)]
pub struct RunContext {
    pub project_id: String,
    pub package_id: String,
    pub dir: Dir,
}

impl RunContext {
    pub fn new(request: &DeploymentRequest, dir: Dir) -> Self {
        Self {
            project_id: request.project_id.clone(),
            package_id: request.package_id.clone(),
            dir,
        }
    }

    pub fn state_prefix(&self) -> String {
        state_prefix(&self.project_id, &self.package_id)
    }
}

/// A provisioning backend.
///
/// Staging and output handling have shared defaults; a backend supplies how
/// it records remote state, how it converges, and what outputs it exposes.
#[async_trait]
pub trait Executor: Send + Sync {
    fn kind(&self) -> ExecutorKind;

    /// Directory holding one template directory per module type
    fn module_root(&self) -> &Path;

    /// Copy the module template into the run directory
    async fn stage_module(&self, module_type: &str, target: &Dir) -> Result<(), ProvisionerError> {
        staging::copy_module(self.module_root(), module_type, target).await?;
        Ok(())
    }

    async fn write_parameters(
        &self,
        request: &DeploymentRequest,
        target: &Dir,
    ) -> Result<(), ProvisionerError> {
        staging::write_parameters(request, target).await?;
        Ok(())
    }

    async fn write_secrets(
        &self,
        request: &DeploymentRequest,
        target: &Dir,
    ) -> Result<(), ProvisionerError> {
        staging::write_secrets(request, target).await?;
        Ok(())
    }

    /// Point the backend at the package's remote state
    async fn write_backend_config(
        &self,
        request: &DeploymentRequest,
        target: &Dir,
    ) -> Result<(), ProvisionerError>;

    /// Converge the staged module for `action`
    async fn invoke(
        &self,
        run: &RunContext,
        action: &DeploymentAction,
        cancel: &CancellationToken,
    ) -> Result<(), ProvisionerError>;

    /// Raw output set after a successful invocation
    async fn query_outputs(
        &self,
        run: &RunContext,
        cancel: &CancellationToken,
    ) -> Result<OutputData, ProvisionerError>;

    /// Query outputs, unwrap value wrappers, keep declared names only
    async fn extract_outputs(
        &self,
        request: &DeploymentRequest,
        run: &RunContext,
        cancel: &CancellationToken,
    ) -> Result<OutputData, ProvisionerError> {
        let raw = self.query_outputs(run, cancel).await?;
        Ok(staging::filter_outputs(
            staging::normalize_outputs(raw),
            &request.package.outputs,
        ))
    }

    async fn persist_outputs(
        &self,
        package_id: &str,
        target: &Dir,
        outputs: &OutputData,
    ) -> Result<(), ProvisionerError> {
        staging::persist_outputs(package_id, target, outputs).await?;
        Ok(())
    }
}

/// Supported backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    Terraform,
    OpenTofu,
    Helm,
    Bash,
}

impl ExecutorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorKind::Terraform => "terraform",
            ExecutorKind::OpenTofu => "tofu",
            ExecutorKind::Helm => "helm",
            ExecutorKind::Bash => "bash",
        }
    }

    /// Binary used when none is configured
    pub fn default_binary(&self) -> &'static str {
        self.as_str()
    }
}

impl FromStr for ExecutorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "terraform" => Ok(ExecutorKind::Terraform),
            "tofu" | "opentofu" => Ok(ExecutorKind::OpenTofu),
            "helm" => Ok(ExecutorKind::Helm),
            "bash" => Ok(ExecutorKind::Bash),
            _ => Err(format!("unknown executor kind: {}", s)),
        }
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Executor options
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub kind: ExecutorKind,

    /// Backend binary; the kind's default when unset
    pub binary: Option<CliBinary>,

    pub module_root: PathBuf,

    /// Remote state bucket (Terraform family)
    pub state_bucket: String,

    /// Release namespace (Helm)
    pub namespace: Option<String>,

    pub command_timeout: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            kind: ExecutorKind::Terraform,
            binary: None,
            module_root: PathBuf::from("/mnt/canvas-packages"),
            state_bucket: "rad-provisioner-state-1234".to_string(),
            namespace: None,
            command_timeout: Duration::from_secs(3600),
        }
    }
}

/// Factory for creating executors
pub struct ExecutorFactory;

impl ExecutorFactory {
    pub fn create(options: &ExecutorOptions) -> Arc<dyn Executor> {
        let binary = options
            .binary
            .clone()
            .unwrap_or_else(|| CliBinary::new(options.kind.default_binary()));

        match options.kind {
            ExecutorKind::Terraform | ExecutorKind::OpenTofu => Arc::new(TerraformExecutor::new(
                options.kind,
                binary,
                options.module_root.clone(),
                options.state_bucket.clone(),
                options.command_timeout,
            )),
            ExecutorKind::Helm => Arc::new(HelmExecutor::new(
                binary,
                options.module_root.clone(),
                options.namespace.clone(),
                options.command_timeout,
            )),
            ExecutorKind::Bash => Arc::new(BashExecutor::new(
                binary,
                options.module_root.clone(),
                options.command_timeout,
            )),
        }
    }
}
