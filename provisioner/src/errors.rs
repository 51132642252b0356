//! Error types for the provisioner

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Pipeline step a run error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    ReportStart,
    PrepareWorkspace,
    StageModule,
    WriteParameters,
    WriteSecrets,
    WriteBackendConfig,
    Invoke,
    ExtractOutputs,
    PersistOutputs,
    ReportResult,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::ReportStart => "report start status",
            PipelineStep::PrepareWorkspace => "create deployment directory",
            PipelineStep::StageModule => "stage module",
            PipelineStep::WriteParameters => "create parameter file",
            PipelineStep::WriteSecrets => "create secrets file",
            PipelineStep::WriteBackendConfig => "create backend file",
            PipelineStep::Invoke => "run backend commands",
            PipelineStep::ExtractOutputs => "process outputs",
            PipelineStep::PersistOutputs => "write output file",
            PipelineStep::ReportResult => "report final status",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the provisioner
#[derive(Error, Debug)]
pub enum ProvisionerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Staging error: {0}")]
    StagingError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Command '{command}' failed: {reason}\nOutput: {output}")]
    InvocationError {
        command: String,
        reason: String,
        output: String,
    },

    #[error("Output query error: {0}")]
    OutputQueryError(String),

    #[error("Output parse error: {0}")]
    OutputParseError(String),

    #[error("Reporting error: {0}")]
    ReportingError(String),

    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("Timed out after {timeout:?}: {what}")]
    Timeout { timeout: Duration, what: String },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("failed to {step}: {source}")]
    Step {
        step: PipelineStep,
        #[source]
        source: Box<ProvisionerError>,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProvisionerError {
    /// Attach the pipeline step this error was raised in
    pub fn in_step(self, step: PipelineStep) -> Self {
        ProvisionerError::Step {
            step,
            source: Box::new(self),
        }
    }

    /// The step a pipeline error was raised in, if any
    pub fn step(&self) -> Option<PipelineStep> {
        match self {
            ProvisionerError::Step { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// The innermost error, with step context removed
    pub fn root(&self) -> &ProvisionerError {
        match self {
            ProvisionerError::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// Errors caused by the sender rather than by the provisioner
    pub fn is_client_error(&self) -> bool {
        matches!(self.root(), ProvisionerError::DecodeError(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), ProvisionerError::Cancelled(_))
    }
}

impl From<base64::DecodeError> for ProvisionerError {
    fn from(err: base64::DecodeError) -> Self {
        ProvisionerError::DecodeError(format!("invalid base64 message data: {}", err))
    }
}
