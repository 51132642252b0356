//! Backend sub-process invocation

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::ProvisionerError;

static TIMESTAMP_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[[\d:]+\]\s*").expect("timestamp prefix pattern"));

/// A backend executable plus arguments that precede every sub-command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliBinary {
    pub program: String,
    pub leading_args: Vec<String>,
}

impl CliBinary {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Run the backend through another program, e.g. `sh fake-terraform.sh`
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Human-readable command line for logs and errors
    pub fn command_line(&self, args: &[&str]) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.leading_args.iter().map(String::as_str))
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished sub-process
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Run `binary args..` in `dir` and wait for it.
///
/// The child is killed when `timeout` elapses or `cancel` fires. A non-zero
/// exit is not an error here; see [`run_checked`].
pub async fn run_command(
    binary: &CliBinary,
    args: &[&str],
    dir: &Path,
    envs: &[(&str, String)],
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<CommandOutput, ProvisionerError> {
    let command_line = binary.command_line(args);
    debug!(command = %command_line, dir = %dir.display(), "running command");

    let child = Command::new(&binary.program)
        .args(&binary.leading_args)
        .args(args)
        .current_dir(dir)
        .envs(envs.iter().map(|(k, v)| (*k, v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ProvisionerError::InvocationError {
            command: command_line.clone(),
            reason: format!("failed to start: {}", e),
            output: String::new(),
        })?;

    // Dropping the wait future drops the child, which kills it
    tokio::select! {
        output = child.wait_with_output() => {
            let output = output?;
            Ok(CommandOutput {
                status: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
        _ = tokio::time::sleep(timeout) => {
            warn!(command = %command_line, "command timed out after {:?}", timeout);
            Err(ProvisionerError::Timeout {
                timeout,
                what: command_line,
            })
        }
        _ = cancel.cancelled() => {
            warn!(command = %command_line, "command cancelled");
            Err(ProvisionerError::Cancelled(command_line))
        }
    }
}

/// Like [`run_command`], but a non-zero exit becomes an `InvocationError`
/// carrying the cleaned combined output
pub async fn run_checked(
    binary: &CliBinary,
    args: &[&str],
    dir: &Path,
    envs: &[(&str, String)],
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<CommandOutput, ProvisionerError> {
    let output = run_command(binary, args, dir, envs, timeout, cancel).await?;
    if !output.status.success() {
        return Err(ProvisionerError::InvocationError {
            command: binary.command_line(args),
            reason: output.status.to_string(),
            output: clean_output(&output.combined()),
        });
    }
    Ok(output)
}

/// Drop `[hh:mm:ss]` prefixes and blank lines from backend output
pub fn clean_output(raw: &str) -> String {
    raw.lines()
        .map(|line| TIMESTAMP_PREFIX.replace(line, ""))
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
