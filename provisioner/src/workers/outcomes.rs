//! Run outcome worker

use std::future::Future;
use std::pin::Pin;

use canvas_client::DeployStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

/// Summary of one finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub message_id: String,
    pub project_id: String,
    pub package_id: String,
    pub action: String,
    pub status: DeployStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Outcome worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Outcomes buffered before new ones are dropped
    pub capacity: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

/// Counts of outcomes seen by the worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeStats {
    pub succeeded: u64,
    pub failed: u64,
}

impl OutcomeStats {
    fn record(&mut self, outcome: &RunOutcome) {
        if outcome.succeeded() {
            self.succeeded += 1;
            info!(
                run_id = %outcome.run_id,
                message_id = %outcome.message_id,
                project_id = %outcome.project_id,
                package_id = %outcome.package_id,
                action = %outcome.action,
                status = %outcome.status,
                duration_ms = outcome.duration().num_milliseconds(),
                "run succeeded"
            );
        } else {
            self.failed += 1;
            error!(
                run_id = %outcome.run_id,
                message_id = %outcome.message_id,
                project_id = %outcome.project_id,
                package_id = %outcome.package_id,
                action = %outcome.action,
                duration_ms = outcome.duration().num_milliseconds(),
                error = outcome.error.as_deref().unwrap_or_default(),
                "run failed"
            );
        }
    }
}

/// Run the outcome worker until shutdown or until every sender is gone
pub async fn run(
    mut outcomes: mpsc::Receiver<RunOutcome>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) -> OutcomeStats {
    info!("Outcome worker starting...");
    let mut stats = OutcomeStats::default();

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                while let Ok(outcome) = outcomes.try_recv() {
                    stats.record(&outcome);
                }
                info!("Outcome worker shutting down...");
                return stats;
            }
            outcome = outcomes.recv() => match outcome {
                Some(outcome) => stats.record(&outcome),
                None => {
                    info!("Outcome channel closed");
                    return stats;
                }
            }
        }
    }
}
