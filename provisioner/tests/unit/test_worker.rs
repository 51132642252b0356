//! Deployment worker tests

use std::sync::Arc;
use std::time::Duration;

use canvas_client::DeployStatus;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use provisioner::models::deployment::DeploymentAction;
use provisioner::workers::deployer::DeploymentWorker;
use provisioner::workers::outcomes::{self, OutcomeStats, RunOutcome};

use crate::common::{deployer, request, RecordingReporter, StubExecutor, Workspace};

struct Harness {
    workspace: Workspace,
    executor: Arc<StubExecutor>,
    reporter: Arc<RecordingReporter>,
    worker: DeploymentWorker,
    tracker: TaskTracker,
    cancel: CancellationToken,
    outcomes: mpsc::Receiver<RunOutcome>,
}

impl Harness {
    async fn new(
        configure: impl FnOnce(StubExecutor) -> StubExecutor,
        reporter: RecordingReporter,
    ) -> Self {
        let workspace = Workspace::new().await;
        let executor = Arc::new(configure(StubExecutor::new(workspace.modules.path())));
        let reporter = Arc::new(reporter);
        let deployer = Arc::new(deployer(&workspace, executor.clone(), reporter.clone()));

        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        let (tx, outcomes) = mpsc::channel(16);
        let worker = DeploymentWorker::new(deployer, tracker.clone(), cancel.clone(), tx);

        Self {
            workspace,
            executor,
            reporter,
            worker,
            tracker,
            cancel,
            outcomes,
        }
    }

    async fn wait_idle(&self) {
        self.tracker.close();
        tokio::time::timeout(Duration::from_secs(10), self.tracker.wait())
            .await
            .expect("runs did not finish");
    }
}

#[tokio::test]
async fn test_successful_run_yields_outcome() {
    let mut harness = Harness::new(|e| e, RecordingReporter::new()).await;

    let handle = harness
        .worker
        .spawn(request("pkg1", DeploymentAction::Deploy), "m1".to_string());
    let outcome = handle.await.unwrap();

    assert!(outcome.succeeded());
    assert_eq!(outcome.status, DeployStatus::Deployed);
    assert_eq!(outcome.message_id, "m1");
    assert_eq!(outcome.action, "DEPLOY");
    assert!(outcome.finished_at >= outcome.started_at);

    let sent = harness.outcomes.recv().await.unwrap();
    assert_eq!(sent.run_id, outcome.run_id);

    harness.workspace.cleanup().await;
}

#[tokio::test]
async fn test_staging_failure_is_reported_as_failed() {
    let harness = Harness::new(|e| e, RecordingReporter::new()).await;

    let mut request = request("pkg1", DeploymentAction::Deploy);
    request.package.module_type = "missing".to_string();
    let outcome = harness
        .worker
        .execute(request, "m1".to_string(), CancellationToken::new())
        .await;

    assert_eq!(outcome.status, DeployStatus::Failed);
    assert!(outcome.error.as_deref().unwrap().contains("stage module"));

    let reports = harness.reporter.reports();
    assert_eq!(
        harness.reporter.statuses(),
        vec![DeployStatus::Deploying, DeployStatus::Failed]
    );
    match reports[1].output_data.get("error") {
        Some(Value::String(message)) => assert!(message.starts_with("failed to stage module")),
        other => panic!("unexpected error data: {:?}", other),
    }

    harness.workspace.cleanup().await;
}

#[tokio::test]
async fn test_undeliverable_start_still_reports_failed() {
    let harness = Harness::new(
        |e| e,
        RecordingReporter::failing_on(&[DeployStatus::Deploying]),
    )
    .await;

    let outcome = harness
        .worker
        .execute(
            request("pkg1", DeploymentAction::Deploy),
            "m1".to_string(),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.status, DeployStatus::Failed);
    assert_eq!(harness.reporter.statuses(), vec![DeployStatus::Failed]);
    assert!(harness.executor.calls().is_empty());

    harness.workspace.cleanup().await;
}

#[tokio::test]
async fn test_failed_failure_report_is_only_logged() {
    let harness = Harness::new(
        |e| e.failing_invoke(),
        RecordingReporter::failing_on(&[DeployStatus::Failed]),
    )
    .await;

    let outcome = harness
        .worker
        .execute(
            request("pkg1", DeploymentAction::Deploy),
            "m1".to_string(),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.status, DeployStatus::Failed);
    assert_eq!(harness.reporter.statuses(), vec![DeployStatus::Deploying]);
    assert_eq!(harness.reporter.attempts(), 2);

    harness.workspace.cleanup().await;
}

#[tokio::test]
async fn test_runs_for_same_package_are_serialized() {
    let harness = Harness::new(
        |e| e.with_invoke_delay(Duration::from_millis(100)),
        RecordingReporter::new(),
    )
    .await;

    for i in 0..3 {
        harness
            .worker
            .spawn(request("pkg1", DeploymentAction::Deploy), format!("m{}", i));
    }
    harness.wait_idle().await;

    assert_eq!(harness.executor.max_concurrent_invocations(), 1);
    let statuses = harness.reporter.statuses();
    assert_eq!(statuses.len(), 6);
    // Each run's start is followed by its own terminal status
    for pair in statuses.chunks(2) {
        assert_eq!(pair, [DeployStatus::Deploying, DeployStatus::Deployed]);
    }

    harness.workspace.cleanup().await;
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_runs() {
    let harness = Harness::new(
        |e| e.with_invoke_delay(Duration::from_secs(60)),
        RecordingReporter::new(),
    )
    .await;

    let handle = harness
        .worker
        .spawn(request("pkg1", DeploymentAction::Deploy), "m1".to_string());
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.cancel.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.status, DeployStatus::Failed);
    assert!(outcome.error.unwrap().contains("Cancelled"));
    assert_eq!(
        harness.reporter.statuses(),
        vec![DeployStatus::Deploying, DeployStatus::Failed]
    );

    harness.workspace.cleanup().await;
}

#[tokio::test]
async fn test_outcome_worker_counts_until_closed() {
    let harness = Harness::new(|e| e, RecordingReporter::new()).await;

    harness
        .worker
        .spawn(request("ok", DeploymentAction::Deploy), "m1".to_string());
    let mut bad = request("bad", DeploymentAction::Deploy);
    bad.package.module_type = "missing".to_string();
    harness.worker.spawn(bad, "m2".to_string());
    harness.wait_idle().await;

    // Dropping the worker drops the last sender
    let Harness { worker, outcomes: rx, workspace, .. } = harness;
    drop(worker);
    let stats = outcomes::run(rx, Box::pin(std::future::pending())).await;
    assert_eq!(stats, OutcomeStats { succeeded: 1, failed: 1 });

    workspace.cleanup().await;
}

#[tokio::test]
async fn test_failed_report_lands_before_next_run_of_package() {
    let harness = Harness::new(
        |e| e,
        RecordingReporter::new().delaying(DeployStatus::Failed, Duration::from_millis(300)),
    )
    .await;

    let mut broken = request("pkg1", DeploymentAction::Deploy);
    broken.package.module_type = "missing".to_string();
    harness.worker.spawn(broken, "m1".to_string());
    tokio::time::sleep(Duration::from_millis(20)).await;
    harness
        .worker
        .spawn(request("pkg1", DeploymentAction::Deploy), "m2".to_string());
    harness.wait_idle().await;

    assert_eq!(
        harness.reporter.statuses(),
        vec![
            DeployStatus::Deploying,
            DeployStatus::Failed,
            DeployStatus::Deploying,
            DeployStatus::Deployed,
        ]
    );

    harness.workspace.cleanup().await;
}

#[tokio::test]
async fn test_shutdown_interrupts_slow_result_report() {
    let harness = Harness::new(
        |e| e,
        RecordingReporter::new().delaying(DeployStatus::Deployed, Duration::from_secs(60)),
    )
    .await;

    let handle = harness
        .worker
        .spawn(request("pkg1", DeploymentAction::Deploy), "m1".to_string());
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.cancel.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.status, DeployStatus::Failed);
    assert!(outcome.error.unwrap().contains("report final status"));
    assert_eq!(
        harness.reporter.statuses(),
        vec![DeployStatus::Deploying, DeployStatus::Failed]
    );

    harness.workspace.cleanup().await;
}
