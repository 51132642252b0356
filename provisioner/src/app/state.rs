//! Application state management

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::app::options::AppOptions;
use crate::deploy::deployer::Deployer;
use crate::deploy::executor::ExecutorFactory;
use crate::errors::ProvisionerError;
use crate::http::client::HttpClient;
use crate::http::status::{CanvasStatusReporter, StatusReporter};
use crate::pubsub::subscriber::Subscriber;
use crate::workers::deployer::DeploymentWorker;
use crate::workers::outcomes::RunOutcome;

/// Main application state
pub struct AppState {
    pub deployer: Arc<Deployer>,

    /// Runs accepted messages
    pub worker: Arc<DeploymentWorker>,

    /// Decodes push deliveries
    pub subscriber: Arc<Subscriber>,

    /// Tracks in-flight runs
    pub tracker: TaskTracker,

    /// Parent of every run's cancellation token
    pub cancel: CancellationToken,
}

impl AppState {
    /// Initialize application state
    pub fn init(
        options: &AppOptions,
        outcomes: mpsc::Sender<RunOutcome>,
    ) -> Result<Self, ProvisionerError> {
        info!("Initializing application state...");

        let http_client = Arc::new(HttpClient::new(
            &options.api.base_url,
            SecretString::from(options.api.token.expose_secret().to_string()),
            options.api.timeout,
        )?);
        let reporter: Arc<dyn StatusReporter> = Arc::new(CanvasStatusReporter::new(
            http_client,
            options.reporter.clone(),
        ));

        let executor = ExecutorFactory::create(&options.executor);
        info!(
            executor = %executor.kind(),
            module_root = %executor.module_root().display(),
            "Using executor"
        );
        let deployer = Arc::new(Deployer::new(executor, options.storage.clone(), reporter));

        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        let worker = Arc::new(DeploymentWorker::new(
            deployer.clone(),
            tracker.clone(),
            cancel.clone(),
            outcomes,
        ));
        let subscriber = Arc::new(Subscriber::new(
            worker.clone(),
            options.subscription_path.clone(),
        ));

        Ok(Self {
            deployer,
            worker,
            subscriber,
            tracker,
            cancel,
        })
    }

    /// Cancel in-flight runs and wait for them to finish reporting
    pub async fn shutdown(&self) -> Result<(), ProvisionerError> {
        info!(
            in_flight = self.tracker.len(),
            "Shutting down application state..."
        );
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        Ok(())
    }
}
