//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::ProvisionerError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::outcomes::{self, OutcomeStats, RunOutcome};

/// Run the provisioner until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ProvisionerError> {
    info!("Initializing provisioner...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start provisioner: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppState>, ProvisionerError> {
    let (outcomes_tx, outcomes_rx) = mpsc::channel(options.outcome_worker.capacity);
    let app_state = Arc::new(AppState::init(options, outcomes_tx)?);
    shutdown_manager.with_app_state(app_state.clone())?;

    init_outcome_worker(
        outcomes_rx,
        app_state.clone(),
        shutdown_manager,
        shutdown_tx.subscribe(),
    )?;

    init_server(
        options,
        app_state.clone(),
        shutdown_manager,
        shutdown_tx.subscribe(),
    )
    .await?;

    Ok(app_state)
}

fn init_outcome_worker(
    outcomes_rx: mpsc::Receiver<RunOutcome>,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ProvisionerError> {
    info!("Initializing outcome worker...");

    let tracker = app_state.tracker.clone();
    let handle = tokio::spawn(async move {
        outcomes::run(
            outcomes_rx,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
                // Outlive the runs so their outcomes are still logged
                tracker.wait().await;
            }),
        )
        .await
    });

    shutdown_manager.with_outcome_worker_handle(handle)
}

async fn init_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ProvisionerError> {
    info!("Initializing HTTP server...");

    let server_state = ServerState::new(app_state.subscriber.clone());
    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_server_handle(server_handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    server_handle: Option<JoinHandle<Result<(), ProvisionerError>>>,
    outcome_worker_handle: Option<JoinHandle<OutcomeStats>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            server_handle: None,
            outcome_worker_handle: None,
        }
    }

    pub fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), ProvisionerError> {
        if self.app_state.is_some() {
            return Err(ProvisionerError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    pub fn with_outcome_worker_handle(
        &mut self,
        handle: JoinHandle<OutcomeStats>,
    ) -> Result<(), ProvisionerError> {
        if self.outcome_worker_handle.is_some() {
            return Err(ProvisionerError::ShutdownError(
                "outcome_worker_handle already set".to_string(),
            ));
        }
        self.outcome_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), ProvisionerError>>,
    ) -> Result<(), ProvisionerError> {
        if self.server_handle.is_some() {
            return Err(ProvisionerError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), ProvisionerError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), ProvisionerError> {
        info!("Shutting down provisioner...");

        // 1. Stop taking pushes
        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| ProvisionerError::ShutdownError(e.to_string()))??;
        }

        // 2. Cancel in-flight runs and let them report
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown().await?;
        }

        // 3. Outcome worker drains what the runs left behind
        if let Some(handle) = self.outcome_worker_handle.take() {
            let stats = handle
                .await
                .map_err(|e| ProvisionerError::ShutdownError(e.to_string()))?;
            info!(
                succeeded = stats.succeeded,
                failed = stats.failed,
                "Run outcomes since start"
            );
        }

        info!("Shutdown complete");
        Ok(())
    }
}
