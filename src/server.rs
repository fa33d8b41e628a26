use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use uploadbox::accounts::ConfigAccountResolver;
use uploadbox::api::{self, AppState};
use uploadbox::config::Config;
use uploadbox::connectivity::StaticConnectivity;
use uploadbox::events::BroadcastEmitter;
use uploadbox::observability::Metrics;
use uploadbox::operation::StorageOperationFactory;
use uploadbox::records::{FjallUploadStore, UploadStore};
use uploadbox::registry::ActiveOperationRegistry;
use uploadbox::scheduler::{ParkedAccounts, UploadScheduler};
use uploadbox::storage::StorageClient;
use uploadbox::worker::UploadWorker;

use crate::AnyError;

/// Everything a command needs, wired from configuration
pub struct Services {
    pub store: Arc<FjallUploadStore>,
    pub worker: Arc<UploadWorker>,
    pub scheduler: UploadScheduler,
    pub events: Arc<BroadcastEmitter>,
    pub state: AppState,
    pub account_names: Vec<String>,
}

impl Services {
    pub fn from_config(config: &Config, shutdown: CancellationToken) -> Result<Self, AnyError> {
        let store = Arc::new(
            FjallUploadStore::open(&config.store.path)
                .map_err(|e| format!("Failed to open upload store: {e}"))?,
        );
        let preferences = Arc::new(store.preferences()?);
        let storage = StorageClient::from_config(&config.storage)
            .map_err(|e| format!("Failed to initialise storage: {e}"))?;
        let accounts = ConfigAccountResolver::new(&config.accounts);
        let account_names = accounts.account_names();

        let registry = Arc::new(ActiveOperationRegistry::new());
        let metrics = Arc::new(Metrics::new());
        let events = Arc::new(BroadcastEmitter::new());

        let worker = Arc::new(
            UploadWorker::builder()
                .accounts(Arc::new(accounts))
                .store(store.clone())
                .preferences(preferences.clone())
                .factory(Arc::new(StorageOperationFactory))
                .connectivity(Arc::new(StaticConnectivity::from_config(
                    &config.connectivity,
                )))
                .storage(storage)
                .registry(registry.clone())
                .events(events.clone())
                .metrics(metrics.clone())
                .chunk_size(config.worker.chunk_size)
                .metered_chunk_size(config.worker.metered_chunk_size)
                .shutdown(shutdown.clone())
                .build(),
        );

        let scheduler = UploadScheduler::new(
            worker.clone(),
            store.clone(),
            &config.scheduler,
            config.worker.batch_size,
        )
        .with_shutdown(shutdown);

        let state = AppState::new(store.clone(), registry, preferences, metrics);

        Ok(Self {
            store,
            worker,
            scheduler,
            events,
            state,
            account_names,
        })
    }

    /// Upload everything pending for `account` unless it is parked
    pub async fn drain_account(&self, account: &str, parked: &mut ParkedAccounts) {
        let pending = match self.store.pending_ids(account).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(account, error = %e, "Failed to read pending uploads");
                return;
            }
        };
        if pending.is_empty() {
            parked.release(account);
            return;
        }
        if parked.is_parked(account, &pending) {
            debug!(account, queued = pending.len(), "Account parked after a failed run");
            return;
        }

        let outcomes = self.scheduler.run_all(account, &pending).await;
        for outcome in &outcomes {
            info!(
                account,
                batch_index = outcome.batch_index,
                attempts = outcome.attempts,
                result = %outcome.result,
                "Batch outcome"
            );
        }

        let pending_after = self.store.pending_ids(account).await.unwrap_or_default();
        parked.record(account, &outcomes, pending_after);
    }

    /// Stop starting uploads and cancel the ones in flight
    pub fn stop(&self) {
        self.worker.shutdown();
    }

    pub fn flush(&self) {
        if let Err(e) = self.store.flush() {
            warn!(error = %e, "Failed to flush upload store");
        }
    }
}

/// Serve the control API and drain queues until a shutdown signal
pub async fn run(config: Config) -> Result<(), AnyError> {
    let shutdown = CancellationToken::new();
    let services = Arc::new(Services::from_config(&config, shutdown.clone())?);

    let poller = tokio::spawn(poll_loop(
        services.clone(),
        Duration::from_millis(config.worker.poll_interval_ms),
        shutdown.clone(),
    ));

    let listener = TcpListener::bind(config.server.bind_addr).await?;
    let signal_token = shutdown.clone();
    api::serve(listener, services.state.clone(), async move {
        shutdown_signal().await;
        signal_token.cancel();
    })
    .await?;

    shutdown.cancel();
    services.stop();
    // Interrupted uploads write their status on the way out
    if let Err(e) = poller.await {
        warn!(error = %e, "Upload poller ended abnormally");
    }
    services.flush();

    info!("uploadbox stopped");
    Ok(())
}

async fn poll_loop(services: Arc<Services>, every: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(
        accounts = services.account_names.len(),
        interval_ms = every.as_millis() as u64,
        "Upload poller started"
    );

    let mut parked = ParkedAccounts::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.cancelled() => break,
        }

        for account in &services.account_names {
            if shutdown.is_cancelled() {
                break;
            }
            services.drain_account(account, &mut parked).await;
        }
    }

    info!("Upload poller stopped");
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
