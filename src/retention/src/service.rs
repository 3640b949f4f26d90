//! Retention policy enforcement service.
//!
//! Owns the single background worker that runs a [`Sweeper`] on a fixed
//! interval. `start` and `stop` are idempotent and must be called from one
//! controlling task.

use std::sync::Arc;

use common::config::RetentionConfig;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, dispatcher, error, info};

use crate::meta::MetaClient;
use crate::metrics::RetentionMetrics;
use crate::store::ShardStore;
use crate::sweep::Sweeper;

struct Worker {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct RetentionService {
    config: RetentionConfig,
    sweeper: Arc<Sweeper>,
    worker: Option<Worker>,
}

impl RetentionService {
    /// Create a service whose events are discarded.
    pub fn new(
        config: RetentionConfig,
        meta: Arc<dyn MetaClient>,
        store: Arc<dyn ShardStore>,
    ) -> Self {
        Self::with_dispatch(config, meta, store, Dispatch::none())
    }

    /// Create a service that records its events through `dispatch`.
    pub fn with_dispatch(
        config: RetentionConfig,
        meta: Arc<dyn MetaClient>,
        store: Arc<dyn ShardStore>,
        dispatch: Dispatch,
    ) -> Self {
        let sweeper = Sweeper::new(meta, store)
            .with_orphan_reconciliation(config.reconcile_orphans)
            .with_dispatch(dispatch);
        Self {
            config,
            sweeper: Arc::new(sweeper),
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn metrics(&self) -> &RetentionMetrics {
        self.sweeper.metrics()
    }

    /// Launch the background worker. Returns immediately.
    ///
    /// A no-op when the service is disabled or already running. Must be
    /// called from within a tokio runtime.
    pub fn start(&mut self) {
        if !self.config.enabled || self.worker.is_some() {
            return;
        }

        let interval = self.config.check_interval;
        dispatcher::with_default(self.sweeper.dispatch(), || {
            info!(
                check_interval = ?interval,
                "Starting retention policy enforcement service"
            );
        });

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            run(self.sweeper.clone(), interval, shutdown.clone())
                .with_subscriber(self.sweeper.dispatch().clone()),
        );

        self.worker = Some(Worker { shutdown, handle });
    }

    /// Signal the worker to exit and wait until it has.
    ///
    /// A sweep in progress runs to completion first. A no-op when the service
    /// is disabled or not running.
    pub async fn stop(&mut self) {
        if !self.config.enabled {
            return;
        }
        let Some(worker) = self.worker.take() else {
            return;
        };

        dispatcher::with_default(self.sweeper.dispatch(), || {
            info!("Retention policy enforcement service closing");
        });

        worker.shutdown.cancel();
        if let Err(e) = worker.handle.await {
            dispatcher::with_default(self.sweeper.dispatch(), || {
                error!(error = %e, "Retention worker terminated abnormally");
            });
        }
    }
}

impl Drop for RetentionService {
    fn drop(&mut self) {
        // Without a caller to await the join, at least stop further sweeps.
        if let Some(worker) = &self.worker {
            worker.shutdown.cancel();
        }
    }
}

async fn run(sweeper: Arc<Sweeper>, period: std::time::Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    // A slow sweep pushes the next one back instead of queueing catch-up ticks.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // Not raced against shutdown: a running sweep always finishes.
        sweeper.sweep().await;
    }
}
