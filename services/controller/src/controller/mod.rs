//! StaticPage dispatcher.
//!
//! The controller owns all retry policy. It feeds keys from the watch
//! stream and the periodic resync into a [`WorkQueue`], and runs a pool of
//! workers that each take one key at a time and hand it to the
//! [`Converger`]. The queue guarantees a key is never reconciled by two
//! workers at once.

pub mod events;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use staticpage_id::ObjectKey;
use staticpage_reconcile::{
    BackoffPolicy, RetryTracker, WorkQueue, DEFAULT_MAX_RETRIES, DEFAULT_RESYNC_INTERVAL,
    DEFAULT_RETRY_WINDOW,
};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::converger::{ConvergeError, Converger, Outcome};
use crate::store::StateStore;

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Concurrent reconcile workers.
    pub workers: usize,

    /// Interval between full resyncs.
    pub resync_interval: Duration,

    /// Backoff for retryable failures.
    pub backoff: BackoffPolicy,

    /// Failures within `retry_window` after which a key is reported as
    /// persistently failing. Retries continue at the maximum backoff.
    pub max_retries: u32,

    pub retry_window: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            backoff: BackoffPolicy::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_window: DEFAULT_RETRY_WINDOW,
        }
    }
}

/// Counters for reconcile outcomes.
#[derive(Debug, Default)]
pub struct ReconcileStats {
    converged: AtomicU64,
    requeued: AtomicU64,
    retried: AtomicU64,
    conflicts: AtomicU64,
}

/// Point-in-time copy of [`ReconcileStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub converged: u64,
    pub requeued: u64,
    pub retried: u64,
    pub conflicts: u64,
}

impl ReconcileStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            converged: self.converged.load(Ordering::SeqCst),
            requeued: self.requeued.load(Ordering::SeqCst),
            retried: self.retried.load(Ordering::SeqCst),
            conflicts: self.conflicts.load(Ordering::SeqCst),
        }
    }
}

/// Shared state of the worker pool.
struct Dispatch<S> {
    converger: Converger<S>,
    queue: Arc<WorkQueue<ObjectKey>>,
    retries: Mutex<RetryTracker<ObjectKey>>,
    backoff: BackoffPolicy,
    stats: Arc<ReconcileStats>,
}

/// Runs the StaticPage reconcile loop against a store.
pub struct Controller<S> {
    store: Arc<S>,
    config: ControllerConfig,
    queue: Arc<WorkQueue<ObjectKey>>,
    stats: Arc<ReconcileStats>,
}

impl<S: StateStore> Controller<S> {
    pub fn new(store: Arc<S>, config: ControllerConfig) -> Self {
        Self {
            store,
            config,
            queue: Arc::new(WorkQueue::new()),
            stats: Arc::new(ReconcileStats::default()),
        }
    }

    /// Handle to the outcome counters; stays valid after `run` consumes
    /// the controller.
    pub fn stats(&self) -> Arc<ReconcileStats> {
        Arc::clone(&self.stats)
    }

    /// Run until `shutdown` turns true, then drain workers.
    ///
    /// In-flight passes see the same signal and stop between child steps.
    #[instrument(skip_all, fields(workers = self.config.workers))]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            workers = self.config.workers,
            resync_interval_secs = self.config.resync_interval.as_secs(),
            "Starting StaticPage controller"
        );

        // Subscribe before the first resync so no change falls in between.
        let events = self.store.watch();

        let dispatch = Arc::new(Dispatch {
            converger: Converger::new(Arc::clone(&self.store)),
            queue: Arc::clone(&self.queue),
            retries: Mutex::new(RetryTracker::new(
                self.config.max_retries,
                self.config.retry_window,
            )),
            backoff: self.config.backoff.clone(),
            stats: Arc::clone(&self.stats),
        });

        let pump = tokio::spawn(events::pump_events(
            Arc::clone(&self.store),
            events,
            Arc::clone(&self.queue),
            shutdown.clone(),
        ));
        let resync = tokio::spawn(events::resync(
            Arc::clone(&self.store),
            Arc::clone(&self.queue),
            self.config.resync_interval,
            shutdown.clone(),
        ));

        let workers: Vec<_> = (0..self.config.workers.max(1))
            .map(|id| {
                let dispatch = Arc::clone(&dispatch);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { dispatch.work(id, shutdown).await })
            })
            .collect();

        // A dropped sender also ends the wait.
        loop {
            if *shutdown.borrow() {
                break;
            }
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        info!("StaticPage controller shutting down");
        self.queue.shutdown().await;

        for handle in workers.into_iter().chain([pump, resync]) {
            if let Err(e) = handle.await {
                error!(error = %e, "Controller task panicked");
            }
        }
        info!("StaticPage controller stopped");
    }
}

impl<S: StateStore> Dispatch<S> {
    async fn work(&self, id: usize, shutdown: watch::Receiver<bool>) {
        debug!(worker = id, "Worker started");
        while let Some(key) = self.queue.get().await {
            let outcome = self.converger.reconcile(&key, &shutdown).await;
            self.handle(&key, outcome).await;
            self.queue.done(&key).await;
        }
        debug!(worker = id, "Worker stopped");
    }

    async fn handle(&self, key: &ObjectKey, outcome: Outcome) {
        match outcome {
            Outcome::Converged => {
                self.stats.converged.fetch_add(1, Ordering::SeqCst);
                self.retries.lock().await.clear(key);
            }
            Outcome::RequeueAfter(delay) => {
                self.stats.requeued.fetch_add(1, Ordering::SeqCst);
                self.queue.add_after(key.clone(), delay);
            }
            Outcome::Failed(e) if e.is_retryable() => {
                self.stats.retried.fetch_add(1, Ordering::SeqCst);
                let (attempt, exhausted) = {
                    let mut retries = self.retries.lock().await;
                    // Drop keys whose failures aged out, e.g. deleted pages.
                    retries.prune();
                    let attempt = retries.record_failure(key);
                    (attempt, retries.is_exhausted(key))
                };
                let delay = self.backoff.delay(attempt.saturating_sub(1));
                if exhausted {
                    error!(
                        key = %key,
                        attempt,
                        error = %e,
                        "StaticPage persistently failing to reconcile"
                    );
                } else {
                    warn!(
                        key = %key,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Reconcile failed, retrying"
                    );
                }
                self.queue.add_after(key.clone(), delay);
            }
            Outcome::Failed(ConvergeError::Cancelled) => {
                debug!(key = %key, "Reconcile cancelled");
            }
            Outcome::Failed(e) => {
                // Waits for the next event or resync on this key.
                self.stats.conflicts.fetch_add(1, Ordering::SeqCst);
                self.retries.lock().await.clear(key);
                error!(key = %key, error = %e, "Reconcile needs operator attention");
            }
        }
    }
}
