//! Event source: turns store changes into reconcile requests.
//!
//! - StaticPage changes request their own key
//! - ConfigMap/Pod changes request the StaticPage named by their
//!   controller owner reference; children without one are ignored
//! - a periodic resync requests every StaticPage

use std::sync::Arc;
use std::time::Duration;

use staticpage_id::ObjectKey;
use staticpage_reconcile::WorkQueue;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

use crate::api::{Resource, StaticPage};
use crate::store::{StateStore, WatchEvent};

/// The StaticPage key an event should reconcile, if any.
pub fn request_for(event: &WatchEvent) -> Option<ObjectKey> {
    if event.kind == StaticPage::KIND {
        return Some(event.key.clone());
    }
    let owner = event
        .owners
        .iter()
        .find(|r| r.controller && r.kind == StaticPage::KIND)?;
    ObjectKey::new(event.key.namespace(), owner.name.clone()).ok()
}

/// Enqueue every StaticPage currently in the store.
pub async fn enqueue_all<S: StateStore>(store: &S, queue: &WorkQueue<ObjectKey>) -> usize {
    let pages = match store.list::<StaticPage>(None).await {
        Ok(pages) => pages,
        Err(e) => {
            warn!(error = %e, "Failed to list StaticPages for resync");
            return 0;
        }
    };

    let mut count = 0;
    for page in pages {
        match page.metadata.key() {
            Ok(key) => {
                queue.add(key).await;
                count += 1;
            }
            Err(e) => warn!(
                name = %page.metadata.name,
                error = %e,
                "Skipping StaticPage with invalid key"
            ),
        }
    }
    count
}

/// Forward watch events into the queue until shutdown.
///
/// A lagged subscriber has missed events, so it falls back to a full
/// resync rather than guessing which keys changed.
#[instrument(skip_all)]
pub async fn pump_events<S: StateStore>(
    store: Arc<S>,
    mut events: broadcast::Receiver<WatchEvent>,
    queue: Arc<WorkQueue<ObjectKey>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    if let Some(key) = request_for(&event) {
                        debug!(
                            kind = event.kind,
                            object = %event.key,
                            request = %key,
                            action = ?event.action,
                            "Watch event"
                        );
                        queue.add(key).await;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Watch stream lagged, resyncing");
                    enqueue_all(store.as_ref(), &queue).await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Watch stream closed");
                    break;
                }
            },
            changed = shutdown.changed() => {
                if stop_requested(changed, &shutdown) {
                    break;
                }
            }
        }
    }
}

/// Enqueue every StaticPage now and then on every `interval` tick until
/// shutdown.
#[instrument(skip_all, fields(interval_secs = interval.as_secs()))]
pub async fn resync<S: StateStore>(
    store: Arc<S>,
    queue: Arc<WorkQueue<ObjectKey>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let count = enqueue_all(store.as_ref(), &queue).await;
                debug!(count, "Resync enqueued StaticPages");
            }
            changed = shutdown.changed() => {
                if stop_requested(changed, &shutdown) {
                    break;
                }
            }
        }
    }
}

/// A closed shutdown channel counts as a stop; its value can no longer
/// change.
fn stop_requested(
    changed: Result<(), watch::error::RecvError>,
    shutdown: &watch::Receiver<bool>,
) -> bool {
    changed.is_err() || *shutdown.borrow()
}
