//! StaticPage converger.
//!
//! One call to [`Converger::reconcile`] performs a single fetch-compare-
//! correct pass for one page:
//! - fetch the page; a missing page is already converged
//! - converge the content ConfigMap, then the serving Pod, in that order
//! - mark the page active once both children match
//!
//! Children are created with a controller owner reference to the page and
//! are only ever updated when the page is their controller. Anything else
//! under a derived name is a naming conflict and is left untouched.
//! Deletion is the store's job: removing the page cascades to its children.

use std::sync::Arc;
use std::time::Duration;

use staticpage_id::{IdError, ObjectKey, ReconcileId};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::api::{ConfigMap, ObjectMeta, OwnerReference, Pod, Resource, StaticPage};
use crate::derive;
use crate::store::{StateStore, StoreError};

/// Cancellation signal for an in-flight pass. `true` means stop.
pub type CancelSignal = watch::Receiver<bool>;

/// Result of one reconciliation pass.
#[derive(Debug)]
pub enum Outcome {
    /// Children match the page (or the page is gone).
    Converged,

    /// Another writer got there first; run again after the delay.
    RequeueAfter(Duration),

    /// The pass failed; see [`ConvergeError::is_retryable`].
    Failed(ConvergeError),
}

impl Outcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

/// Errors that end a reconciliation pass.
#[derive(Debug, thiserror::Error)]
pub enum ConvergeError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A child exists under the derived name but is not controlled by this
    /// page.
    #[error(
        "{kind} {key} exists and is not controlled by this StaticPage (controller: {})",
        describe_owner(.owner)
    )]
    NamingConflict {
        kind: &'static str,
        key: ObjectKey,
        owner: Option<OwnerReference>,
    },

    /// A derived child name breaks the naming rules, typically because the
    /// page name leaves no room for the suffix.
    #[error("derived {kind} name for {key} is invalid: {source}")]
    InvalidChildName {
        kind: &'static str,
        key: ObjectKey,
        source: IdError,
    },

    #[error("StaticPage {0} has no uid")]
    MissingUid(ObjectKey),

    #[error("reconciliation cancelled")]
    Cancelled,
}

impl ConvergeError {
    /// Returns true if the dispatcher should retry the key with backoff.
    ///
    /// Naming conflicts and invalid child names need an operator;
    /// cancellation means shutdown.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::MissingUid(_))
    }
}

/// What a child step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChildAction {
    Created,
    Updated,
    Unchanged,
}

/// Converges StaticPages against a [`StateStore`].
pub struct Converger<S> {
    store: Arc<S>,
}

impl<S: StateStore> Converger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Run one pass for the page at `key`.
    #[instrument(
        skip(self, key, cancel),
        fields(namespace = %key.namespace(), name = %key.name(), reconcile_id = %ReconcileId::new())
    )]
    pub async fn reconcile(&self, key: &ObjectKey, cancel: &CancelSignal) -> Outcome {
        match self.converge(key, cancel).await {
            Ok(()) => Outcome::Converged,
            Err(ConvergeError::Store(e)) if e.is_conflict() => {
                debug!(error = %e, "Concurrent modification, requeueing");
                Outcome::RequeueAfter(Duration::ZERO)
            }
            Err(e) => Outcome::Failed(e),
        }
    }

    async fn converge(&self, key: &ObjectKey, cancel: &CancelSignal) -> Result<(), ConvergeError> {
        let page: StaticPage = match self.store.get(key).await {
            Ok(page) => page,
            Err(e) if e.is_not_found() => {
                debug!("StaticPage not found, nothing to do");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let owner = OwnerReference::controller_of(&page)
            .ok_or_else(|| ConvergeError::MissingUid(key.clone()))?;

        // Both child names are checked before any write.
        let content_key = derive::content_key(key);
        let workload_key = derive::workload_key(key);
        check_child_name::<ConfigMap>(&content_key)?;
        check_child_name::<Pod>(&workload_key)?;

        // Content first: the Pod mounts the ConfigMap by name.
        let content = self.converge_content(&page, &owner, &content_key).await?;
        check_cancelled(cancel)?;

        let workload = self
            .converge_workload(&page, &owner, &content_key, &workload_key)
            .await?;
        check_cancelled(cancel)?;

        debug!(content = ?content, workload = ?workload, "Children converged");
        self.mark_active(page).await
    }

    async fn converge_content(
        &self,
        page: &StaticPage,
        owner: &OwnerReference,
        key: &ObjectKey,
    ) -> Result<ChildAction, ConvergeError> {
        let target = derive::derive_content(page);

        let existing = match self.store.get::<ConfigMap>(key).await {
            Ok(existing) => existing,
            Err(e) if e.is_not_found() => {
                let cm = ConfigMap {
                    metadata: child_meta(key, page, owner),
                    data: target,
                };
                let created = self.store.create(cm).await?;
                info!(
                    kind = ConfigMap::KIND,
                    child = %key,
                    version = %created.metadata.resource_version,
                    "Created content"
                );
                return Ok(ChildAction::Created);
            }
            Err(e) => return Err(e.into()),
        };

        ensure_controlled::<ConfigMap>(&existing.metadata, owner, key)?;

        let Some(field) = derive::content_divergence(&existing.data, &target) else {
            debug!(kind = ConfigMap::KIND, child = %key, "Content up to date");
            return Ok(ChildAction::Unchanged);
        };
        info!(kind = ConfigMap::KIND, child = %key, field, "Content diverged, updating");

        // The fetched resource_version rides along; a concurrent write
        // turns this into a VersionConflict instead of an overwrite.
        let mut desired = existing;
        desired.data = target;
        self.store.update(desired).await?;
        Ok(ChildAction::Updated)
    }

    async fn converge_workload(
        &self,
        page: &StaticPage,
        owner: &OwnerReference,
        content_key: &ObjectKey,
        key: &ObjectKey,
    ) -> Result<ChildAction, ConvergeError> {
        let target = derive::derive_workload(page, content_key.name());

        let existing = match self.store.get::<Pod>(key).await {
            Ok(existing) => existing,
            Err(e) if e.is_not_found() => {
                let pod = Pod {
                    metadata: child_meta(key, page, owner),
                    spec: target,
                };
                let created = self.store.create(pod).await?;
                info!(
                    kind = Pod::KIND,
                    child = %key,
                    version = %created.metadata.resource_version,
                    "Created workload"
                );
                return Ok(ChildAction::Created);
            }
            Err(e) => return Err(e.into()),
        };

        ensure_controlled::<Pod>(&existing.metadata, owner, key)?;

        let Some(field) = derive::workload_divergence(&existing.spec, &target) else {
            debug!(kind = Pod::KIND, child = %key, "Workload up to date");
            return Ok(ChildAction::Unchanged);
        };
        info!(kind = Pod::KIND, child = %key, field, "Workload diverged, updating");

        let mut desired = existing;
        desired.spec = target;
        self.store.update(desired).await?;
        Ok(ChildAction::Updated)
    }

    /// Record `status.active = true`; no write if it already is.
    async fn mark_active(&self, mut page: StaticPage) -> Result<(), ConvergeError> {
        if page.status.active {
            return Ok(());
        }
        page.status.active = true;
        self.store.update_status(page).await?;
        info!("StaticPage active");
        Ok(())
    }
}

fn describe_owner(owner: &Option<OwnerReference>) -> String {
    owner
        .as_ref()
        .map_or_else(|| "none".to_string(), ToString::to_string)
}

fn child_meta(key: &ObjectKey, page: &StaticPage, owner: &OwnerReference) -> ObjectMeta {
    ObjectMeta {
        labels: derive::child_labels(&page.metadata.name),
        owner_references: vec![owner.clone()],
        ..ObjectMeta::for_key(key)
    }
}

fn ensure_controlled<R: Resource>(
    meta: &ObjectMeta,
    owner: &OwnerReference,
    key: &ObjectKey,
) -> Result<(), ConvergeError> {
    if meta.is_controlled_by(owner) {
        return Ok(());
    }
    let current = meta.controller_owner().cloned();
    warn!(
        kind = R::KIND,
        child = %key,
        controller = ?current.as_ref().map(ToString::to_string),
        "Child name taken by an object this page does not control"
    );
    Err(ConvergeError::NamingConflict {
        kind: R::KIND,
        key: key.clone(),
        owner: current,
    })
}

fn check_child_name<R: Resource>(key: &ObjectKey) -> Result<(), ConvergeError> {
    key.validate().map_err(|source| {
        warn!(kind = R::KIND, child = %key, error = %source, "Derived child name is invalid");
        ConvergeError::InvalidChildName {
            kind: R::KIND,
            key: key.clone(),
            source,
        }
    })
}

fn check_cancelled(cancel: &CancelSignal) -> Result<(), ConvergeError> {
    if *cancel.borrow() {
        debug!("Cancellation requested, stopping pass");
        return Err(ConvergeError::Cancelled);
    }
    Ok(())
}
