//! State store contract.
//!
//! The converger only ever talks to a [`StateStore`]. The store owns
//! versioning (optimistic concurrency), change notification, and
//! cascading deletion of objects whose owner is removed.

mod memory;

use async_trait::async_trait;
use staticpage_id::{ObjectKey, ResourceVersion};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::api::{OwnerReference, Resource};

pub use memory::{MemoryStore, StoreCounters};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by the state store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: ObjectKey },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: &'static str, key: ObjectKey },

    #[error("{kind} {key} was modified concurrently (expected version {expected}, found {actual})")]
    VersionConflict {
        kind: &'static str,
        key: ObjectKey,
        expected: ResourceVersion,
        actual: ResourceVersion,
    },

    #[error("invalid object: {0}")]
    Invalid(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation timed out")]
    Timeout,

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Returns true for faults expected to clear on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }

    /// Returns true if the error signals concurrent progress by another
    /// writer rather than a fault.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. } | Self::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// What happened to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    Added,
    Modified,
    Deleted,
}

/// Change notification emitted after every committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: &'static str,
    pub key: ObjectKey,
    pub action: WatchAction,
    /// Owner references of the object as of this change.
    pub owners: Vec<OwnerReference>,
}

/// Versioned object store.
///
/// Every returned object carries its current `resource_version`; `update`
/// and `update_status` succeed only if the caller's version still matches.
/// Deleting an object deletes, transitively, every object that lists it in
/// `owner_references`.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    async fn get<R: Resource>(&self, key: &ObjectKey) -> StoreResult<R>;

    /// All objects of a kind, optionally restricted to one namespace,
    /// ordered by key.
    async fn list<R: Resource>(&self, namespace: Option<&str>) -> StoreResult<Vec<R>>;

    /// Create a new object. The store assigns uid, version and creation
    /// timestamp, and resets any status.
    async fn create<R: Resource>(&self, obj: R) -> StoreResult<R>;

    /// Replace an object's spec and metadata. Status is preserved.
    async fn update<R: Resource>(&self, obj: R) -> StoreResult<R>;

    /// Replace only an object's status.
    async fn update_status<R: Resource>(&self, obj: R) -> StoreResult<R>;

    async fn delete<R: Resource>(&self, key: &ObjectKey) -> StoreResult<()>;

    /// Subscribe to change notifications from now on.
    fn watch(&self) -> broadcast::Receiver<WatchEvent>;
}
