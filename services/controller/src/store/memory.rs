//! In-process state store.
//!
//! Objects are kept as JSON keyed by `(kind, namespace/name)`. A single
//! version counter stamps every write, so resource versions are strictly
//! increasing across the whole store. Watch events are broadcast while the
//! write lock is held, which keeps them in commit order.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use staticpage_id::{ObjectKey, ObjectUid, ResourceVersion};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::debug;

use super::{StateStore, StoreError, StoreResult, WatchAction, WatchEvent};
use crate::api::{OwnerReference, Resource};

const DEFAULT_EVENT_CAPACITY: usize = 1024;

type StoreKey = (&'static str, ObjectKey);

struct StoredObject {
    uid: ObjectUid,
    version: ResourceVersion,
    owners: Vec<OwnerReference>,
    value: serde_json::Value,
}

struct Inner {
    objects: BTreeMap<StoreKey, StoredObject>,
    version: ResourceVersion,
    last_created: Option<DateTime<Utc>>,
}

impl Inner {
    fn bump_version(&mut self) -> ResourceVersion {
        self.version = self.version.next();
        self.version
    }

    /// Creation timestamps are strictly increasing in creation order, even
    /// when the wall clock does not advance between two creates.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_created {
            Some(last) if now <= last => last + TimeDelta::microseconds(1),
            _ => now,
        };
        self.last_created = Some(ts);
        ts
    }

    fn load<R: Resource>(&self, key: &ObjectKey) -> StoreResult<(R, ResourceVersion)> {
        let stored = self
            .objects
            .get(&(R::KIND, key.clone()))
            .ok_or_else(|| StoreError::NotFound {
                kind: R::KIND,
                key: key.clone(),
            })?;
        let obj = serde_json::from_value(stored.value.clone())?;
        Ok((obj, stored.version))
    }

    fn save<R: Resource>(&mut self, key: ObjectKey, obj: &R) -> StoreResult<()> {
        let meta = obj.meta();
        let uid = meta
            .uid
            .ok_or_else(|| StoreError::Invalid(format!("{} {key} has no uid", R::KIND)))?;
        let stored = StoredObject {
            uid,
            version: meta.resource_version,
            owners: meta.owner_references.clone(),
            value: serde_json::to_value(obj)?,
        };
        self.objects.insert((R::KIND, key), stored);
        Ok(())
    }
}

/// Operation counts since creation or the last [`MemoryStore::reset_counters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounters {
    /// `get` and `list` calls.
    pub reads: u64,
    /// `create`, `update`, `update_status` and `delete` calls, including
    /// ones that failed.
    pub writes: u64,
}

/// In-memory [`StateStore`] with operation counters and fault injection.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    events: broadcast::Sender<WatchEvent>,
    reads: AtomicU64,
    writes: AtomicU64,
    read_faults: Mutex<VecDeque<StoreError>>,
    write_faults: Mutex<VecDeque<StoreError>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a store whose watch channel buffers `capacity` events per
    /// subscriber before lagging.
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: RwLock::new(Inner {
                objects: BTreeMap::new(),
                version: ResourceVersion::UNSET,
                last_created: None,
            }),
            events,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            read_faults: Mutex::new(VecDeque::new()),
            write_faults: Mutex::new(VecDeque::new()),
        }
    }

    pub fn counters(&self) -> StoreCounters {
        StoreCounters {
            reads: self.reads.load(Ordering::SeqCst),
            writes: self.writes.load(Ordering::SeqCst),
        }
    }

    pub fn reset_counters(&self) {
        self.reads.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
    }

    /// Make the next read (`get`/`list`) fail with `err`. Faults queue up.
    pub async fn inject_read_fault(&self, err: StoreError) {
        self.read_faults.lock().await.push_back(err);
    }

    /// Make the next write fail with `err`. Faults queue up.
    pub async fn inject_write_fault(&self, err: StoreError) {
        self.write_faults.lock().await.push_back(err);
    }

    /// Number of stored objects of all kinds.
    pub async fn len(&self) -> usize {
        self.inner.read().await.objects.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn begin_read(&self) -> StoreResult<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.read_faults.lock().await.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn begin_write(&self) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        match self.write_faults.lock().await.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn notify(
        &self,
        kind: &'static str,
        key: ObjectKey,
        action: WatchAction,
        owners: Vec<OwnerReference>,
    ) {
        // No subscribers is fine.
        let _ = self.events.send(WatchEvent {
            kind,
            key,
            action,
            owners,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn object_key<R: Resource>(obj: &R) -> StoreResult<ObjectKey> {
    obj.meta()
        .key()
        .map_err(|e| StoreError::Invalid(format!("{}: {e}", R::KIND)))
}

fn check_version(
    kind: &'static str,
    key: &ObjectKey,
    expected: ResourceVersion,
    actual: ResourceVersion,
) -> StoreResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(StoreError::VersionConflict {
            kind,
            key: key.clone(),
            expected,
            actual,
        })
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get<R: Resource>(&self, key: &ObjectKey) -> StoreResult<R> {
        self.begin_read().await?;
        let inner = self.inner.read().await;
        inner.load::<R>(key).map(|(obj, _)| obj)
    }

    async fn list<R: Resource>(&self, namespace: Option<&str>) -> StoreResult<Vec<R>> {
        self.begin_read().await?;
        let inner = self.inner.read().await;
        inner
            .objects
            .iter()
            .filter(|((kind, key), _)| {
                *kind == R::KIND && namespace.is_none_or(|ns| key.namespace() == ns)
            })
            .map(|(_, stored)| {
                serde_json::from_value::<R>(stored.value.clone()).map_err(StoreError::from)
            })
            .collect()
    }

    async fn create<R: Resource>(&self, mut obj: R) -> StoreResult<R> {
        self.begin_write().await?;
        let key = object_key(&obj)?;

        let mut inner = self.inner.write().await;
        if inner.objects.contains_key(&(R::KIND, key.clone())) {
            return Err(StoreError::AlreadyExists { kind: R::KIND, key });
        }

        let version = inner.bump_version();
        let created = inner.next_timestamp();
        let meta = obj.meta_mut();
        meta.uid = Some(ObjectUid::new());
        meta.resource_version = version;
        meta.creation_timestamp = Some(created);
        obj.clear_status();

        inner.save(key.clone(), &obj)?;
        debug!(kind = R::KIND, key = %key, version = %version, "Created object");
        self.notify(R::KIND, key, WatchAction::Added, obj.meta().owner_references.clone());
        Ok(obj)
    }

    async fn update<R: Resource>(&self, mut obj: R) -> StoreResult<R> {
        self.begin_write().await?;
        let key = object_key(&obj)?;

        let mut inner = self.inner.write().await;
        let (current, stored_version) = inner.load::<R>(&key)?;
        check_version(R::KIND, &key, obj.meta().resource_version, stored_version)?;

        let version = inner.bump_version();
        obj.copy_status_from(&current);
        let meta = obj.meta_mut();
        meta.uid = current.meta().uid;
        meta.creation_timestamp = current.meta().creation_timestamp;
        meta.resource_version = version;

        inner.save(key.clone(), &obj)?;
        debug!(kind = R::KIND, key = %key, version = %version, "Updated object");
        self.notify(R::KIND, key, WatchAction::Modified, obj.meta().owner_references.clone());
        Ok(obj)
    }

    async fn update_status<R: Resource>(&self, obj: R) -> StoreResult<R> {
        self.begin_write().await?;
        let key = object_key(&obj)?;

        let mut inner = self.inner.write().await;
        let (mut current, stored_version) = inner.load::<R>(&key)?;
        check_version(R::KIND, &key, obj.meta().resource_version, stored_version)?;

        let version = inner.bump_version();
        current.copy_status_from(&obj);
        current.meta_mut().resource_version = version;

        inner.save(key.clone(), &current)?;
        debug!(kind = R::KIND, key = %key, version = %version, "Updated status");
        self.notify(R::KIND, key, WatchAction::Modified, current.meta().owner_references.clone());
        Ok(current)
    }

    async fn delete<R: Resource>(&self, key: &ObjectKey) -> StoreResult<()> {
        self.begin_write().await?;

        let mut inner = self.inner.write().await;
        let root = inner
            .objects
            .remove(&(R::KIND, key.clone()))
            .ok_or_else(|| StoreError::NotFound {
                kind: R::KIND,
                key: key.clone(),
            })?;

        let mut frontier = vec![root.uid];
        let mut removed: Vec<(StoreKey, StoredObject)> = vec![((R::KIND, key.clone()), root)];

        // Cascade through owner references until no dependents remain.
        while let Some(owner_uid) = frontier.pop() {
            let dependents: Vec<StoreKey> = inner
                .objects
                .iter()
                .filter(|(_, obj)| obj.owners.iter().any(|r| r.uid == owner_uid))
                .map(|(k, _)| k.clone())
                .collect();

            for dependent in dependents {
                if let Some(obj) = inner.objects.remove(&dependent) {
                    frontier.push(obj.uid);
                    removed.push((dependent, obj));
                }
            }
        }

        debug!(
            kind = R::KIND,
            key = %key,
            cascaded = removed.len().saturating_sub(1),
            "Deleted object"
        );

        for ((kind, obj_key), obj) in removed {
            self.notify(kind, obj_key, WatchAction::Deleted, obj.owners);
        }
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ConfigMap, ObjectMeta, StaticPage, StaticPageSpec};

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new("default", name).unwrap()
    }

    fn page(name: &str) -> StaticPage {
        StaticPage::new(
            ObjectMeta::for_key(&key(name)),
            StaticPageSpec {
                title: "t".to_string(),
                content: "c".to_string(),
                image: String::new(),
            },
        )
    }

    fn config_map(name: &str, owner: Option<&StaticPage>) -> ConfigMap {
        let mut metadata = ObjectMeta::for_key(&key(name));
        if let Some(owner) = owner {
            metadata
                .owner_references
                .extend(OwnerReference::controller_of(owner));
        }
        ConfigMap {
            metadata,
            data: BTreeMap::from([("index.html".to_string(), "x".to_string())]),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_metadata_and_resets_status() {
        let store = MemoryStore::new();
        let mut p = page("hello");
        p.status.active = true;

        let created = store.create(p).await.unwrap();
        assert!(created.metadata.uid.is_some());
        assert!(created.metadata.resource_version.is_set());
        assert!(created.metadata.creation_timestamp.is_some());
        assert!(!created.status.active);

        let fetched: StaticPage = store.get(&key("hello")).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_duplicate_rejected() {
        let store = MemoryStore::new();
        store.create(page("hello")).await.unwrap();
        let err = store.create(page("hello")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { kind: "StaticPage", .. }));
    }

    #[tokio::test]
    async fn test_kinds_are_separate_namespaces() {
        let store = MemoryStore::new();
        store.create(page("same")).await.unwrap();
        store.create(config_map("same", None)).await.unwrap();
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_name() {
        let store = MemoryStore::new();
        let mut invalid = page("hello");
        invalid.metadata.name = "Not_Valid".to_string();
        let err = store.create(invalid).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_update_with_stale_version_conflicts() {
        let store = MemoryStore::new();
        let created = store.create(page("hello")).await.unwrap();

        let mut first = created.clone();
        first.spec.title = "first".to_string();
        let updated = store.update(first).await.unwrap();
        assert!(updated.metadata.resource_version > created.metadata.resource_version);

        let mut stale = created.clone();
        stale.spec.title = "second".to_string();
        let err = store.update(stale).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict { expected, actual, .. }
                if expected == created.metadata.resource_version
                    && actual == updated.metadata.resource_version
        ));

        let current: StaticPage = store.get(&key("hello")).await.unwrap();
        assert_eq!(current.spec.title, "first");
    }

    #[tokio::test]
    async fn test_update_preserves_status_and_identity() {
        let store = MemoryStore::new();
        let created = store.create(page("hello")).await.unwrap();

        let mut status = created.clone();
        status.status.active = true;
        let with_status = store.update_status(status).await.unwrap();
        assert!(with_status.status.active);

        let mut edit = with_status.clone();
        edit.status.active = false;
        edit.metadata.uid = Some(ObjectUid::new());
        edit.spec.content = "new".to_string();
        let updated = store.update(edit).await.unwrap();

        assert!(updated.status.active);
        assert_eq!(updated.metadata.uid, created.metadata.uid);
        assert_eq!(
            updated.metadata.creation_timestamp,
            created.metadata.creation_timestamp
        );
        assert_eq!(updated.spec.content, "new");
    }

    #[tokio::test]
    async fn test_update_status_ignores_spec() {
        let store = MemoryStore::new();
        let created = store.create(page("hello")).await.unwrap();

        let mut obj = created.clone();
        obj.spec.title = "ignored".to_string();
        obj.status.active = true;
        let result = store.update_status(obj).await.unwrap();

        assert_eq!(result.spec.title, "t");
        assert!(result.status.active);
    }

    #[tokio::test]
    async fn test_update_missing_object() {
        let store = MemoryStore::new();
        let err = store.update(page("ghost")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_cascades_to_owned_objects() {
        let store = MemoryStore::new();
        let parent = store.create(page("hello")).await.unwrap();
        let child = store
            .create(config_map("hello-html", Some(&parent)))
            .await
            .unwrap();

        // Grandchild owned by the ConfigMap.
        let mut grandchild = config_map("hello-extra", None);
        grandchild
            .metadata
            .owner_references
            .extend(OwnerReference::controller_of(&child));
        store.create(grandchild).await.unwrap();
        store.create(config_map("unrelated", None)).await.unwrap();

        let mut events = store.watch();
        store.delete::<StaticPage>(&key("hello")).await.unwrap();

        assert!(store.get::<ConfigMap>(&key("hello-html")).await.unwrap_err().is_not_found());
        assert!(store.get::<ConfigMap>(&key("hello-extra")).await.unwrap_err().is_not_found());
        assert!(store.get::<ConfigMap>(&key("unrelated")).await.is_ok());

        let mut deleted = Vec::new();
        while let Ok(event) = events.try_recv() {
            assert_eq!(event.action, WatchAction::Deleted);
            deleted.push(event.key.name().to_string());
        }
        assert_eq!(deleted, vec!["hello", "hello-html", "hello-extra"]);
    }

    #[tokio::test]
    async fn test_list_filters_by_kind_and_namespace() {
        let store = MemoryStore::new();
        store.create(page("b")).await.unwrap();
        store.create(page("a")).await.unwrap();
        let mut other = page("c");
        other.metadata.namespace = "other".to_string();
        store.create(other).await.unwrap();
        store.create(config_map("a-html", None)).await.unwrap();

        let all: Vec<StaticPage> = store.list(None).await.unwrap();
        let names: Vec<_> = all.iter().map(|p| p.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        let default: Vec<StaticPage> = store.list(Some("default")).await.unwrap();
        assert_eq!(default.len(), 2);
    }

    #[tokio::test]
    async fn test_versions_and_timestamps_strictly_increase() {
        let store = MemoryStore::new();
        let a = store.create(page("a")).await.unwrap();
        let b = store.create(config_map("b", None)).await.unwrap();

        assert!(b.metadata.resource_version > a.metadata.resource_version);
        assert!(b.metadata.creation_timestamp > a.metadata.creation_timestamp);
    }

    #[tokio::test]
    async fn test_fault_injection_and_counters() {
        let store = MemoryStore::new();
        store.inject_write_fault(StoreError::Timeout).await;
        store
            .inject_read_fault(StoreError::Unavailable("partition".into()))
            .await;

        assert_eq!(store.create(page("a")).await.unwrap_err(), StoreError::Timeout);
        assert!(store.get::<StaticPage>(&key("a")).await.unwrap_err().is_transient());

        store.create(page("a")).await.unwrap();
        store.get::<StaticPage>(&key("a")).await.unwrap();

        assert_eq!(store.counters(), StoreCounters { reads: 2, writes: 2 });
        store.reset_counters();
        assert_eq!(store.counters(), StoreCounters::default());
    }

    #[tokio::test]
    async fn test_watch_reports_owner_references() {
        let store = MemoryStore::new();
        let parent = store.create(page("hello")).await.unwrap();
        let mut events = store.watch();

        store
            .create(config_map("hello-html", Some(&parent)))
            .await
            .unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, "ConfigMap");
        assert_eq!(event.action, WatchAction::Added);
        assert_eq!(event.owners[0].name, "hello");
    }
}
