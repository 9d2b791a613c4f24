//! Remote mirroring for a single persisted slot.
//!
//! A [`RemoteMirror`] keeps one [`PersistentStore`] in step with a row of a
//! [`RemoteTable`] under a last-write-wins policy:
//!
//! 1. On mount, [`RemoteMirror::hydrate`] fetches the row once. A row found
//!    on the remote overwrites the local value unconditionally.
//! 2. After that first fetch attempt completes (found, not found, or
//!    failed), every local change schedules a push. A new change cancels the
//!    pending push and restarts the quiet period, so a burst of edits turns
//!    into one upsert carrying the last value.
//!
//! Changes reported before the fetch attempt completes are never pushed. That
//! is what keeps hydration from echoing a stale pre-hydration value back to
//! the remote. [`RemoteMirror::run`] looks at the store once the fetch is
//! done and pushes it only if it differs from what hydration left there.
//!
//! There is no offline queue. A push that fails is dropped and the status
//! goes to [`SyncStatus::Error`]; the next local change tries again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::remote::RemoteTable;
use crate::store::PersistentStore;

/// Default quiet period before a change is pushed.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2000);

/// Sync state of a mirrored slot, for status indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Synced,
    Error,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "idle"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Synced => write!(f, "synced"),
            SyncStatus::Error => write!(f, "error"),
        }
    }
}

/// Mirror tuning.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Quiet period after the last change before pushing
    pub debounce: Duration,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Mirrors one slot to the remote table.
///
/// Cheap to clone; clones drive the same mirror.
pub struct RemoteMirror<T> {
    inner: Arc<MirrorInner<T>>,
}

impl<T> Clone for RemoteMirror<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct MirrorInner<T> {
    store: PersistentStore<T>,
    remote: Arc<dyn RemoteTable>,
    config: MirrorConfig,
    status: watch::Sender<SyncStatus>,
    mounted: watch::Sender<bool>,
    /// Set once the mount-time fetch attempt has finished
    fetched: AtomicBool,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<T> RemoteMirror<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Creates a mounted mirror for `store`.
    pub fn new(store: PersistentStore<T>, remote: Arc<dyn RemoteTable>, config: MirrorConfig) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        let (mounted, _) = watch::channel(true);

        Self {
            inner: Arc::new(MirrorInner {
                store,
                remote,
                config,
                status,
                mounted,
                fetched: AtomicBool::new(false),
                pending: Mutex::new(None),
            }),
        }
    }

    /// Returns the mirrored slot key.
    pub fn key(&self) -> &str {
        self.inner.store.key()
    }

    /// Returns the mirrored store.
    pub fn store(&self) -> &PersistentStore<T> {
        &self.inner.store
    }

    /// Returns the current sync status.
    pub fn status(&self) -> SyncStatus {
        *self.inner.status.borrow()
    }

    /// Subscribes to sync status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    /// Returns false once [`RemoteMirror::unmount`] has been called.
    pub fn is_mounted(&self) -> bool {
        self.inner.is_mounted()
    }

    /// Returns true once the mount-time fetch attempt has finished and
    /// changes are allowed to push.
    pub fn is_hydrated(&self) -> bool {
        self.inner.fetched.load(Ordering::SeqCst)
    }

    /// Fetches the remote row once and applies it to the store.
    ///
    /// A row found on the remote wins over the local value. No row leaves
    /// the local value in place to be pushed by the next change. A failed
    /// fetch leaves the local value untouched and is not retried.
    ///
    /// If the mirror is unmounted while the fetch is in flight, the result is
    /// discarded.
    pub async fn hydrate(&self) {
        self.fetch_and_apply().await;
    }

    /// Runs the mount-time fetch. Returns the JSON form of the remote value
    /// written into the store, if one was.
    async fn fetch_and_apply(&self) -> Option<Value> {
        let inner = &self.inner;
        if !inner.is_mounted() {
            return None;
        }

        if !inner.remote.is_enabled() {
            tracing::debug!("Remote sync disabled, skipping fetch for '{}'", self.key());
            inner.fetched.store(true, Ordering::SeqCst);
            return None;
        }

        inner.set_status(SyncStatus::Syncing);
        let result = inner.remote.fetch(self.key()).await;

        if !inner.is_mounted() {
            tracing::debug!("Mirror for '{}' unmounted during fetch, discarding", self.key());
            return None;
        }

        let mut applied = None;
        let status = match result {
            Ok(Some(value)) => match serde_json::from_value::<T>(value) {
                Ok(remote_value) => {
                    tracing::debug!("Hydrated '{}' from remote", self.key());
                    applied = serde_json::to_value(&remote_value).ok();
                    inner.store.set(remote_value);
                    SyncStatus::Synced
                }
                Err(e) => {
                    tracing::warn!("Remote value for '{}' has unexpected shape: {}", self.key(), e);
                    SyncStatus::Error
                }
            },
            Ok(None) => {
                tracing::debug!("No remote row for '{}', keeping local value", self.key());
                SyncStatus::Idle
            }
            Err(e) => {
                tracing::warn!("Failed to fetch '{}' from remote: {}", self.key(), e);
                SyncStatus::Error
            }
        };

        inner.set_status(status);
        inner.fetched.store(true, Ordering::SeqCst);
        applied
    }

    /// Handles a local change to the mirrored value.
    ///
    /// Moves the status to [`SyncStatus::Syncing`] and restarts the quiet
    /// period; the push fires once no further change arrives within it. Ignored while unmounted, while remote sync is
    /// disabled, and before the mount-time fetch attempt has finished.
    ///
    /// Must be called from within a Tokio runtime; outside one the change is
    /// dropped with a warning.
    pub fn on_value_change(&self, value: &T) {
        let inner = &self.inner;
        if !inner.is_mounted() || !self.is_hydrated() || !inner.remote.is_enabled() {
            return;
        }

        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to serialize '{}' for push: {}", self.key(), e);
                return;
            }
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!("No async runtime, dropping push for '{}'", self.key());
                return;
            }
        };

        let mut pending = inner.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.take() {
            previous.abort();
        }

        inner.set_status(SyncStatus::Syncing);

        let task_inner = Arc::clone(inner);
        *pending = Some(runtime.spawn(async move {
            tokio::time::sleep(task_inner.config.debounce).await;
            task_inner.push(value).await;
        }));
    }

    /// Hydrates, then pushes every later change of the store until unmounted.
    ///
    /// The hydration write itself is not pushed. A local write that lands
    /// while the fetch is in flight or right after it is.
    pub async fn run(&self) {
        let mut changes = self.inner.store.subscribe();
        let mut mounted = self.inner.mounted.subscribe();
        let before = serde_json::to_value(&*changes.borrow()).ok();

        let applied = self.fetch_and_apply().await;
        let expected = applied.or(before);

        let current = changes.borrow_and_update().clone();
        if serde_json::to_value(&current).ok() != expected {
            self.on_value_change(&current);
        }

        while self.is_mounted() {
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let value = changes.borrow_and_update().clone();
                    self.on_value_change(&value);
                }
                _ = mounted.wait_for(|alive| !*alive) => break,
            }
        }
    }

    /// Stops the mirror and cancels any pending push.
    pub fn unmount(&self) {
        self.inner.mounted.send_replace(false);
        let mut pending = self.inner.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = pending.take() {
            handle.abort();
        }
    }
}

impl<T> MirrorInner<T> {
    fn is_mounted(&self) -> bool {
        *self.mounted.borrow()
    }

    fn set_status(&self, status: SyncStatus) {
        self.status.send_replace(status);
    }

    async fn push(&self, value: Value) {
        if !self.is_mounted() || !self.remote.is_enabled() {
            return;
        }

        let key = self.store.key().to_string();
        self.set_status(SyncStatus::Syncing);

        match self.remote.upsert(&key, &value).await {
            Ok(()) => {
                tracing::debug!("Pushed '{}' to remote", key);
                self.set_status(SyncStatus::Synced);
            }
            Err(e) => {
                tracing::warn!("Failed to push '{}' to remote: {}", key, e);
                self.set_status(SyncStatus::Error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryRemoteTable, RemoteError};
    use crate::storage::{MemoryStorage, SlotStorage};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    fn store(initial: Value) -> PersistentStore<Value> {
        let storage: Arc<dyn SlotStorage> = Arc::new(MemoryStorage::new());
        PersistentStore::open(storage, "k", initial)
    }

    fn mirror(
        store: &PersistentStore<Value>,
        remote: &Arc<MemoryRemoteTable>,
    ) -> RemoteMirror<Value> {
        let remote: Arc<dyn RemoteTable> = remote.clone();
        RemoteMirror::new(store.clone(), remote, MirrorConfig::default())
    }

    fn change(mirror: &RemoteMirror<Value>, value: Value) {
        mirror.store().set(value.clone());
        mirror.on_value_change(&value);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_changes_pushes_once() {
        let remote = Arc::new(MemoryRemoteTable::new());
        let store = store(json!(0));
        let mirror = mirror(&store, &remote);
        mirror.hydrate().await;

        for i in 1..=5 {
            change(&mirror, json!(i));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_millis(2500)).await;

        let upserts = remote.upserts();
        assert_eq!(upserts.len(), 1);
        assert_eq!(upserts[0].key, "k");
        assert_eq!(upserts[0].value, json!(5));
        assert_eq!(mirror.status(), SyncStatus::Synced);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_is_syncing_during_quiet_period() {
        let remote = Arc::new(MemoryRemoteTable::new());
        remote.insert("k", json!(1));
        let store = store(json!(0));
        let mirror = mirror(&store, &remote);
        mirror.hydrate().await;
        assert_eq!(mirror.status(), SyncStatus::Synced);

        change(&mirror, json!(2));
        assert_eq!(mirror.status(), SyncStatus::Syncing);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(mirror.status(), SyncStatus::Syncing);
        assert!(remote.upserts().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(mirror.status(), SyncStatus::Synced);
        assert_eq!(remote.get("k"), Some(json!(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_pushed_before_quiet_period() {
        let remote = Arc::new(MemoryRemoteTable::new());
        let store = store(json!(0));
        let mirror = mirror(&store, &remote);
        mirror.hydrate().await;

        change(&mirror, json!(1));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(remote.upserts().is_empty());

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(remote.upserts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_row_overwrites_local_on_mount() {
        let remote = Arc::new(MemoryRemoteTable::new());
        remote.insert("k", json!({"a": 1}));
        let store = store(json!({"a": 0}));
        let mirror = mirror(&store, &remote);

        mirror.hydrate().await;
        assert_eq!(store.get(), json!({"a": 1}));
        assert_eq!(mirror.status(), SyncStatus::Synced);

        change(&mirror, json!({"a": 2}));
        tokio::time::sleep(Duration::from_secs(3)).await;

        let upserts = remote.upserts();
        assert_eq!(upserts.len(), 1);
        assert_eq!(upserts[0].value, json!({"a": 2}));
        assert!(upserts.iter().all(|u| u.value != json!({"a": 0})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_before_fetch_are_not_pushed() {
        let remote = Arc::new(MemoryRemoteTable::new());
        remote.insert("k", json!({"a": 1}));
        let store = store(json!({"a": 0}));
        let mirror = mirror(&store, &remote);

        // Initial hydration notification from the UI binding
        mirror.on_value_change(&json!({"a": 0}));
        mirror.hydrate().await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(remote.upserts().is_empty());
        assert_eq!(store.get(), json!({"a": 1}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_remote_row_keeps_local_and_idles() {
        let remote = Arc::new(MemoryRemoteTable::new());
        let store = store(json!({"a": 0}));
        let mirror = mirror(&store, &remote);

        mirror.hydrate().await;
        assert_eq!(store.get(), json!({"a": 0}));
        assert_eq!(mirror.status(), SyncStatus::Idle);
        assert!(mirror.is_hydrated());

        change(&mirror, json!({"a": 5}));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(remote.get("k"), Some(json!({"a": 5})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_sets_error_and_keeps_local() {
        let remote = Arc::new(MemoryRemoteTable::new());
        remote.insert("k", json!("remote"));
        remote.set_failing(true);
        let store = store(json!("local"));
        let mirror = mirror(&store, &remote);

        mirror.hydrate().await;
        assert_eq!(mirror.status(), SyncStatus::Error);
        assert_eq!(store.get(), json!("local"));
        assert_eq!(remote.fetches().len(), 1);

        // Later edits still push once the remote recovers
        remote.set_failing(false);
        change(&mirror, json!("edited"));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(mirror.status(), SyncStatus::Synced);
        assert_eq!(remote.get("k"), Some(json!("edited")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_failure_is_dropped_then_retried_on_next_change() {
        let remote = Arc::new(MemoryRemoteTable::new());
        let store = store(json!(0));
        let mirror = mirror(&store, &remote);
        mirror.hydrate().await;

        remote.set_failing(true);
        change(&mirror, json!(1));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(mirror.status(), SyncStatus::Error);
        assert!(remote.upserts().is_empty());

        remote.set_failing(false);
        change(&mirror, json!(2));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(mirror.status(), SyncStatus::Synced);
        assert_eq!(remote.upserts().len(), 1);
        assert_eq!(remote.upserts()[0].value, json!(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_remote_is_inert_until_enabled() {
        let remote = Arc::new(MemoryRemoteTable::new());
        remote.set_enabled(false);
        let store = store(json!(0));
        let mirror = mirror(&store, &remote);

        mirror.hydrate().await;
        assert_eq!(mirror.status(), SyncStatus::Idle);
        assert!(remote.fetches().is_empty());

        change(&mirror, json!(1));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(remote.upserts().is_empty());

        // Credentials supplied later
        remote.set_enabled(true);
        change(&mirror, json!(2));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(remote.upserts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_cancels_pending_push() {
        let remote = Arc::new(MemoryRemoteTable::new());
        let store = store(json!(0));
        let mirror = mirror(&store, &remote);
        mirror.hydrate().await;

        change(&mirror, json!(1));
        tokio::time::sleep(Duration::from_millis(500)).await;
        mirror.unmount();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(remote.upserts().is_empty());
        assert!(!mirror.is_mounted());

        change(&mirror, json!(2));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(remote.upserts().is_empty());
    }

    /// Remote whose fetch blocks until released.
    struct GatedRemote {
        release: Notify,
    }

    #[async_trait]
    impl RemoteTable for GatedRemote {
        fn is_enabled(&self) -> bool {
            true
        }

        async fn fetch(&self, _key: &str) -> Result<Option<Value>, RemoteError> {
            self.release.notified().await;
            Ok(Some(json!("late remote value")))
        }

        async fn upsert(&self, _key: &str, _value: &Value) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fetch_result_discarded_after_unmount() {
        let remote = Arc::new(GatedRemote {
            release: Notify::new(),
        });
        let store = store(json!("local"));
        let dyn_remote: Arc<dyn RemoteTable> = remote.clone();
        let mirror = RemoteMirror::new(store.clone(), dyn_remote, MirrorConfig::default());

        let task = {
            let mirror = mirror.clone();
            tokio::spawn(async move { mirror.hydrate().await })
        };
        tokio::task::yield_now().await;

        mirror.unmount();
        remote.release.notify_one();
        task.await.unwrap();

        assert_eq!(store.get(), json!("local"));
        assert!(!mirror.is_hydrated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_hydrates_then_follows_store() {
        let remote = Arc::new(MemoryRemoteTable::new());
        remote.insert("k", json!([1]));
        let store = store(json!([]));
        let mirror = mirror(&store, &remote);
        let mut status = mirror.subscribe_status();

        let task = {
            let mirror = mirror.clone();
            tokio::spawn(async move { mirror.run().await })
        };

        status
            .wait_for(|s| *s == SyncStatus::Synced)
            .await
            .unwrap();
        assert_eq!(store.get(), json!([1]));

        // Hydration itself must not echo back
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(remote.upserts().is_empty());

        for n in 2..=4 {
            store.update(|v| {
                let mut next = v.as_array().cloned().unwrap_or_default();
                next.push(json!(n));
                Value::Array(next)
            });
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        tokio::time::sleep(Duration::from_secs(3)).await;

        let upserts = remote.upserts();
        assert_eq!(upserts.len(), 1);
        assert_eq!(upserts[0].value, json!([1, 2, 3, 4]));

        mirror.unmount();
        task.await.unwrap();
    }

    /// Remote whose fetch lets the test write to the store before answering.
    struct SlowRemote {
        fetching: Notify,
        release: Notify,
        upserts: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl RemoteTable for SlowRemote {
        fn is_enabled(&self) -> bool {
            true
        }

        async fn fetch(&self, _key: &str) -> Result<Option<Value>, RemoteError> {
            self.fetching.notify_one();
            self.release.notified().await;
            Ok(None)
        }

        async fn upsert(&self, _key: &str, value: &Value) -> Result<(), RemoteError> {
            self.upserts.lock().unwrap().push(value.clone());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_pushes_write_made_during_fetch() {
        let remote = Arc::new(SlowRemote {
            fetching: Notify::new(),
            release: Notify::new(),
            upserts: Mutex::new(Vec::new()),
        });
        let store = store(json!("local"));
        let dyn_remote: Arc<dyn RemoteTable> = remote.clone();
        let mirror = RemoteMirror::new(store.clone(), dyn_remote, MirrorConfig::default());

        let task = {
            let mirror = mirror.clone();
            tokio::spawn(async move { mirror.run().await })
        };

        remote.fetching.notified().await;
        store.set(json!("edited during fetch"));
        remote.release.notify_one();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(
            *remote.upserts.lock().unwrap(),
            vec![json!("edited during fetch")]
        );

        mirror.unmount();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_does_not_push_unchanged_local_value() {
        let remote = Arc::new(MemoryRemoteTable::new());
        let store = store(json!({"a": 0}));
        let mirror = mirror(&store, &remote);

        let task = {
            let mirror = mirror.clone();
            tokio::spawn(async move { mirror.run().await })
        };
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(mirror.status(), SyncStatus::Idle);
        assert!(remote.upserts().is_empty());

        mirror.unmount();
        task.await.unwrap();
    }
}
