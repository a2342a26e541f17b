//! In-process replicated store with injectable faults.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{AsyncStore, GetResponse};
use crate::error::StoreError;
use crate::types::{ContentKey, ReplicaId, StoreKey};

/// Per-replica values of one key.
type Replicated = Vec<Option<Vec<u8>>>;

/// A store that keeps `n` replicas in memory.
///
/// Faults are injected through the `fail_*` and `lag_removals` knobs, which
/// makes it the test double for every layer above the store.
pub struct MemoryStore {
    replicas: Vec<ReplicaId>,
    data: Mutex<HashMap<StoreKey, Replicated>>,
    fail_puts: AtomicBool,
    fail_removes: AtomicBool,
    failing_put_keys: Mutex<HashSet<ContentKey>>,
    lagging_removals: AtomicUsize,
    puts: AtomicUsize,
    gets: AtomicUsize,
    removes: AtomicUsize,
}

impl MemoryStore {
    pub fn new(replicas: usize) -> Self {
        Self {
            replicas: (0..replicas)
                .map(|i| ReplicaId(format!("replica-{i}")))
                .collect(),
            data: Mutex::new(HashMap::new()),
            fail_puts: AtomicBool::new(false),
            fail_removes: AtomicBool::new(false),
            failing_put_keys: Mutex::new(HashSet::new()),
            lagging_removals: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
        }
    }

    /// Reject every subsequent put.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Reject puts whose content key equals `content`, whatever the location.
    pub fn fail_puts_for(&self, content: impl Into<ContentKey>) {
        lock(&self.failing_put_keys).insert(content.into());
    }

    /// Reject every subsequent remove (nothing is removed).
    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    /// The next `n` removals are acknowledged but leave the last replica
    /// untouched, as if it had not converged yet.
    pub fn lag_removals(&self, n: usize) {
        self.lagging_removals.store(n, Ordering::SeqCst);
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn remove_count(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    /// First replica value of `key`, empty content included.
    pub fn value(&self, key: &StoreKey) -> Option<Vec<u8>> {
        lock(&self.data)
            .get(key)
            .and_then(|values| values.iter().flatten().next().cloned())
    }

    pub fn contains(&self, key: &StoreKey) -> bool {
        self.value(key).is_some()
    }

    /// Full copy of the store state, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<StoreKey, Replicated> {
        lock(&self.data)
            .iter()
            .map(|(key, values)| (key.clone(), values.clone()))
            .collect()
    }

    fn take_lagging_removal(&self) -> bool {
        self.lagging_removals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(3)
    }
}

#[async_trait]
impl AsyncStore for MemoryStore {
    async fn put(&self, key: &StoreKey, value: Vec<u8>) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) || lock(&self.failing_put_keys).contains(&key.content)
        {
            return Err(StoreError::Rejected { op: "put", key: key.clone() });
        }
        let values = vec![Some(value); self.replicas.len()];
        lock(&self.data).insert(key.clone(), values);
        Ok(())
    }

    async fn get(&self, key: &StoreKey) -> Result<GetResponse, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let data = lock(&self.data);
        let stored = data.get(key);
        let entries = self
            .replicas
            .iter()
            .enumerate()
            .map(|(i, replica)| {
                let value = stored.and_then(|values| values.get(i).cloned().flatten());
                (replica.clone(), value)
            })
            .collect();
        Ok(GetResponse { entries })
    }

    async fn remove(&self, key: &StoreKey) -> Result<(), StoreError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected { op: "remove", key: key.clone() });
        }
        let lagging = self.take_lagging_removal();
        let mut data = lock(&self.data);
        let Some(values) = data.get_mut(key) else {
            return Ok(());
        };
        let keep = if lagging { values.len().saturating_sub(1) } else { values.len() };
        for value in values.iter_mut().take(keep) {
            *value = None;
        }
        if values.iter().all(Option::is_none) {
            data.remove(key);
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(content: &str) -> StoreKey {
        StoreKey::new("alice", content)
    }

    #[tokio::test]
    async fn put_then_get_reaches_every_replica() {
        let store = MemoryStore::new(3);
        store.put(&key("a"), b"v".to_vec()).await.expect("put");

        let resp = store.get(&key("a")).await.expect("get");
        assert_eq!(resp.entries.len(), 3);
        assert_eq!(resp.present_count(), 3);
    }

    #[tokio::test]
    async fn lagging_removal_leaves_one_replica_stale() {
        let store = MemoryStore::new(3);
        store.put(&key("a"), b"v".to_vec()).await.expect("put");
        store.lag_removals(1);

        store.remove(&key("a")).await.expect("remove");
        assert_eq!(store.get(&key("a")).await.expect("get").present_count(), 1);

        store.remove(&key("a")).await.expect("remove");
        assert!(store.get(&key("a")).await.expect("get").is_absent_everywhere());
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn failing_put_key_is_rejected_without_state_change() {
        let store = MemoryStore::new(2);
        store.fail_puts_for("USER_PROFILE");

        let err = store
            .put(&key("USER_PROFILE"), b"p".to_vec())
            .await
            .expect_err("put should fail");
        assert!(matches!(err, StoreError::Rejected { op: "put", .. }));
        assert!(store.snapshot().is_empty());
        assert_eq!(store.put_count(), 1);

        store.put(&key("OTHER"), b"o".to_vec()).await.expect("other put");
        assert!(store.contains(&key("OTHER")));
    }

    #[tokio::test]
    async fn zero_replicas_answer_with_no_entries() {
        let store = MemoryStore::new(0);
        store.put(&key("a"), b"v".to_vec()).await.expect("put");
        let resp = store.get(&key("a")).await.expect("get");
        assert!(resp.entries.is_empty());
        assert!(resp.is_absent_everywhere());
    }
}
