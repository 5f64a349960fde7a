//! Session-scoped keyed caches for fetched entities.
//!
//! Entries are immutable server-side within a session, so there is no
//! eviction and no TTL. The cache itself performs no I/O: callers check
//! presence, fetch on a miss, and store the result. `begin_fetch` provides
//! the per-key single-flight guard that makes concurrent misses dispatch
//! exactly one fetch.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Recover the guard even if a holder panicked; cache state is a plain map
/// and stays valid.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Passive keyed store plus per-key fetch coalescing.
pub struct EntityCache<K, V> {
    entries: Mutex<HashMap<K, V>>,
    inflight: AsyncMutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K, V> Default for EntityCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> EntityCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            inflight: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Clone of the cached value, if present.
    pub fn get(&self, key: &K) -> Option<V> {
        lock_unpoisoned(&self.entries).get(key).cloned()
    }

    /// Store a value. Overwriting is allowed (used for refresh), though
    /// normal usage never overwrites.
    pub fn put(&self, key: K, value: V) {
        lock_unpoisoned(&self.entries).insert(key, value);
    }

    pub fn contains(&self, key: &K) -> bool {
        lock_unpoisoned(&self.entries).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Acquire the single-flight guard for `key`.
    ///
    /// While the returned guard is held, every other `begin_fetch` for the
    /// same key waits. Callers must re-check `get` after acquiring: a
    /// waiter that wakes up after the winner completed will find the entry
    /// cached and must not dispatch a second fetch.
    pub async fn begin_fetch(&self, key: &K) -> OwnedMutexGuard<()> {
        let slot = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(
                inflight
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        slot.lock_owned().await
    }
}
