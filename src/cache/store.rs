//! Key/value store with explicit per-entry expiry.
//!
//! Entries are JSON blobs persisted through a [`Backing`] with an in-process
//! memory layer in front. Expired entries are dropped lazily on read or in
//! bulk via [`TtlStore::purge_expired`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::backing::Backing;
use crate::calendar::Clock;

/// A stored value and the instant it stops being readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: serde_json::Value,
    /// `None` never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// TTL store scoped to a key namespace.
///
/// `clear`, `purge_expired` and eviction only ever touch keys under the
/// namespace; other keys are readable and writable but unmanaged.
pub struct TtlStore {
    backing: Box<dyn Backing>,
    memory: Mutex<HashMap<String, CacheEntry>>,
    namespace: String,
    clock: Arc<dyn Clock>,
}

impl TtlStore {
    pub fn new(backing: Box<dyn Backing>, namespace: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backing,
            memory: Mutex::new(HashMap::new()),
            namespace: namespace.into(),
            clock,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now().with_timezone(&Utc)
    }

    fn memory(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.memory.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn owns(&self, key: &str) -> bool {
        key.starts_with(&self.namespace)
    }

    /// Persist `value` under `key` until `expires_at`.
    ///
    /// Returns whether the write landed. A full backing triggers one eviction
    /// pass (oldest-expiring half of this store's entries) and one retry; if
    /// that also fails the write is dropped and logged.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, expires_at: Option<DateTime<Utc>>) -> bool {
        let entry = match serde_json::to_value(value) {
            Ok(payload) => CacheEntry {
                payload,
                expires_at,
            },
            Err(e) => {
                error!("Failed to serialize cache entry {}: {}", key, e);
                return false;
            }
        };

        let blob = match serde_json::to_string(&entry) {
            Ok(blob) => blob,
            Err(e) => {
                error!("Failed to encode cache entry {}: {}", key, e);
                return false;
            }
        };

        if let Err(first) = self.backing.write(key, &blob) {
            warn!("Cache write for {} failed ({}), evicting and retrying", key, first);
            let evicted = self.evict_oldest_half(key);
            debug!("Evicted {} cache entries", evicted);

            if let Err(second) = self.backing.write(key, &blob) {
                error!("Dropping cache write for {}: {}", key, second);
                self.memory().remove(key);
                return false;
            }
        }

        self.memory().insert(key.to_string(), entry);
        true
    }

    /// Read a live entry; an expired one is removed and reported absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.load_entry(key)?;

        if !entry.is_live(self.now()) {
            debug!("Cache entry {} expired", key);
            self.remove(key);
            return None;
        }

        match serde_json::from_value(entry.payload) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", key, e);
                self.remove(key);
                None
            }
        }
    }

    fn load_entry(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.memory().get(key) {
            return Some(entry.clone());
        }

        let blob = match self.backing.read(key) {
            Ok(blob) => blob?,
            Err(e) => {
                warn!("Cache read for {} failed: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry>(&blob) {
            Ok(entry) => {
                self.memory().insert(key.to_string(), entry.clone());
                Some(entry)
            }
            Err(e) => {
                warn!("Discarding corrupt cache blob {}: {}", key, e);
                self.remove(key);
                None
            }
        }
    }

    /// Idempotent.
    pub fn remove(&self, key: &str) {
        self.memory().remove(key);
        if let Err(e) = self.backing.delete(key) {
            warn!("Cache delete for {} failed: {}", key, e);
        }
    }

    fn owned_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = match self.backing.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Listing cache keys failed: {}", e);
                Vec::new()
            }
        };
        keys.extend(self.memory().keys().cloned());
        keys.retain(|k| self.owns(k));
        keys.sort();
        keys.dedup();
        keys
    }

    /// Remove every entry in this store's namespace. Returns how many.
    pub fn clear(&self) -> usize {
        let keys = self.owned_keys();
        for key in &keys {
            self.remove(key);
        }
        keys.len()
    }

    /// Drop every expired entry in the namespace. Returns how many.
    pub fn purge_expired(&self) -> usize {
        let now = self.now();
        let mut purged = 0;
        for key in self.owned_keys() {
            match self.load_entry(&key) {
                Some(entry) if entry.is_live(now) => {}
                Some(_) => {
                    self.remove(&key);
                    purged += 1;
                }
                // load_entry already removed anything unreadable
                None => {}
            }
        }
        purged
    }

    /// Evict the oldest-expiring half of this store's expiring entries.
    ///
    /// Non-expiring entries (indexes, pointers) and `keep` are never evicted.
    fn evict_oldest_half(&self, keep: &str) -> usize {
        let mut candidates: Vec<(DateTime<Utc>, String)> = self
            .owned_keys()
            .into_iter()
            .filter(|k| k != keep)
            .filter_map(|k| {
                let at = self.load_entry(&k)?.expires_at?;
                Some((at, k))
            })
            .collect();

        candidates.sort();
        let count = (candidates.len() + 1) / 2;
        for (_, key) in candidates.iter().take(count) {
            self.remove(key);
        }
        count
    }

    /// Drop the memory layer so the next read goes to the backing.
    #[cfg(test)]
    pub fn forget_memory(&self) {
        self.memory().clear();
    }

    #[cfg(test)]
    pub fn backing_keys(&self) -> Vec<String> {
        self.backing.keys().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backing::{FileBacking, MemoryBacking};
    use crate::calendar::testing::ManualClock;
    use chrono::Duration;
    use tempfile::TempDir;

    fn store_with(backing: Box<dyn Backing>) -> (TtlStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::noon());
        let store = TtlStore::new(backing, "ns_", clock.clone());
        (store, clock)
    }

    fn in_hours(clock: &ManualClock, hours: i64) -> Option<DateTime<Utc>> {
        Some((clock.now() + Duration::hours(hours)).with_timezone(&Utc))
    }

    #[test]
    fn test_get_after_expiry_removes_entry() {
        let temp_dir = TempDir::new().unwrap();
        let (store, clock) =
            store_with(Box::new(FileBacking::new(temp_dir.path().to_path_buf())));

        assert!(store.set("ns_a", &vec![1, 2, 3], in_hours(&clock, 1)));
        assert_eq!(store.get::<Vec<i32>>("ns_a"), Some(vec![1, 2, 3]));

        clock.advance(Duration::hours(1));
        assert_eq!(store.get::<Vec<i32>>("ns_a"), None);
        assert!(store.backing_keys().is_empty());
    }

    #[test]
    fn test_reads_through_to_backing() {
        let temp_dir = TempDir::new().unwrap();
        let (store, clock) =
            store_with(Box::new(FileBacking::new(temp_dir.path().to_path_buf())));

        store.set("ns_a", &"hello", in_hours(&clock, 2));
        store.forget_memory();
        assert_eq!(store.get::<String>("ns_a").as_deref(), Some("hello"));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (store, _) = store_with(Box::new(MemoryBacking::new()));
        store.set("ns_a", &1, None);
        store.remove("ns_a");
        store.remove("ns_a");
        assert_eq!(store.get::<i32>("ns_a"), None);
    }

    #[test]
    fn test_clear_leaves_foreign_keys() {
        let (store, clock) = store_with(Box::new(MemoryBacking::new()));
        store.set("ns_a", &1, in_hours(&clock, 1));
        store.set("ns_b", &2, None);
        store.set("other", &3, None);

        assert_eq!(store.clear(), 2);
        assert_eq!(store.backing_keys(), vec!["other".to_string()]);
        assert_eq!(store.get::<i32>("other"), Some(3));
    }

    #[test]
    fn test_full_backing_evicts_oldest_half_then_retries() {
        let (store, clock) = store_with(Box::new(MemoryBacking::with_capacity(4)));
        store.set("ns_1", &1, in_hours(&clock, 1));
        store.set("ns_2", &2, in_hours(&clock, 2));
        store.set("ns_3", &3, in_hours(&clock, 3));
        store.set("ns_index", &"idx", None);

        assert!(store.set("ns_4", &4, in_hours(&clock, 4)));

        // Two of the three expiring entries go, soonest first.
        assert_eq!(store.get::<i32>("ns_1"), None);
        assert_eq!(store.get::<i32>("ns_2"), None);
        assert_eq!(store.get::<i32>("ns_3"), Some(3));
        assert_eq!(store.get::<i32>("ns_4"), Some(4));
        assert_eq!(store.get::<String>("ns_index").as_deref(), Some("idx"));
    }

    #[test]
    fn test_write_dropped_when_retry_fails() {
        let (store, _) = store_with(Box::new(MemoryBacking::with_capacity(1)));
        store.set("other", &1, None);

        assert!(!store.set("ns_a", &2, None));
        assert_eq!(store.get::<i32>("ns_a"), None);
        assert_eq!(store.get::<i32>("other"), Some(1));
    }

    #[test]
    fn test_purge_expired() {
        let (store, clock) = store_with(Box::new(MemoryBacking::new()));
        store.set("ns_old", &1, in_hours(&clock, 1));
        store.set("ns_new", &2, in_hours(&clock, 5));
        clock.advance(Duration::hours(2));

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.get::<i32>("ns_new"), Some(2));
    }

    #[test]
    fn test_corrupt_blob_is_discarded() {
        let backing = MemoryBacking::new();
        backing.write("ns_bad", "not json").unwrap();
        let (store, _) = store_with(Box::new(backing));

        assert_eq!(store.get::<i32>("ns_bad"), None);
        assert!(store.backing_keys().is_empty());
    }
}
