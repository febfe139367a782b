//! Cache Store Module
//!
//! The expiring key-value store the memo cache sits on: an atomic
//! insert-if-absent with sliding expiration, plus idempotent removal.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{CacheStats, Evictable, ExpirationPolicy, LruTracker, StoreEntry};
use crate::config::Config;
use crate::error::StoreError;

// == Expiring Store ==
/// Capability the memo cache needs from its backing store.
///
/// Every operation on a key must be atomic with respect to every other
/// operation on the same key.
pub trait ExpiringStore<V>: Send + Sync {
    /// Inserts `value` under `key` unless a live entry already exists.
    ///
    /// Returns the resident value: `value` itself if it was inserted, the
    /// pre-existing value otherwise. Either way the entry's sliding window
    /// restarts.
    fn insert_if_absent(
        &self,
        key: &str,
        value: V,
        policy: &ExpirationPolicy,
    ) -> Result<V, StoreError>;

    /// Returns the live value under `key`, restarting its sliding window.
    fn get(&self, key: &str) -> Option<V>;

    /// Removes `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Removes `key` only if its current value satisfies `predicate`.
    ///
    /// Returns whether an entry was removed.
    fn remove_if(&self, key: &str, predicate: &dyn Fn(&V) -> bool) -> Result<bool, StoreError>;

    /// Number of entries currently held, possibly including expired entries
    /// that have not been swept yet.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// == Memory Store ==
/// In-process [`ExpiringStore`] with sliding expiration and LRU capacity eviction.
///
/// Expired entries are treated as absent the moment they are looked at;
/// [`MemoryStore::cleanup_expired`] sweeps the rest. Values that report
/// themselves busy through [`Evictable`] are neither expired nor evicted, so
/// the store may briefly hold more than `max_entries` when all of them are busy.
#[derive(Debug)]
pub struct MemoryStore<V> {
    state: Mutex<StoreState<V>>,
    /// Maximum number of entries allowed
    max_entries: usize,
}

#[derive(Debug)]
struct StoreState<V> {
    entries: HashMap<String, StoreEntry<V>>,
    lru: LruTracker,
    stats: CacheStats,
}

impl<V> MemoryStore<V> {
    // == Constructor ==
    /// Creates a store holding at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: Mutex::new(StoreState {
                entries: HashMap::new(),
                lru: LruTracker::new(),
                stats: CacheStats::new(),
            }),
            max_entries,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_entries)
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.set_total_entries(state.entries.len());
        stats
    }
}

impl<V: Evictable> MemoryStore<V> {
    /// Returns true if a live entry exists, without touching it.
    pub fn contains_key(&self, key: &str) -> bool {
        self.state
            .lock()
            .entries
            .get(key)
            .map_or(false, |entry| !entry.is_expired())
    }

    // == Cleanup Expired ==
    /// Removes all expired entries and returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        self.state.lock().purge_expired(Instant::now())
    }
}

impl<V> StoreState<V> {
    fn drop_entry(&mut self, key: &str) -> Option<StoreEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(key);
        self.stats.set_total_entries(self.entries.len());
        Some(entry)
    }
}

impl<V: Evictable> StoreState<V> {
    /// Drops the entry under `key` if it has expired.
    fn purge_if_expired(&mut self, key: &str, now: Instant) {
        let expired = self
            .entries
            .get(key)
            .map_or(false, |entry| entry.is_expired_at(now));
        if expired {
            self.drop_entry(key);
            self.stats.record_expirations(1);
        }
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.drop_entry(key);
        }
        self.stats.record_expirations(expired_keys.len());
        expired_keys.len()
    }

    /// Frees a slot for one new entry: expired entries go first, then the
    /// least recently used ones that are not busy.
    fn make_room(&mut self, max_entries: usize, now: Instant) -> Result<(), StoreError> {
        if self.entries.len() < max_entries {
            return Ok(());
        }
        if max_entries == 0 {
            return Err(StoreError::CacheFull("store capacity is zero".to_string()));
        }

        self.purge_expired(now);
        while self.entries.len() >= max_entries {
            let entries = &self.entries;
            let victim = self.lru.evict_oldest(|key| {
                entries
                    .get(key)
                    .map_or(true, |entry| entry.value.is_evictable())
            });
            let Some(victim) = victim else {
                debug!(
                    len = self.entries.len(),
                    max_entries, "all entries busy, exceeding capacity"
                );
                break;
            };
            self.entries.remove(&victim);
            self.stats.record_eviction();
            debug!(key = %victim, "evicted least recently used entry");
        }
        self.stats.set_total_entries(self.entries.len());
        Ok(())
    }
}

impl<V: Clone + Send + Evictable> ExpiringStore<V> for MemoryStore<V> {
    fn insert_if_absent(
        &self,
        key: &str,
        value: V,
        policy: &ExpirationPolicy,
    ) -> Result<V, StoreError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let now = Instant::now();

        state.purge_if_expired(key, now);
        if let Some(entry) = state.entries.get_mut(key) {
            entry.touch();
            state.lru.touch(key);
            state.stats.record_hit();
            return Ok(entry.value.clone());
        }

        state.stats.record_miss();
        state.make_room(self.max_entries, now)?;
        state
            .entries
            .insert(key.to_string(), StoreEntry::new(value.clone(), *policy));
        state.lru.touch(key);
        state.stats.set_total_entries(state.entries.len());
        Ok(value)
    }

    fn get(&self, key: &str) -> Option<V> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        state.purge_if_expired(key, Instant::now());
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.touch();
                state.lru.touch(key);
                state.stats.record_hit();
                Some(entry.value.clone())
            }
            None => {
                state.stats.record_miss();
                None
            }
        }
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.drop_entry(key).is_some() {
            state.stats.record_removal();
        }
        Ok(())
    }

    fn remove_if(&self, key: &str, predicate: &dyn Fn(&V) -> bool) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        let matches = state
            .entries
            .get(key)
            .map_or(false, |entry| predicate(&entry.value));
        if matches {
            state.drop_entry(key);
            state.stats.record_removal();
        }
        Ok(matches)
    }

    fn len(&self) -> usize {
        self.state.lock().entries.len()
    }
}
