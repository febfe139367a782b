//! LRU Tracker Module
//!
//! Least Recently Used ordering used to pick a victim when the store is full.

use std::collections::{BTreeMap, HashMap};

// == LRU Tracker ==
/// Tracks access order for capacity eviction.
///
/// Every touch stamps the key with a fresh, monotonically increasing tick.
/// `order` maps ticks back to keys, so it iterates from least to most
/// recently used.
#[derive(Debug, Default)]
pub(crate) struct LruTracker {
    ticks: HashMap<String, u64>,
    order: BTreeMap<u64, String>,
    next_tick: u64,
}

impl LruTracker {
    // == Constructor ==
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used, tracking it if new.
    pub(crate) fn touch(&mut self, key: &str) {
        let tick = self.next_tick;
        self.next_tick += 1;

        match self.ticks.get_mut(key) {
            Some(previous) => {
                self.order.remove(&*previous);
                *previous = tick;
            }
            None => {
                self.ticks.insert(key.to_string(), tick);
            }
        }
        self.order.insert(tick, key.to_string());
    }

    // == Remove ==
    /// Stops tracking a key. Unknown keys are ignored.
    pub(crate) fn remove(&mut self, key: &str) {
        if let Some(tick) = self.ticks.remove(key) {
            self.order.remove(&tick);
        }
    }

    // == Evict Oldest ==
    /// Returns and forgets the least recently used key accepted by
    /// `evictable`. Rejected keys keep their position.
    pub(crate) fn evict_oldest(&mut self, evictable: impl Fn(&str) -> bool) -> Option<String> {
        let tick = self
            .order
            .iter()
            .find(|(_, key)| evictable(key.as_str()))
            .map(|(tick, _)| *tick)?;
        let key = self.order.remove(&tick)?;
        self.ticks.remove(&key);
        Some(key)
    }
}
