//! Cache Entry Module
//!
//! Defines the sliding expiration policy and the per-entry bookkeeping the
//! store keeps around each value.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{CacheError, Result};

// == Public Constants ==
/// Longest accepted sliding window (one year)
pub const MAX_SLIDING_EXPIRATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

// == Expiration Policy ==
/// Sliding expiration policy: an entry idle for `sliding` is evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationPolicy {
    sliding: Duration,
}

impl ExpirationPolicy {
    /// Creates a sliding policy.
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidConfig`] if `sliding` is zero or longer
    /// than [`MAX_SLIDING_EXPIRATION`].
    pub fn sliding(sliding: Duration) -> Result<Self> {
        if sliding.is_zero() {
            return Err(CacheError::InvalidConfig(
                "sliding expiration must be positive".to_string(),
            ));
        }
        if sliding > MAX_SLIDING_EXPIRATION {
            return Err(CacheError::InvalidConfig(format!(
                "sliding expiration of {:?} exceeds the maximum of {:?}",
                sliding, MAX_SLIDING_EXPIRATION
            )));
        }
        Ok(Self { sliding })
    }

    /// The idle window after which an entry expires.
    pub fn duration(&self) -> Duration {
        self.sliding
    }
}

// == Evictable ==
/// Lets a stored value veto expiry and eviction while it is busy.
pub trait Evictable {
    /// Returns false while the value must stay resident.
    fn is_evictable(&self) -> bool;

    /// When the value stopped being busy. The idle window is measured from
    /// this instant if it is later than the last access.
    fn settled_at(&self) -> Option<Instant> {
        None
    }
}

impl<E: Evictable + ?Sized> Evictable for Arc<E> {
    fn is_evictable(&self) -> bool {
        (**self).is_evictable()
    }

    fn settled_at(&self) -> Option<Instant> {
        (**self).settled_at()
    }
}

// == Store Entry ==
/// A stored value with its access bookkeeping.
#[derive(Debug, Clone)]
pub struct StoreEntry<V> {
    /// The stored value
    pub value: V,
    /// Last insert or successful read
    pub last_access: Instant,
    /// Expiration policy the entry was inserted with
    pub policy: ExpirationPolicy,
}

impl<V> StoreEntry<V> {
    // == Constructor ==
    pub fn new(value: V, policy: ExpirationPolicy) -> Self {
        Self {
            value,
            last_access: Instant::now(),
            policy,
        }
    }

    // == Touch ==
    /// Restarts the sliding window.
    pub fn touch(&mut self) {
        self.last_access = Instant::now();
    }
}

impl<V: Evictable> StoreEntry<V> {
    // == Is Expired ==
    /// Checks if the entry has been idle for at least its sliding window.
    ///
    /// A busy value never expires, and its window restarts once it settles.
    /// Boundary condition: an entry idle for exactly the window is expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        if !self.value.is_evictable() {
            return false;
        }
        let idle_since = match self.value.settled_at() {
            Some(settled) => settled.max(self.last_access),
            None => self.last_access,
        };
        now.saturating_duration_since(idle_since) >= self.policy.duration()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FactoryCell;
    use std::sync::mpsc;
    use std::thread::{self, sleep};

    fn policy(ms: u64) -> ExpirationPolicy {
        ExpirationPolicy::sliding(Duration::from_millis(ms)).unwrap()
    }

    fn ready(value: u32) -> Arc<FactoryCell<u32>> {
        let cell = Arc::new(FactoryCell::from_fn(move || value));
        cell.resolve().unwrap();
        cell
    }

    #[test]
    fn test_policy_rejects_zero() {
        let result = ExpirationPolicy::sliding(Duration::ZERO);
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_policy_rejects_too_long() {
        let result = ExpirationPolicy::sliding(MAX_SLIDING_EXPIRATION + Duration::from_secs(1));
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
        assert!(ExpirationPolicy::sliding(MAX_SLIDING_EXPIRATION).is_ok());
    }

    #[test]
    fn test_entry_expires_when_idle() {
        let entry = StoreEntry::new(ready(1), policy(30));
        assert!(!entry.is_expired());

        sleep(Duration::from_millis(40));
        assert!(entry.is_expired());
    }

    #[test]
    fn test_touch_restarts_window() {
        let mut entry = StoreEntry::new(ready(1), policy(100));
        sleep(Duration::from_millis(60));
        entry.touch();
        sleep(Duration::from_millis(60));

        // 120ms since insert, but only 60ms since the last touch
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = StoreEntry::new(ready(1), policy(50));
        let boundary = entry.last_access + Duration::from_millis(50);

        assert!(entry.is_expired_at(boundary), "Entry should be expired at boundary");
        assert!(!entry.is_expired_at(boundary - Duration::from_millis(1)));
    }

    #[test]
    fn test_unresolved_cell_never_expires() {
        let entry = StoreEntry::new(Arc::new(FactoryCell::from_fn(|| 1u32)), policy(10));
        let far_future = entry.last_access + Duration::from_secs(3600);

        assert!(!entry.is_expired_at(far_future));
    }

    #[test]
    fn test_window_restarts_when_factory_settles() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let cell = Arc::new(FactoryCell::from_fn(move || {
            release_rx.recv().unwrap();
            7u32
        }));
        let entry = StoreEntry::new(cell.clone(), policy(50));

        let runner = thread::spawn(move || cell.resolve().unwrap());
        sleep(Duration::from_millis(80));
        assert!(!entry.is_expired(), "Running cell must not expire");

        release_tx.send(()).unwrap();
        assert_eq!(*runner.join().unwrap(), 7);

        // Idle time counts from completion, not from insertion
        assert!(!entry.is_expired());
        sleep(Duration::from_millis(60));
        assert!(entry.is_expired());
    }
}
