//! Sliding Cache Module
//!
//! Memoizing cache on top of an [`ExpiringStore`]. Each key maps to a
//! [`FactoryCell`], so concurrent requests for one key share a single factory
//! execution, and a failed execution is removed so the key can be retried.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::cache::{ExpirationPolicy, ExpiringStore, FactoryCell, MemoryStore};
use crate::config::Config;
use crate::error::{BoxError, CacheError, CellError, Result};

/// What the cache keeps in its store for each key.
pub type CellHandle<T> = Arc<FactoryCell<T>>;

// == Sliding Cache ==
/// A memoizing cache whose entries expire after sitting idle for the
/// configured sliding window.
///
/// Keys are namespaced with a random per-instance prefix, so several caches
/// can share one store without colliding.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use sliding_cache::SlidingCache;
///
/// let cache: SlidingCache<String> = SlidingCache::new(Duration::from_secs(60)).unwrap();
/// let first = cache.get_or_create("k1", || "a".to_string()).unwrap();
/// let second = cache.get_or_create("k1", || "b".to_string()).unwrap();
/// assert_eq!(*second, "a");
/// assert!(std::sync::Arc::ptr_eq(&first, &second));
/// ```
pub struct SlidingCache<T, S = MemoryStore<CellHandle<T>>> {
    store: Arc<S>,
    key_prefix: String,
    policy: ExpirationPolicy,
    _value: PhantomData<fn() -> T>,
}

impl<T> SlidingCache<T>
where
    T: Send + Sync + 'static,
{
    // == Constructors ==
    /// Creates a cache backed by its own default-sized [`MemoryStore`].
    ///
    /// # Errors
    /// [`CacheError::InvalidConfig`] if `sliding_expiration` is zero or too long.
    pub fn new(sliding_expiration: Duration) -> Result<Self> {
        let store = MemoryStore::new(Config::default().max_entries);
        Self::with_store(Arc::new(store), sliding_expiration)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_store(
            Arc::new(MemoryStore::from_config(config)),
            config.sliding_expiration(),
        )
    }
}

impl<T, S> SlidingCache<T, S>
where
    T: Send + Sync + 'static,
    S: ExpiringStore<CellHandle<T>>,
{
    /// Creates a cache over an injected, possibly shared, store.
    pub fn with_store(store: Arc<S>, sliding_expiration: Duration) -> Result<Self> {
        let policy = ExpirationPolicy::sliding(sliding_expiration)?;
        Ok(Self {
            store,
            key_prefix: Uuid::new_v4().simple().to_string(),
            policy,
            _value: PhantomData,
        })
    }

    // == Get Or Create ==
    /// Returns the cached value for `key`, computing it with `factory` if no
    /// live entry exists.
    ///
    /// Only one factory runs per key at a time; concurrent callers wait for it
    /// and receive the same `Arc`. If the factory fails, every caller waiting
    /// on it gets [`CacheError::FactoryFailed`] and the entry is removed, so
    /// the next call runs a fresh factory.
    ///
    /// A factory that asks for its own key gets [`CacheError::Reentrant`]
    /// back instead of deadlocking. The inner error is not wrapped as a
    /// factory failure and the entry is left in place: the outer call still
    /// owns the running factory, and its own outcome decides whether the
    /// entry is kept or removed.
    ///
    /// # Errors
    /// - [`CacheError::FactoryFailed`] if the factory failed or panicked
    /// - [`CacheError::Reentrant`] if the factory requested `key` itself
    /// - [`CacheError::Store`] if the store rejected the insert
    pub fn try_get_or_create<F, E>(&self, key: &str, factory: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
        E: Into<BoxError>,
    {
        let store_key = self.make_key(key);
        let candidate: CellHandle<T> = Arc::new(FactoryCell::new(factory));
        let resident = self
            .store
            .insert_if_absent(&store_key, Arc::clone(&candidate), &self.policy)?;

        if Arc::ptr_eq(&resident, &candidate) {
            debug!(key, "cache miss, installed new cell");
        } else {
            trace!(key, "cache hit");
        }
        drop(candidate);

        match resident.resolve() {
            Ok(value) => Ok(value),
            Err(CellError::Reentrant) => Err(CacheError::Reentrant {
                key: key.to_string(),
            }),
            Err(CellError::Factory(source)) => {
                warn!(key, error = %source, "factory failed");
                self.evict_failed(&store_key, &resident);
                Err(CacheError::FactoryFailed {
                    key: key.to_string(),
                    source,
                })
            }
        }
    }

    /// [`try_get_or_create`](Self::try_get_or_create) for factories that
    /// cannot fail. A panicking factory still surfaces as
    /// [`CacheError::FactoryFailed`].
    pub fn get_or_create<F>(&self, key: &str, factory: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        self.try_get_or_create(key, move || Ok::<T, BoxError>(factory()))
    }

    // == Get ==
    /// Returns the value for `key` if it has already been computed.
    ///
    /// Restarts the entry's sliding window. Never blocks and never runs a factory.
    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.store.get(&self.make_key(key))?.peek()
    }

    // == Invalidate ==
    /// Removes `key` from the cache. Removing an absent key is not an error.
    pub fn invalidate(&self, key: &str) -> Result<()> {
        self.store.remove(&self.make_key(key))?;
        Ok(())
    }

    /// Removes the failed cell, leaving any newer cell under the key alone.
    fn evict_failed(&self, store_key: &str, failed: &CellHandle<T>) {
        match self
            .store
            .remove_if(store_key, &|resident| Arc::ptr_eq(resident, failed))
        {
            Ok(true) => debug!(store_key, "removed failed cell"),
            Ok(false) => trace!(store_key, "failed cell already gone"),
            Err(err) => warn!(store_key, error = %err, "could not remove failed cell"),
        }
    }
}

impl<T, S> SlidingCache<T, S> {
    /// Builds the store key: `<prefix>_<key>`.
    fn make_key(&self, key: &str) -> String {
        format!("{}_{}", self.key_prefix, key)
    }

    /// Per-instance namespace prefix.
    pub fn prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn policy(&self) -> ExpirationPolicy {
        self.policy
    }

    pub fn sliding_expiration(&self) -> Duration {
        self.policy.duration()
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

impl<T, S> fmt::Debug for SlidingCache<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlidingCache")
            .field("key_prefix", &self.key_prefix)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
