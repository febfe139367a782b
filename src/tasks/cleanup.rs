//! Expiry Sweep Task
//!
//! Background task that periodically removes expired store entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{Evictable, MemoryStore};

/// Spawns a background task that sweeps expired entries out of `store`.
///
/// Lookups already treat expired entries as absent; the sweep only releases
/// the memory held by entries nobody asks for again.
///
/// Must be called from within a tokio runtime. Abort the returned handle to
/// stop the task.
///
/// # Example
/// ```ignore
/// let store = Arc::new(MemoryStore::new(1000));
/// let cleanup_handle = spawn_cleanup_task(store.clone(), Duration::from_secs(1));
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task<V>(store: Arc<MemoryStore<V>>, interval: Duration) -> JoinHandle<()>
where
    V: Evictable + Send + 'static,
{
    tokio::spawn(async move {
        info!("Starting expiry sweep task with interval of {:?}", interval);

        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let removed = store.cleanup_expired();
            if removed > 0 {
                info!("Expiry sweep: removed {} expired entries", removed);
            } else {
                debug!("Expiry sweep: no expired entries found");
            }
        }
    })
}
