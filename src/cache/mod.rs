//! Cache Module
//!
//! Memoizing cache with sliding expiration: single-execution factory cells
//! stored in an expiring key-value store.

mod cell;
mod entry;
mod lru;
mod sliding;
mod stats;
mod store;


// Re-export public types
pub use cell::{CellState, FactoryCell};
pub use entry::{Evictable, ExpirationPolicy, MAX_SLIDING_EXPIRATION};
pub use sliding::{CellHandle, SlidingCache};
pub use stats::CacheStats;
pub use store::{ExpiringStore, MemoryStore};

pub(crate) use entry::StoreEntry;
pub(crate) use lru::LruTracker;
