//! Sliding Cache - a thread-safe memoizing cache with sliding expiration
//!
//! Each entry's idle timer restarts on every access, and concurrent requests
//! for the same key share a single factory execution.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{MemoryStore, SlidingCache};
pub use config::Config;
pub use error::{CacheError, FactoryError, Result};
pub use tasks::spawn_cleanup_task;
