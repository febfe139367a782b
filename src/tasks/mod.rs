//! Background Tasks Module
//!
//! # Tasks
//! - Expiry sweep: removes idle entries from a [`MemoryStore`](crate::cache::MemoryStore)

mod cleanup;

pub use cleanup::spawn_cleanup_task;
