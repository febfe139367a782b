//! Error types for the sliding cache
//!
//! Provides unified error handling using thiserror.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error accepted from fallible factories.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

// == Factory Error ==
/// Failure captured from a factory's single execution.
///
/// Cloning is cheap: every caller waiting on the same cell receives a clone
/// pointing at the same underlying error.
#[derive(Error, Debug, Clone)]
pub enum FactoryError {
    /// The factory returned an error
    #[error(transparent)]
    Failed(Arc<dyn StdError + Send + Sync + 'static>),

    /// The factory panicked; the payload message is kept when it was a string
    #[error("factory panicked: {0}")]
    Panicked(String),
}

impl FactoryError {
    /// Returns the original factory error if it is of type `E`.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            FactoryError::Failed(inner) => inner.downcast_ref::<E>(),
            FactoryError::Panicked(_) => None,
        }
    }

    /// Returns true if the factory panicked instead of returning an error.
    pub fn is_panic(&self) -> bool {
        matches!(self, FactoryError::Panicked(_))
    }
}

impl From<BoxError> for FactoryError {
    fn from(err: BoxError) -> Self {
        FactoryError::Failed(Arc::from(err))
    }
}

// == Cell Error ==
/// Outcome of a failed [`FactoryCell::resolve`](crate::cache::FactoryCell::resolve).
#[derive(Error, Debug, Clone)]
pub enum CellError {
    /// The cell's factory failed; every resolver sees the same failure
    #[error(transparent)]
    Factory(#[from] FactoryError),

    /// The cell was resolved from inside its own running factory
    #[error("cell resolved re-entrantly from its own factory")]
    Reentrant,
}

// == Store Error ==
/// Failures reported by an [`ExpiringStore`](crate::cache::ExpiringStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Cache is full and eviction failed
    #[error("Cache full: {0}")]
    CacheFull(String),

    /// Backend failure of a store implementation
    #[error("Internal store error: {0}")]
    Internal(String),
}

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The factory for `key` failed; `source` carries the original failure
    #[error("Error occurred while calling factory for key '{key}'")]
    FactoryFailed {
        key: String,
        #[source]
        source: FactoryError,
    },

    /// The factory for `key` requested `key` again while computing it
    #[error("Factory for key '{key}' re-entered its own entry")]
    Reentrant { key: String },

    /// The underlying store failed; not retried
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Rejected construction parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    /// Returns the captured factory failure, if this error wraps one.
    pub fn factory_error(&self) -> Option<&FactoryError> {
        match self {
            CacheError::FactoryFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
