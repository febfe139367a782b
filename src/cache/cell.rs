//! Factory Cell Module
//!
//! A single-slot deferred computation. The bound factory runs at most once,
//! no matter how many threads resolve the cell concurrently; every resolver
//! observes the same value or the same captured failure.

use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::cache::Evictable;
use crate::error::{BoxError, CellError, FactoryError};

type Factory<T> = Box<dyn FnOnce() -> Result<T, BoxError> + Send + 'static>;
type Outcome<T> = Result<Arc<T>, FactoryError>;

// == Cell State ==
/// Execution state of a [`FactoryCell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    NotStarted,
    Running,
    Completed,
    Failed,
}

enum Slot<T> {
    Idle(Factory<T>),
    /// Factory is executing on the given thread
    Running(ThreadId),
    Finished,
}

// == Factory Cell ==
/// Holds a factory and, once it has run, its outcome.
///
/// Threads that lose the race to run the factory park on a condition variable
/// until the running thread publishes the outcome. After that, resolution
/// reads the write-once outcome without touching the mutex.
pub struct FactoryCell<T> {
    slot: Mutex<Slot<T>>,
    outcome: OnceLock<Outcome<T>>,
    /// Set just before `outcome`
    settled_at: OnceLock<Instant>,
    finished: Condvar,
}

impl<T> FactoryCell<T> {
    // == Constructor ==
    /// Wraps a fallible factory. The factory is not invoked here.
    pub fn new<F, E>(factory: F) -> Self
    where
        T: 'static,
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<BoxError>,
    {
        let factory: Factory<T> =
            Box::new(move || -> Result<T, BoxError> { factory().map_err(Into::into) });
        Self {
            slot: Mutex::new(Slot::Idle(factory)),
            outcome: OnceLock::new(),
            settled_at: OnceLock::new(),
            finished: Condvar::new(),
        }
    }

    /// Wraps an infallible factory.
    pub fn from_fn<F>(factory: F) -> Self
    where
        T: 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        Self::new(move || Ok::<T, BoxError>(factory()))
    }

    // == Resolve ==
    /// Returns the cell's value, running the factory if nobody has yet.
    ///
    /// Blocks while another thread is running the factory. There is no
    /// timeout: a factory that never returns blocks all resolvers.
    ///
    /// # Errors
    /// - [`CellError::Factory`] if the factory failed or panicked, for every resolver
    /// - [`CellError::Reentrant`] if called from inside this cell's own factory
    pub fn resolve(&self) -> Result<Arc<T>, CellError> {
        if let Some(outcome) = self.outcome.get() {
            return outcome.clone().map_err(CellError::from);
        }

        let current = thread::current().id();
        let mut slot = self.slot.lock();
        loop {
            if let Some(outcome) = self.outcome.get() {
                return outcome.clone().map_err(CellError::from);
            }

            let owner = match &*slot {
                Slot::Running(owner) => Some(*owner),
                Slot::Idle(_) | Slot::Finished => None,
            };
            match owner {
                Some(owner) if owner == current => return Err(CellError::Reentrant),
                Some(_) => {
                    self.finished.wait(&mut slot);
                    continue;
                }
                None => {}
            }

            match mem::replace(&mut *slot, Slot::Running(current)) {
                Slot::Idle(factory) => {
                    let outcome = MutexGuard::unlocked(&mut slot, || run_factory(factory));
                    // Publish before leaving Running so woken waiters find it
                    let _ = self.settled_at.set(Instant::now());
                    let _ = self.outcome.set(outcome);
                    *slot = Slot::Finished;
                    self.finished.notify_all();
                }
                previous => *slot = previous,
            }
        }
    }

    // == Peek ==
    /// Returns the value if the factory already completed successfully.
    ///
    /// Never blocks and never runs the factory.
    pub fn peek(&self) -> Option<Arc<T>> {
        self.outcome.get().and_then(|outcome| outcome.as_ref().ok().cloned())
    }

    /// Returns the current execution state.
    pub fn state(&self) -> CellState {
        if let Some(outcome) = self.outcome.get() {
            return match outcome {
                Ok(_) => CellState::Completed,
                Err(_) => CellState::Failed,
            };
        }
        match &*self.slot.lock() {
            Slot::Idle(_) => CellState::NotStarted,
            Slot::Running(_) => CellState::Running,
            // Outcome is published before the slot becomes Finished
            Slot::Finished => match self.outcome.get() {
                Some(Err(_)) => CellState::Failed,
                _ => CellState::Completed,
            },
        }
    }
}

/// A cell stays resident until its factory has finished.
impl<T> Evictable for FactoryCell<T> {
    fn is_evictable(&self) -> bool {
        self.outcome.get().is_some()
    }

    fn settled_at(&self) -> Option<Instant> {
        self.settled_at.get().copied()
    }
}

impl<T> fmt::Debug for FactoryCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryCell")
            .field("state", &self.state())
            .finish()
    }
}

fn run_factory<T>(factory: Factory<T>) -> Outcome<T> {
    match panic::catch_unwind(AssertUnwindSafe(factory)) {
        Ok(Ok(value)) => Ok(Arc::new(value)),
        Ok(Err(err)) => Err(FactoryError::from(err)),
        Err(payload) => Err(FactoryError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Barrier};
    use std::time::Duration;

    #[derive(thiserror::Error, Debug)]
    #[error("Boom!")]
    struct Boom;

    #[test]
    fn test_new_does_not_run_factory() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cell = FactoryCell::from_fn(move || counter.fetch_add(1, Ordering::SeqCst));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cell.state(), CellState::NotStarted);
        assert!(cell.peek().is_none());
    }

    #[test]
    fn test_resolve_runs_factory_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cell = FactoryCell::from_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            "value".to_string()
        });

        let first = cell.resolve().unwrap();
        let second = cell.resolve().unwrap();

        assert_eq!(*first, "value");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cell.state(), CellState::Completed);
        assert!(Arc::ptr_eq(&cell.peek().unwrap(), &first));
    }

    #[test]
    fn test_concurrent_resolvers_share_one_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cell = Arc::new(FactoryCell::from_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            vec![1u8, 2, 3]
        }));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cell = cell.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cell.resolve().unwrap()
                })
            })
            .collect();

        let values: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
    }

    #[test]
    fn test_failure_is_memoized_for_every_resolver() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cell: FactoryCell<String> = FactoryCell::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(Boom)
        });

        for _ in 0..3 {
            match cell.resolve() {
                Err(CellError::Factory(err)) => assert!(err.downcast_ref::<Boom>().is_some()),
                other => panic!("expected factory failure, got {:?}", other),
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cell.state(), CellState::Failed);
        assert!(cell.peek().is_none());
    }

    #[test]
    fn test_waiters_receive_failure_of_running_factory() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let cell: Arc<FactoryCell<u32>> = Arc::new(FactoryCell::new(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            Err(Boom)
        }));

        let owner = {
            let cell = cell.clone();
            thread::spawn(move || cell.resolve())
        };
        started_rx.recv().unwrap();
        assert_eq!(cell.state(), CellState::Running);

        let waiter = {
            let cell = cell.clone();
            thread::spawn(move || cell.resolve())
        };
        thread::sleep(Duration::from_millis(20));
        release_tx.send(()).unwrap();

        assert!(matches!(owner.join().unwrap(), Err(CellError::Factory(_))));
        assert!(matches!(waiter.join().unwrap(), Err(CellError::Factory(_))));
    }

    #[test]
    fn test_panic_is_captured_as_failure() {
        let cell: FactoryCell<u32> = FactoryCell::from_fn(|| panic!("kaboom"));

        match cell.resolve() {
            Err(CellError::Factory(FactoryError::Panicked(message))) => {
                assert_eq!(message, "kaboom")
            }
            other => panic!("expected panic failure, got {:?}", other),
        }
        assert_eq!(cell.state(), CellState::Failed);
    }

    #[test]
    fn test_reentrant_resolve_is_rejected() {
        let holder: Arc<OnceLock<Arc<FactoryCell<bool>>>> = Arc::new(OnceLock::new());
        let inner = holder.clone();
        let cell = Arc::new(FactoryCell::from_fn(move || {
            let this = inner.get().unwrap();
            matches!(this.resolve(), Err(CellError::Reentrant))
        }));
        holder.set(cell.clone()).unwrap();

        assert!(*cell.resolve().unwrap());
    }

    #[test]
    fn test_cell_is_pinned_until_finished() {
        let cell = FactoryCell::from_fn(|| 1);
        assert!(!cell.is_evictable());
        assert!(cell.settled_at().is_none());

        let before = Instant::now();
        cell.resolve().unwrap();
        assert!(cell.is_evictable());
        assert!(cell.settled_at().unwrap() >= before);

        let failed: FactoryCell<u32> = FactoryCell::new(|| Err(Boom));
        let _ = failed.resolve();
        assert!(failed.is_evictable());
    }

    #[test]
    fn test_debug_shows_state() {
        let cell = FactoryCell::from_fn(|| 1);
        assert!(format!("{:?}", cell).contains("NotStarted"));
        cell.resolve().unwrap();
        assert!(format!("{:?}", cell).contains("Completed"));
    }
}
