//! Per-connection synchronization guard.
//!
//! Serializes every access to the native handle across threads. The guard
//! is scoped: it is released when the returned `MutexGuard` (or the closure
//! passed to [`SessionLock::with_detached`]) goes out of scope, on every
//! exit path. It must never be held while user code runs.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

/// Hook wrapping calls that may block inside the native library.
///
/// Embedders running under an interpreter lock implement this to release
/// that lock for the duration of `f` (for example with
/// `Python::allow_threads`). Implementations must call `f` exactly once.
pub trait Detach: Send + Sync {
    fn detach(&self, f: &mut dyn FnMut());
}

/// Default hook: runs the call on the current thread with nothing released.
#[derive(Debug, Default, Clone, Copy)]
pub struct Attached;

impl Detach for Attached {
    fn detach(&self, f: &mut dyn FnMut()) {
        f();
    }
}

/// Mutex around the native session state plus the detach hook.
pub struct SessionLock<T> {
    inner: Mutex<T>,
    detach: Arc<dyn Detach>,
}

impl<T> fmt::Debug for SessionLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLock")
            .field("locked", &self.inner.is_locked())
            .finish_non_exhaustive()
    }
}

impl<T> SessionLock<T> {
    pub fn new(value: T, detach: Arc<dyn Detach>) -> Self {
        Self {
            inner: Mutex::new(value),
            detach,
        }
    }

    /// Acquire the guard for a span that cannot block.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        tracing::trace!("acquiring session guard");
        self.inner.lock()
    }

    /// Acquire the guard and run `f` with the detach hook active.
    ///
    /// Both the wait for the mutex and `f` itself happen detached, so a
    /// thread blocked here never holds the embedder's lock.
    pub fn with_detached<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut call = Some(f);
        let mut out = None;
        self.detach.detach(&mut || {
            if let Some(f) = call.take() {
                tracing::trace!("acquiring session guard (detached)");
                let mut guard = self.inner.lock();
                out = Some(f(&mut *guard));
            }
        });

        match (out, call) {
            (Some(out), _) => out,
            // hook returned without invoking the call; run it attached
            (None, Some(f)) => f(&mut *self.inner.lock()),
            (None, None) => unreachable!("detach hook consumed the call without completing it"),
        }
    }
}
