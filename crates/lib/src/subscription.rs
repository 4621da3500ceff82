//! Cancellation handles for live subscriptions.
//!
//! Every `get`, `list` and `on` call returns a [`Subscription`]. Handles form
//! a tree: a recursive node subscription registers the handles of the adapter
//! subscriptions and child subscriptions it creates, and unsubscribing the
//! parent tears those down depth-first.

use std::{
    fmt,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};

type Teardown = Box<dyn FnOnce() + Send>;

/// Locks a mutex, recovering the data if a callback panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A cloneable, idempotent unsubscribe handle.
///
/// Clones share state: unsubscribing any clone cancels them all. Dropping a
/// handle does not unsubscribe.
#[derive(Clone, Default)]
pub struct Subscription {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    teardown: Mutex<Vec<Teardown>>,
}

impl Subscription {
    /// Creates an active handle with nothing registered on it.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        !self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Registers work to run when this handle is unsubscribed.
    ///
    /// If the handle is already cancelled, `f` runs immediately.
    pub fn on_unsubscribe<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut teardown = lock(&self.inner.teardown);
        if self.is_active() {
            teardown.push(Box::new(f));
        } else {
            drop(teardown);
            f();
        }
    }

    /// Makes `child` part of this subscription's tree.
    pub fn add_child(&self, child: Subscription) {
        self.on_unsubscribe(move || child.unsubscribe());
    }

    /// Stops all future callbacks for this subscription and its children.
    ///
    /// Safe to call any number of times, including after the adapter that
    /// issued it has gone away.
    pub fn unsubscribe(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let teardown = std::mem::take(&mut *lock(&self.inner.teardown));
        for f in teardown {
            f();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
