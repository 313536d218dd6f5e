//! Lock-free snapshot proxies for session event listeners.
//!
//! Readers clone the current `Arc<Vec<L>>` and iterate without holding a
//! lock; writers replace the whole snapshot under a short-lived
//! [`std::sync::Mutex`]. This keeps dispatch (the hot path, run once per
//! event) lock-free while keeping registration (the cold path) simple.

use std::sync::{Arc, Mutex};

/// A registry of listeners of type `L`, dispatched as a snapshot.
pub struct Listeners<L> {
    snapshot: Mutex<Arc<Vec<L>>>,
    closed: Mutex<bool>,
}

impl<L> Default for Listeners<L> {
    fn default() -> Self {
        Self {
            snapshot: Mutex::new(Arc::new(Vec::new())),
            closed: Mutex::new(false),
        }
    }
}

impl<L: Clone> Listeners<L> {
    /// Register a new listener, unless this registry has been closed.
    ///
    /// Returns `false` without registering if the session is already
    /// closing.
    pub fn add(&self, listener: L) -> bool {
        if *self.closed.lock().expect("listeners lock poisoned") {
            return false;
        }

        let mut guard = self.snapshot.lock().expect("listeners lock poisoned");
        let mut next = Vec::clone(&guard);
        next.push(listener);
        *guard = Arc::new(next);

        true
    }

    /// Take a cheap, lock-free snapshot of the currently registered
    /// listeners to iterate over.
    pub fn snapshot(&self) -> Arc<Vec<L>> {
        Arc::clone(&self.snapshot.lock().expect("listeners lock poisoned"))
    }

    /// Reject any further registration; existing listeners are retained so
    /// an in-flight dispatch still completes.
    pub fn close(&self) {
        *self.closed.lock().expect("listeners lock poisoned") = true;
    }
}

/// Dispatch `event` to every listener in `listeners`, catching a panicking
/// listener and logging it rather than letting it abort the remainder of
/// the snapshot (or the caller's task).
pub fn dispatch<L>(listeners: &Listeners<L>, event: impl Fn(&L))
where
    L: Clone,
{
    for listener in listeners.snapshot().iter() {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| event(listener)));
        if outcome.is_err() {
            tracing::warn!("listener panicked, ignoring");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn dispatch_reaches_every_listener() {
        let listeners = Listeners::default();
        listeners.add(1);
        listeners.add(2);

        let seen = Mutex::new(Vec::new());
        dispatch(&listeners, |l| seen.lock().expect("lock poisoned").push(*l));

        assert_eq!(*seen.lock().expect("lock poisoned"), vec![1, 2]);
    }

    #[test]
    fn closed_registry_rejects_new_listeners() {
        let listeners = Listeners::default();
        listeners.close();

        assert!(!listeners.add(1));
        assert!(listeners.snapshot().is_empty());
    }

    #[test]
    fn one_panicking_listener_does_not_block_the_rest() {
        let listeners = Listeners::default();
        listeners.add(true);
        listeners.add(false);

        let seen = Mutex::new(0);
        dispatch(&listeners, |ok| {
            *seen.lock().expect("lock poisoned") += 1;
            assert!(*ok, "listener failed");
        });

        assert_eq!(*seen.lock().expect("lock poisoned"), 2);
    }
}
