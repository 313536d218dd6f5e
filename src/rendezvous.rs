//! Small async rendezvous primitives the session core uses to bridge a
//! background dispatch loop back to whichever task is waiting on its
//! outcome, without inventing a bespoke wait/notify monitor.
//!
//! [`OneShot`] models a value set exactly once and observed by any number of
//! waiters (the key-exchange completion future: every concurrent caller of
//! [`crate::session::Session::rekey`] sees the same outcome). [`Rendezvous`]
//! models a single-slot request/response exchange serialized behind its own
//! lock (the global-request pattern: one outstanding request at a time, its
//! reply wakes exactly one waiter).

use futures::channel::oneshot;

use crate::error::{Error, Result};

enum OneShotState<T> {
    Pending(Vec<oneshot::Sender<T>>),
    Done(T),
}

/// A value completed exactly once; first writer wins, every waiter
/// (including ones that arrive after completion) observes the same value.
pub struct OneShot<T: Clone + Send + 'static> {
    state: std::sync::Mutex<OneShotState<T>>,
}

impl<T: Clone + Send + 'static> Default for OneShot<T> {
    fn default() -> Self {
        Self {
            state: std::sync::Mutex::new(OneShotState::Pending(Vec::new())),
        }
    }
}

impl<T: Clone + Send + 'static> OneShot<T> {
    /// A fresh, uncompleted value.
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete this value and wake every current waiter. A value that has
    /// already been completed silently ignores later calls, so a late
    /// "closing" completion racing a successful one can never clobber it.
    pub fn complete(&self, value: T) {
        let mut state = self.state.lock().expect("rendezvous lock poisoned");

        if matches!(&*state, OneShotState::Done(_)) {
            return;
        }

        let previous = std::mem::replace(&mut *state, OneShotState::Done(value.clone()));
        if let OneShotState::Pending(waiters) = previous {
            for waiter in waiters {
                let _ = waiter.send(value.clone());
            }
        }
    }

    /// Wait for this value to be completed, returning immediately if it
    /// already has been.
    pub async fn wait(&self) -> T {
        let rx = {
            let mut state = self.state.lock().expect("rendezvous lock poisoned");

            match &mut *state {
                OneShotState::Done(value) => return value.clone(),
                OneShotState::Pending(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    rx
                }
            }
        };

        rx.await.expect("oneshot completed without a value")
    }
}

/// A single-slot request/response rendezvous: callers serialize on an
/// internal lock, register themselves as the sole waiter, perform their
/// `send` side-effect, then park for the matching `respond`.
pub struct Rendezvous<T: Send + 'static> {
    lock: futures::lock::Mutex<()>,
    slot: std::sync::Mutex<Option<oneshot::Sender<T>>>,
}

impl<T: Send + 'static> Default for Rendezvous<T> {
    fn default() -> Self {
        Self {
            lock: futures::lock::Mutex::new(()),
            slot: std::sync::Mutex::new(None),
        }
    }
}

impl<T: Send + 'static> Rendezvous<T> {
    /// A fresh rendezvous with no outstanding request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize against any other in-flight request, perform `send`, then
    /// wait for the matching [`Rendezvous::respond`].
    pub async fn request<F, Fut>(&self, send: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let _guard = self.lock.lock().await;

        let (tx, rx) = oneshot::channel();
        *self.slot.lock().expect("rendezvous lock poisoned") = Some(tx);

        if let Err(err) = send().await {
            self.slot.lock().expect("rendezvous lock poisoned").take();
            return Err(err);
        }

        rx.await.map_err(|_| Error::Closing)
    }

    /// Wake the single outstanding waiter, if any, with `value`. Returns
    /// `false` if there was no request in flight to answer.
    pub fn respond(&self, value: T) -> bool {
        match self.slot.lock().expect("rendezvous lock poisoned").take() {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[async_std::test]
    async fn oneshot_first_writer_wins() {
        let cell = OneShot::new();
        cell.complete(1);
        cell.complete(2);

        assert_eq!(cell.wait().await, 1);
    }

    #[async_std::test]
    async fn oneshot_late_waiter_sees_completed_value() {
        let cell = OneShot::new();
        cell.complete("done");

        assert_eq!(cell.wait().await, "done");
    }

    #[async_std::test]
    async fn rendezvous_roundtrip() {
        let rendezvous: Rendezvous<u32> = Rendezvous::new();

        let (result, ()) = futures::join!(
            rendezvous.request(|| async { Ok(()) }),
            async {
                // Give the requester a chance to register before answering.
                futures::pending!();
                assert!(rendezvous.respond(42));
            }
        );

        assert_eq!(result.unwrap(), 42);
    }
}
