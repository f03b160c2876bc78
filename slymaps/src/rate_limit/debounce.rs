//! Trailing-edge debouncing for bursty callers.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Runs only the last call of a burst, once `delay` passes without a new call.
///
/// Each [`Debouncer::call`] cancels the pending timer (and its call) from the
/// previous invocation. Superseded callers resolve to `None`.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `f` to run after the quiet period.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn call<F, Fut, T>(&self, f: F) -> impl Future<Output = Option<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let delay = self.delay;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(f().await);
        });

        if let Some(previous) = self.pending.lock().replace(handle) {
            previous.abort();
        }

        async move { rx.await.ok() }
    }

    /// Drop the pending call, if any.
    pub fn cancel(&self) {
        if let Some(pending) = self.pending.lock().take() {
            pending.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
