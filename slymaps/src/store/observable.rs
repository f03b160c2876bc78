//! Snapshot state with change listeners.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

type Listener<S> = Arc<dyn Fn(&S) + Send + Sync>;

struct Listeners<S> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Listener<S>)>>,
}

impl<S> Listeners<S> {
    fn snapshot(&self) -> Vec<Listener<S>> {
        self.entries
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

/// State container that publishes immutable snapshots.
///
/// Readers get an `Arc<S>` that never changes under them. Writers go
/// through [`Observable::update`], which applies a closure to a copy of the
/// current state and swaps it in as one step. Updates are serialized, and
/// listeners run after the swap, outside every lock, so they may read the
/// store again.
pub struct Observable<S> {
    state: RwLock<Arc<S>>,
    write: Mutex<()>,
    listeners: Arc<Listeners<S>>,
}

impl<S> Observable<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(initial: S) -> Self {
        Self {
            state: RwLock::new(Arc::new(initial)),
            write: Mutex::new(()),
            listeners: Arc::new(Listeners {
                next_id: AtomicU64::new(0),
                entries: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Current snapshot.
    pub fn state(&self) -> Arc<S> {
        Arc::clone(&self.state.read())
    }

    /// Register `listener`; it is called with each new snapshot until the
    /// returned [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        let id = self.listeners.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.entries.lock().push((id, Arc::new(listener)));

        let weak: Weak<Listeners<S>> = Arc::downgrade(&self.listeners);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(listeners) = weak.upgrade() {
                    listeners.entries.lock().retain(|(entry, _)| *entry != id);
                }
            })),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.entries.lock().len()
    }

    /// Apply `f` to a copy of the state and publish the result.
    pub fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        match self.try_update(|state| Ok::<R, std::convert::Infallible>(f(state))) {
            Ok(result) => result,
            Err(never) => match never {},
        }
    }

    /// Like [`Observable::update`], but nothing is published when `f`
    /// returns an error.
    pub fn try_update<R, E>(&self, f: impl FnOnce(&mut S) -> Result<R, E>) -> Result<R, E> {
        let published = {
            let _write = self.write.lock();
            let mut next = S::clone(&self.state.read());
            let result = f(&mut next)?;
            let next = Arc::new(next);
            *self.state.write() = Arc::clone(&next);
            (result, next)
        };

        let (result, snapshot) = published;
        for listener in self.listeners.snapshot() {
            listener(&snapshot);
        }
        Ok(result)
    }
}

/// Keeps a listener registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Unsubscribe now. Same as dropping.
    pub fn unsubscribe(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
