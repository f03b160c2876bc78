//! A single keyed query: fetch, cache, retry, poll, publish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::provider::{ProviderError, ProviderResult};

use super::cache::QueryCache;
use super::policy::QueryPolicy;
use super::state::QueryState;

/// Produces one fetch attempt. Called again for every retry and refetch.
pub type Fetcher<T> =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, ProviderResult<T>> + Send + Sync>;

struct Inner<T>
where
    T: Clone + Send + Sync + 'static,
{
    key: String,
    fetcher: Fetcher<T>,
    policy: QueryPolicy,
    cache: Arc<QueryCache<T>>,
    state: watch::Sender<QueryState<T>>,
    /// Bumped by every fetch; results of older generations are dropped.
    generation: AtomicU64,
    in_flight: Mutex<Option<CancellationToken>>,
    /// Parent of every request token; cancelled when the handle drops.
    shutdown: CancellationToken,
}

/// Live view of one query.
///
/// Created by the coordinators in this module. The state starts from
/// whatever the query cache already holds for the key, so a second handle
/// for the same key shows data immediately.
///
/// Dropping the handle cancels any in-flight request and stops polling.
pub struct QueryHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<Inner<T>>,
}

impl<T> QueryHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(
        key: impl Into<String>,
        fetcher: Fetcher<T>,
        policy: QueryPolicy,
        cache: Arc<QueryCache<T>>,
    ) -> Self {
        let key = key.into();
        let mut initial = QueryState::default();
        if let Some(cached) = cache.get(&key) {
            initial.succeed(cached.data, cached.fetched_at);
        }
        let (state, _) = watch::channel(initial);

        let inner = Arc::new(Inner {
            key,
            fetcher,
            policy,
            cache,
            state,
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
            shutdown: CancellationToken::new(),
        });

        if let Some(interval) = policy.refetch_interval {
            spawn_polling(&inner, interval);
        }

        Self { inner }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn policy(&self) -> &QueryPolicy {
        &self.inner.policy
    }

    /// Current state snapshot.
    pub fn state(&self) -> QueryState<T> {
        self.inner.state.borrow().clone()
    }

    /// Receiver that sees every state change.
    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.inner.state.subscribe()
    }

    /// Return fresh cached data, or fetch.
    pub async fn fetch(&self) -> ProviderResult<T> {
        let inner = &self.inner;
        if let Some(cached) = inner.cache.get_fresh(&inner.key, &inner.policy) {
            inner
                .state
                .send_modify(|state| state.succeed(cached.data.clone(), cached.fetched_at));
            return Ok(cached.data);
        }
        execute(inner).await
    }

    /// Fetch regardless of freshness.
    pub async fn refetch(&self) -> ProviderResult<T> {
        execute(&self.inner).await
    }

    /// Cancel the in-flight request, if any.
    pub fn cancel(&self) {
        if let Some(token) = self.inner.in_flight.lock().take() {
            token.cancel();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.inner.policy.refetch_interval.is_some() && !self.inner.shutdown.is_cancelled()
    }
}

impl<T> Drop for QueryHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

async fn execute<T>(inner: &Inner<T>) -> ProviderResult<T>
where
    T: Clone + Send + Sync + 'static,
{
    let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
    let token = inner.shutdown.child_token();
    if let Some(previous) = inner.in_flight.lock().replace(token.clone()) {
        previous.cancel();
    }

    inner.state.send_modify(|state| state.start_fetch());
    tracing::debug!(key = %inner.key, generation, "Query fetch started");

    let retry = inner.policy.retry;
    let mut attempt = 0;
    let result = loop {
        match (inner.fetcher)(token.clone()).await {
            Err(e) if e.is_retryable() && attempt < retry.max_retries && !token.is_cancelled() => {
                let delay = retry.delay_for(attempt);
                attempt += 1;
                tracing::warn!(
                    key = %inner.key,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Query failed, retrying"
                );
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break Err(ProviderError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            other => break other,
        }
    };

    {
        let mut in_flight = inner.in_flight.lock();
        if inner.generation.load(Ordering::SeqCst) == generation {
            *in_flight = None;
        }
    }

    inner.state.send_if_modified(|state| {
        if inner.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(key = %inner.key, generation, "Discarding superseded query result");
            return false;
        }
        match &result {
            Ok(data) => {
                let cached = inner.cache.insert(&inner.key, data.clone());
                state.succeed(cached.data, cached.fetched_at);
            }
            Err(ProviderError::Cancelled) => state.abandon(),
            Err(e) => {
                tracing::debug!(key = %inner.key, error = %e, "Query failed");
                state.fail(e.to_string());
            }
        }
        true
    });

    result
}

fn spawn_polling<T>(inner: &Arc<Inner<T>>, interval: Duration)
where
    T: Clone + Send + Sync + 'static,
{
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(key = %inner.key, "No async runtime, query will not poll");
        return;
    };

    let weak: Weak<Inner<T>> = Arc::downgrade(inner);
    let shutdown = inner.shutdown.clone();
    let key = inner.key.clone();

    runtime.spawn(async move {
        tracing::debug!(%key, interval_ms = interval.as_millis() as u64, "Polling started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            let Some(inner) = weak.upgrade() else {
                break;
            };
            if let Err(e) = execute(&inner).await {
                tracing::debug!(%key, error = %e, "Poll failed");
            }
        }
        tracing::debug!(%key, "Polling stopped");
    });
}
