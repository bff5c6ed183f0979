//! Request lifecycle shared by queries and mutations.
//!
//! A [`QueryExecutor`] owns the state of one query consumer. Each run consults
//! the cache, then drives a chain of attempts against the transport under a
//! fresh [`CancellationToken`], retrying failures according to the
//! [`RetryPolicy`]. Starting a run cancels the previous one, and a cancelled
//! attempt never writes state, so the most recently started run always wins.
//!
//! A [`MutationExecutor`] runs the same retry chain without the cache and
//! re-raises terminal errors to its caller.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken as AbortSignal;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::cancel::CancellationToken;
use crate::error::{QueryError, Result};
use crate::retry::RetryPolicy;
use crate::state::{MutationState, Phase, QueryState, RequestState};
use crate::transport::{Method, Response, Transport, TransportFuture};

/// Performs one attempt of a query against the transport.
pub type Fetcher = Arc<dyn Fn(AbortSignal) -> TransportFuture + Send + Sync>;

/// Transforms the raw payload before it is decoded into the consumer's type.
pub type Selector = Arc<dyn Fn(Value) -> Value + Send + Sync>;

pub type SuccessCallback<T> = Arc<dyn Fn(Option<&T>) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&QueryError) + Send + Sync>;

/// Resolved settings for a query executor.
pub struct RunOptions<T> {
    pub enabled: bool,
    pub fresh_for: Duration,
    pub retry: RetryPolicy,
    pub select: Option<Selector>,
    pub on_success: Option<SuccessCallback<T>>,
    pub on_error: Option<ErrorCallback>,
}

impl<T> Default for RunOptions<T> {
    fn default() -> Self {
        Self {
            enabled: true,
            fresh_for: Duration::ZERO,
            retry: RetryPolicy::default(),
            select: None,
            on_success: None,
            on_error: None,
        }
    }
}

impl<T> Clone for RunOptions<T> {
    fn clone(&self) -> Self {
        Self {
            enabled: self.enabled,
            fresh_for: self.fresh_for,
            retry: self.retry,
            select: self.select.clone(),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

fn decode<T: DeserializeOwned>(value: Value, select: Option<&Selector>) -> Result<T> {
    let value = match select {
        Some(select) => select(value),
        None => value,
    };
    serde_json::from_value(value).map_err(|e| QueryError::Decode(e.to_string()))
}

/// Executes runs for a single query consumer.
pub struct QueryExecutor<T> {
    key: String,
    fetcher: Fetcher,
    cache: Arc<CacheStore>,
    options: RunOptions<T>,
    state: watch::Sender<QueryState<T>>,
    current: Mutex<Option<CancellationToken>>,
}

impl<T> QueryExecutor<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(
        key: impl Into<String>,
        fetcher: Fetcher,
        cache: Arc<CacheStore>,
        options: RunOptions<T>,
        initial: QueryState<T>,
    ) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            key: key.into(),
            fetcher,
            cache,
            options,
            state,
            current: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> QueryState<T> {
        self.state.borrow().clone()
    }

    /// Returns a receiver notified on every state transition.
    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.state.subscribe()
    }

    /// Runs the query, serving a fresh cache entry without touching the
    /// transport.
    pub async fn run(&self) -> QueryState<T> {
        self.execute(false, None).await
    }

    /// Runs the query against the transport even if the cache is fresh.
    pub async fn run_uncached(&self) -> QueryState<T> {
        self.execute(true, None).await
    }

    /// Runs on behalf of an activation.
    ///
    /// Nothing starts once `activation` is cancelled. The check happens under
    /// the same lock [`cancel`](Self::cancel) takes, so a run either starts
    /// before deactivation and gets cancelled by it, or does not start at all.
    pub async fn run_active(
        &self,
        skip_cache: bool,
        activation: &CancellationToken,
    ) -> QueryState<T> {
        self.execute(skip_cache, Some(activation)).await
    }

    /// Cancels the in-flight run, if any. Its result will be discarded.
    pub fn cancel(&self) {
        if let Some(token) = self.current.lock().take() {
            token.cancel();
        }
    }

    /// Clears data, error and flags. The cache and in-flight calls are untouched.
    pub fn reset(&self) {
        self.state.send_replace(RequestState::default());
    }

    async fn execute(
        &self,
        skip_cache: bool,
        activation: Option<&CancellationToken>,
    ) -> QueryState<T> {
        if !self.options.enabled {
            self.state.send_modify(|state| state.phase = Phase::Idle);
            return self.state();
        }

        let Some(token) = self.supersede(activation) else {
            debug!(key = %self.key, "activation cancelled, not running");
            return self.state();
        };

        if !skip_cache {
            if let Some(value) = self.cache.get(&self.key) {
                debug!(key = %self.key, "cache hit");
                match decode(value, self.options.select.as_ref()) {
                    Ok(data) => {
                        self.settle_success(&token, Some(data));
                        return self.state();
                    }
                    Err(error) => {
                        debug!(key = %self.key, %error, "cached value did not decode, fetching");
                    }
                }
            }
        }

        self.state.send_modify(RequestState::begin);
        self.attempt_chain(&token).await;
        self.state()
    }

    /// Installs a new token for this consumer and cancels its predecessor.
    ///
    /// Returns `None` without touching the slot if `activation` is cancelled.
    fn supersede(&self, activation: Option<&CancellationToken>) -> Option<CancellationToken> {
        let token = CancellationToken::new();
        let mut current = self.current.lock();
        if activation.is_some_and(CancellationToken::is_cancelled) {
            return None;
        }
        if let Some(previous) = current.replace(token.clone()) {
            if !previous.is_cancelled() {
                debug!(key = %self.key, "superseding in-flight run");
            }
            previous.cancel();
        }
        Some(token)
    }

    async fn attempt_chain(&self, token: &CancellationToken) {
        let mut retries = 0;
        loop {
            debug!(key = %self.key, attempt = retries + 1, "starting attempt");

            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => return,
                outcome = (self.fetcher)(token.signal()) => outcome,
            };
            if token.is_cancelled() {
                debug!(key = %self.key, "discarding result of cancelled attempt");
                return;
            }

            let error = match outcome.and_then(Response::into_result) {
                Ok(payload) => {
                    if let Some(value) = &payload {
                        self.cache
                            .set(self.key.clone(), value.clone(), self.options.fresh_for);
                    }
                    match payload
                        .map(|value| decode(value, self.options.select.as_ref()))
                        .transpose()
                    {
                        Ok(data) => {
                            self.settle_success(token, data);
                            return;
                        }
                        Err(error) => error,
                    }
                }
                Err(error) => error,
            };

            let delay = if error.is_retryable() {
                self.options.retry.next_delay(retries)
            } else {
                None
            };
            let Some(delay) = delay else {
                warn!(key = %self.key, %error, "query failed");
                self.settle_error(token, error);
                return;
            };

            retries += 1;
            warn!(key = %self.key, %error, retry = retries, ?delay, "attempt failed, retrying");
            self.state.send_modify(|state| state.retry_count = retries);
            if !RetryPolicy::wait(delay, token).await {
                return;
            }
        }
    }

    /// Applies `f` to state unless `token` has been superseded.
    ///
    /// Holding the token slot while writing keeps a concurrent supersede from
    /// interleaving with the check.
    fn apply(&self, token: &CancellationToken, f: impl FnOnce(&mut QueryState<T>)) -> bool {
        let _current = self.current.lock();
        if token.is_cancelled() {
            return false;
        }
        self.state.send_modify(f);
        true
    }

    fn settle_success(&self, token: &CancellationToken, data: Option<T>) {
        let applied = self.apply(token, |state| state.succeed(data.clone()));
        if applied {
            if let Some(on_success) = &self.options.on_success {
                on_success(data.as_ref());
            }
        }
    }

    fn settle_error(&self, token: &CancellationToken, error: QueryError) {
        let applied = self.apply(token, |state| state.fail(error.clone()));
        if applied {
            if let Some(on_error) = &self.options.on_error {
                on_error(&error);
            }
        }
    }
}

impl<T> fmt::Debug for QueryExecutor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("key", &self.key)
            .field("enabled", &self.options.enabled)
            .field("fresh_for", &self.options.fresh_for)
            .field("retry", &self.options.retry)
            .finish_non_exhaustive()
    }
}

pub type MutationSuccessCallback<T, V> = Arc<dyn Fn(Option<&T>, &V) + Send + Sync>;
pub type MutationErrorCallback<V> = Arc<dyn Fn(&QueryError, &V) + Send + Sync>;
pub type SettledCallback<T, V> = Arc<dyn Fn(Option<&T>, Option<&QueryError>, &V) + Send + Sync>;

/// Resolved settings for a mutation executor.
pub struct MutationRunOptions<T, V> {
    pub retry: RetryPolicy,
    pub on_success: Option<MutationSuccessCallback<T, V>>,
    pub on_error: Option<MutationErrorCallback<V>>,
    pub on_settled: Option<SettledCallback<T, V>>,
}

impl<T, V> Default for MutationRunOptions<T, V> {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            on_success: None,
            on_error: None,
            on_settled: None,
        }
    }
}

/// Executes a mutation against a fixed endpoint and method.
pub struct MutationExecutor<T, V> {
    endpoint: String,
    method: Method,
    transport: Arc<dyn Transport>,
    options: MutationRunOptions<T, V>,
    state: watch::Sender<MutationState<T>>,
}

impl<T, V> MutationExecutor<T, V>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    V: Serialize + Send + Sync + 'static,
{
    pub fn new(
        endpoint: impl Into<String>,
        method: Method,
        transport: Arc<dyn Transport>,
        options: MutationRunOptions<T, V>,
    ) -> Self {
        let (state, _) = watch::channel(RequestState::default());
        Self {
            endpoint: endpoint.into(),
            method,
            transport,
            options,
            state,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub const fn method(&self) -> Method {
        self.method
    }

    pub fn state(&self) -> MutationState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState<T>> {
        self.state.subscribe()
    }

    /// Clears data, error and flags. In-flight calls keep running.
    pub fn reset(&self) {
        self.state.send_replace(RequestState::default());
    }

    /// Sends `variables` and waits for the terminal outcome.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidParams`] without touching state if the
    /// variables cannot be serialized, and otherwise re-raises the terminal
    /// error after updating state and invoking callbacks.
    pub async fn run(&self, variables: V) -> Result<Option<T>> {
        let body = serde_json::to_value(&variables)
            .map_err(|e| QueryError::InvalidParams(e.to_string()))?;

        self.state.send_modify(|state| {
            state.phase = Phase::Loading;
            state.retry_count = 0;
        });

        // Mutations are never superseded; the token only guards retry waits.
        let token = CancellationToken::new();
        let mut retries = 0;
        let outcome = loop {
            debug!(endpoint = %self.endpoint, method = %self.method, attempt = retries + 1, "sending mutation");

            let result: Result<Option<T>> = self
                .method
                .send(self.transport.as_ref(), &self.endpoint, Some(body.clone()))
                .await
                .and_then(Response::into_result)
                .and_then(|payload| payload.map(|value| decode(value, None)).transpose());

            let error = match result {
                Ok(data) => break Ok(data),
                Err(error) => error,
            };
            let delay = if error.is_retryable() {
                self.options.retry.next_delay(retries)
            } else {
                None
            };
            let Some(delay) = delay else {
                break Err(error);
            };

            retries += 1;
            warn!(endpoint = %self.endpoint, %error, retry = retries, ?delay, "mutation attempt failed, retrying");
            self.state.send_modify(|state| state.retry_count = retries);
            RetryPolicy::wait(delay, &token).await;
        };

        match outcome {
            Ok(data) => {
                self.state.send_modify(|state| state.succeed(data.clone()));
                if let Some(on_success) = &self.options.on_success {
                    on_success(data.as_ref(), &variables);
                }
                if let Some(on_settled) = &self.options.on_settled {
                    on_settled(data.as_ref(), None, &variables);
                }
                Ok(data)
            }
            Err(error) => {
                warn!(endpoint = %self.endpoint, method = %self.method, %error, "mutation failed");
                self.state.send_modify(|state| {
                    state.data = None;
                    state.fail(error.clone());
                });
                if let Some(on_error) = &self.options.on_error {
                    on_error(&error, &variables);
                }
                if let Some(on_settled) = &self.options.on_settled {
                    on_settled(None, Some(&error), &variables);
                }
                Err(error)
            }
        }
    }
}

impl<T, V> fmt::Debug for MutationExecutor<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationExecutor")
            .field("endpoint", &self.endpoint)
            .field("method", &self.method)
            .field("retry", &self.options.retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockReply, MockTransport};
    use crate::transport::{GetOptions, Transport};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fetcher(transport: &MockTransport, path: &str) -> Fetcher {
        let transport = transport.clone();
        let path = path.to_string();
        Arc::new(move |signal| {
            transport.get(
                &path,
                GetOptions {
                    params: None,
                    signal: Some(signal),
                },
            )
        })
    }

    fn executor<T>(transport: &MockTransport, options: RunOptions<T>) -> QueryExecutor<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        QueryExecutor::new(
            "/users",
            fetcher(transport, "/users"),
            Arc::new(CacheStore::new()),
            options,
            RequestState::default(),
        )
    }

    #[tokio::test]
    async fn test_success_populates_state_and_cache() {
        let transport = MockTransport::new().reply(Response::ok(json!([{"id": 1}])));
        let exec = executor::<Value>(&transport, RunOptions::default());

        let state = exec.run().await;

        assert_eq!(state.data(), Some(&json!([{"id": 1}])));
        assert!(state.is_success());
        assert!(!state.is_error());
        assert_eq!(exec.cache.get("/users"), None, "zero fresh_for is stale at once");
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_disabled_does_not_fetch() {
        let transport = MockTransport::new();
        let options = RunOptions {
            enabled: false,
            ..RunOptions::default()
        };
        let exec = executor::<Value>(&transport, options);

        let state = exec.run().await;

        assert!(state.is_idle());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fresh_cache_short_circuits_transport() {
        let transport = MockTransport::new();
        let called = Arc::new(AtomicUsize::new(0));
        let c = called.clone();
        let options = RunOptions {
            fresh_for: Duration::from_secs(60),
            on_success: Some(Arc::new(move |_: Option<&Value>| {
                c.fetch_add(1, Ordering::SeqCst);
            }) as SuccessCallback<Value>),
            ..RunOptions::default()
        };
        let exec = executor::<Value>(&transport, options);
        exec.cache.set("/users", json!(["cached"]), Duration::from_secs(60));

        let state = exec.run().await;

        assert_eq!(state.data(), Some(&json!(["cached"])));
        assert_eq!(transport.call_count(), 0);
        assert_eq!(called.load(Ordering::SeqCst), 1);

        exec.run_uncached().await;
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let transport = MockTransport::new()
            .fail("down")
            .fail("down")
            .reply(Response::ok(json!("ok")));
        let options = RunOptions {
            retry: RetryPolicy::new(2, Duration::from_millis(50)),
            ..RunOptions::default()
        };
        let exec = executor::<String>(&transport, options);

        let state = exec.run().await;

        assert_eq!(transport.call_count(), 3);
        assert!(state.is_success());
        assert_eq!(state.data(), Some(&"ok".to_string()));
        assert_eq!(state.retry_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_report_error_once() {
        let transport = MockTransport::new().fallback(MockReply::err("down"));
        let errors = Arc::new(AtomicUsize::new(0));
        let e = errors.clone();
        let options = RunOptions {
            retry: RetryPolicy::new(3, Duration::from_millis(10)),
            on_error: Some(Arc::new(move |_: &QueryError| {
                e.fetch_add(1, Ordering::SeqCst);
            }) as ErrorCallback),
            ..RunOptions::default()
        };
        let exec = executor::<Value>(&transport, options);

        let state = exec.run().await;

        assert_eq!(transport.call_count(), 4);
        assert!(state.is_error());
        assert_eq!(state.error(), Some(&QueryError::Transport("down".to_string())));
        assert_eq!(state.retry_count, 3);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_payload_is_success_without_data() {
        let transport = MockTransport::new().reply(Response::empty());
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        let options = RunOptions {
            on_success: Some(Arc::new(move |data: Option<&Value>| {
                *s.lock() = Some(data.cloned());
            }) as SuccessCallback<Value>),
            ..RunOptions::default()
        };
        let exec = executor::<Value>(&transport, options);

        let state = exec.run().await;

        assert!(state.is_success());
        assert_eq!(state.data(), None);
        assert_eq!(*seen.lock(), Some(None));
    }

    #[tokio::test]
    async fn test_success_with_errors_is_failure() {
        let transport = MockTransport::new().reply(Response {
            success: true,
            data: Some(json!(1)),
            errors: Some(json!({"field": "invalid"})),
        });
        let options = RunOptions {
            retry: RetryPolicy::none(),
            ..RunOptions::default()
        };
        let exec = executor::<Value>(&transport, options);

        let state = exec.run().await;

        assert!(state.is_error());
        assert_eq!(
            state.error(),
            Some(&QueryError::Semantic(json!({"field": "invalid"})))
        );
    }

    #[tokio::test]
    async fn test_decode_failure_is_not_retried() {
        let transport = MockTransport::new().fallback(MockReply::ok(Response::ok(json!("text"))));
        let exec = executor::<Vec<u32>>(&transport, RunOptions::default());

        let state = exec.run().await;

        assert!(state.is_error());
        assert!(matches!(state.error(), Some(QueryError::Decode(_))));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_select_transforms_payload() {
        let transport = MockTransport::new().reply(Response::ok(json!({"items": [1, 2, 3]})));
        let options = RunOptions {
            select: Some(Arc::new(|value: Value| value["items"].clone()) as Selector),
            ..RunOptions::default()
        };
        let exec = executor::<Vec<u32>>(&transport, options);

        let state = exec.run().await;

        assert_eq!(state.data(), Some(&vec![1, 2, 3]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_run_is_discarded() {
        let transport = MockTransport::new()
            .push(MockReply::ok(Response::ok(json!("old"))).after(Duration::from_millis(100)))
            .push(MockReply::ok(Response::ok(json!("new"))).after(Duration::from_millis(10)));
        let exec = Arc::new(executor::<String>(&transport, RunOptions::default()));

        let first = {
            let exec = exec.clone();
            tokio::spawn(async move { exec.run().await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        let second = exec.run().await;
        let _ = first.await;

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(second.data(), Some(&"new".to_string()));
        assert_eq!(exec.state().data(), Some(&"new".to_string()));
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_retry_wait_skips_error() {
        let transport = MockTransport::new().fallback(MockReply::err("down"));
        let errors = Arc::new(AtomicUsize::new(0));
        let e = errors.clone();
        let options = RunOptions {
            retry: RetryPolicy::new(3, Duration::from_secs(10)),
            on_error: Some(Arc::new(move |_: &QueryError| {
                e.fetch_add(1, Ordering::SeqCst);
            }) as ErrorCallback),
            ..RunOptions::default()
        };
        let exec = Arc::new(executor::<Value>(&transport, options));

        let run = {
            let exec = exec.clone();
            tokio::spawn(async move { exec.run().await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        exec.cancel();
        let state = run.await.unwrap();

        assert_eq!(transport.call_count(), 1);
        assert!(!state.is_error());
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_activation_never_starts() {
        let transport = MockTransport::new().reply(Response::ok(json!(1)));
        let successes = Arc::new(AtomicUsize::new(0));
        let s = successes.clone();
        let options = RunOptions {
            on_success: Some(Arc::new(move |_: Option<&Value>| {
                s.fetch_add(1, Ordering::SeqCst);
            }) as SuccessCallback<Value>),
            ..RunOptions::default()
        };
        let exec = executor::<Value>(&transport, options);
        let activation = CancellationToken::new();
        activation.cancel();

        let state = exec.run_active(false, &activation).await;

        assert!(state.is_idle());
        assert_eq!(transport.call_count(), 0);
        assert_eq!(successes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activation_cancel_stops_started_run() {
        let transport = MockTransport::new()
            .push(MockReply::ok(Response::ok(json!(1))).after(Duration::from_millis(100)));
        let successes = Arc::new(AtomicUsize::new(0));
        let s = successes.clone();
        let options = RunOptions {
            on_success: Some(Arc::new(move |_: Option<&Value>| {
                s.fetch_add(1, Ordering::SeqCst);
            }) as SuccessCallback<Value>),
            ..RunOptions::default()
        };
        let exec = Arc::new(executor::<Value>(&transport, options));
        let activation = CancellationToken::new();
        let in_flight = exec.clone();
        activation.on_cancel(move || in_flight.cancel());

        let run = {
            let exec = exec.clone();
            let activation = activation.clone();
            tokio::spawn(async move { exec.run_active(false, &activation).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        activation.cancel();
        run.await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(transport.call_count(), 1);
        assert!(!exec.state().is_success());
        assert_eq!(successes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let transport = MockTransport::new().reply(Response::ok(json!(1)));
        let exec = executor::<Value>(&transport, RunOptions::default());
        exec.run().await;

        exec.reset();

        assert_eq!(exec.state(), RequestState::default());
    }

    fn mutation(
        transport: &MockTransport,
        method: Method,
        options: MutationRunOptions<Value, Value>,
    ) -> MutationExecutor<Value, Value> {
        let transport: Arc<dyn Transport> = Arc::new(transport.clone());
        MutationExecutor::new("/posts", method, transport, options)
    }

    #[tokio::test]
    async fn test_mutation_success_invokes_callbacks_in_order() {
        let transport = MockTransport::new().reply(Response::ok(json!({"id": 7})));
        let log = Arc::new(Mutex::new(Vec::new()));
        let (l1, l2) = (log.clone(), log.clone());
        let options = MutationRunOptions {
            on_success: Some(Arc::new(move |data: Option<&Value>, vars: &Value| {
                l1.lock().push(("success", data.cloned(), vars.clone()));
            }) as MutationSuccessCallback<Value, Value>),
            on_settled: Some(Arc::new(
                move |data: Option<&Value>, error: Option<&QueryError>, vars: &Value| {
                    assert!(error.is_none());
                    l2.lock().push(("settled", data.cloned(), vars.clone()));
                },
            ) as SettledCallback<Value, Value>),
            ..MutationRunOptions::default()
        };
        let exec = mutation(&transport, Method::Post, options);

        let result = exec.run(json!({"title": "hi"})).await;

        assert_eq!(result, Ok(Some(json!({"id": 7}))));
        assert!(exec.state().is_success());
        assert_eq!(
            *log.lock(),
            vec![
                ("success", Some(json!({"id": 7})), json!({"title": "hi"})),
                ("settled", Some(json!({"id": 7})), json!({"title": "hi"})),
            ]
        );
        assert_eq!(transport.calls()[0].method, "POST");
        assert_eq!(transport.calls()[0].body, Some(json!({"title": "hi"})));
    }

    #[tokio::test]
    async fn test_mutation_failure_reraises() {
        let transport = MockTransport::new().fallback(MockReply::err("rejected"));
        let options = MutationRunOptions {
            retry: RetryPolicy::none(),
            ..MutationRunOptions::default()
        };
        let exec = mutation(&transport, Method::Post, options);

        let result = exec.run(json!({})).await;

        assert_eq!(result, Err(QueryError::Transport("rejected".to_string())));
        let state = exec.state();
        assert!(state.is_error());
        assert_eq!(state.data(), None);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutation_retries() {
        let transport = MockTransport::new()
            .fail("flaky")
            .reply(Response::empty());
        let options = MutationRunOptions {
            retry: RetryPolicy::new(2, Duration::from_millis(20)),
            ..MutationRunOptions::default()
        };
        let exec = mutation(&transport, Method::Delete, options);

        let result = exec.run(Value::Null).await;

        assert_eq!(result, Ok(None));
        assert_eq!(transport.call_count(), 2);
        assert_eq!(transport.calls()[1].method, "DELETE");
    }
}
