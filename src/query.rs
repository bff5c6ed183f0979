//! Consumer-facing queries.
//!
//! A [`Query`] is created through [`Client::query`] and exposes its state
//! (data, error and loading flags) together with `refetch`, `invalidate` and
//! `reset`. Calling [`Query::activate`] subscribes it to mount, interval,
//! focus and invalidation triggers until [`Query::deactivate`] or drop.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use querykit::prelude::*;
//! use querykit::transport::mock::MockTransport;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Clone, Deserialize)]
//! struct User {
//!     id: u64,
//! }
//!
//! # async fn run() -> Result<(), QueryError> {
//! let client = Client::new(MockTransport::new());
//!
//! let users = client.query::<Vec<User>>(
//!     "/users",
//!     QueryOptions::default()
//!         .stale_time(Duration::from_secs(30))
//!         .retry(2),
//! )?;
//!
//! let state = users.refetch().await;
//! if let Some(users) = state.data() {
//!     println!("{} users", users.len());
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::QueryError;
use crate::executor::{ErrorCallback, QueryExecutor, RunOptions, Selector, SuccessCallback};
use crate::retry::RetryPolicy;
use crate::state::QueryState;
use crate::subscription::{Activation, Triggers};

/// Per-query options. Unset fields fall back to the client's [`ClientConfig`].
pub struct QueryOptions<T> {
    /// When `false` the query stays idle and never touches the transport.
    pub enabled: bool,
    pub refetch_on_mount: Option<bool>,
    pub refetch_on_window_focus: Option<bool>,
    /// Refetch periodically while the query is active.
    pub refetch_interval: Option<Duration>,
    /// How long a fetched result is served from the cache.
    pub stale_time: Option<Duration>,
    /// Number of retries after the first failed attempt.
    pub retry: Option<u32>,
    /// Base delay of the linear backoff between retries.
    pub retry_delay: Option<Duration>,
    /// Parameters that become part of the cache key and are sent with `get`.
    pub params: Option<Value>,
    pub select: Option<Selector>,
    pub on_success: Option<SuccessCallback<T>>,
    pub on_error: Option<ErrorCallback>,
    /// Data shown until the first fetch completes.
    pub initial_data: Option<T>,
}

impl<T> Default for QueryOptions<T> {
    fn default() -> Self {
        Self {
            enabled: true,
            refetch_on_mount: None,
            refetch_on_window_focus: None,
            refetch_interval: None,
            stale_time: None,
            retry: None,
            retry_delay: None,
            params: None,
            select: None,
            on_success: None,
            on_error: None,
            initial_data: None,
        }
    }
}

impl<T> QueryOptions<T> {
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn refetch_on_mount(mut self, enabled: bool) -> Self {
        self.refetch_on_mount = Some(enabled);
        self
    }

    #[must_use]
    pub fn refetch_on_window_focus(mut self, enabled: bool) -> Self {
        self.refetch_on_window_focus = Some(enabled);
        self
    }

    /// Polls while active. A zero interval disables polling.
    #[must_use]
    pub fn refetch_interval(mut self, interval: Duration) -> Self {
        self.refetch_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    #[must_use]
    pub fn retry(mut self, retries: u32) -> Self {
        self.retry = Some(retries);
        self
    }

    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    #[must_use]
    pub fn select(mut self, select: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.select = Some(Arc::new(select));
        self
    }

    #[must_use]
    pub fn on_success(mut self, f: impl Fn(Option<&T>) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&QueryError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn initial_data(mut self, data: T) -> Self {
        self.initial_data = Some(data);
        self
    }

    /// Splits the options into executor settings and activation triggers.
    pub(crate) fn resolve(self, config: &ClientConfig) -> ResolvedQuery<T> {
        let retry = RetryPolicy::new(
            self.retry.unwrap_or(config.retry.max_retries),
            self.retry_delay.unwrap_or(config.retry.retry_delay),
        );
        ResolvedQuery {
            run: RunOptions {
                enabled: self.enabled,
                fresh_for: self.stale_time.unwrap_or(config.stale_time),
                retry,
                select: self.select,
                on_success: self.on_success,
                on_error: self.on_error,
            },
            triggers: Triggers {
                on_mount: self.refetch_on_mount.unwrap_or(config.refetch_on_mount),
                on_window_focus: self
                    .refetch_on_window_focus
                    .unwrap_or(config.refetch_on_window_focus),
                // Zero disables polling.
                interval: self.refetch_interval.filter(|period| !period.is_zero()),
            },
            params: self.params,
            initial_data: self.initial_data,
        }
    }
}

pub(crate) struct ResolvedQuery<T> {
    pub run: RunOptions<T>,
    pub triggers: Triggers,
    pub params: Option<Value>,
    pub initial_data: Option<T>,
}

/// A query bound to one cache key.
///
/// Dropping the query deactivates it.
pub struct Query<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    executor: Arc<QueryExecutor<T>>,
    client: Client,
    triggers: Triggers,
    activation: Mutex<Option<Activation>>,
}

impl<T> Query<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(executor: Arc<QueryExecutor<T>>, client: Client, triggers: Triggers) -> Self {
        Self {
            executor,
            client,
            triggers,
            activation: Mutex::new(None),
        }
    }

    /// The cache key derived from the endpoint and parameters.
    pub fn key(&self) -> &str {
        self.executor.key()
    }

    pub fn state(&self) -> QueryState<T> {
        self.executor.state()
    }

    pub fn data(&self) -> Option<T> {
        self.executor.state().data
    }

    pub fn error(&self) -> Option<QueryError> {
        self.executor.state().error
    }

    pub fn is_loading(&self) -> bool {
        self.executor.state().is_loading()
    }

    pub fn is_fetching(&self) -> bool {
        self.executor.state().is_fetching()
    }

    pub fn is_success(&self) -> bool {
        self.executor.state().is_success()
    }

    pub fn is_error(&self) -> bool {
        self.executor.state().is_error()
    }

    /// Returns a receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.executor.subscribe()
    }

    /// Stream of state snapshots, starting with the current one.
    pub fn stream(&self) -> BoxStream<'static, QueryState<T>> {
        WatchStream::new(self.executor.subscribe()).boxed()
    }

    /// Runs the query now. A fresh cache entry is served without a fetch.
    ///
    /// Any run already in flight for this query is superseded.
    pub async fn refetch(&self) -> QueryState<T> {
        self.executor.run().await
    }

    /// Drops the cached entry for this key and fetches from the transport.
    pub async fn invalidate(&self) -> QueryState<T> {
        self.client.cache().delete(self.key());
        self.executor.run_uncached().await
    }

    /// Clears data, error and flags without touching the cache or in-flight runs.
    pub fn reset(&self) {
        self.executor.reset();
    }

    /// Subscribes the query to its refetch triggers.
    ///
    /// Does nothing if already active. Must be called within a Tokio runtime.
    pub fn activate(&self) {
        let mut activation = self.activation.lock();
        if activation.is_none() {
            *activation = Some(
                self.client
                    .subscriptions()
                    .activate(self.executor.clone(), self.triggers),
            );
        }
    }

    /// Tears down triggers and cancels any in-flight run.
    pub fn deactivate(&self) {
        if let Some(activation) = self.activation.lock().take() {
            self.client.subscriptions().deactivate(activation);
        }
    }

    pub fn is_active(&self) -> bool {
        self.activation.lock().is_some()
    }
}

impl<T> Drop for Query<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl<T> fmt::Debug for Query<T>
where
    T: DeserializeOwned + Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("key", &self.key())
            .field("state", &self.state())
            .field("active", &self.is_active())
            .finish()
    }
}
