//! The client bundling transport, cache and subscriptions.
//!
//! A [`Client`] is constructed once and passed to every query and mutation;
//! there is no process-wide state. Cloning a client is cheap and clones share
//! the same cache.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::cache::CacheStore;
use crate::config::ClientConfig;
use crate::error::{QueryError, Result};
use crate::executor::{Fetcher, MutationExecutor, QueryExecutor, RunOptions};
use crate::key::build_key_from_value;
use crate::mutation::{Mutation, MutationOptions};
use crate::query::{Query, QueryOptions};
use crate::state::RequestState;
use crate::subscription::SubscriptionManager;
use crate::transport::{GetOptions, Method, Transport};

struct Inner {
    transport: Arc<dyn Transport>,
    cache: Arc<CacheStore>,
    subscriptions: SubscriptionManager,
    config: ClientConfig,
}

/// Entry point for queries, mutations and cache administration.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
///
/// use querykit::{Client, ClientConfig};
/// use querykit::transport::mock::MockTransport;
/// use serde_json::json;
///
/// let client = Client::with_config(
///     MockTransport::new(),
///     ClientConfig::default().with_stale_time(Duration::from_secs(30)),
/// );
///
/// client.set_query_data("/users", json!([{"id": 1}]), Duration::from_secs(5));
/// assert_eq!(client.get_query_data("/users"), Some(json!([{"id": 1}])));
///
/// client.invalidate_all();
/// assert_eq!(client.get_query_data("/users"), None);
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Creates a client with the default configuration.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    pub fn with_config(transport: impl Transport + 'static, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport: Arc::new(transport),
                cache: Arc::new(CacheStore::new()),
                subscriptions: SubscriptionManager::new(config.channel_capacity),
                config,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &CacheStore {
        &self.inner.cache
    }

    pub(crate) fn subscriptions(&self) -> &SubscriptionManager {
        &self.inner.subscriptions
    }

    /// Creates a query for `endpoint`.
    ///
    /// The query starts idle (or with its initial data) and fetches when it is
    /// refetched or activated.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::MissingConfig`] for an empty endpoint.
    pub fn query<T>(&self, endpoint: &str, options: QueryOptions<T>) -> Result<Query<T>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        if endpoint.is_empty() {
            return Err(QueryError::MissingConfig("endpoint"));
        }

        let resolved = options.resolve(&self.inner.config);
        let key = build_key_from_value(endpoint, resolved.params.as_ref().unwrap_or(&Value::Null));
        let fetcher = self.fetcher(endpoint, resolved.params);
        let initial = resolved
            .initial_data
            .map_or_else(RequestState::default, RequestState::with_initial_data);

        debug!(key = %key, "query created");
        let executor = QueryExecutor::new(
            key,
            fetcher,
            self.inner.cache.clone(),
            resolved.run,
            initial,
        );
        Ok(Query::new(Arc::new(executor), self.clone(), resolved.triggers))
    }

    /// Creates a mutation sending `method` requests to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::MissingConfig`] for an empty endpoint.
    pub fn mutation<T, V>(
        &self,
        endpoint: &str,
        method: Method,
        options: MutationOptions<T, V>,
    ) -> Result<Mutation<T, V>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
        V: Serialize + Send + Sync + 'static,
    {
        if endpoint.is_empty() {
            return Err(QueryError::MissingConfig("endpoint"));
        }

        let (run, invalidates) = options.resolve(&self.inner.config);
        let executor = MutationExecutor::new(endpoint, method, self.inner.transport.clone(), run);
        Ok(Mutation::new(executor, self.clone(), invalidates))
    }

    /// Fetches `endpoint` into the cache without creating a consumer.
    ///
    /// # Errors
    ///
    /// Returns the terminal error of the fetch after retries.
    pub async fn prefetch_query(&self, endpoint: &str, params: Option<Value>) -> Result<()> {
        if endpoint.is_empty() {
            return Err(QueryError::MissingConfig("endpoint"));
        }

        let key = build_key_from_value(endpoint, params.as_ref().unwrap_or(&Value::Null));
        let options = RunOptions::<Value> {
            fresh_for: self.inner.config.stale_time,
            retry: self.inner.config.retry,
            ..RunOptions::default()
        };
        let executor = QueryExecutor::new(
            key,
            self.fetcher(endpoint, params),
            self.inner.cache.clone(),
            options,
            RequestState::default(),
        );

        match executor.run().await.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Removes the cached entry for `key` and refetches its active consumers.
    ///
    /// Invalidating an absent key is a no-op for the cache.
    pub fn invalidate_query(&self, key: &str) {
        debug!(key, "invalidating query");
        self.inner.cache.delete(key);
        self.inner.subscriptions.notify_invalidated(key);
    }

    /// Clears the whole cache.
    ///
    /// No refetch is triggered; active consumers miss the cache on their next run.
    pub fn invalidate_all(&self) {
        debug!("invalidating all queries");
        self.inner.cache.clear();
    }

    /// Returns the fresh cached value for `key`, if any.
    pub fn get_query_data(&self, key: &str) -> Option<Value> {
        self.inner.cache.get(key)
    }

    /// Stores `value` under `key` for `fresh_for`.
    pub fn set_query_data(&self, key: &str, value: Value, fresh_for: Duration) {
        self.inner.cache.set(key, value, fresh_for);
    }

    /// Signals that the application regained focus.
    ///
    /// Active queries with `refetch_on_window_focus` refetch.
    pub fn notify_focus(&self) {
        self.inner.subscriptions.notify_focus();
    }

    /// Keys with at least one active query, sorted.
    pub fn active_keys(&self) -> Vec<String> {
        self.inner.subscriptions.active_keys()
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.inner.subscriptions.is_active(key)
    }

    fn fetcher(&self, endpoint: &str, params: Option<Value>) -> Fetcher {
        let transport = self.inner.transport.clone();
        let path = endpoint.to_string();
        Arc::new(move |signal| {
            transport.get(
                &path,
                GetOptions {
                    params: params.clone(),
                    signal: Some(signal),
                },
            )
        })
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("cache_entries", &self.inner.cache.len())
            .field("active_keys", &self.active_keys())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
