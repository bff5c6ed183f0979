//! Consumer-facing mutations for creating, updating, or deleting resources.
//!
//! Mutations are never served from the cache. A successful mutation can
//! invalidate related query keys so that active queries refetch.
//!
//! # Example
//!
//! ```rust,no_run
//! use querykit::prelude::*;
//! use querykit::transport::mock::MockTransport;
//! use serde::Serialize;
//! use serde_json::Value;
//!
//! #[derive(Serialize)]
//! struct NewPost {
//!     title: String,
//! }
//!
//! # async fn run() -> Result<(), QueryError> {
//! let client = Client::new(MockTransport::new());
//!
//! let create = client.mutation::<Value, NewPost>(
//!     "/posts",
//!     "POST".parse()?,
//!     MutationOptions::default().invalidates(["/posts"]),
//! )?;
//!
//! // Re-raises the terminal error so callers can branch on it.
//! create.mutate_async(NewPost { title: "hello".into() }).await?;
//! assert!(create.is_success());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::{QueryError, Result};
use crate::executor::{
    MutationErrorCallback, MutationExecutor, MutationRunOptions, MutationSuccessCallback,
    SettledCallback,
};
use crate::retry::RetryPolicy;
use crate::state::MutationState;

/// Per-mutation options. Unset retry settings fall back to the client's config.
pub struct MutationOptions<T, V> {
    pub retry: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub on_success: Option<MutationSuccessCallback<T, V>>,
    pub on_error: Option<MutationErrorCallback<V>>,
    pub on_settled: Option<SettledCallback<T, V>>,
    /// Query keys invalidated after a successful mutation.
    pub invalidates: Vec<String>,
}

impl<T, V> Default for MutationOptions<T, V> {
    fn default() -> Self {
        Self {
            retry: None,
            retry_delay: None,
            on_success: None,
            on_error: None,
            on_settled: None,
            invalidates: Vec::new(),
        }
    }
}

impl<T, V> MutationOptions<T, V> {
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
    pub fn on_success(mut self, f: impl Fn(Option<&T>, &V) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&QueryError, &V) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_settled(
        mut self,
        f: impl Fn(Option<&T>, Option<&QueryError>, &V) + Send + Sync + 'static,
    ) -> Self {
        self.on_settled = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn invalidates<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.invalidates.extend(keys.into_iter().map(Into::into));
        self
    }

    pub(crate) fn resolve(self, config: &ClientConfig) -> (MutationRunOptions<T, V>, Vec<String>) {
        let run = MutationRunOptions {
            retry: RetryPolicy::new(
                self.retry.unwrap_or(config.retry.max_retries),
                self.retry_delay.unwrap_or(config.retry.retry_delay),
            ),
            on_success: self.on_success,
            on_error: self.on_error,
            on_settled: self.on_settled,
        };
        (run, self.invalidates)
    }
}

/// A mutation bound to an endpoint and method.
///
/// Clones share state.
pub struct Mutation<T, V> {
    executor: Arc<MutationExecutor<T, V>>,
    client: Client,
    invalidates: Arc<[String]>,
}

impl<T, V> Clone for Mutation<T, V> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            client: self.client.clone(),
            invalidates: self.invalidates.clone(),
        }
    }
}

impl<T, V> Mutation<T, V>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    V: Serialize + Send + Sync + 'static,
{
    pub(crate) fn new(
        executor: MutationExecutor<T, V>,
        client: Client,
        invalidates: Vec<String>,
    ) -> Self {
        Self {
            executor: Arc::new(executor),
            client,
            invalidates: invalidates.into(),
        }
    }

    pub fn state(&self) -> MutationState<T> {
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

    pub fn is_success(&self) -> bool {
        self.executor.state().is_success()
    }

    pub fn is_error(&self) -> bool {
        self.executor.state().is_error()
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState<T>> {
        self.executor.subscribe()
    }

    /// Runs the mutation in the background.
    ///
    /// The handle resolves to the same result as [`mutate_async`](Self::mutate_async).
    pub fn mutate(&self, variables: V) -> JoinHandle<Result<Option<T>>> {
        let this = self.clone();
        tokio::spawn(async move { this.mutate_async(variables).await })
    }

    /// Runs the mutation and waits for its terminal outcome.
    ///
    /// # Errors
    ///
    /// Re-raises the terminal error after state and callbacks have been updated.
    pub async fn mutate_async(&self, variables: V) -> Result<Option<T>> {
        let data = self.executor.run(variables).await?;
        for key in self.invalidates.iter() {
            self.client.invalidate_query(key);
        }
        Ok(data)
    }

    /// Clears data, error and flags. The cache and in-flight calls are untouched.
    pub fn reset(&self) {
        self.executor.reset();
    }
}

impl<T, V> fmt::Debug for Mutation<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutation")
            .field("executor", &self.executor)
            .field("invalidates", &self.invalidates)
            .finish_non_exhaustive()
    }
}
