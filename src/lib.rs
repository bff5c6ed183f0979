//! # querykit - async data fetching with caching
//!
//! querykit fetches remote resources through a pluggable transport and keeps
//! the results in a time-bound cache, similar to SWR or TanStack Query. It
//! handles retries, cancellation of superseded requests, invalidation and
//! refetching, and exposes a consistent state (data, error, loading flags) to
//! each consumer.
//!
//! ## Core Components
//!
//! - [`Client`](client::Client): Bundles the transport, cache and subscriptions
//! - [`Query`](query::Query): A cached read bound to one cache key
//! - [`Mutation`](mutation::Mutation): A write that is never cached
//! - [`CacheStore`](cache::CacheStore): Key/value store with lazy expiry
//! - [`RetryPolicy`](retry::RetryPolicy): Linear backoff between attempts
//! - [`Transport`](transport::Transport): The HTTP capability you provide
//!
//! ## Lifecycle
//!
//! 1. A query derives its cache key from the endpoint and sorted parameters
//! 2. A fresh cache entry is served without touching the transport
//! 3. Otherwise the transport is called, retrying failures with backoff
//! 4. The newest run always wins; results of superseded runs are dropped
//! 5. Invalidating a key removes its entry and refetches active consumers
//!
//! ## Example
//!
//! ```rust
//! use querykit::prelude::*;
//! use querykit::transport::{Response, mock::MockTransport};
//! use serde_json::{Value, json};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), QueryError> {
//! let transport = MockTransport::new().reply(Response::ok(json!([{"id": 1}])));
//! let client = Client::new(transport);
//!
//! let users = client.query::<Value>("/users", QueryOptions::default())?;
//! let state = users.refetch().await;
//!
//! assert!(state.is_success());
//! assert_eq!(state.data(), Some(&json!([{"id": 1}])));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cancel;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod key;
pub mod mutation;
pub mod prelude;
pub mod query;
pub mod retry;
pub mod state;
pub mod subscription;
pub mod transport;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{QueryError, Result};
pub use mutation::{Mutation, MutationOptions};
pub use query::{Query, QueryOptions};
pub use state::{MutationState, Phase, QueryState, RequestState};
