//! Scripted transport for testing.
//!
//! [`MockTransport`] answers calls from a queue of scripted replies, records
//! every call, and can delay replies to simulate latency. Once the queue is
//! empty it falls back to a default reply.
//!
//! ```
//! use querykit::transport::{Response, mock::MockTransport};
//! use serde_json::json;
//!
//! let transport = MockTransport::new()
//!     .fail("connection refused")
//!     .reply(Response::ok(json!([{"id": 1}])));
//!
//! assert_eq!(transport.call_count(), 0);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::sleep;

use super::{GetOptions, Response, Transport, TransportFuture};
use crate::error::{QueryError, Result};

/// A single scripted reply.
#[derive(Debug, Clone)]
pub struct MockReply {
    pub result: Result<Response>,
    pub delay: Duration,
}

impl MockReply {
    pub fn ok(response: Response) -> Self {
        Self {
            result: Ok(response),
            delay: Duration::ZERO,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            result: Err(QueryError::Transport(message.into())),
            delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A call recorded by [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub method: &'static str,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Debug)]
struct Inner {
    replies: VecDeque<MockReply>,
    fallback: MockReply,
    calls: Vec<MockCall>,
}

/// A transport that answers from a script.
///
/// Clones share the same script and call log.
#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MockTransport {
    /// Creates a transport whose fallback reply is an empty success.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                replies: VecDeque::new(),
                fallback: MockReply::ok(Response::empty()),
                calls: Vec::new(),
            })),
        }
    }

    /// Queues a reply.
    #[must_use]
    pub fn push(self, reply: MockReply) -> Self {
        self.inner.lock().replies.push_back(reply);
        self
    }

    /// Queues a successful response.
    #[must_use]
    pub fn reply(self, response: Response) -> Self {
        self.push(MockReply::ok(response))
    }

    /// Queues a transport rejection.
    #[must_use]
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(MockReply::err(message))
    }

    /// Sets the reply used once the queue is exhausted.
    #[must_use]
    pub fn fallback(self, reply: MockReply) -> Self {
        self.inner.lock().fallback = reply;
        self
    }

    /// Returns every call made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.inner.lock().calls.clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.inner.lock().calls.len()
    }

    fn respond(&self, method: &'static str, path: &str, body: Option<Value>) -> TransportFuture {
        let reply = {
            let mut inner = self.inner.lock();
            inner.calls.push(MockCall {
                method,
                path: path.to_string(),
                body,
            });
            let next = inner.replies.pop_front();
            next.unwrap_or_else(|| inner.fallback.clone())
        };

        async move {
            if !reply.delay.is_zero() {
                sleep(reply.delay).await;
            }
            reply.result
        }
        .boxed()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn get(&self, path: &str, options: GetOptions) -> TransportFuture {
        self.respond("GET", path, options.params)
    }

    fn post(&self, path: &str, body: Option<Value>) -> TransportFuture {
        self.respond("POST", path, body)
    }

    fn put(&self, path: &str, body: Option<Value>) -> TransportFuture {
        self.respond("PUT", path, body)
    }

    fn patch(&self, path: &str, body: Option<Value>) -> TransportFuture {
        self.respond("PATCH", path, body)
    }

    fn delete(&self, path: &str) -> TransportFuture {
        self.respond("DELETE", path, None)
    }
}
