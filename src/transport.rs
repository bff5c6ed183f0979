//! The transport capability the core fetches through.
//!
//! The HTTP client itself lives outside this crate. Anything that can perform
//! `get`/`post`/`put`/`patch`/`delete` and report a [`Response`] can be plugged
//! into a [`Client`](crate::Client).
//!
//! Transports return `'static` futures so that in-flight requests are not tied
//! to a borrow of the transport; implementations clone whatever shared handle
//! they need into the future.

pub mod mock;

use std::fmt;
use std::str::FromStr;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken as AbortSignal;

use crate::error::{QueryError, Result};

/// The envelope every transport call resolves with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
}

impl Response {
    /// A successful response carrying `data`.
    pub fn ok(data: impl Into<Value>) -> Self {
        Self {
            success: true,
            data: Some(data.into()),
            errors: None,
        }
    }

    /// A successful response without a payload, as returned by delete-style calls.
    pub fn empty() -> Self {
        Self {
            success: true,
            data: None,
            errors: None,
        }
    }

    /// A failed response carrying `errors`.
    pub fn failed(errors: impl Into<Value>) -> Self {
        Self {
            success: false,
            data: None,
            errors: Some(errors.into()),
        }
    }

    /// Interprets the envelope.
    ///
    /// A populated error payload is a failure even when `success` is `true`.
    /// A successful response with no data resolves to `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Semantic`] for failed or inconsistent responses.
    pub fn into_result(self) -> Result<Option<Value>> {
        if let Some(errors) = self.errors.filter(has_content) {
            return Err(QueryError::Semantic(errors));
        }
        if !self.success {
            return Err(QueryError::Semantic(Value::Null));
        }
        Ok(self.data.filter(|data| !data.is_null()))
    }
}

fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Options for a `get` call.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Query parameters, if any.
    pub params: Option<Value>,
    /// Abort signal for the attempt. Observing it is optional.
    pub signal: Option<AbortSignal>,
}

pub type TransportFuture = BoxFuture<'static, Result<Response>>;

/// A transport capable of performing requests.
///
/// Rejections (network errors, timeouts, non-2xx statuses) should be reported
/// as [`QueryError::Transport`].
pub trait Transport: Send + Sync {
    fn get(&self, path: &str, options: GetOptions) -> TransportFuture;

    fn post(&self, path: &str, body: Option<Value>) -> TransportFuture;

    fn put(&self, path: &str, body: Option<Value>) -> TransportFuture;

    fn patch(&self, path: &str, body: Option<Value>) -> TransportFuture;

    fn delete(&self, path: &str) -> TransportFuture;
}

/// Methods a mutation may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Issues the request for this method. `body` is ignored for `DELETE`.
    pub fn send(self, transport: &dyn Transport, path: &str, body: Option<Value>) -> TransportFuture {
        match self {
            Self::Post => transport.post(path, body),
            Self::Put => transport.put(path, body),
            Self::Patch => transport.patch(path, body),
            Self::Delete => transport.delete(path),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(QueryError::UnknownMethod(s.to_string())),
        }
    }
}
