use serde_json::Value;
use thiserror::Error;

/// Error type for query and mutation operations.
///
/// Transport and semantic failures are recoverable and go through the retry
/// policy. The remaining variants are programming errors and are raised
/// immediately, without retrying.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The transport rejected the request (network, timeout, non-2xx).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response reported failure, or reported success together with an
    /// error payload.
    #[error("Request failed: {0}")]
    Semantic(Value),

    /// The payload could not be converted into the consumer's data type.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unknown HTTP method: {0}")]
    UnknownMethod(String),

    #[error("Missing required configuration: {0}")]
    MissingConfig(&'static str),

    #[error("Invalid query parameters: {0}")]
    InvalidParams(String),
}

impl QueryError {
    /// Returns `true` if the error may succeed on another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Semantic(_))
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
