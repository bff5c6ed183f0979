//! Prelude module for convenient imports.
//!
//! ```
//! use querykit::prelude::*;
//! ```
//!
//! # What's included
//!
//! - [`Client`] and [`ClientConfig`] - The entry point and its defaults
//! - [`Query`] and [`QueryOptions`] - Cached reads
//! - [`Mutation`] and [`MutationOptions`] - Writes
//! - [`QueryState`], [`MutationState`] and [`Phase`] - Observable state
//! - [`QueryError`] - The error type
//! - [`Method`] and [`Transport`] - The transport capability

pub use crate::client::Client;
pub use crate::config::ClientConfig;
pub use crate::error::QueryError;
pub use crate::mutation::{Mutation, MutationOptions};
pub use crate::query::{Query, QueryOptions};
pub use crate::retry::RetryPolicy;
pub use crate::state::{MutationState, Phase, QueryState};
pub use crate::transport::{Method, Transport};
