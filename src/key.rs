//! Deterministic cache-key derivation.
//!
//! A key is the endpoint followed by a canonical serialization of the
//! parameters, so parameter sets that are equal up to field order collide:
//!
//! ```
//! use querykit::key::build_key;
//! use serde_json::json;
//!
//! let a = build_key("/users", &json!({"page": 1, "sort": "name"})).unwrap();
//! let b = build_key("/users", &json!({"sort": "name", "page": 1})).unwrap();
//! assert_eq!(a, b);
//! assert_eq!(a, r#"/users?{"page":1,"sort":"name"}"#);
//!
//! // No parameters: the key is the endpoint itself.
//! assert_eq!(build_key("/users", &()).unwrap(), "/users");
//! ```

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{QueryError, Result};

/// Builds the cache key for `endpoint` and `params`.
///
/// Empty parameters (`()`, `None`, `null` or an empty object) yield the
/// endpoint verbatim. Anything else is rendered as `endpoint?<canonical json>`
/// with object fields sorted by name at every nesting level.
///
/// # Errors
///
/// Returns [`QueryError::InvalidParams`] if `params` cannot be represented as
/// JSON (for example a map with non-string keys).
pub fn build_key<P>(endpoint: &str, params: &P) -> Result<String>
where
    P: Serialize + ?Sized,
{
    let value =
        serde_json::to_value(params).map_err(|e| QueryError::InvalidParams(e.to_string()))?;
    Ok(build_key_from_value(endpoint, &value))
}

/// Same as [`build_key`] for parameters that are already a JSON value.
pub fn build_key_from_value(endpoint: &str, params: &Value) -> String {
    if is_empty(params) {
        return endpoint.to_string();
    }
    format!("{endpoint}?{}", canonicalize(params))
}

fn is_empty(params: &Value) -> bool {
    match params {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Rebuilds `value` with every object's fields in sorted order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
