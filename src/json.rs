//! Lenient JSON helpers for non-critical paths.
//!
//! Failures are logged and turned into `None`. The request path does not use
//! these; it propagates serde errors.

use serde::{de::DeserializeOwned, Serialize};

pub fn to_string_lenient<T: Serialize + ?Sized>(value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize value to JSON");
            None
        }
    }
}

pub fn from_str_lenient<T: DeserializeOwned>(json: &str) -> Option<T> {
    match serde_json::from_str(json) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(error = %e, json = %json, "Failed to parse JSON");
            None
        }
    }
}
