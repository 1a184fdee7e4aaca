//! Extension points of [`RestClient`](crate::RestClient).
//!
//! A client holds one [`RestHooks`] implementation, supplied at construction.
//! Every method has a default, so implementors override only what they need.
//!
//! # Examples
//!
//! ```
//! use servicekit::hooks::RestHooks;
//! use servicekit::ResponseEnvelope;
//!
//! /// Unwraps `{"data": ...}` envelopes before decoding.
//! struct Unwrap;
//!
//! impl RestHooks for Unwrap {
//!     fn parse_response(&self, response: &ResponseEnvelope) -> Option<String> {
//!         let value: serde_json::Value = serde_json::from_str(&response.body).ok()?;
//!         value.get("data").map(|data| data.to_string())
//!     }
//!
//!     fn append_header(&self) -> Vec<(String, String)> {
//!         vec![("x-caller".to_string(), "billing".to_string())]
//!     }
//! }
//! ```

use crate::entity::EntityBody;
use crate::response::ResponseEnvelope;
use crate::Error;
use chrono::{DateTime, Local};
use http::{HeaderMap, Method, StatusCode};
use std::time::Duration;

/// Result returned by [`RestHooks::log_exchange`].
pub type HookResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Caller-supplied behaviour around each exchange.
pub trait RestHooks: Send + Sync {
    /// Rewrites a response body before it is decoded.
    ///
    /// Only called for responses that carry a body. Returning `None` (or an
    /// empty string) keeps the original body.
    fn parse_response(&self, _response: &ResponseEnvelope) -> Option<String> {
        None
    }

    /// Headers added to every request. Call-specific headers win on a
    /// name collision; entries with an empty value are skipped.
    fn append_header(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Content type for JSON body requests. `application/json` is used when
    /// neither this nor the call sets one.
    fn content_type(&self) -> Option<String> {
        None
    }

    /// The `Accept` header for every request.
    fn accept(&self) -> Option<String> {
        None
    }

    /// Converts the error raised for a non-2xx response.
    fn catch_error(&self, _status: StatusCode, _status_text: &str, error: Error) -> Error {
        error
    }

    /// Records a finished exchange, successful or not.
    ///
    /// Errors (and panics) from this method are logged and never reach the
    /// caller.
    fn log_exchange(&self, exchange: &ExchangeLog<'_>) -> HookResult {
        default_log_exchange(exchange);
        Ok(())
    }
}

/// Hooks that keep every default.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl RestHooks for DefaultHooks {}

/// Everything known about one exchange once it is over.
#[derive(Debug)]
pub struct ExchangeLog<'a> {
    pub method: &'a Method,
    /// The URL after variable substitution, before load-balancer rewriting.
    pub url: &'a str,
    pub request_headers: &'a HeaderMap,
    pub request_body: Option<&'a EntityBody>,
    /// Absent when the request never got a response.
    pub response: Option<&'a ResponseEnvelope>,
    /// The error handed back to the caller, if any.
    pub error: Option<&'a Error>,
    pub started_at: DateTime<Local>,
    pub elapsed: Duration,
    /// The configured `log-time-format`.
    pub time_format: Option<&'a str>,
}

impl ExchangeLog<'_> {
    pub fn finished_at(&self) -> DateTime<Local> {
        let elapsed = chrono::Duration::from_std(self.elapsed).unwrap_or_else(|_| chrono::Duration::zero());
        self.started_at + elapsed
    }

    /// Formats a timestamp with the configured pattern, or as epoch
    /// milliseconds when none is set.
    pub fn format_time(&self, at: DateTime<Local>) -> String {
        match self.time_format {
            Some(pattern) => at.format(pattern).to_string(),
            None => at.timestamp_millis().to_string(),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.response.map(|response| response.status)
    }
}

fn default_log_exchange(exchange: &ExchangeLog<'_>) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }

    let request_body = match exchange.request_body {
        None => String::new(),
        Some(EntityBody::Multipart(_)) => "<multipart>".to_string(),
        Some(body) => body.to_string(),
    };
    let response_body = exchange
        .response
        .map(|response| response.body.as_str())
        .unwrap_or_default();

    tracing::debug!(
        method = %exchange.method,
        url = %exchange.url,
        request_headers = ?exchange.request_headers,
        request_body = %request_body,
        status = exchange.status().map(|s| s.as_u16()),
        response_body = %response_body,
        error = exchange.error.map(tracing::field::display),
        started_at = %exchange.format_time(exchange.started_at),
        finished_at = %exchange.format_time(exchange.finished_at()),
        elapsed_ms = exchange.elapsed.as_millis() as u64,
        "HTTP exchange"
    );
}
