//! The internal token carried between services.
//!
//! An edge service authenticates the caller and forwards the result to
//! internal services as JSON in the `internal-token` header. Handlers build
//! a [`RequestContext`] from the inbound headers and pass it down the call
//! chain; it is dropped with the request.

use crate::json::from_str_lenient;
use crate::{Error, Result};
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use serde::{Deserialize, Serialize};

/// Name of the header carrying the token.
pub const INTERNAL_TOKEN_HEADER: &str = "internal-token";

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub aid: Option<String>,
    /// The `appid` of the original request, when it had one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    /// Expiry as epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<i64>,
}

impl Token {
    pub fn new(aid: impl Into<String>) -> Self {
        Self {
            aid: Some(aid.into()),
            app_id: None,
            expire_at: None,
        }
    }

    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expire_at.is_some_and(|at| at <= now_millis)
    }
}

/// Per-request state built from the inbound headers.
///
/// # Examples
///
/// ```
/// use servicekit::token::{RequestContext, INTERNAL_TOKEN_HEADER};
/// use http::HeaderMap;
///
/// let mut headers = HeaderMap::new();
/// headers.insert(INTERNAL_TOKEN_HEADER, r#"{"aid":"u-1","expireAt":1700000000000}"#.parse().unwrap());
///
/// let context = RequestContext::from_headers(&headers);
/// assert_eq!(context.aid().unwrap(), "u-1");
///
/// assert!(RequestContext::default().aid().is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    token: Option<Token>,
}

impl RequestContext {
    pub fn new(token: Option<Token>) -> Self {
        Self { token }
    }

    /// Reads the token header. A missing, empty or malformed header yields
    /// a context without a token; malformed ones are logged.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let token = headers
            .get(INTERNAL_TOKEN_HEADER)
            .and_then(|value| match value.to_str() {
                Ok(text) => Some(text),
                Err(e) => {
                    tracing::error!(error = %e, "Token header is not valid text");
                    None
                }
            })
            .filter(|text| !text.is_empty())
            .and_then(from_str_lenient::<Token>);
        Self { token }
    }

    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    /// The caller's account id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingToken`] when the request carried no token.
    pub fn aid(&self) -> Result<&str> {
        let token = self.token.as_ref().ok_or(Error::MissingToken)?;
        Ok(token.aid.as_deref().unwrap_or_default())
    }

    /// The header that forwards this token to another service.
    pub fn to_header(&self) -> Option<(HeaderName, HeaderValue)> {
        let token = self.token.as_ref()?;
        let json = crate::json::to_string_lenient(token)?;
        let value = HeaderValue::try_from(json).ok()?;
        Some((HeaderName::from_static(INTERNAL_TOKEN_HEADER), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(INTERNAL_TOKEN_HEADER, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_parses_token_and_ignores_unknown_fields() {
        let context =
            RequestContext::from_headers(&headers(r#"{"aid":"a1","appId":"wx","expireAt":5,"role":"x"}"#));
        let token = context.token().unwrap();
        assert_eq!(token.aid.as_deref(), Some("a1"));
        assert_eq!(token.app_id.as_deref(), Some("wx"));
        assert!(token.is_expired(5));
        assert!(!token.is_expired(4));
    }

    #[test]
    fn test_malformed_header_means_no_token() {
        let context = RequestContext::from_headers(&headers("{not json"));
        assert!(context.token().is_none());
        assert!(matches!(context.aid(), Err(Error::MissingToken)));

        let empty = RequestContext::from_headers(&headers(""));
        assert!(empty.token().is_none());
    }

    #[test]
    fn test_header_round_trip() {
        let context = RequestContext::new(Some(Token::new("a9")));
        let (name, value) = context.to_header().unwrap();
        assert_eq!(name, INTERNAL_TOKEN_HEADER);
        assert_eq!(value, r#"{"aid":"a9"}"#);

        let mut forwarded = HeaderMap::new();
        forwarded.insert(name, value);
        assert_eq!(RequestContext::from_headers(&forwarded), context);
    }
}
