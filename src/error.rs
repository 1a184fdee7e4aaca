//! Error types shared by the REST client and the configuration layers.
//!
//! Every fallible operation in the crate returns [`Error`]. Variants keep as
//! much context as possible (status, raw body, headers) so a failed call can
//! be diagnosed from the error value alone.

use http::{HeaderMap, StatusCode};

/// The main error type of the crate.
///
/// # Examples
///
/// ```no_run
/// use servicekit::{Error, RestClient};
///
/// # async fn example() -> Result<(), Error> {
/// let client = RestClient::builder().build()?;
///
/// match client.get::<serde_json::Value>("http://api.example.com/endpoint").await {
///     Ok(response) => println!("Success: {:?}", response.data),
///     Err(Error::HttpError { status, status_text, raw_response, .. }) => {
///         eprintln!("HTTP {} {}: {}", status, status_text, raw_response);
///     }
///     Err(Error::DeserializationFailed { raw_response, serde_error, .. }) => {
///         eprintln!("Failed to deserialize. Raw response: {}", raw_response);
///         eprintln!("Serde error: {}", serde_error);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A network-level error occurred (connection refused, DNS failure, TLS...).
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The transport gave up waiting for the server.
    ///
    /// Raised when the connect or read timeout configured on the transport
    /// elapses.
    #[error("Request timed out")]
    Timeout,

    /// No connection could be leased from the pool within the configured
    /// connection-request timeout.
    #[error("Timed out after {waited_ms} ms waiting for a pooled connection to {route}")]
    PoolTimeout {
        /// The route (`scheme://host:port`) the lease was requested for
        route: String,
        /// How long the caller waited, in milliseconds
        waited_ms: u64,
    },

    /// The response body could not be deserialized into the expected type.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The body that failed to deserialize (after the response hook)
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// The server answered with a non-2xx status.
    #[error("HTTP error {status} {status_text}: {raw_response}")]
    HttpError {
        /// The HTTP status code
        status: StatusCode,
        /// The canonical reason phrase of the status
        status_text: String,
        /// The raw response body
        raw_response: String,
        /// The response headers
        headers: HeaderMap,
    },

    /// Invalid configuration: malformed Redis URL, bad route pool entry,
    /// invalid header, missing load-balanced transport, and so on.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The request body or form could not be serialized.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A file part of a multipart form could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A date string or timestamp could not be converted.
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// The request context carries no internal token.
    #[error("token is not exist")]
    MissingToken,

    /// An error produced by a caller-supplied hook.
    #[error("{0}")]
    Hook(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(err)
        }
    }
}

impl Error {
    /// Wraps an arbitrary error coming out of a hook.
    pub fn hook<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Hook(err.into())
    }

    /// Returns `true` for configuration errors, which are only raised while
    /// building clients or descriptors.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::ConfigurationError(_))
    }

    /// Returns the HTTP status code if this error has one.
    ///
    /// # Examples
    ///
    /// ```
    /// use servicekit::Error;
    /// use http::StatusCode;
    ///
    /// let err = Error::HttpError {
    ///     status: StatusCode::BAD_GATEWAY,
    ///     status_text: "Bad Gateway".to_string(),
    ///     raw_response: String::new(),
    ///     headers: http::HeaderMap::new(),
    /// };
    /// assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
    /// assert_eq!(Error::Timeout.status(), None);
    /// ```
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::HttpError { status, .. } => Some(*status),
            Error::DeserializationFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::HttpError { raw_response, .. } => Some(raw_response),
            Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_errors_keep_their_message() {
        let err = Error::hook("upstream rejected the order");
        assert_eq!(err.to_string(), "upstream rejected the order");
        assert!(!err.is_configuration());
    }

    #[test]
    fn raw_response_is_exposed_for_status_errors() {
        let err = Error::DeserializationFailed {
            raw_response: "<html>".to_string(),
            serde_error: "expected value".to_string(),
            status: StatusCode::OK,
        };
        assert_eq!(err.raw_response(), Some("<html>"));
        assert_eq!(err.status(), Some(StatusCode::OK));
        assert_eq!(Error::MissingToken.raw_response(), None);
    }

    #[test]
    fn missing_token_message() {
        assert_eq!(Error::MissingToken.to_string(), "token is not exist");
        assert!(Error::ConfigurationError("bad".into()).is_configuration());
    }
}
