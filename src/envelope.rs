//! JSON envelopes shared by services.
//!
//! [`ApiResponse`] is what handlers answer with; failures become
//! `status: FAILED` plus an error code instead of a non-2xx status.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Outcome flag of an [`ApiResponse`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    #[default]
    Succeed,
    Failed,
}

/// A namespaced error code, rendered as `NAMESPACE.code`.
pub trait ErrorCode {
    fn namespace(&self) -> &str;
    fn code(&self) -> &str;
    fn message(&self) -> &str;

    fn error_code(&self) -> String {
        format!("{}.{}", self.namespace(), self.code())
    }
}

/// Errors every service may answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemError {
    SystemInternalError,
    TooMuchRequestData,
    InvalidToken,
    InvalidSign,
    AccessDenied,
    CallThirdSystemError,
    Other,
}

impl SystemError {
    pub const NAMESPACE: &'static str = "SYS";
}

impl ErrorCode for SystemError {
    fn namespace(&self) -> &str {
        Self::NAMESPACE
    }

    fn code(&self) -> &str {
        match self {
            SystemError::SystemInternalError => "0000",
            SystemError::TooMuchRequestData => "0003",
            SystemError::InvalidToken => "0004",
            SystemError::InvalidSign => "0005",
            SystemError::AccessDenied => "0006",
            SystemError::CallThirdSystemError => "9998",
            SystemError::Other => "9999",
        }
    }

    fn message(&self) -> &str {
        match self {
            SystemError::SystemInternalError => "System Internal Error",
            SystemError::TooMuchRequestData => "Too much request data",
            SystemError::InvalidToken => "Invalid token",
            SystemError::InvalidSign => "Invalid sign",
            SystemError::AccessDenied => "Access denied",
            SystemError::CallThirdSystemError => "call third system error",
            SystemError::Other => "unrecognized error",
        }
    }
}

/// A business failure a handler turns into a `FAILED` envelope.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct BusinessError {
    pub code: String,
    pub message: String,
    pub ext_message: Option<String>,
    pub data: Option<Value>,
}

impl BusinessError {
    pub fn new(error: &dyn ErrorCode) -> Self {
        Self {
            code: error.error_code(),
            message: error.message().to_string(),
            ext_message: None,
            data: None,
        }
    }

    pub fn with_ext_message(mut self, ext_message: impl Into<String>) -> Self {
        self.ext_message = Some(ext_message.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The response envelope.
///
/// # Examples
///
/// ```
/// use servicekit::envelope::{ApiResponse, SystemError};
///
/// let ok = ApiResponse::paged(vec![1, 2], 10);
/// assert_eq!(
///     serde_json::to_string(&ok).unwrap(),
///     r#"{"status":"SUCCEED","total":10,"data":[1,2]}"#
/// );
///
/// let failed = ApiResponse::<()>::error(&SystemError::InvalidToken);
/// assert_eq!(failed.error_code.as_deref(), Some("SYS.0004"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Superseded by `total`; kept for older clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    /// Whether another slice follows, for infinite scrolling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_next: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Default for ApiResponse<T> {
    fn default() -> Self {
        Self {
            status: Status::Succeed,
            error_code: None,
            error_message: None,
            ext_message: None,
            total: None,
            total_count: None,
            has_next: None,
            data: None,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    /// A page of a larger result set.
    pub fn paged(data: T, total: u64) -> Self {
        Self {
            data: Some(data),
            total: Some(total),
            ..Self::default()
        }
    }

    /// A slice with a "has next" marker.
    pub fn slice(data: T, has_next: bool) -> Self {
        Self {
            data: Some(data),
            has_next: Some(has_next),
            ..Self::default()
        }
    }

    /// Only a count.
    pub fn total(total: u64) -> Self {
        Self {
            total: Some(total),
            ..Self::default()
        }
    }

    pub fn error(error: &dyn ErrorCode) -> Self {
        Self {
            status: Status::Failed,
            error_code: Some(error.error_code()),
            error_message: Some(error.message().to_string()),
            ..Self::default()
        }
    }

    /// The envelope for a framework-level failure: `SYS.<status>` and the
    /// reason phrase.
    pub fn from_status(status: StatusCode) -> Self {
        Self {
            status: Status::Failed,
            error_code: Some(format!("{}.{}", SystemError::NAMESPACE, status.as_u16())),
            error_message: status.canonical_reason().map(str::to_string),
            ..Self::default()
        }
    }

    pub fn with_ext_message(mut self, ext_message: impl Into<String>) -> Self {
        self.ext_message = Some(ext_message.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Succeed
    }
}

impl From<BusinessError> for ApiResponse<Value> {
    fn from(error: BusinessError) -> Self {
        Self {
            status: Status::Failed,
            error_code: Some(error.code),
            error_message: Some(error.message),
            ext_message: error.ext_message,
            data: error.data,
            ..Self::default()
        }
    }
}

/// A slice of results plus whether more follow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlicePage<T> {
    pub data: Vec<T>,
    pub has_next: bool,
}

impl<T> SlicePage<T> {
    pub fn new(data: Vec<T>, has_next: bool) -> Self {
        Self { data, has_next }
    }
}

/// The request envelope: a payload stamped with the sender's clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request<T> {
    /// Epoch milliseconds.
    pub timestamp: Option<i64>,
    pub data: Option<T>,
}

impl<T> Request<T> {
    /// Stamps `data` with the current time.
    pub fn new(data: T) -> Self {
        Self {
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
            data: Some(data),
        }
    }

    pub fn at(timestamp: i64, data: T) -> Self {
        Self {
            timestamp: Some(timestamp),
            data: Some(data),
        }
    }
}

const MAX_PAGE_SIZE: u32 = 200;

/// Normalises a requested page index: missing or below 1 becomes 1.
pub fn page_index(index: Option<i64>) -> u32 {
    match index {
        Some(index) if index >= 1 => u32::try_from(index).unwrap_or(u32::MAX),
        _ => 1,
    }
}

/// Normalises a requested page size into `1..=200`; missing becomes 1.
pub fn page_size(size: Option<i64>) -> u32 {
    match size {
        Some(size) if size > i64::from(MAX_PAGE_SIZE) => MAX_PAGE_SIZE,
        Some(size) if size >= 1 => size as u32,
        _ => 1,
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Succeed => f.write_str("SUCCEED"),
            Status::Failed => f.write_str("FAILED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_system_error_codes() {
        assert_eq!(SystemError::SystemInternalError.error_code(), "SYS.0000");
        assert_eq!(SystemError::Other.error_code(), "SYS.9999");
        assert_eq!(SystemError::CallThirdSystemError.message(), "call third system error");
    }

    #[test]
    fn test_status_failure_envelope() {
        let envelope = ApiResponse::<()>::from_status(StatusCode::NOT_FOUND);
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"status": "FAILED", "errorCode": "SYS.404", "errorMessage": "Not Found"})
        );
    }

    #[test]
    fn test_business_error_envelope() {
        let error = BusinessError::new(&SystemError::AccessDenied)
            .with_ext_message("role missing")
            .with_data(json!({"need": "admin"}));
        let envelope = ApiResponse::from(error);
        assert!(!envelope.is_success());
        assert_eq!(envelope.error_code.as_deref(), Some("SYS.0006"));
        assert_eq!(envelope.ext_message.as_deref(), Some("role missing"));
        assert_eq!(envelope.data, Some(json!({"need": "admin"})));
    }

    #[test]
    fn test_parse_envelope_from_service() {
        let parsed: ApiResponse<SlicePage<u32>> = serde_json::from_str(
            r#"{"status":"SUCCEED","hasNext":true,"data":{"data":[1,2],"hasNext":true}}"#,
        )
        .unwrap();
        assert!(parsed.is_success());
        assert_eq!(parsed.data.unwrap(), SlicePage::new(vec![1, 2], true));
    }

    #[test]
    fn test_request_envelope() {
        let request = Request::at(5, "x");
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"timestamp":5,"data":"x"}"#
        );
        assert!(Request::new(1).timestamp.is_some());
    }

    #[test]
    fn test_paging_normalisation() {
        assert_eq!(page_index(None), 1);
        assert_eq!(page_index(Some(0)), 1);
        assert_eq!(page_index(Some(-4)), 1);
        assert_eq!(page_index(Some(3)), 3);

        assert_eq!(page_size(None), 1);
        assert_eq!(page_size(Some(0)), 1);
        assert_eq!(page_size(Some(50)), 50);
        assert_eq!(page_size(Some(201)), 200);
    }
}
