//! Request entities: the headers and body of an outgoing request.
//!
//! Entities are assembled before sending, from the caller's headers, the
//! client's [`RestHooks`] and the body. A form containing at least one file
//! is sent as `multipart/form-data`; any other form is URL-encoded.

use crate::hooks::RestHooks;
use crate::{Error, Result};
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// One value of a form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    /// A file, read when the request is sent.
    File(PathBuf),
}

/// An ordered collection of form fields.
///
/// # Examples
///
/// ```
/// use servicekit::entity::FormBody;
///
/// let form = FormBody::new()
///     .text("name", "report")
///     .file("attachment", "/tmp/report.pdf");
/// assert!(form.is_multipart());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormBody {
    fields: Vec<(String, FormValue)>,
}

impl FormBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), FormValue::Text(value.into())));
        self
    }

    pub fn file(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.fields.push((name.into(), FormValue::File(path.into())));
        self
    }

    /// Builds a form out of any value that serializes to a JSON object.
    ///
    /// Null members are skipped; strings are taken verbatim and everything
    /// else is rendered as JSON text.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let value =
            serde_json::to_value(value).map_err(|e| Error::SerializationFailed(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(Error::SerializationFailed(
                "form body must serialize to an object".to_string(),
            ));
        };

        let fields = map
            .into_iter()
            .filter_map(|(name, value)| {
                let text = match value {
                    Value::Null => return None,
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                Some((name, FormValue::Text(text)))
            })
            .collect();
        Ok(Self { fields })
    }

    pub fn is_multipart(&self) -> bool {
        self.fields
            .iter()
            .any(|(_, value)| matches!(value, FormValue::File(_)))
    }

    pub fn fields(&self) -> &[(String, FormValue)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The body of a request entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityBody {
    Json(Value),
    Form(Vec<(String, String)>),
    Multipart(Vec<(String, FormValue)>),
}

impl fmt::Display for EntityBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityBody::Json(value) => write!(f, "{value}"),
            EntityBody::Form(pairs) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs)
                    .finish();
                f.write_str(&encoded)
            }
            EntityBody::Multipart(parts) => {
                let names: Vec<&str> = parts.iter().map(|(name, _)| name.as_str()).collect();
                write!(f, "multipart[{}]", names.join(","))
            }
        }
    }
}

/// Headers plus an optional body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestEntity {
    pub headers: HeaderMap,
    pub body: Option<EntityBody>,
}

impl RequestEntity {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)?.to_str().ok()
    }
}

/// Builds a form entity.
///
/// The content type is always the one matching the form kind, whatever the
/// headers say.
pub fn build_form(
    form: FormBody,
    headers: Option<&HeaderMap>,
    hooks: &dyn RestHooks,
) -> Result<RequestEntity> {
    let mut merged = build_headers(headers, hooks)?;
    let body = if form.is_multipart() {
        merged.insert(CONTENT_TYPE, HeaderValue::from_static(MULTIPART_FORM_DATA));
        EntityBody::Multipart(form.fields)
    } else {
        merged.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_URLENCODED));
        let pairs = form
            .fields
            .into_iter()
            .filter_map(|(name, value)| match value {
                FormValue::Text(text) => Some((name, text)),
                FormValue::File(_) => None,
            })
            .collect();
        EntityBody::Form(pairs)
    };

    Ok(RequestEntity {
        headers: merged,
        body: Some(body),
    })
}

/// Builds a JSON body entity.
///
/// Without a body the entity carries only the merged headers. The content
/// type hook applies unless the call already set one.
pub fn build_body<B: Serialize + ?Sized>(
    body: Option<&B>,
    headers: Option<&HeaderMap>,
    hooks: &dyn RestHooks,
) -> Result<RequestEntity> {
    let mut merged = build_headers(headers, hooks)?;
    let Some(body) = body else {
        return Ok(RequestEntity {
            headers: merged,
            body: None,
        });
    };

    let value =
        serde_json::to_value(body).map_err(|e| Error::SerializationFailed(e.to_string()))?;
    if !merged.contains_key(CONTENT_TYPE) {
        if let Some(content_type) = hooks.content_type() {
            merged.insert(CONTENT_TYPE, header_value(&content_type)?);
        }
    }

    Ok(RequestEntity {
        headers: merged,
        body: Some(EntityBody::Json(value)),
    })
}

/// Merges hook headers, call headers and the accept hook.
///
/// Call headers replace hook headers of the same name, keeping every value
/// the call supplied.
pub fn build_headers(headers: Option<&HeaderMap>, hooks: &dyn RestHooks) -> Result<HeaderMap> {
    let mut merged = HeaderMap::new();
    for (name, value) in hooks.append_header() {
        if value.is_empty() {
            continue;
        }
        merged.append(header_name(&name)?, header_value(&value)?);
    }

    if let Some(headers) = headers {
        for name in headers.keys() {
            merged.remove(name);
        }
        for (name, value) in headers {
            merged.append(name.clone(), value.clone());
        }
    }

    if !merged.contains_key(ACCEPT) {
        if let Some(accept) = hooks.accept() {
            merged.insert(ACCEPT, header_value(&accept)?);
        }
    }

    Ok(merged)
}

pub(crate) fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::try_from(name)
        .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))
}

pub(crate) fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::try_from(value)
        .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))
}
