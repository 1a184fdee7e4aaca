//! Per-call request description.

use crate::entity::{header_name, header_value};
use crate::token::RequestContext;
use crate::uri::{join_domain, Params, PathVariables};
use crate::Result;
use http::{HeaderMap, Method};
use serde_json::Value;

/// Everything about a call except its body.
///
/// `url` may contain `{name}` placeholders; they are filled from the query
/// parameters and path variables when the call is made.
///
/// # Examples
///
/// ```
/// use servicekit::metadata::RequestSpec;
/// use http::Method;
///
/// let spec = RequestSpec::at(Method::GET, "http://user-service", "/users/{id}")
///     .with_path_variable("id", 7)
///     .with_query_param("verbose", true);
/// assert_eq!(spec.url, "http://user-service/users/{id}");
/// ```
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    /// Appended to the URL as `key={key}` placeholders; absent values are
    /// dropped.
    pub query_params: Params,
    /// Fill placeholders already present in the URL.
    pub path_variables: Option<PathVariables>,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            query_params: Params::new(),
            path_variables: None,
        }
    }

    /// A call to `url` relative to `domain`.
    pub fn at(method: Method, domain: &str, url: &str) -> Self {
        Self::new(method, join_domain(domain, url))
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = header_name(name.as_ref())?;
        let value = header_value(value.as_ref())?;
        self.headers.append(name, value);
        Ok(self)
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Forwards the internal token of an inbound request, if it has one.
    pub fn with_request_context(mut self, context: &RequestContext) -> Self {
        if let Some((name, value)) = context.to_header() {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query_params.insert(key, value);
        self
    }

    pub fn with_query_params(mut self, params: Params) -> Self {
        self.query_params.merge(&params);
        self
    }

    pub fn with_path_variable(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.path_variables
            .get_or_insert_with(PathVariables::new)
            .insert(key, value);
        self
    }

    pub fn with_path_variables(mut self, variables: PathVariables) -> Self {
        match &mut self.path_variables {
            Some(existing) => existing.merge(&variables),
            None => self.path_variables = Some(variables),
        }
        self
    }
}

impl Default for RequestSpec {
    fn default() -> Self {
        Self::new(Method::GET, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_parts() {
        let spec = RequestSpec::new(Method::POST, "http://a.com/x")
            .with_header("x-a", "1")
            .unwrap()
            .with_header("x-a", "2")
            .unwrap()
            .with_query_param("q", "rust")
            .with_path_variable("id", 3)
            .with_path_variables(Params::new().add("other", "v"));

        assert_eq!(spec.headers.get_all("x-a").iter().count(), 2);
        assert_eq!(spec.query_params.text("q").as_deref(), Some("rust"));
        let variables = spec.path_variables.unwrap();
        assert_eq!(variables.len(), 2);
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let err = RequestSpec::default().with_header("bad\nname", "v").unwrap_err();
        assert!(err.is_configuration());
    }
}
