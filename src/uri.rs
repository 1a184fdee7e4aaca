//! URL templating: query placeholders, path variables and placeholder
//! resolution.
//!
//! Request URLs are handled as templates. [`build_url`] appends one
//! `key={key}` placeholder per query parameter, and
//! [`replace_uri_variables`] fills every `{name}` placeholder from the merged
//! query and path variables right before the request is sent.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;
use std::collections::btree_map::{self, BTreeMap};
use url::form_urlencoded;

/// Characters left as-is in a path value: unreserved, sub-delims, `:`, `@`
/// and `/`. Everything else, including `?`, `#` and `%`, is escaped.
const PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b':')
    .remove(b'@')
    .remove(b'/');

const HTTP: &str = "http://";
const HTTPS: &str = "https://";

/// An ordered map of request parameters.
///
/// Used both for query parameters and for path variables. Keys iterate in
/// lexicographic order, which is what makes the built URL deterministic.
///
/// Values are JSON values so callers can pass strings, numbers and booleans
/// alike. `null` and the empty string count as "no value".
///
/// # Examples
///
/// ```
/// use servicekit::uri::Params;
///
/// let params = Params::new().add("page", 2).add("q", "rust").add("empty", "");
/// assert_eq!(params.text("page").as_deref(), Some("2"));
/// assert_eq!(params.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, Value>,
}

/// Path variables substituted into `{name}` placeholders of the URL.
pub type PathVariables = Params;

impl Params {
    /// Creates an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, builder style.
    pub fn add(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a parameter, replacing any previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Returns the raw value of a parameter.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns the textual form of a parameter, or `None` when it is
    /// missing or `null`.
    ///
    /// Strings are returned as-is; other values use their JSON text.
    pub fn text(&self, key: &str) -> Option<String> {
        self.values.get(key).and_then(value_text)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.values.iter()
    }

    /// Drops every parameter whose value is `null` or an empty string.
    pub fn remove_absent(&mut self) {
        self.values.retain(|_, value| !is_absent(value));
    }

    /// Copies every entry of `other` into `self`; entries of `other` win.
    pub fn merge(&mut self, other: &Params) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Appends one `key={key}` placeholder per query parameter to `url`.
///
/// Parameters without a value are removed from `query_params` first, so the
/// same map can later be merged into the URI variables. Placeholders follow
/// lexicographic key order and are joined by `&`. When nothing remains the
/// URL is returned unchanged, without a dangling `?`.
///
/// # Examples
///
/// ```
/// use servicekit::uri::{build_url, Params};
///
/// let mut query = Params::new().add("vin", "V1").add("aid", 10).add("skip", "");
/// let url = build_url("http://api.example.com/vehicles", &mut query);
///
/// assert_eq!(url, "http://api.example.com/vehicles?aid={aid}&vin={vin}");
/// assert!(query.get("skip").is_none());
/// ```
pub fn build_url(url: &str, query_params: &mut Params) -> String {
    query_params.remove_absent();
    if query_params.is_empty() {
        return url.to_string();
    }

    let placeholders = query_params
        .keys()
        .map(|key| format!("{key}={{{key}}}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut built = String::with_capacity(url.len() + placeholders.len() + 1);
    built.push_str(url);
    if !(url.ends_with('?') || url.ends_with('&')) {
        built.push(if url.contains('?') { '&' } else { '?' });
    }
    built.push_str(&placeholders);
    built
}

/// Merges query parameters and path variables into the map used to resolve
/// placeholders. Path variables win on key collision.
pub fn merge_uri_variables(query_params: &Params, path_variables: Option<&PathVariables>) -> Params {
    let mut merged = query_params.clone();
    if let Some(path_variables) = path_variables {
        merged.merge(path_variables);
    }
    merged
}

/// Resolves every `{name}` placeholder in `template`.
///
/// Missing variables resolve to the empty string. Values placed after the
/// first `?` are form-url-encoded; values in the path are inserted verbatim.
///
/// # Examples
///
/// ```
/// use servicekit::uri::{replace_uri_variables, Params};
///
/// let vars = Params::new().add("vin", "V 1").add("q", "a&b");
/// let url = replace_uri_variables("http://h.com/v/{vin}/{missing}?q={q}", &vars);
/// assert_eq!(url, "http://h.com/v/V%201/?q=a%26b");
/// ```
pub fn replace_uri_variables(template: &str, variables: &Params) -> String {
    let mut resolved = String::with_capacity(template.len());
    match template.split_once('?') {
        Some((path, query)) => {
            substitute(path, variables, false, &mut resolved);
            resolved.push('?');
            substitute(query, variables, true, &mut resolved);
        }
        None => substitute(template, variables, false, &mut resolved),
    }
    resolved
}

fn substitute(segment: &str, variables: &Params, encode: bool, out: &mut String) {
    let mut rest = segment;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if close > 0 => {
                let value = variables.text(&after[..close]).unwrap_or_default();
                if encode {
                    out.extend(form_urlencoded::byte_serialize(value.as_bytes()));
                } else {
                    out.extend(utf8_percent_encode(&value, PATH_ENCODE_SET));
                }
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
}

/// Returns the relative URI of `url`.
///
/// `http://localhost/veh-status/query` becomes `veh-status/query`, a leading
/// `/` is dropped, and stray spaces from configuration files are removed.
pub fn get_uri(url: &str) -> String {
    let uri = if let Some(rest) = url.strip_prefix(HTTP).or_else(|| url.strip_prefix(HTTPS)) {
        match rest.split_once('/') {
            Some((_, path)) => path,
            None => "",
        }
    } else if let Some(path) = url.strip_prefix('/') {
        path
    } else {
        url
    };
    uri.replace(' ', "")
}

/// Joins a domain and a relative URL the way configuration usually
/// provides them (`http://host` + `/path`).
pub fn join_domain(domain: &str, url: &str) -> String {
    let mut joined = String::with_capacity(domain.len() + url.len());
    joined.push_str(domain);
    joined.push_str(url);
    joined
}
