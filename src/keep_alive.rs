//! Keep-alive timeout policy for pooled connections.
//!
//! The policy decides how long an established connection stays reusable.
//! Resolution order for a response from `host`:
//!
//! 1. the server's `Keep-Alive: timeout=N` hint (seconds), unless disabled;
//! 2. a per-host override, matched case-insensitively;
//! 3. the global default.

use http::header::HeaderName;
use http::HeaderMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");

/// Keep-alive timeouts, in milliseconds.
///
/// Deserializes from the `keep-alive-timeout` configuration block:
///
/// ```
/// use servicekit::keep_alive::KeepAlivePolicy;
///
/// let policy: KeepAlivePolicy = serde_json::from_str(
///     r#"{ "def": 30000, "specifics": { "api.example.com": 5000 }, "disable-server": true }"#,
/// ).unwrap();
/// assert_eq!(policy.def, 30000);
/// assert!(policy.disable_server);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct KeepAlivePolicy {
    /// Default timeout in milliseconds.
    pub def: u64,
    /// Per-host timeouts in milliseconds.
    pub specifics: HashMap<String, u64>,
    /// Ignore the server's `Keep-Alive` header.
    pub disable_server: bool,
}

impl Default for KeepAlivePolicy {
    fn default() -> Self {
        Self {
            def: 55_000,
            specifics: HashMap::new(),
            disable_server: false,
        }
    }
}

impl KeepAlivePolicy {
    /// The global default as a `Duration`.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.def)
    }

    /// The override configured for `host`, if any.
    pub fn host_timeout(&self, host: &str) -> Option<Duration> {
        self.specifics
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(host))
            .map(|(_, ms)| Duration::from_millis(*ms))
    }

    /// Resolves the keep-alive duration for a connection to `host` given the
    /// headers of a response received on it.
    ///
    /// The result is reported on each response but only the per-host and
    /// default values bound the idle time of pooled connections. A server's
    /// `Keep-Alive: timeout=` hint is not applied to the connection itself,
    /// since reqwest sets the idle timeout per client, not per connection.
    ///
    /// # Examples
    ///
    /// ```
    /// use servicekit::keep_alive::KeepAlivePolicy;
    /// use http::HeaderMap;
    /// use std::time::Duration;
    ///
    /// let mut headers = HeaderMap::new();
    /// headers.insert("keep-alive", "timeout=30, max=100".parse().unwrap());
    ///
    /// let policy = KeepAlivePolicy::default();
    /// assert_eq!(policy.resolve(&headers, "a.com"), Duration::from_millis(30_000));
    /// ```
    pub fn resolve(&self, headers: &HeaderMap, host: &str) -> Duration {
        if !self.disable_server {
            if let Some(timeout) = server_timeout(headers) {
                return timeout;
            }
        }
        self.host_timeout(host).unwrap_or_else(|| self.default_timeout())
    }
}

/// Parses the first usable `timeout=N` element of the `Keep-Alive` headers.
fn server_timeout(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get_all(KEEP_ALIVE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|element| element.split_once('='))
        .filter(|(name, _)| name.trim().eq_ignore_ascii_case("timeout"))
        .find_map(|(_, secs)| secs.trim().trim_matches('"').parse::<u64>().ok())
        .map(|secs| Duration::from_millis(secs.saturating_mul(1000)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn policy() -> KeepAlivePolicy {
        let mut specifics = HashMap::new();
        specifics.insert("Slow.Example.com".to_string(), 120_000);
        KeepAlivePolicy {
            def: 55_000,
            specifics,
            disable_server: false,
        }
    }

    fn hinted(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("keep-alive", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_server_hint_wins_over_policy() {
        let headers = hinted("timeout=30");
        assert_eq!(
            policy().resolve(&headers, "slow.example.com"),
            Duration::from_millis(30_000)
        );
    }

    #[test]
    fn test_disabled_hint_falls_through_to_host() {
        let mut policy = policy();
        policy.disable_server = true;
        let headers = hinted("timeout=30");
        assert_eq!(
            policy.resolve(&headers, "slow.example.com"),
            Duration::from_millis(120_000)
        );
        assert_eq!(policy.resolve(&headers, "other.com"), Duration::from_millis(55_000));
    }

    #[test]
    fn test_host_match_is_case_insensitive() {
        assert_eq!(
            policy().resolve(&HeaderMap::new(), "SLOW.EXAMPLE.COM"),
            Duration::from_millis(120_000)
        );
    }

    #[test]
    fn test_malformed_hint_is_ignored() {
        let headers = hinted("max=5, timeout=soon");
        assert_eq!(policy().resolve(&headers, "x.com"), Duration::from_millis(55_000));
    }

    #[test]
    fn test_hint_parameter_name_case() {
        let headers = hinted("Timeout=7");
        assert_eq!(policy().resolve(&headers, "x.com"), Duration::from_millis(7_000));
    }
}
