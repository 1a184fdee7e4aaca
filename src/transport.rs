//! Builds the `reqwest` transports from [`RestProperties`].
//!
//! `reqwest` keeps one idle timeout per client, so every host with its own
//! keep-alive override gets a dedicated client. Everything else shares the
//! default client, configured with the global keep-alive default.

use crate::config::RestProperties;
use crate::pool::ConnectionManager;
use crate::{Error, Result};
use std::collections::HashMap;
use std::time::Duration;

/// The configured HTTP clients, keyed by lower-cased host.
#[derive(Debug, Clone)]
pub struct Transports {
    default: reqwest::Client,
    by_host: HashMap<String, reqwest::Client>,
}

impl Transports {
    /// The client to use for a request to `host`.
    pub fn for_host(&self, host: &str) -> &reqwest::Client {
        if self.by_host.is_empty() {
            return &self.default;
        }
        self.by_host
            .get(&host.to_ascii_lowercase())
            .unwrap_or(&self.default)
    }

    /// Number of host-specific clients.
    pub fn dedicated_hosts(&self) -> usize {
        self.by_host.len()
    }
}

/// Composes transports out of a properties value.
pub struct TransportFactory;

impl TransportFactory {
    /// Builds the default transport plus one per keep-alive host override.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] if `reqwest` rejects the
    /// configuration (for example when TLS initialisation fails).
    pub fn build(properties: &RestProperties, manager: &ConnectionManager) -> Result<Transports> {
        let keep_alive = &properties.keep_alive_timeout;
        let default = Self::client(properties, manager, keep_alive.default_timeout())?;

        let mut by_host = HashMap::with_capacity(keep_alive.specifics.len());
        for (host, idle_ms) in &keep_alive.specifics {
            let client = Self::client(properties, manager, Duration::from_millis(*idle_ms))?;
            by_host.insert(host.to_ascii_lowercase(), client);
        }

        tracing::debug!(
            connect_timeout_ms = properties.connect_timeout,
            read_timeout_ms = properties.read_timeout,
            keep_alive_ms = keep_alive.def,
            dedicated_hosts = by_host.len(),
            "Built HTTP transports"
        );

        Ok(Transports { default, by_host })
    }

    fn client(
        properties: &RestProperties,
        manager: &ConnectionManager,
        idle_timeout: Duration,
    ) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(properties.connect_timeout())
            .read_timeout(properties.read_timeout())
            .pool_idle_timeout(idle_timeout)
            .pool_max_idle_per_host(manager.default_max_per_route())
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::ConfigurationError(format!("Failed to build HTTP client: {}", e)))
    }
}
