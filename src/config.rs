//! REST client configuration (`<namespace>.rest.*`).
//!
//! [`RestProperties`] deserializes from the kebab-case configuration block
//! services already ship, for example:
//!
//! ```json
//! {
//!   "connect-timeout": 5000,
//!   "read-timeout": 60000,
//!   "keep-alive-timeout": { "def": 55000, "specifics": { "api.example.com": 10000 } },
//!   "conn-pool": {
//!     "max-conn-total": 200,
//!     "default-conn-per-route": 20,
//!     "route-conn": [ { "host": "https://api.example.com", "max": 100 } ]
//!   },
//!   "log-time-format": "%Y-%m-%d %H:%M:%S%.3f"
//! }
//! ```

use crate::keep_alive::KeepAlivePolicy;
use crate::pool::ConnectionPoolPolicy;
use crate::{Error, Result};
use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;
use std::time::Duration;

/// Settings for [`RestClient`](crate::RestClient) transports.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RestProperties {
    /// Connect timeout in milliseconds.
    pub connect_timeout: u64,
    /// Read timeout in milliseconds.
    pub read_timeout: u64,
    pub keep_alive_timeout: KeepAlivePolicy,
    pub conn_pool: ConnectionPoolPolicy,
    /// `chrono` strftime pattern for timestamps in the exchange log.
    /// Timestamps are printed as epoch milliseconds when unset.
    pub log_time_format: Option<String>,
}

impl Default for RestProperties {
    fn default() -> Self {
        Self {
            connect_timeout: 5_000,
            read_timeout: 60_000,
            keep_alive_timeout: KeepAlivePolicy::default(),
            conn_pool: ConnectionPoolPolicy::default(),
            log_time_format: None,
        }
    }
}

impl RestProperties {
    /// Parses properties from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] for malformed JSON or an
    /// invalid `log-time-format`.
    pub fn from_json(json: &str) -> Result<Self> {
        let properties: RestProperties = serde_json::from_str(json)
            .map_err(|e| Error::ConfigurationError(format!("Invalid rest properties: {e}")))?;
        properties.validate()?;
        Ok(properties)
    }

    /// Checks the settings that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if let Some(pattern) = &self.log_time_format {
            if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
                return Err(Error::ConfigurationError(format!(
                    "Invalid log-time-format '{pattern}'"
                )));
            }
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout)
    }
}
