//! Redis connection settings (`<namespace>.redis.*`).
//!
//! A single URL describes the whole deployment:
//!
//! ```text
//! {standalone|sentinel|cluster}[s]://[password@]host:port[,host2:port2,...]
//! ```
//!
//! The trailing `s` on the mode turns TLS on. The password runs up to the
//! last `@`, so it may itself contain `@`. For sentinel deployments list the
//! master first.
//!
//! This module only produces connection descriptors; opening connections is
//! left to the Redis client in use.

use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

const URL_FORMAT: &str =
    "{standalone,sentinel,cluster,standalones,sentinels,clusters}://[password@]host:port[,host2:port2]";

/// Deployment topology, with or without TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedisMode {
    Standalone,
    Sentinel,
    Cluster,
    StandaloneTls,
    SentinelTls,
    ClusterTls,
}

impl RedisMode {
    pub fn is_tls(self) -> bool {
        matches!(
            self,
            RedisMode::StandaloneTls | RedisMode::SentinelTls | RedisMode::ClusterTls
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            RedisMode::Standalone => "standalone",
            RedisMode::Sentinel => "sentinel",
            RedisMode::Cluster => "cluster",
            RedisMode::StandaloneTls => "standalones",
            RedisMode::SentinelTls => "sentinels",
            RedisMode::ClusterTls => "clusters",
        }
    }
}

impl FromStr for RedisMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "standalone" => Ok(RedisMode::Standalone),
            "sentinel" => Ok(RedisMode::Sentinel),
            "cluster" => Ok(RedisMode::Cluster),
            "standalones" => Ok(RedisMode::StandaloneTls),
            "sentinels" => Ok(RedisMode::SentinelTls),
            "clusters" => Ok(RedisMode::ClusterTls),
            other => Err(Error::ConfigurationError(format!(
                "Unknown redis mode '{other}', expected {URL_FORMAT}"
            ))),
        }
    }
}

impl fmt::Display for RedisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RedisNode {
    pub host: String,
    pub port: u16,
}

impl RedisNode {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl FromStr for RedisNode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            Error::ConfigurationError(format!(
                "Invalid redis node '{s}', expected host:port as in {URL_FORMAT}"
            ))
        };
        let (host, port) = s.trim().split_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok(RedisNode::new(host, port))
    }
}

impl fmt::Display for RedisNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The parts of a Redis URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConnectionInfo {
    pub mode: RedisMode,
    pub password: Option<String>,
    /// The node list as written, `host:port[,host:port]`.
    pub nodes_spec: String,
    /// Never empty.
    pub nodes: Vec<RedisNode>,
}

impl RedisConnectionInfo {
    /// Parses a Redis URL.
    ///
    /// # Examples
    ///
    /// ```
    /// use servicekit::redis::{RedisConnectionInfo, RedisMode};
    ///
    /// let info = RedisConnectionInfo::parse("clusters://p@ss@10.0.0.1:7000,10.0.0.2:7000").unwrap();
    /// assert_eq!(info.mode, RedisMode::ClusterTls);
    /// assert_eq!(info.password.as_deref(), Some("p@ss"));
    /// assert_eq!(info.nodes.len(), 2);
    ///
    /// assert!(RedisConnectionInfo::parse("redis://localhost:6379").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] for a missing `://`, an unknown
    /// mode, an empty node list or a node that is not `host:port`.
    pub fn parse(url: &str) -> Result<Self> {
        let (protocol, rest) = url.split_once("://").ok_or_else(|| {
            Error::ConfigurationError(format!(
                "Malformed redis url, expected {URL_FORMAT}"
            ))
        })?;
        let mode = protocol.parse::<RedisMode>()?;

        let (password, nodes_spec) = match rest.rsplit_once('@') {
            Some((password, nodes)) => (Some(password).filter(|p| !p.is_empty()), nodes),
            None => (None, rest),
        };
        let nodes_spec = nodes_spec.trim().trim_end_matches(',');
        if nodes_spec.is_empty() {
            return Err(Error::ConfigurationError(format!(
                "Redis url has no host:port, expected {URL_FORMAT}"
            )));
        }

        let nodes = nodes_spec
            .split(',')
            .map(str::parse)
            .collect::<Result<Vec<RedisNode>>>()?;

        Ok(Self {
            mode,
            password: password.map(str::to_string),
            nodes_spec: nodes_spec.to_string(),
            nodes,
        })
    }

    pub fn is_tls(&self) -> bool {
        self.mode.is_tls()
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RedisPool {
    /// Negative means unlimited.
    pub max_idle: i32,
    pub min_idle: i32,
    /// Negative means no limit.
    pub max_active: i32,
    /// Milliseconds to wait for a connection; negative blocks indefinitely.
    pub max_wait: i64,
}

impl Default for RedisPool {
    fn default() -> Self {
        Self {
            max_idle: 8,
            min_idle: 0,
            max_active: 8,
            max_wait: -1,
        }
    }
}

impl RedisPool {
    /// `None` when callers should block indefinitely.
    pub fn max_wait(&self) -> Option<Duration> {
        u64::try_from(self.max_wait).ok().map(Duration::from_millis)
    }
}

/// Redis settings as configured.
///
/// # Examples
///
/// ```
/// use servicekit::redis::{RedisProperties, RedisTopology};
///
/// let properties = RedisProperties::from_json(
///     r#"{ "url": "sentinel://secret@10.0.0.1:26379,10.0.0.2:26379", "sentinel-master": "main", "database": 2 }"#,
/// ).unwrap();
///
/// match properties.topology().unwrap() {
///     RedisTopology::Sentinel(sentinel) => {
///         assert_eq!(sentinel.master, "main");
///         assert_eq!(sentinel.sentinels.len(), 2);
///     }
///     other => panic!("unexpected topology {other:?}"),
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RedisProperties {
    /// Ignored in cluster mode.
    pub database: u32,
    pub url: Option<String>,
    /// Command timeout in milliseconds.
    pub timeout: Option<u64>,
    pub sentinel_master: Option<String>,
    /// Shutdown timeout in milliseconds; zero disables it.
    pub shutdown_timeout: u64,
    pub max_redirects: Option<u32>,
    /// Pooling is off when absent.
    pub pool: Option<RedisPool>,
    pub prefix_key: Option<String>,
}

impl Default for RedisProperties {
    fn default() -> Self {
        Self {
            database: 0,
            url: None,
            timeout: None,
            sentinel_master: None,
            shutdown_timeout: 100,
            max_redirects: None,
            pool: None,
            prefix_key: None,
        }
    }
}

impl RedisProperties {
    /// Parses properties from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::ConfigurationError(format!("Invalid redis properties: {e}")))
    }

    /// Parses the configured URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] when the URL is unset, blank or
    /// malformed.
    pub fn connection_info(&self) -> Result<RedisConnectionInfo> {
        let url = self
            .url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| Error::ConfigurationError("redis url must be configured".to_string()))?;
        RedisConnectionInfo::parse(url)
    }

    /// Builds the descriptor for the configured deployment.
    pub fn topology(&self) -> Result<RedisTopology> {
        let info = self.connection_info()?;
        let tls = info.is_tls();
        let topology = match info.mode {
            RedisMode::Standalone | RedisMode::StandaloneTls => {
                let node = info.nodes[0].clone();
                RedisTopology::Standalone(StandaloneConfig {
                    node,
                    database: self.database,
                    password: info.password,
                    tls,
                })
            }
            RedisMode::Sentinel | RedisMode::SentinelTls => {
                let master = self.sentinel_master.clone().ok_or_else(|| {
                    Error::ConfigurationError("sentinel-master is required in sentinel mode".to_string())
                })?;
                RedisTopology::Sentinel(SentinelConfig {
                    master,
                    sentinels: info.nodes,
                    database: self.database,
                    password: info.password,
                    tls,
                })
            }
            RedisMode::Cluster | RedisMode::ClusterTls => RedisTopology::Cluster(ClusterConfig {
                nodes: info.nodes,
                password: info.password,
                max_redirects: self.max_redirects,
                tls,
            }),
        };

        tracing::debug!(mode = %info.mode, nodes = %info.nodes_spec, "Resolved redis topology");
        Ok(topology)
    }

    /// Client-side options that apply to every topology.
    pub fn client_options(&self) -> Result<RedisClientOptions> {
        let info = self.connection_info()?;
        Ok(RedisClientOptions {
            tls: info.is_tls(),
            command_timeout: self.timeout.map(Duration::from_millis),
            shutdown_timeout: Some(self.shutdown_timeout)
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            pool: self.pool.clone(),
        })
    }

    /// Prepends the configured key prefix.
    pub fn prefixed_key(&self, key: &str) -> String {
        match &self.prefix_key {
            Some(prefix) => format!("{prefix}{key}"),
            None => key.to_string(),
        }
    }
}

/// Options a Redis client is built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisClientOptions {
    pub tls: bool,
    pub command_timeout: Option<Duration>,
    pub shutdown_timeout: Option<Duration>,
    pub pool: Option<RedisPool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandaloneConfig {
    pub node: RedisNode,
    pub database: u32,
    pub password: Option<String>,
    pub tls: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelConfig {
    pub master: String,
    pub sentinels: Vec<RedisNode>,
    pub database: u32,
    pub password: Option<String>,
    pub tls: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    pub nodes: Vec<RedisNode>,
    pub password: Option<String>,
    pub max_redirects: Option<u32>,
    pub tls: bool,
}

/// The descriptor of one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisTopology {
    Standalone(StandaloneConfig),
    Sentinel(SentinelConfig),
    Cluster(ClusterConfig),
}

impl RedisTopology {
    /// Renders `redis://` (or `rediss://`) URLs for every node, with the
    /// password percent-encoded. Standalone URLs carry the database.
    pub fn node_urls(&self) -> Result<Vec<String>> {
        match self {
            RedisTopology::Standalone(c) => Ok(vec![node_url(
                &c.node,
                c.password.as_deref(),
                Some(c.database),
                c.tls,
            )?]),
            RedisTopology::Sentinel(c) => c
                .sentinels
                .iter()
                .map(|node| node_url(node, c.password.as_deref(), None, c.tls))
                .collect(),
            RedisTopology::Cluster(c) => c
                .nodes
                .iter()
                .map(|node| node_url(node, c.password.as_deref(), None, c.tls))
                .collect(),
        }
    }
}

fn node_url(node: &RedisNode, password: Option<&str>, database: Option<u32>, tls: bool) -> Result<String> {
    let scheme = if tls { "rediss" } else { "redis" };
    let mut url = Url::parse(&format!("{scheme}://{node}"))?;
    if let Some(password) = password {
        url.set_password(Some(password)).map_err(|_| {
            Error::ConfigurationError(format!("Cannot set a password on redis node {node}"))
        })?;
    }
    if let Some(database) = database {
        url.set_path(&format!("/{database}"));
    }
    Ok(url.to_string())
}
