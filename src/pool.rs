//! Connection pool limits.
//!
//! [`ConnectionManager`] holds the global and per-route connection limits
//! derived from a [`ConnectionPoolPolicy`] and enforces them at run time:
//! every exchange leases one slot on its route and one slot of the global
//! total before it is sent, and gives both back when the response has been
//! read.
//!
//! All validation happens in [`ConnectionManager::build`]. A policy whose
//! route overrides add up to more than the global maximum never produces a
//! manager.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

/// Pool defaults used when neither the process settings nor the policy set
/// a limit.
const FALLBACK_MAX_TOTAL: usize = 20;
const FALLBACK_MAX_PER_ROUTE: usize = 2;

/// Connection pool configuration (`conn-pool` block).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ConnectionPoolPolicy {
    /// Global maximum number of connections. Ignored unless positive.
    pub max_conn_total: Option<usize>,
    /// Default maximum per route. Ignored unless positive.
    pub default_conn_per_route: Option<usize>,
    /// Explicit per-route maxima.
    pub route_conn: Vec<RouteConnection>,
    /// How long to wait for a pooled connection, in milliseconds.
    pub connection_request_timeout: Option<u64>,
}

impl Default for ConnectionPoolPolicy {
    fn default() -> Self {
        Self {
            max_conn_total: None,
            default_conn_per_route: None,
            route_conn: Vec::new(),
            connection_request_timeout: Some(10_000),
        }
    }
}

/// A per-route override. `host` has the form `scheme://hostOrIp`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteConnection {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub max: Option<usize>,
}

impl RouteConnection {
    pub fn new(host: impl Into<String>, port: Option<u16>, max: usize) -> Self {
        Self {
            host: host.into(),
            port,
            max: Some(max),
        }
    }
}

/// Process-level pool settings, the equivalent of the JVM's
/// `http.keepAlive` / `http.maxConnections` properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemDefaults {
    pub keep_alive: bool,
    pub max_connections: usize,
}

impl Default for SystemDefaults {
    fn default() -> Self {
        Self {
            keep_alive: true,
            max_connections: 5,
        }
    }
}

impl SystemDefaults {
    /// Reads `HTTP_KEEPALIVE` and `HTTP_MAX_CONNECTIONS` from the
    /// environment, falling back to `true` and `5`.
    pub fn from_env() -> Result<Self> {
        let keep_alive = std::env::var("HTTP_KEEPALIVE")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);
        let max_connections = match std::env::var("HTTP_MAX_CONNECTIONS") {
            Ok(raw) => raw.trim().parse::<usize>().map_err(|e| {
                Error::ConfigurationError(format!("HTTP_MAX_CONNECTIONS is not a number: {e}"))
            })?,
            Err(_) => 5,
        };
        Ok(Self {
            keep_alive,
            max_connections,
        })
    }
}

/// A pool route: scheme, host and port of a destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl Route {
    pub fn new(scheme: &str, host: &str, port: Option<u16>) -> Result<Self> {
        let scheme = scheme.to_ascii_lowercase();
        let port = match port {
            Some(port) => port,
            None => default_port(&scheme).ok_or_else(|| {
                Error::ConfigurationError(format!(
                    "No default port for scheme '{scheme}', set the route port explicitly"
                ))
            })?,
        };
        Ok(Self {
            scheme,
            host: host.to_ascii_lowercase(),
            port,
        })
    }

    /// The route a request to `url` travels on.
    pub fn from_url(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::ConfigurationError(format!("URL has no host: {url}")))?;
        Route::new(url.scheme(), host, url.port_or_known_default())
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

/// A leased pool slot. Dropping it returns the slot.
#[derive(Debug)]
pub struct Lease {
    _route: OwnedSemaphorePermit,
    _total: OwnedSemaphorePermit,
}

/// Enforces global and per-route connection limits.
///
/// # Examples
///
/// ```
/// use servicekit::pool::{ConnectionManager, ConnectionPoolPolicy, RouteConnection, SystemDefaults};
///
/// let policy = ConnectionPoolPolicy {
///     max_conn_total: Some(50),
///     default_conn_per_route: Some(10),
///     route_conn: vec![RouteConnection::new("https://api.example.com", None, 30)],
///     ..Default::default()
/// };
/// let manager = ConnectionManager::build(&policy, &SystemDefaults::default()).unwrap();
/// assert_eq!(manager.max_total(), 50);
///
/// let too_small = ConnectionPoolPolicy { max_conn_total: Some(20), ..policy };
/// assert!(ConnectionManager::build(&too_small, &SystemDefaults::default()).is_err());
/// ```
#[derive(Debug)]
pub struct ConnectionManager {
    max_total: usize,
    default_max_per_route: usize,
    route_limits: HashMap<Route, usize>,
    request_timeout: Option<Duration>,
    total: Arc<Semaphore>,
    routes: Mutex<HashMap<Route, Arc<Semaphore>>>,
}

impl ConnectionManager {
    /// Builds a manager, validating every route override.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] when a route host is not of the
    /// form `scheme://hostOrIp`, a route max is missing or zero, the sum of
    /// route maxima exceeds the global maximum, or a limit is larger than a
    /// semaphore can hold.
    pub fn build(policy: &ConnectionPoolPolicy, system: &SystemDefaults) -> Result<Self> {
        let (mut max_total, mut default_max_per_route) = (FALLBACK_MAX_TOTAL, FALLBACK_MAX_PER_ROUTE);
        if system.keep_alive {
            default_max_per_route = system.max_connections;
            max_total = system.max_connections.saturating_mul(2);
        }
        if let Some(total) = policy.max_conn_total.filter(|n| *n > 0) {
            max_total = total;
        }
        if let Some(per_route) = policy.default_conn_per_route.filter(|n| *n > 0) {
            default_max_per_route = per_route;
        }

        let mut route_limits = HashMap::with_capacity(policy.route_conn.len());
        let mut spec_count = 0usize;
        for route_conn in &policy.route_conn {
            let max = route_conn.max.filter(|n| *n > 0).ok_or_else(|| {
                Error::ConfigurationError(format!(
                    "route-conn entry for '{}' needs a max greater than 0",
                    route_conn.host
                ))
            })?;
            check_permits("route-conn max", max)?;
            let route = parse_route_host(&route_conn.host, route_conn.port)?;
            spec_count = spec_count.saturating_add(max);
            route_limits.insert(route, max);
        }
        check_permits("max-conn-total", max_total)?;
        check_permits("default-conn-per-route", default_max_per_route)?;
        if max_total < spec_count {
            return Err(Error::ConfigurationError(format!(
                "max-conn-total ({max_total}) must be at least the sum of route-conn maxima ({spec_count})"
            )));
        }

        tracing::debug!(
            max_total,
            default_max_per_route,
            routes = route_limits.len(),
            "Built connection manager"
        );

        Ok(Self {
            max_total,
            default_max_per_route,
            route_limits,
            request_timeout: policy.connection_request_timeout.map(Duration::from_millis),
            total: Arc::new(Semaphore::new(max_total)),
            routes: Mutex::new(HashMap::new()),
        })
    }

    pub fn max_total(&self) -> usize {
        self.max_total
    }

    pub fn default_max_per_route(&self) -> usize {
        self.default_max_per_route
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// The limit that applies to `route`.
    pub fn max_per_route(&self, route: &Route) -> usize {
        self.route_limits
            .get(route)
            .copied()
            .unwrap_or(self.default_max_per_route)
    }

    /// Slots currently free on `route`.
    pub fn available(&self, route: &Route) -> usize {
        self.route_semaphore(route).available_permits()
    }

    /// Leases a slot for a request to `url`, waiting at most the
    /// connection-request timeout.
    pub async fn acquire(&self, url: &Url) -> Result<Lease> {
        let route = Route::from_url(url)?;
        let route_slots = self.route_semaphore(&route);
        let total_slots = Arc::clone(&self.total);
        let started = Instant::now();

        let lease = async move {
            let route_permit = route_slots.acquire_owned().await?;
            let total_permit = total_slots.acquire_owned().await?;
            Ok::<_, tokio::sync::AcquireError>(Lease {
                _route: route_permit,
                _total: total_permit,
            })
        };

        let leased = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, lease).await.map_err(|_| {
                tracing::warn!(route = %route, waited_ms = limit.as_millis() as u64, "Connection pool exhausted");
                Error::PoolTimeout {
                    route: route.to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                }
            })?,
            None => lease.await,
        };
        leased.map_err(|_| Error::ConfigurationError("connection pool is closed".to_string()))
    }

    /// Semaphores are created on first contact with a route. Before a new
    /// one is added, idle routes without an explicit override are dropped,
    /// so the map holds at most the overridden routes plus those in use.
    fn route_semaphore(&self, route: &Route) -> Arc<Semaphore> {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slots) = routes.get(route) {
            return Arc::clone(slots);
        }
        routes.retain(|known, slots| {
            self.route_limits.contains_key(known) || Arc::strong_count(slots) > 1
        });
        let slots = Arc::new(Semaphore::new(self.max_per_route(route)));
        routes.insert(route.clone(), Arc::clone(&slots));
        slots
    }

    #[cfg(test)]
    fn tracked_routes(&self) -> usize {
        self.routes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

fn check_permits(key: &str, limit: usize) -> Result<()> {
    if limit > Semaphore::MAX_PERMITS {
        return Err(Error::ConfigurationError(format!(
            "{key} ({limit}) exceeds the largest supported limit ({})",
            Semaphore::MAX_PERMITS
        )));
    }
    Ok(())
}

fn parse_route_host(host: &str, port: Option<u16>) -> Result<Route> {
    let parts: Vec<&str> = host.split("://").collect();
    match parts.as_slice() {
        [scheme, name] if !scheme.is_empty() && !name.is_empty() => Route::new(scheme, name, port),
        _ => Err(Error::ConfigurationError(format!(
            "route-conn host '{host}' must look like scheme://domain-or-ip, e.g. https://example.com or http://192.168.1.1"
        ))),
    }
}
