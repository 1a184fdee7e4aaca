//! Client-side load balancing for logical service names.
//!
//! When [`select_transport`](crate::route::select_transport) classifies a URL
//! as [`Balanced`](crate::route::RouteDecision::Balanced), the client asks a
//! [`ServiceResolver`] for one instance of the service and rewrites the URL
//! authority before sending.

use crate::{Error, Result};
use rand::Rng;
use std::collections::HashMap;

/// One reachable instance of a logical service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    pub host: String,
    pub port: u16,
    /// Forces `https` for this instance regardless of the requested scheme.
    pub secure: bool,
}

impl ServiceInstance {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            secure: false,
        }
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }
}

/// Resolves a logical service name to one of its instances.
///
/// Implementations must be cheap to call; the resolver is consulted once
/// per balanced request.
pub trait ServiceResolver: Send + Sync {
    /// Returns an instance for `service`, or `None` when it has none.
    fn choose(&self, service: &str) -> Option<ServiceInstance>;
}

/// A fixed service table that picks instances at random.
///
/// # Examples
///
/// ```
/// use servicekit::balance::{ServiceInstance, ServiceResolver, StaticServiceRegistry};
///
/// let registry = StaticServiceRegistry::new()
///     .register("user-service", ServiceInstance::new("10.0.0.7", 8080));
///
/// assert_eq!(registry.choose("USER-SERVICE").unwrap().port, 8080);
/// assert!(registry.choose("billing").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticServiceRegistry {
    services: HashMap<String, Vec<ServiceInstance>>,
}

impl StaticServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instance to a service. Service names are case-insensitive.
    pub fn register(mut self, service: impl AsRef<str>, instance: ServiceInstance) -> Self {
        self.services
            .entry(service.as_ref().to_ascii_lowercase())
            .or_default()
            .push(instance);
        self
    }
}

impl ServiceResolver for StaticServiceRegistry {
    fn choose(&self, service: &str) -> Option<ServiceInstance> {
        let instances = self.services.get(&service.to_ascii_lowercase())?;
        match instances.len() {
            0 => None,
            1 => Some(instances[0].clone()),
            n => Some(instances[rand::thread_rng().gen_range(0..n)].clone()),
        }
    }
}

/// Rewrites `scheme://service[:port]/path` to point at a resolved instance.
pub(crate) fn rewrite_balanced(url: &str, resolver: &dyn ServiceResolver) -> Result<String> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| Error::ConfigurationError(format!("Not an absolute URL: {url}")))?;
    let (authority, path) = match rest.find(&['/', '?'][..]) {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };
    let service = authority.split(':').next().unwrap_or(authority);

    let instance = resolver.choose(service).ok_or_else(|| {
        tracing::warn!(service = %service, "No instance available for service");
        Error::ConfigurationError(format!("No instance available for service '{service}'"))
    })?;

    let scheme = if instance.secure { "https" } else { scheme };
    tracing::debug!(
        service = %service,
        host = %instance.host,
        port = instance.port,
        "Resolved load-balanced target"
    );
    Ok(format!("{scheme}://{}:{}{path}", instance.host, instance.port))
}
