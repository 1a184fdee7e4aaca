//! Per-call choice between the plain transport and the load-balanced one.

/// Which transport a request goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// The host is a real domain, an address or `localhost`.
    Direct,
    /// The host is a logical service name resolved by service discovery.
    Balanced,
}

/// Extracts the authority between `://` and the next `/`.
///
/// Returns `None` when the URL has no `://`.
pub fn extract_host(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    Some(rest.split_once('/').map_or(rest, |(host, _)| host))
}

/// Decides which transport handles `url`.
///
/// A host containing a `.` or `localhost` goes [`RouteDecision::Direct`];
/// anything else is treated as a logical service name. URLs without a scheme
/// separator always go direct. No discovery lookup happens here.
///
/// # Examples
///
/// ```
/// use servicekit::route::{select_transport, RouteDecision};
///
/// assert_eq!(select_transport("http://api.example.com/v1"), RouteDecision::Direct);
/// assert_eq!(select_transport("http://localhost:8080/v1"), RouteDecision::Direct);
/// assert_eq!(select_transport("http://user-service/v1"), RouteDecision::Balanced);
/// ```
pub fn select_transport(url: &str) -> RouteDecision {
    match extract_host(url) {
        Some(host) if host.contains('.') || host.contains("localhost") => RouteDecision::Direct,
        Some(_) => RouteDecision::Balanced,
        None => RouteDecision::Direct,
    }
}
