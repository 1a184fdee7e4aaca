//! # servicekit - shared infrastructure for Rust microservices
//!
//! The centrepiece is [`RestClient`], an HTTP client for calling other
//! services. It adds, on top of `reqwest`:
//!
//! - URL templates filled from query parameters and path variables;
//! - routing between direct hosts and load-balanced logical service names;
//! - global and per-route connection limits and a keep-alive policy;
//! - hooks to rewrite responses, add headers, convert errors and log every
//!   exchange.
//!
//! Next to it live the pieces most services share: Redis connection
//! descriptors ([`redis`]), the internal token ([`token`]), the JSON
//! response envelope ([`envelope`]) and date helpers ([`date`]).
//!
//! ## Quick Start
//!
//! ```no_run
//! use servicekit::{RestClient, RestProperties};
//! use servicekit::uri::Params;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize)]
//! struct CreateUser {
//!     name: String,
//!     email: String,
//! }
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//!     email: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), servicekit::Error> {
//!     let client = RestClient::builder()
//!         .properties(RestProperties::from_json(r#"{ "read-timeout": 10000 }"#)?)
//!         .build()?;
//!
//!     // GET https://api.example.com/users/123?expand=true
//!     let user = client
//!         .get_with::<User>(
//!             "https://api.example.com/users/{id}",
//!             Params::new().add("expand", true),
//!             Some(Params::new().add("id", 123)),
//!         )
//!         .await?;
//!     println!("User: {}", user.data.name);
//!     println!("Request took {:?}", user.latency);
//!
//!     let new_user = CreateUser {
//!         name: "Alice".to_string(),
//!         email: "alice@example.com".to_string(),
//!     };
//!     let created = client
//!         .post_entity::<_, User>("https://api.example.com/users", &new_user)
//!         .await?;
//!     println!("Created user with ID: {}", created.data.id);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Errors keep the raw response data:
//!
//! ```no_run
//! use servicekit::{Error, RestClient};
//!
//! # async fn example() -> Result<(), Error> {
//! # let client = RestClient::builder().build()?;
//! match client.get::<serde_json::Value>("https://api.example.com/endpoint").await {
//!     Ok(response) => {
//!         println!("Success: {:?}", response.data);
//!     }
//!     Err(Error::DeserializationFailed { raw_response, serde_error, status }) => {
//!         eprintln!("Failed to deserialize (status {}):", status);
//!         eprintln!("  Raw response: {}", raw_response);
//!         eprintln!("  Error: {}", serde_error);
//!     }
//!     Err(Error::HttpError { status, raw_response, .. }) => {
//!         eprintln!("HTTP error {}: {}", status, raw_response);
//!     }
//!     Err(e) => {
//!         eprintln!("Other error: {}", e);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Load-balanced calls
//!
//! A URL whose host has no dot and is not `localhost` names a service.
//! Such calls go through the configured [`balance::ServiceResolver`]:
//!
//! ```no_run
//! use servicekit::RestClient;
//! use servicekit::balance::{ServiceInstance, StaticServiceRegistry};
//!
//! # async fn example() -> Result<(), servicekit::Error> {
//! let client = RestClient::builder()
//!     .service_resolver(
//!         StaticServiceRegistry::new()
//!             .register("order-service", ServiceInstance::new("10.0.0.7", 8080))
//!             .register("order-service", ServiceInstance::new("10.0.0.8", 8080)),
//!     )
//!     .build()?;
//!
//! let orders = client.get::<Vec<u64>>("http://order-service/orders").await?;
//! # Ok(())
//! # }
//! ```

pub mod balance;
mod client;
pub mod config;
pub mod date;
pub mod entity;
pub mod envelope;
mod error;
pub mod hooks;
pub mod json;
pub mod keep_alive;
pub mod metadata;
pub mod pool;
pub mod redis;
mod response;
pub mod route;
pub mod token;
pub mod transport;
pub mod uri;

pub use client::{RestClient, RestClientBuilder};
pub use config::RestProperties;
pub use error::{Error, Result};
pub use hooks::RestHooks;
pub use response::{Response, ResponseEnvelope};
