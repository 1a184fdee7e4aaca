//! The REST client.
//!
//! [`RestClient`] is the main entry point for calling other services. Use
//! [`RestClientBuilder`] to configure and create clients.
//!
//! Every call goes through the same pipeline: URL variables are filled,
//! the transport is chosen (direct host or load-balanced service name), a
//! pool slot is leased, the request is sent once, and the body is decoded.
//! The exchange is handed to [`RestHooks::log_exchange`] whatever happened.

use crate::{
    balance::{rewrite_balanced, ServiceResolver},
    config::RestProperties,
    entity::{build_body, build_form, EntityBody, FormBody, FormValue, RequestEntity},
    hooks::{DefaultHooks, ExchangeLog, RestHooks},
    keep_alive::KeepAlivePolicy,
    metadata::RequestSpec,
    pool::{ConnectionManager, SystemDefaults},
    route::{select_transport, RouteDecision},
    transport::{TransportFactory, Transports},
    uri::{build_url, merge_uri_variables, replace_uri_variables, Params, PathVariables},
    Error, Response, ResponseEnvelope, Result,
};
use chrono::Local;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Method};
use serde::{de::DeserializeOwned, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use url::Url;

/// An HTTP client for calling other services.
///
/// The client is cheap to clone and designed to be shared. It owns the
/// transports and the connection pool limits.
///
/// # Examples
///
/// ```no_run
/// use servicekit::{RestClient, Response};
/// use servicekit::uri::Params;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize)]
/// struct CreateUser {
///     name: String,
/// }
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), servicekit::Error> {
/// let client = RestClient::builder().build()?;
///
/// let user: Response<User> = client
///     .get_with(
///         "https://api.example.com/users/{id}",
///         Params::new().add("verbose", true),
///         Some(Params::new().add("id", 123)),
///     )
///     .await?;
/// println!("User: {}", user.data.name);
///
/// let created: Response<User> = client
///     .post_entity("https://api.example.com/users", &CreateUser { name: "Alice".into() })
///     .await?;
/// println!("Created user with ID: {}", created.data.id);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transports: Transports,
    pool: ConnectionManager,
    keep_alive: KeepAlivePolicy,
    hooks: Arc<dyn RestHooks>,
    resolver: Option<Arc<dyn ServiceResolver>>,
    default_headers: HeaderMap,
    log_time_format: Option<String>,
}

impl RestClient {
    /// Creates a new `RestClientBuilder` for configuring a client.
    pub fn builder() -> RestClientBuilder {
        RestClientBuilder::new()
    }

    /// The connection limits in force.
    pub fn pool(&self) -> &ConnectionManager {
        &self.inner.pool
    }

    /// Makes a call with a JSON body.
    ///
    /// Without a body only headers are sent. Query parameters become
    /// `key={key}` placeholders; placeholders are filled from the query
    /// parameters and path variables, path variables winning.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use servicekit::{metadata::RequestSpec, RestClient};
    /// use http::Method;
    /// use serde::{Deserialize, Serialize};
    ///
    /// #[derive(Serialize)]
    /// struct Search { query: String }
    ///
    /// #[derive(Deserialize)]
    /// struct Hits { results: Vec<String> }
    ///
    /// # async fn example() -> Result<(), servicekit::Error> {
    /// let client = RestClient::builder().build()?;
    ///
    /// let spec = RequestSpec::at(Method::POST, "http://search-service", "/search/{index}")
    ///     .with_path_variable("index", "docs");
    /// let request = Search { query: "rust".to_string() };
    ///
    /// let response = client.call::<_, Hits>(spec, Some(&request)).await?;
    /// println!("Found {} results", response.data.results.len());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call<Req, Res>(&self, spec: RequestSpec, body: Option<&Req>) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let headers = self.call_headers(&spec.headers);
        let entity = build_body(body, Some(&headers), self.inner.hooks.as_ref())?;
        self.dispatch(spec, entity, decode_json).await
    }

    /// Makes a call with a form body.
    ///
    /// The form is URL-encoded, or sent as `multipart/form-data` when it
    /// contains a file.
    pub async fn call_form<Res>(&self, spec: RequestSpec, form: FormBody) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        let headers = self.call_headers(&spec.headers);
        let entity = build_form(form, Some(&headers), self.inner.hooks.as_ref())?;
        self.dispatch(spec, entity, decode_json).await
    }

    async fn dispatch<Res>(
        &self,
        spec: RequestSpec,
        entity: RequestEntity,
        decode: Decoder<Res>,
    ) -> Result<Response<Res>> {
        let RequestSpec {
            method,
            url,
            mut query_params,
            path_variables,
            ..
        } = spec;
        let template = build_url(&url, &mut query_params);
        let variables = merge_uri_variables(&query_params, path_variables.as_ref());
        self.run(&template, method, entity, &variables, decode).await
    }

    /// Sends a prepared entity to a URL template.
    ///
    /// This is the single transport step every other method ends in. The
    /// empty body decodes as JSON `null`, so `Option<T>` and `()` targets
    /// accept it.
    pub async fn exchange<Res>(
        &self,
        url: &str,
        method: Method,
        entity: RequestEntity,
        uri_variables: &Params,
    ) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        self.run(url, method, entity, uri_variables, decode_json).await
    }

    async fn run<Res>(
        &self,
        url: &str,
        method: Method,
        entity: RequestEntity,
        uri_variables: &Params,
        decode: Decoder<Res>,
    ) -> Result<Response<Res>> {
        let started = Instant::now();
        let started_at = Local::now();
        let resolved = replace_uri_variables(url, uri_variables);

        let (envelope, result) = match self.send(&resolved, &method, &entity).await {
            Ok(envelope) => {
                let result = self.decode(&envelope, started, decode);
                (Some(envelope), result)
            }
            Err(e) => (None, Err(e)),
        };

        if let Err(e) = &result {
            tracing::warn!(error = %e, method = %method, url = %resolved, "Request failed");
        }

        self.log_exchange(&ExchangeLog {
            method: &method,
            url: &resolved,
            request_headers: &entity.headers,
            request_body: entity.body.as_ref(),
            response: envelope.as_ref(),
            error: result.as_ref().err(),
            started_at,
            elapsed: started.elapsed(),
            time_format: self.inner.log_time_format.as_deref(),
        });

        result
    }

    /// Sends one request and reads the whole body.
    async fn send(&self, url: &str, method: &Method, entity: &RequestEntity) -> Result<ResponseEnvelope> {
        let target = match select_transport(url) {
            RouteDecision::Direct => url.to_string(),
            RouteDecision::Balanced => {
                let resolver = self.inner.resolver.as_deref().ok_or_else(|| {
                    Error::ConfigurationError(format!(
                        "No service resolver configured for load-balanced URL '{url}'"
                    ))
                })?;
                rewrite_balanced(url, resolver)?
            }
        };
        let target = Url::parse(&target)?;
        let host = target.host_str().unwrap_or_default().to_string();

        let _lease = self.inner.pool.acquire(&target).await?;

        tracing::debug!(method = %method, url = %target, "Executing HTTP request");

        let mut headers = entity.headers.clone();
        let mut request = self
            .inner
            .transports
            .for_host(&host)
            .request(method.clone(), target);

        match &entity.body {
            None => {}
            Some(EntityBody::Json(value)) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                let bytes =
                    serde_json::to_vec(value).map_err(|e| Error::SerializationFailed(e.to_string()))?;
                request = request.body(bytes);
            }
            Some(EntityBody::Form(pairs)) => {
                request = request.form(pairs);
            }
            Some(EntityBody::Multipart(parts)) => {
                // reqwest sets the content type with its boundary
                headers.remove(CONTENT_TYPE);
                request = request.multipart(multipart_form(parts).await?);
            }
        }

        let response = request.headers(headers).send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let keep_alive = self.inner.keep_alive.resolve(&headers, &host);
        let body = response.text().await?;

        Ok(ResponseEnvelope {
            status,
            headers,
            body,
            keep_alive,
        })
    }

    fn decode<Res>(
        &self,
        envelope: &ResponseEnvelope,
        started: Instant,
        decode: Decoder<Res>,
    ) -> Result<Response<Res>> {
        let status = envelope.status;
        let latency = started.elapsed();

        tracing::info!(
            status = status.as_u16(),
            latency_ms = latency.as_millis() as u64,
            "Received HTTP response"
        );

        if !status.is_success() {
            if status.is_client_error() {
                tracing::error!(status = status.as_u16(), response = %envelope.body, "Client error (4xx)");
            } else if status.is_server_error() {
                tracing::warn!(status = status.as_u16(), response = %envelope.body, "Server error (5xx)");
            }

            let status_text = status.canonical_reason().unwrap_or_default().to_string();
            let error = Error::HttpError {
                status,
                status_text: status_text.clone(),
                raw_response: envelope.body.clone(),
                headers: envelope.headers.clone(),
            };
            return Err(self.inner.hooks.catch_error(status, &status_text, error));
        }

        let rewritten = if envelope.has_body() {
            self.inner
                .hooks
                .parse_response(envelope)
                .filter(|body| !body.is_empty())
        } else {
            None
        };
        let body = rewritten.as_deref().unwrap_or(&envelope.body);

        match decode(body) {
            Ok(data) => Ok(Response::new(
                data,
                envelope.body.clone(),
                status,
                envelope.headers.clone(),
                latency,
                envelope.keep_alive,
            )),
            Err(e) => {
                tracing::error!(error = %e, raw_response = %body, "Failed to deserialize response");
                Err(Error::DeserializationFailed {
                    raw_response: body.to_string(),
                    serde_error: e.to_string(),
                    status,
                })
            }
        }
    }

    fn log_exchange(&self, exchange: &ExchangeLog<'_>) {
        let hooks = &self.inner.hooks;
        match catch_unwind(AssertUnwindSafe(|| hooks.log_exchange(exchange))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Failed to log HTTP exchange"),
            Err(_) => tracing::error!("HTTP exchange logger panicked"),
        }
    }

    fn call_headers(&self, headers: &HeaderMap) -> HeaderMap {
        if self.inner.default_headers.is_empty() {
            return headers.clone();
        }
        let mut merged = self.inner.default_headers.clone();
        for name in headers.keys() {
            merged.remove(name);
        }
        for (name, value) in headers {
            merged.append(name.clone(), value.clone());
        }
        merged
    }

    /// Makes a GET request.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use servicekit::RestClient;
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize)]
    /// struct User { name: String }
    ///
    /// # async fn example() -> Result<(), servicekit::Error> {
    /// let client = RestClient::builder().build()?;
    ///
    /// let user: servicekit::Response<User> = client.get("http://user-service/users/123").await?;
    /// println!("User: {}", user.data.name);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get<Res>(&self, url: impl Into<String>) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        self.call::<(), Res>(RequestSpec::new(Method::GET, url), None).await
    }

    /// Makes a GET request with query parameters and path variables.
    pub async fn get_with<Res>(
        &self,
        url: impl Into<String>,
        query_params: Params,
        path_variables: Option<PathVariables>,
    ) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        let mut spec = RequestSpec::new(Method::GET, url).with_query_params(query_params);
        spec.path_variables = path_variables;
        self.call::<(), Res>(spec, None).await
    }

    /// Makes a GET request without decoding the body.
    ///
    /// The body (after [`RestHooks::parse_response`]) is returned as text.
    pub async fn get_text(&self, url: impl Into<String>) -> Result<Response<String>> {
        let spec = RequestSpec::new(Method::GET, url);
        let headers = self.call_headers(&spec.headers);
        let entity = build_body::<()>(None, Some(&headers), self.inner.hooks.as_ref())?;
        self.dispatch(spec, entity, decode_text).await
    }

    /// Makes a POST request with a JSON body.
    pub async fn post_entity<Req, Res>(&self, url: impl Into<String>, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.call(RequestSpec::new(Method::POST, url), Some(body)).await
    }

    /// Makes a POST request with a form body.
    pub async fn post_form<Res>(&self, url: impl Into<String>, form: FormBody) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        self.call_form(RequestSpec::new(Method::POST, url), form).await
    }

    /// Makes a PUT request with a JSON body.
    pub async fn put<Req, Res>(&self, url: impl Into<String>, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.call(RequestSpec::new(Method::PUT, url), Some(body)).await
    }

    /// Makes a DELETE request.
    pub async fn delete<Res>(&self, url: impl Into<String>) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        self.call::<(), Res>(RequestSpec::new(Method::DELETE, url), None).await
    }
}

type Decoder<T> = fn(&str) -> serde_json::Result<T>;

/// An empty body decodes as `null`.
fn decode_json<T: DeserializeOwned>(body: &str) -> serde_json::Result<T> {
    serde_json::from_str(if body.is_empty() { "null" } else { body })
}

fn decode_text(body: &str) -> serde_json::Result<String> {
    Ok(body.to_string())
}

async fn multipart_form(parts: &[(String, FormValue)]) -> Result<reqwest::multipart::Form> {
    let mut form = reqwest::multipart::Form::new();
    for (name, value) in parts {
        form = match value {
            FormValue::Text(text) => form.text(name.clone(), text.clone()),
            FormValue::File(path) => {
                let bytes = tokio::fs::read(path).await?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| name.clone());
                form.part(
                    name.clone(),
                    reqwest::multipart::Part::bytes(bytes).file_name(file_name),
                )
            }
        };
    }
    Ok(form)
}

/// Builder for configuring and creating a [`RestClient`].
///
/// # Examples
///
/// ```no_run
/// use servicekit::{RestClientBuilder, RestProperties};
/// use servicekit::balance::{ServiceInstance, StaticServiceRegistry};
///
/// # fn example() -> Result<(), servicekit::Error> {
/// let properties = RestProperties::from_json(r#"{ "read-timeout": 3000 }"#)?;
/// let registry = StaticServiceRegistry::new()
///     .register("user-service", ServiceInstance::new("10.0.0.5", 8080));
///
/// let client = RestClientBuilder::new()
///     .properties(properties)
///     .service_resolver(registry)
///     .default_header("User-Agent", "billing/1.0")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RestClientBuilder {
    properties: RestProperties,
    system: Option<SystemDefaults>,
    hooks: Option<Arc<dyn RestHooks>>,
    resolver: Option<Arc<dyn ServiceResolver>>,
    default_headers: HeaderMap,
}

impl RestClientBuilder {
    /// Creates a new `RestClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            properties: RestProperties::default(),
            system: None,
            hooks: None,
            resolver: None,
            default_headers: HeaderMap::new(),
        }
    }

    pub fn properties(mut self, properties: RestProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Overrides the process-level defaults, which are otherwise read from
    /// the environment on [`build`](Self::build).
    pub fn system_defaults(mut self, system: SystemDefaults) -> Self {
        self.system = Some(system);
        self
    }

    pub fn hooks(mut self, hooks: impl RestHooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    pub fn shared_hooks(mut self, hooks: Arc<dyn RestHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Enables load-balanced calls to logical service names.
    pub fn service_resolver(mut self, resolver: impl ServiceResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Adds a header sent with every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = crate::entity::header_name(name.as_ref())?;
        let value = crate::entity::header_value(value.as_ref())?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Builds the configured `RestClient`.
    ///
    /// # Errors
    ///
    /// Returns an error if the properties or the pool policy are invalid, or
    /// if the transports cannot be created.
    pub fn build(self) -> Result<RestClient> {
        self.properties.validate()?;
        let system = match self.system {
            Some(system) => system,
            None => SystemDefaults::from_env()?,
        };

        let pool = ConnectionManager::build(&self.properties.conn_pool, &system)?;
        let transports = TransportFactory::build(&self.properties, &pool)?;
        let hooks = self.hooks.unwrap_or_else(|| Arc::new(DefaultHooks));

        Ok(RestClient {
            inner: Arc::new(ClientInner {
                transports,
                pool,
                keep_alive: self.properties.keep_alive_timeout,
                hooks,
                resolver: self.resolver,
                default_headers: self.default_headers,
                log_time_format: self.properties.log_time_format,
            }),
        })
    }
}

impl Default for RestClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
