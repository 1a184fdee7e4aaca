//! Integration tests using wiremock to simulate HTTP servers.

use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use servicekit::balance::{ServiceInstance, StaticServiceRegistry};
use servicekit::entity::FormBody;
use servicekit::hooks::{ExchangeLog, HookResult, RestHooks};
use servicekit::metadata::RequestSpec;
use servicekit::pool::{RouteConnection, SystemDefaults};
use servicekit::token::{RequestContext, Token};
use servicekit::uri::Params;
use servicekit::{Error, ResponseEnvelope, RestClient, RestClientBuilder, RestProperties};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_json, body_string, body_string_contains, header, header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct TestData {
    id: u32,
    name: String,
}

fn builder() -> RestClientBuilder {
    RestClient::builder().system_defaults(SystemDefaults::default())
}

fn port_of(server: &MockServer) -> u16 {
    server.address().port()
}

#[tokio::test]
async fn test_successful_get_request() {
    let mock_server = MockServer::start().await;

    let response_data = TestData {
        id: 1,
        name: "Test".to_string(),
    };

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&response_data))
        .mount(&mock_server)
        .await;

    let client = builder().build().unwrap();

    let response = client
        .get::<TestData>(format!("{}/test", mock_server.uri()))
        .await
        .unwrap();

    assert_eq!(response.data, response_data);
    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.keep_alive, Duration::from_millis(55_000));
}

#[tokio::test]
async fn test_get_with_query_params_and_path_variables() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/42/orders"))
        .and(query_param("page", "2"))
        .and(query_param("q", "a b&c"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![7, 8]))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = builder().build().unwrap();

    let response = client
        .get_with::<Vec<u32>>(
            format!("{}/users/{{id}}/orders", mock_server.uri()),
            Params::new().add("page", 2).add("q", "a b&c").add("skip", ""),
            Some(Params::new().add("id", 42)),
        )
        .await
        .unwrap();

    assert_eq!(response.data, vec![7, 8]);
}

#[tokio::test]
async fn test_post_entity_sends_json() {
    let mock_server = MockServer::start().await;

    let request_data = TestData {
        id: 0,
        name: "New".to_string(),
    };

    let response_data = TestData {
        id: 1,
        name: "New".to_string(),
    };

    Mock::given(method("POST"))
        .and(path("/test"))
        .and(header("content-type", "application/json"))
        .and(body_json(&request_data))
        .respond_with(ResponseTemplate::new(201).set_body_json(&response_data))
        .mount(&mock_server)
        .await;

    let client = builder().build().unwrap();

    let response = client
        .post_entity::<TestData, TestData>(format!("{}/test", mock_server.uri()), &request_data)
        .await
        .unwrap();

    assert_eq!(response.data, response_data);
    assert_eq!(response.status.as_u16(), 201);
}

#[tokio::test]
async fn test_form_is_urlencoded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/form"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("name=report&size=10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(true))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = builder().build().unwrap();
    let form = FormBody::new().text("name", "report").text("size", "10");

    let response = client
        .post_form::<bool>(format!("{}/form", mock_server.uri()), form)
        .await
        .unwrap();
    assert!(response.data);
}

#[tokio::test]
async fn test_form_with_file_is_multipart() {
    let mock_server = MockServer::start().await;

    let file = std::env::temp_dir().join(format!("servicekit-upload-{}.txt", std::process::id()));
    tokio::fs::write(&file, b"file contents").await.unwrap();

    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(header_regex("content-type", "^multipart/form-data; boundary="))
        .and(body_string_contains("file contents"))
        .and(body_string_contains("name=\"title\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(1))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = builder().build().unwrap();
    let form = FormBody::new().text("title", "notes").file("doc", &file);

    let result = client
        .post_form::<u32>(format!("{}/upload", mock_server.uri()), form)
        .await;
    tokio::fs::remove_file(&file).await.ok();

    assert_eq!(result.unwrap().data, 1);
}

#[tokio::test]
async fn test_missing_upload_file_is_io_error() {
    let client = builder().build().unwrap();
    let form = FormBody::new().file("doc", "/definitely/not/here.bin");

    let result = client
        .post_form::<u32>("http://127.0.0.1:9/upload", form)
        .await;
    assert!(matches!(result, Err(Error::Io(_))));
}

#[tokio::test]
async fn test_http_error_4xx() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not found"))
        .mount(&mock_server)
        .await;

    let client = builder().build().unwrap();

    let result = client
        .get::<TestData>(format!("{}/test", mock_server.uri()))
        .await;

    match result {
        Err(Error::HttpError {
            status,
            status_text,
            raw_response,
            ..
        }) => {
            assert_eq!(status.as_u16(), 404);
            assert_eq!(status_text, "Not Found");
            assert_eq!(raw_response, "Not found");
        }
        _ => panic!("Expected HttpError, got {:?}", result),
    }
}

#[tokio::test]
async fn test_deserialization_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(200).set_body_string("invalid json"))
        .mount(&mock_server)
        .await;

    let client = builder().build().unwrap();

    let result = client
        .get::<TestData>(format!("{}/test", mock_server.uri()))
        .await;

    match result {
        Err(Error::DeserializationFailed {
            raw_response,
            status,
            ..
        }) => {
            assert_eq!(raw_response, "invalid json");
            assert_eq!(status, StatusCode::OK);
        }
        _ => panic!("Expected DeserializationFailed, got {:?}", result),
    }
}

#[tokio::test]
async fn test_empty_body_decodes_as_none() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/test/1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let client = builder().build().unwrap();

    let response = client
        .delete::<Option<TestData>>(format!("{}/test/1", mock_server.uri()))
        .await
        .unwrap();
    assert_eq!(response.data, None);
    assert_eq!(response.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_get_text_returns_plain_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .mount(&mock_server)
        .await;

    let client = builder().build().unwrap();
    let response = client
        .get_text(format!("{}/ping", mock_server.uri()))
        .await
        .unwrap();
    assert_eq!(response.data, "pong");
}

/// Unwraps `{"code": 0, "data": ...}` bodies.
struct UnwrapData;

impl RestHooks for UnwrapData {
    fn parse_response(&self, response: &ResponseEnvelope) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(&response.body).ok()?;
        value.get("data").map(|data| data.to_string())
    }
}

#[tokio::test]
async fn test_parse_response_hook_rewrites_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/wrapped"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"code":0,"data":{"id":3,"name":"inner"}}"#),
        )
        .mount(&mock_server)
        .await;

    let client = builder().hooks(UnwrapData).build().unwrap();

    let response = client
        .get::<TestData>(format!("{}/wrapped", mock_server.uri()))
        .await
        .unwrap();
    assert_eq!(
        response.data,
        TestData {
            id: 3,
            name: "inner".to_string()
        }
    );
    assert!(response.raw_body.contains("\"code\":0"));
}

#[derive(Debug)]
struct RemoteFailure(String);

impl std::fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "remote failure: {}", self.0)
    }
}

impl std::error::Error for RemoteFailure {}

struct ConvertErrors;

impl RestHooks for ConvertErrors {
    fn catch_error(&self, status: StatusCode, status_text: &str, _error: Error) -> Error {
        Error::hook(RemoteFailure(format!("{} {}", status.as_u16(), status_text)))
    }
}

#[tokio::test]
async fn test_catch_error_hook_converts_status_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let client = builder().hooks(ConvertErrors).build().unwrap();

    let err = client
        .get::<TestData>(format!("{}/broken", mock_server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Hook(_)));
    assert_eq!(err.to_string(), "remote failure: 503 Service Unavailable");
}

#[derive(Default)]
struct RecordingLogger {
    calls: AtomicUsize,
    statuses: Mutex<Vec<Option<u16>>>,
    fail: bool,
}

struct Recording(Arc<RecordingLogger>);

impl RestHooks for Recording {
    fn log_exchange(&self, exchange: &ExchangeLog<'_>) -> HookResult {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        self.0
            .statuses
            .lock()
            .unwrap()
            .push(exchange.status().map(|s| s.as_u16()));
        if self.0.fail {
            return Err("log sink unavailable".into());
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_every_exchange_is_logged() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(1))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let logger = Arc::new(RecordingLogger::default());
    let client = builder().hooks(Recording(Arc::clone(&logger))).build().unwrap();

    client
        .get::<u32>(format!("{}/ok", mock_server.uri()))
        .await
        .unwrap();
    client
        .get::<u32>(format!("{}/missing", mock_server.uri()))
        .await
        .unwrap_err();
    // Nothing listens on port 9; the exchange never gets a response.
    client
        .get::<u32>("http://127.0.0.1:9/down")
        .await
        .unwrap_err();

    assert_eq!(logger.calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        *logger.statuses.lock().unwrap(),
        vec![Some(200), Some(404), None]
    );
}

#[tokio::test]
async fn test_logging_failure_does_not_fail_the_call() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(5))
        .mount(&mock_server)
        .await;

    let logger = Arc::new(RecordingLogger {
        fail: true,
        ..Default::default()
    });
    let client = builder().hooks(Recording(Arc::clone(&logger))).build().unwrap();

    let response = client
        .get::<u32>(format!("{}/ok", mock_server.uri()))
        .await
        .unwrap();
    assert_eq!(response.data, 5);
    assert_eq!(logger.calls.load(Ordering::SeqCst), 1);
}

struct TenantHeaders;

impl RestHooks for TenantHeaders {
    fn append_header(&self) -> Vec<(String, String)> {
        vec![
            ("x-tenant".to_string(), "default".to_string()),
            ("x-source".to_string(), "hooks".to_string()),
        ]
    }

    fn accept(&self) -> Option<String> {
        Some("application/json".to_string())
    }
}

#[tokio::test]
async fn test_call_headers_override_hook_and_default_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/headers"))
        .and(header("x-tenant", "acme"))
        .and(header("x-source", "hooks"))
        .and(header("x-app", "billing"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(true))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = builder()
        .hooks(TenantHeaders)
        .default_header("x-app", "billing")
        .unwrap()
        .default_header("x-tenant", "from-default")
        .unwrap()
        .build()
        .unwrap();

    let spec = RequestSpec::new(Method::GET, format!("{}/headers", mock_server.uri()))
        .with_header("x-tenant", "acme")
        .unwrap();
    let response = client.call::<(), bool>(spec, None).await.unwrap();
    assert!(response.data);
}

#[tokio::test]
async fn test_internal_token_is_forwarded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/profile"))
        .and(header("internal-token", r#"{"aid":"acc-1"}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json("saved"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = builder().build().unwrap();
    let context = RequestContext::new(Some(Token::new("acc-1")));

    let spec = RequestSpec::at(Method::PUT, &mock_server.uri(), "/profile").with_request_context(&context);
    let response = client
        .call::<_, String>(spec, Some(&serde_json::json!({"nick": "a"})))
        .await
        .unwrap();
    assert_eq!(response.data, "saved");
}

#[tokio::test]
async fn test_balanced_call_resolves_service_name() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items/9"))
        .and(query_param("full", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(9))
        .expect(1)
        .mount(&mock_server)
        .await;

    let registry = StaticServiceRegistry::new()
        .register("item-service", ServiceInstance::new("127.0.0.1", port_of(&mock_server)));
    let client = builder().service_resolver(registry).build().unwrap();

    let response = client
        .get_with::<u32>(
            "http://item-service/items/{id}",
            Params::new().add("full", true),
            Some(Params::new().add("id", 9)),
        )
        .await
        .unwrap();
    assert_eq!(response.data, 9);
}

#[tokio::test]
async fn test_unknown_service_is_a_configuration_error() {
    let client = builder()
        .service_resolver(StaticServiceRegistry::new())
        .build()
        .unwrap();

    let err = client
        .get::<u32>("http://ghost-service/x")
        .await
        .unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_host_keep_alive_override_is_reported() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ka"))
        .respond_with(ResponseTemplate::new(200).set_body_json(0))
        .mount(&mock_server)
        .await;

    let mut properties = RestProperties::default();
    properties.keep_alive_timeout.disable_server = true;
    properties
        .keep_alive_timeout
        .specifics
        .insert("127.0.0.1".to_string(), 12_000);
    let client = builder().properties(properties).build().unwrap();

    let response = client
        .get::<u32>(format!("{}/ka", mock_server.uri()))
        .await
        .unwrap();
    assert_eq!(response.keep_alive, Duration::from_millis(12_000));
}

#[tokio::test]
async fn test_route_limit_times_out_waiting_for_a_slot() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(1)
                .set_delay(Duration::from_millis(600)),
        )
        .mount(&mock_server)
        .await;

    let mut properties = RestProperties::default();
    properties.conn_pool.route_conn.push(RouteConnection::new(
        "http://127.0.0.1",
        Some(port_of(&mock_server)),
        1,
    ));
    properties.conn_pool.connection_request_timeout = Some(100);
    let client = builder().properties(properties).build().unwrap();

    let url = format!("{}/slow", mock_server.uri());
    let (first, second) = tokio::join!(client.get::<u32>(url.clone()), client.get::<u32>(url));

    let outcomes = [first, second];
    let timeouts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(Error::PoolTimeout { .. })))
        .count();
    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!((timeouts, successes), (1, 1));
}

#[tokio::test]
async fn test_exchange_with_prepared_entity() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/things/5"))
        .and(header("content-type", "application/merge-patch+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json("patched"))
        .mount(&mock_server)
        .await;

    let client = builder().build().unwrap();

    let mut headers = HeaderMap::new();
    headers.insert(
        "content-type",
        HeaderValue::from_static("application/merge-patch+json"),
    );
    let entity = servicekit::entity::build_body(
        Some(&serde_json::json!({"a": 1})),
        Some(&headers),
        &servicekit::hooks::DefaultHooks,
    )
    .unwrap();

    let response = client
        .exchange::<String>(
            &format!("{}/things/{{id}}", mock_server.uri()),
            Method::PATCH,
            entity,
            &Params::new().add("id", 5),
        )
        .await
        .unwrap();
    assert_eq!(response.data, "patched");
}
