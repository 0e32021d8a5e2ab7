//! Integration tests for ReqwestTransport using wiremock.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gatehouse::{ApiClient, ApiError, ClientConfig, SessionHooks, TransportError};
use gatehouse_reqwest::ReqwestTransport;
use http::Extensions;
use reqwest::{Client, Request, Response};
use reqwest_middleware::{ClientBuilder, Middleware, Next};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> ApiClient {
    ApiClient::new(
        ReqwestTransport::new(Client::new()),
        ClientConfig::builder()
            .base_endpoint(server.uri())
            .retry_delay(Duration::from_millis(50))
            .build(),
    )
}

#[derive(Default)]
struct CountingHooks {
    navigated: AtomicUsize,
}

impl SessionHooks for CountingHooks {
    fn clear_persisted_session(&self) {}

    fn navigate_to_login(&self) {
        self.navigated.fetch_add(1, Ordering::SeqCst);
    }
}

/// Test 1: overlapping identical reads hit the server once, and a read right
/// after settlement is served from the cache.
#[tokio::test]
async fn test_identical_reads_reach_server_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/students"))
        .and(query_param("dept", "5"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": 1, "name": "Ada"}]))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let results = futures::future::join_all(
        (0..5).map(|_| client.get("/students").query("dept", 5).send()),
    )
    .await;

    for result in results {
        assert_eq!(result.unwrap()[0]["name"], "Ada");
    }
    let cached = client.get("/students").query("dept", 5).send().await.unwrap();
    assert_eq!(cached[0]["id"], 1);
}

/// Test 2: the bearer token reaches the server.
#[tokio::test]
async fn test_bearer_token_is_sent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer abc.def"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    client.session().store("abc.def");

    assert_eq!(client.get("/me").send().await.unwrap()["id"], 7);
}

/// Test 3: JSON bodies are sent with the right content type.
#[tokio::test]
async fn test_json_body_is_sent() {
    let mock_server = MockServer::start().await;
    let body = json!({"course": "CS101", "student": 7});

    Mock::given(method("POST"))
        .and(path("/enrollments"))
        .and(header("content-type", "application/json"))
        .and(body_json(&body))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 99})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let created = client.post("/enrollments").json(&body).send().await.unwrap();

    assert_eq!(created["id"], 99);
}

/// Test 4: an empty success body decodes to null.
#[tokio::test]
async fn test_empty_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/rooms/4"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    assert!(client.delete("/rooms/4").send().await.unwrap().is_null());
}

/// Test 5: one 429 is retried, honouring Retry-After.
#[tokio::test]
async fn test_rate_limit_is_retried_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/schedule"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0.1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/schedule"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"slots": 3})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    assert_eq!(client.get("/schedule").send().await.unwrap()["slots"], 3);
}

/// Test 6: a second 429 is terminal.
#[tokio::test]
async fn test_persistent_rate_limit_fails() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/exams"))
        .respond_with(ResponseTemplate::new(429))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    assert!(matches!(
        client.get("/exams").send().await,
        Err(ApiError::RateLimited { retry_after: None })
    ));
}

/// Test 7: 401 resets the session and navigates once.
#[tokio::test]
async fn test_unauthorized_resets_session() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/grades"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;

    let hooks = Arc::new(CountingHooks::default());
    let client = ApiClient::builder()
        .transport(ReqwestTransport::new(Client::new()))
        .hooks(Arc::clone(&hooks))
        .config(ClientConfig::builder().base_endpoint(mock_server.uri()).build())
        .build();
    client.session().store("expired");

    assert!(matches!(
        client.get("/grades").send().await,
        Err(ApiError::Unauthorized { .. })
    ));
    assert!(!client.session().is_authenticated());
    assert_eq!(hooks.navigated.load(Ordering::SeqCst), 1);
}

/// Test 8: other statuses keep their body.
#[tokio::test]
async fn test_server_error_keeps_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/library"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    match client.get("/library").send().await {
        Err(ApiError::Http { status, body }) => {
            assert_eq!(status.as_u16(), 503);
            assert_eq!(&body[..], b"maintenance");
        }
        other => panic!("expected http error, got {other:?}"),
    }
}

/// Test 9: an unreachable server is a network error.
#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let client = ApiClient::new(
        ReqwestTransport::new(Client::new()),
        ClientConfig::builder()
            .base_endpoint("http://127.0.0.1:1")
            .build(),
    );

    assert!(matches!(
        client.get("/rooms").send().await,
        Err(ApiError::Network(TransportError::Connection(_)))
    ));
}

struct ClientTag;

#[async_trait]
impl Middleware for ClientTag {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        req.headers_mut()
            .insert("x-client", http::HeaderValue::from_static("gatehouse"));
        next.run(req, extensions).await
    }
}

/// Test 10: reqwest middleware stacks plug in unchanged.
#[tokio::test]
async fn test_middleware_stack_runs() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .and(header("x-client", "gatehouse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport =
        ReqwestTransport::from_middleware(ClientBuilder::new(Client::new()).with(ClientTag).build());
    let client = ApiClient::new(
        transport,
        ClientConfig::builder().base_endpoint(mock_server.uri()).build(),
    );

    assert_eq!(client.get("/health").send().await.unwrap()["ok"], true);
}
