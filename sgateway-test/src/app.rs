use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use sgateway_http::AppState;
use tower::util::ServiceExt;

const TEST_ADDR: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 0);

/// In-process HTTP test client wrapping the gateway's axum router.
///
/// Uses `tower::ServiceExt::oneshot` to dispatch requests without binding
/// to a TCP port. The router's catch-all handler requires a `ConnectInfo`
/// extension (it's normally supplied by `into_make_service_with_connect_info`
/// at serve time), so every request gets a fixed loopback address stamped
/// onto it here.
pub struct TestApp {
    router: axum::Router,
}

impl TestApp {
    /// Build a `TestApp` from an assembled `AppState` (registry, pipeline,
    /// dispatcher and error mode already wired).
    pub fn new(state: AppState) -> Self {
        Self { router: sgateway_http::router(Arc::new(state)) }
    }

    /// Send a request built with `TestRequest`.
    pub async fn send(&self, request: TestRequest) -> TestResponse {
        let mut req = request.into_request();
        req.extensions_mut().insert(ConnectInfo(TEST_ADDR));

        let response = self.router.clone().oneshot(req).await.expect("failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.expect("failed to read response body").to_bytes();

        TestResponse { status, headers, body }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(TestRequest::get(path)).await
    }

    pub async fn get_authenticated(&self, path: &str, token: &str) -> TestResponse {
        self.send(TestRequest::get(path).bearer(token)).await
    }

    pub async fn post_json(&self, path: &str, body: &impl serde::Serialize) -> TestResponse {
        self.send(TestRequest::post(path).json(body)).await
    }

    pub async fn post_json_authenticated(&self, path: &str, body: &impl serde::Serialize, token: &str) -> TestResponse {
        self.send(TestRequest::post(path).json(body).bearer(token)).await
    }

    pub async fn put_json_authenticated(&self, path: &str, body: &impl serde::Serialize, token: &str) -> TestResponse {
        self.send(TestRequest::put(path).json(body).bearer(token)).await
    }

    pub async fn delete_authenticated(&self, path: &str, token: &str) -> TestResponse {
        self.send(TestRequest::delete(path).bearer(token)).await
    }
}

/// Fluent request builder; `TestApp::send` is the one thing that needs it,
/// the `TestApp` convenience methods above cover the common shapes.
pub struct TestRequest {
    method: Method,
    path: String,
    headers: Vec<(&'static str, String)>,
    body: Option<Bytes>,
}

impl TestRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), headers: Vec::new(), body: None }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.headers.push((AUTHORIZATION.as_str(), format!("Bearer {token}")));
        self
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn json(mut self, body: &impl serde::Serialize) -> Self {
        self.headers.push((CONTENT_TYPE.as_str(), "application/json".to_string()));
        self.body = Some(Bytes::from(serde_json::to_vec(body).unwrap()));
        self
    }

    fn into_request(self) -> Request<Body> {
        let mut builder = Request::builder().method(self.method).uri(self.path);
        for (name, value) in &self.headers {
            builder = builder.header(*name, value);
        }
        let body = match self.body {
            Some(bytes) => Body::from(bytes),
            None => Body::empty(),
        };
        builder.body(body).unwrap()
    }
}

/// Response wrapper with assertion helpers.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn assert_ok(self) -> Self {
        assert_eq!(self.status, StatusCode::OK, "Expected 200 OK, got {}", self.status);
        self
    }

    pub fn assert_created(self) -> Self {
        assert_eq!(self.status, StatusCode::CREATED, "Expected 201 Created, got {}", self.status);
        self
    }

    pub fn assert_bad_request(self) -> Self {
        assert_eq!(self.status, StatusCode::BAD_REQUEST, "Expected 400 Bad Request, got {}", self.status);
        self
    }

    pub fn assert_unauthorized(self) -> Self {
        assert_eq!(self.status, StatusCode::UNAUTHORIZED, "Expected 401 Unauthorized, got {}", self.status);
        self
    }

    pub fn assert_forbidden(self) -> Self {
        assert_eq!(self.status, StatusCode::FORBIDDEN, "Expected 403 Forbidden, got {}", self.status);
        self
    }

    pub fn assert_not_found(self) -> Self {
        assert_eq!(self.status, StatusCode::NOT_FOUND, "Expected 404 Not Found, got {}", self.status);
        self
    }

    pub fn assert_status(self, expected: StatusCode) -> Self {
        assert_eq!(self.status, expected, "Expected {expected}, got {}", self.status);
        self
    }

    /// Deserialize the response body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).unwrap_or_else(|e| panic!("Failed to parse JSON: {e}\nBody: {}", self.text()))
    }

    /// Resolve a field out of the JSON body with the `resolve_path` DSL.
    pub fn at(&self, path: &str) -> serde_json::Value {
        crate::path::resolve_path(&self.json(), path)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}
