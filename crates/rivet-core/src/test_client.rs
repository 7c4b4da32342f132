//! TestClient for integration testing without network binding
//!
//! Requests go through the full dispatch pipeline: routing, security
//! providers, binding, the handler and the access log.
//!
//! # Example
//!
//! ```rust,ignore
//! use rivet_core::{get, Api, Context, TestClient};
//!
//! async fn hello(_ctx: Context) -> &'static str {
//!     "Hello, World!"
//! }
//!
//! #[tokio::test]
//! async fn test_hello() {
//!     let client = TestClient::new(Api::new("Test", "1.0.0").route("/", get(hello)));
//!
//!     let response = client.get("/").await;
//!     response.assert_status(200);
//!     assert_eq!(response.text(), "Hello, World!");
//! }
//! ```

use crate::app::Api;
use crate::context::CORRELATION_HEADER;
use crate::dispatch::Service;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use http_body_util::BodyExt;
use serde::{de::DeserializeOwned, Serialize};

/// Test client for integration testing without network binding
#[derive(Debug, Clone)]
pub struct TestClient {
    service: Service,
}

impl TestClient {
    /// Build `api` and wrap the resulting service.
    ///
    /// # Panics
    ///
    /// Panics with every registration fault if the API does not build.
    pub fn new(api: Api) -> Self {
        match api.build() {
            Ok(service) => Self { service },
            Err(errors) => panic!("API failed to build: {errors}"),
        }
    }

    pub fn from_service(service: Service) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    /// Send a GET request
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(TestRequest::get(path)).await
    }

    /// Send a POST request with JSON body
    pub async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> TestResponse {
        self.request(TestRequest::post(path).json(body)).await
    }

    /// Send a request with full control
    ///
    /// ```rust,ignore
    /// let response = client.request(
    ///     TestRequest::put("/user/1")
    ///         .basic_auth("alice", "secret")
    ///         .json(&UpdateUser { name: "Bob" })
    /// ).await;
    /// ```
    pub async fn request(&self, req: TestRequest) -> TestResponse {
        let mut request = http::Request::new(req.body.unwrap_or_default());
        *request.method_mut() = req.method;
        *request.uri_mut() = match req.path.parse() {
            Ok(uri) => uri,
            Err(_) => http::Uri::from_static("/"),
        };
        *request.headers_mut() = req.headers;

        TestResponse::from_response(self.service.dispatch(request).await).await
    }
}

/// Test request builder
#[derive(Debug, Clone)]
pub struct TestRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl TestRequest {
    /// Create a request with any method; `path` may carry a query string.
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: &str) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: &str) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a header. Repeated names keep every value.
    pub fn header(mut self, key: &str, value: &str) -> Self {
        if let (Ok(name), Ok(val)) = (key.parse::<HeaderName>(), HeaderValue::from_str(value)) {
            self.headers.append(name, val);
        }
        self
    }

    pub fn cookie(self, name: &str, value: &str) -> Self {
        self.header("cookie", &format!("{name}={value}"))
    }

    /// `Authorization: Basic` with the encoded credentials
    pub fn basic_auth(self, user: &str, password: &str) -> Self {
        let encoded = STANDARD.encode(format!("{user}:{password}"));
        self.header("authorization", &format!("Basic {encoded}"))
    }

    pub fn correlation_id(self, id: &str) -> Self {
        self.header(CORRELATION_HEADER.as_str(), id)
    }

    /// Set the request body as JSON
    ///
    /// This automatically sets the Content-Type header to `application/json`.
    pub fn json<T: Serialize>(mut self, body: &T) -> Self {
        if let Ok(bytes) = serde_json::to_vec(body) {
            self.body = Some(Bytes::from(bytes));
            self.headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }
        self
    }

    /// Set the request body as raw bytes
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn content_type(self, content_type: &str) -> Self {
        self.header("content-type", content_type)
    }
}

/// Test response with assertion helpers
#[derive(Debug)]
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TestResponse {
    async fn from_response(response: crate::response::Response) -> Self {
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map(|b| b.to_bytes())
            .unwrap_or_default();
        Self {
            status: parts.status,
            headers: parts.headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.header(CORRELATION_HEADER.as_str())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Get the response body as a string
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Parse the response body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Assert that the response has the expected status code
    ///
    /// # Panics
    ///
    /// Panics if the status code doesn't match.
    pub fn assert_status<S>(&self, expected: S) -> &Self
    where
        S: TryInto<StatusCode>,
        S::Error: std::fmt::Debug,
    {
        let expected = expected.try_into().expect("invalid status code");
        assert_eq!(
            self.status,
            expected,
            "Expected status {}, got {}. Body: {}",
            expected,
            self.status,
            self.text()
        );
        self
    }

    /// Assert that the response has the expected header value
    pub fn assert_header(&self, key: &str, expected: &str) -> &Self {
        let actual = self.header(key).unwrap_or("");
        assert_eq!(
            actual, expected,
            "Expected header '{}' to be '{}', got '{}'",
            key, expected, actual
        );
        self
    }

    /// Assert that the response body contains the expected string
    pub fn assert_body_contains(&self, expected: &str) -> &Self {
        let body = self.text();
        assert!(
            body.contains(expected),
            "Expected body to contain '{}', got '{}'",
            expected,
            body
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::router::{get, post};
    use crate::response::Json;
    use serde::Deserialize;

    async fn hello(_ctx: Context) -> &'static str {
        "Hello, World!"
    }

    async fn echo(ctx: Context) -> String {
        String::from_utf8_lossy(ctx.body()).to_string()
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Echoed {
        count: i32,
    }

    #[tokio::test]
    async fn get_request() {
        let client = TestClient::new(Api::new("Test", "1.0.0").route("/", get(hello)));
        let response = client.get("/").await;
        response.assert_status(200).assert_body_contains("Hello");
        assert!(response.correlation_id().is_some());
    }

    #[tokio::test]
    async fn json_bodies_are_sent() {
        let client = TestClient::new(Api::new("Test", "1.0.0").route("/echo", post(echo)));
        let response = client
            .post_json("/echo", &serde_json::json!({ "count": 42 }))
            .await;
        response.assert_status(StatusCode::OK);
        assert_eq!(response.json::<Echoed>().unwrap(), Echoed { count: 42 });
    }

    #[tokio::test]
    async fn correlation_id_is_echoed() {
        let client = TestClient::new(Api::new("Test", "1.0.0").route("/", get(hello)));
        let response = client
            .request(TestRequest::get("/").correlation_id("00000000000000000000000000C0FFEE"))
            .await;
        response.assert_header("x-corrid", "00000000000000000000000000C0FFEE");

        let replaced = client
            .request(TestRequest::get("/").correlation_id("not-an-id"))
            .await;
        let id = replaced.correlation_id().unwrap();
        assert_ne!(id, "not-an-id");
        assert_eq!(id.len(), 32);
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let api = Api::new("Test", "1.0.0")
            .body_limit(4)
            .route("/echo", post(echo));
        let client = TestClient::new(api);
        let response = client
            .request(TestRequest::post("/echo").body("too long"))
            .await;
        response.assert_status(413);
    }

    #[tokio::test]
    #[should_panic(expected = "API failed to build")]
    async fn registration_faults_panic() {
        let api = Api::new("Test", "1.0.0")
            .route("/", get(hello))
            .route("/", get(|_ctx: Context| async { Json(1u8) }));
        let _ = TestClient::new(api);
    }
}
