//! Response destination and handler outputs.
//!
//! A handler writes into a [`Reply`]. Nothing written means nothing was
//! produced, which the dispatcher reports as `501 Not Implemented`.
//!
//! | Output | Status | Content-Type |
//! |--------|--------|--------------|
//! | `()` | unset (501) | - |
//! | `String` / `&'static str` | 200 | text/plain |
//! | [`Json<T>`] | 200 | application/json |
//! | [`Created<T>`] | 201 | application/json |
//! | [`NoContent`] | 204 | - |
//! | [`Redirect`] | 3xx | - |
//! | [`WithStatus<T, N>`] | N | varies |
//! | `Result<T, ApiError>` | T's or the error's | varies |

use crate::context::Context;
use crate::error::{ApiError, Environment};
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use http_body_util::Full;
use rivet_openapi::{Describe, Shape, TypeRef};
use serde::Serialize;
use std::borrow::Cow;

/// HTTP Response type
pub type Response = http::Response<Full<Bytes>>;

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

/// Response under construction.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Bytes,
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.status = Some(status);
        self
    }

    pub fn header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        self.headers.insert(name, value);
        self
    }

    pub fn text(&mut self, status: StatusCode, body: impl Into<String>) -> &mut Self {
        self.bytes(status, TEXT, body.into())
    }

    /// Serialize `value` as the body; a value that cannot be encoded turns
    /// the reply into a 500.
    pub fn json<T: Serialize + ?Sized>(&mut self, status: StatusCode, value: &T) -> &mut Self {
        match serde_json::to_vec(value) {
            Ok(body) => self.bytes(status, JSON, body),
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize response body");
                self.text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to serialize response")
            }
        }
    }

    pub fn bytes(
        &mut self,
        status: StatusCode,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> &mut Self {
        self.status = Some(status);
        if let Ok(value) = HeaderValue::from_str(content_type) {
            self.headers.insert(header::CONTENT_TYPE, value);
        }
        self.body = body.into();
        self
    }

    pub fn redirect(&mut self, status: StatusCode, location: &str) -> &mut Self {
        self.status = Some(status);
        if let Ok(value) = HeaderValue::from_str(location) {
            self.headers.insert(header::LOCATION, value);
        }
        self.body = Bytes::new();
        self
    }

    /// Replace everything written so far.
    pub fn set(&mut self, other: Reply) -> &mut Self {
        *self = other;
        self
    }

    pub fn is_set(&self) -> bool {
        self.status.is_some()
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Standard JSON error body for `err`.
    pub fn from_error(err: &ApiError, request_id: Option<&str>, env: Environment) -> Reply {
        if err.status.is_server_error() {
            tracing::error!(
                error_type = %err.error_type,
                message = %err.message,
                internal = ?err.internal_details(),
                request_id = ?request_id,
                "server error"
            );
        }
        let mut reply = Reply::new();
        reply.json(err.status, &err.to_body(request_id, env));
        reply
    }

    pub fn into_response(self) -> Response {
        let mut response = http::Response::new(Full::new(self.body));
        *response.status_mut() = self.status.unwrap_or(StatusCode::NOT_IMPLEMENTED);
        *response.headers_mut() = self.headers;
        response
    }
}

/// Documented response of an operation.
#[derive(Debug, Clone)]
pub struct ResponseDoc {
    /// `0` documents the catch-all `default` response.
    pub status: u16,
    pub description: String,
    pub content: Option<(String, TypeRef)>,
    /// Store in `components/responses` under this key.
    pub shared: Option<String>,
}

impl ResponseDoc {
    pub fn shared(&mut self, key: impl Into<String>) -> &mut Self {
        self.shared = Some(key.into());
        self
    }
}

/// Response catalogue filled by [`Output::responses`] and endpoint docs.
#[derive(Debug, Clone, Default)]
pub struct ResponseDocs(Vec<ResponseDoc>);

impl ResponseDocs {
    pub fn json<T: Describe>(&mut self, status: u16, description: &str) -> &mut ResponseDoc {
        self.push(status, description, Some((JSON.to_string(), TypeRef::of::<T>())))
    }

    pub fn text(&mut self, status: u16, description: &str) -> &mut ResponseDoc {
        self.push(status, description, Some(("text/plain".to_string(), TypeRef::of::<String>())))
    }

    pub fn empty(&mut self, status: u16, description: &str) -> &mut ResponseDoc {
        self.push(status, description, None)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResponseDoc> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn extend(&mut self, other: ResponseDocs) {
        self.0.extend(other.0);
    }

    fn push(
        &mut self,
        status: u16,
        description: &str,
        content: Option<(String, TypeRef)>,
    ) -> &mut ResponseDoc {
        self.0.push(ResponseDoc {
            status,
            description: description.to_string(),
            content,
            shared: None,
        });
        let last = self.0.len() - 1;
        &mut self.0[last]
    }
}

/// Values a handler can return.
pub trait Output: Send + 'static {
    fn write(self, ctx: &Context, reply: &mut Reply);

    /// Responses this output can produce, for the API document.
    fn responses(_docs: &mut ResponseDocs) {}
}

impl Output for () {
    fn write(self, _ctx: &Context, _reply: &mut Reply) {}
}

impl Output for Reply {
    fn write(self, _ctx: &Context, reply: &mut Reply) {
        reply.set(self);
    }
}

impl Output for StatusCode {
    fn write(self, _ctx: &Context, reply: &mut Reply) {
        reply.status(self);
    }
}

impl Output for String {
    fn write(self, _ctx: &Context, reply: &mut Reply) {
        reply.text(StatusCode::OK, self);
    }

    fn responses(docs: &mut ResponseDocs) {
        docs.text(200, "OK");
    }
}

impl Output for &'static str {
    fn write(self, _ctx: &Context, reply: &mut Reply) {
        reply.text(StatusCode::OK, self);
    }

    fn responses(docs: &mut ResponseDocs) {
        docs.text(200, "OK");
    }
}

impl<T: Output> Output for Option<T> {
    fn write(self, ctx: &Context, reply: &mut Reply) {
        if let Some(inner) = self {
            inner.write(ctx, reply);
        }
    }

    fn responses(docs: &mut ResponseDocs) {
        T::responses(docs);
    }
}

/// Errors go through the route's error handler.
impl<T: Output> Output for Result<T, ApiError> {
    fn write(self, ctx: &Context, reply: &mut Reply) {
        match self {
            Ok(inner) => inner.write(ctx, reply),
            Err(err) => {
                reply.set(ctx.error(err));
            }
        }
    }

    fn responses(docs: &mut ResponseDocs) {
        T::responses(docs);
        docs.json::<ErrorDocument>(0, "Error");
    }
}

/// JSON body with 200 OK
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<T: Serialize + Describe + Send> Output for Json<T> {
    fn write(self, _ctx: &Context, reply: &mut Reply) {
        reply.json(StatusCode::OK, &self.0);
    }

    fn responses(docs: &mut ResponseDocs) {
        docs.json::<T>(200, "OK");
    }
}

/// JSON body with 201 Created
#[derive(Debug, Clone, Copy)]
pub struct Created<T>(pub T);

impl<T: Serialize + Describe + Send> Output for Created<T> {
    fn write(self, _ctx: &Context, reply: &mut Reply) {
        reply.json(StatusCode::CREATED, &self.0);
    }

    fn responses(docs: &mut ResponseDocs) {
        docs.json::<T>(201, "Created");
    }
}

/// 204 No Content
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContent;

impl Output for NoContent {
    fn write(self, _ctx: &Context, reply: &mut Reply) {
        reply.status(StatusCode::NO_CONTENT);
    }

    fn responses(docs: &mut ResponseDocs) {
        docs.empty(204, "No Content");
    }
}

#[derive(Debug, Clone)]
pub struct Redirect {
    status: StatusCode,
    location: String,
}

impl Redirect {
    /// 303 See Other
    pub fn to(uri: &str) -> Self {
        Self::with(StatusCode::SEE_OTHER, uri)
    }

    /// 301 Moved Permanently
    pub fn permanent(uri: &str) -> Self {
        Self::with(StatusCode::MOVED_PERMANENTLY, uri)
    }

    /// 307 Temporary Redirect
    pub fn temporary(uri: &str) -> Self {
        Self::with(StatusCode::TEMPORARY_REDIRECT, uri)
    }

    fn with(status: StatusCode, uri: &str) -> Self {
        Self {
            status,
            location: uri.to_string(),
        }
    }
}

impl Output for Redirect {
    fn write(self, _ctx: &Context, reply: &mut Reply) {
        reply.redirect(self.status, &self.location);
    }

    fn responses(docs: &mut ResponseDocs) {
        docs.empty(303, "Redirect");
    }
}

/// JSON body with a fixed status code.
#[derive(Debug, Clone)]
pub struct WithStatus<T, const CODE: u16>(pub T);

impl<T: Serialize + Describe + Send, const CODE: u16> Output for WithStatus<T, CODE> {
    fn write(self, _ctx: &Context, reply: &mut Reply) {
        let status = StatusCode::from_u16(CODE).unwrap_or(StatusCode::OK);
        reply.json(status, &self.0);
    }

    fn responses(docs: &mut ResponseDocs) {
        let description = StatusCode::from_u16(CODE)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Response");
        docs.json::<T>(CODE, description);
    }
}

/// Documented shape of the standard error body.
pub struct ErrorDocument;

struct ErrorDetail;

struct FieldErrorDoc;

impl Describe for ErrorDocument {
    fn type_name() -> Option<Cow<'static, str>> {
        Some("ErrorResponse".into())
    }

    fn shape() -> Shape {
        Shape::record()
            .field::<ErrorDetail>("error")
            .optional::<String>("request_id")
            .build()
    }
}

impl Describe for ErrorDetail {
    fn type_name() -> Option<Cow<'static, str>> {
        Some("ErrorBody".into())
    }

    fn shape() -> Shape {
        Shape::record()
            .field::<String>("type")
            .field::<String>("message")
            .optional::<Vec<FieldErrorDoc>>("fields")
            .build()
    }
}

impl Describe for FieldErrorDoc {
    fn type_name() -> Option<Cow<'static, str>> {
        Some("FieldError".into())
    }

    fn shape() -> Shape {
        Shape::record()
            .field::<String>("field")
            .field::<String>("code")
            .field::<String>("message")
            .build()
    }
}
