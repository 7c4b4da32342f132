//! Per-request context handed to security providers and handlers.

use crate::error::{get_environment, ApiError, Environment};
use crate::path::PathParams;
use crate::response::Reply;
use crate::security::{Principal, Principals};
use bytes::Bytes;
use cookie::Cookie;
use http::{header, request::Parts, Extensions, HeaderMap, HeaderName, HeaderValue, Method, Uri};
use rivet_validate::{DefaultLocale, Locale};
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

/// Correlation id header, set on the request and echoed on the response.
pub const CORRELATION_HEADER: HeaderName = HeaderName::from_static("x-corrid");

/// Fresh correlation id: a v4 UUID as 32 uppercase hex digits.
pub fn new_correlation_id() -> String {
    Uuid::new_v4().simple().to_string().to_uppercase()
}

/// Whether `id` has the form [`new_correlation_id`] produces. Incoming ids of
/// any other form are replaced.
pub fn is_correlation_id(id: &str) -> bool {
    id.len() == 32 && id.bytes().all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
}

/// Renders request-time errors for a subtree of the path trie.
pub type ErrorHandler = Arc<dyn Fn(&Context, ApiError) -> Reply + Send + Sync>;

/// Request view shared by the providers and the handler of one request.
///
/// Cloning is cheap; all clones see the same request.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    parts: Parts,
    body: Bytes,
    correlation_id: String,
    route: Option<String>,
    params: PathParams,
    query: Vec<(String, String)>,
    principals: OnceLock<Principals>,
    locale: Arc<dyn Locale>,
    state: Arc<Extensions>,
    environment: Environment,
    error_handler: Option<ErrorHandler>,
}

impl Context {
    /// Context for a request outside the dispatcher, mostly for tests of
    /// providers and handlers.
    pub fn builder(request: http::Request<Bytes>) -> ContextBuilder {
        let (parts, body) = request.into_parts();
        ContextBuilder {
            parts,
            body,
            correlation_id: None,
            route: None,
            params: PathParams::default(),
            locale: Arc::new(DefaultLocale),
            state: Arc::new(Extensions::new()),
            environment: get_environment(),
            error_handler: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.inner.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.parts.uri
    }

    pub fn path(&self) -> &str {
        self.inner.parts.uri.path()
    }

    pub fn query_string(&self) -> Option<&str> {
        self.inner.parts.uri.query()
    }

    /// Matched route pattern, e.g. `/user/:id`.
    pub fn route(&self) -> Option<&str> {
        self.inner.route.as_deref()
    }

    pub fn correlation_id(&self) -> &str {
        &self.inner.correlation_id
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.parts.headers
    }

    /// First value of a header, if it is valid visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every value of a header in arrival order.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.inner
            .parts
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// Decoded query pairs in arrival order.
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.inner.query
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.inner
            .query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn query_values(&self, name: &str) -> Vec<&str> {
        self.inner
            .query
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Value of the first cookie called `name`.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.inner
            .parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|c| c.name() == name)
            .map(|c| c.value().to_string())
    }

    /// Raw request body; empty when none was sent.
    pub fn body(&self) -> &Bytes {
        &self.inner.body
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner.params.get(name)
    }

    pub fn params(&self) -> &PathParams {
        &self.inner.params
    }

    /// Principal authenticated by the provider registered under `scheme`.
    pub fn principal(&self, scheme: &str) -> Option<&Arc<dyn Principal>> {
        self.principals().get(scheme)
    }

    pub fn principals(&self) -> &Principals {
        static NONE: OnceLock<Principals> = OnceLock::new();
        self.inner
            .principals
            .get()
            .unwrap_or_else(|| NONE.get_or_init(Principals::default))
    }

    pub fn locale(&self) -> &dyn Locale {
        self.inner.locale.as_ref()
    }

    /// Application state registered with `Api::state`.
    pub fn state<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.inner.state.get::<T>()
    }

    pub fn environment(&self) -> Environment {
        self.inner.environment
    }

    /// Render `err` through the error handler inherited by this route.
    pub fn error(&self, err: ApiError) -> Reply {
        match &self.inner.error_handler {
            Some(handler) => handler(self, err),
            None => self.default_error(&err),
        }
    }

    /// Render `err` as the standard JSON error body.
    pub fn default_error(&self, err: &ApiError) -> Reply {
        Reply::from_error(err, Some(self.correlation_id()), self.inner.environment)
    }

    /// Record the authentication outcome; only the first call has effect.
    pub(crate) fn set_principals(&self, principals: Principals) {
        let _ = self.inner.principals.set(principals);
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", self.method())
            .field("uri", self.uri())
            .field("correlation_id", &self.inner.correlation_id)
            .field("params", &self.inner.params)
            .finish()
    }
}

pub struct ContextBuilder {
    parts: Parts,
    body: Bytes,
    correlation_id: Option<String>,
    route: Option<String>,
    params: PathParams,
    locale: Arc<dyn Locale>,
    state: Arc<Extensions>,
    environment: Environment,
    error_handler: Option<ErrorHandler>,
}

impl ContextBuilder {
    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn params(mut self, params: PathParams) -> Self {
        self.params = params;
        self
    }

    pub fn locale(mut self, locale: Arc<dyn Locale>) -> Self {
        self.locale = locale;
        self
    }

    pub fn state(mut self, state: Arc<Extensions>) -> Self {
        self.state = state;
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn error_handler(mut self, handler: Option<ErrorHandler>) -> Self {
        self.error_handler = handler;
        self
    }

    /// Finish the context. A well-formed incoming `X-CorrID` is kept, anything
    /// else gets a fresh id. The id is written into the request headers so
    /// handlers and providers see it like any other header.
    pub fn build(mut self) -> Context {
        let correlation_id = self
            .correlation_id
            .or_else(|| {
                self.parts
                    .headers
                    .get(&CORRELATION_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .filter(|id| is_correlation_id(id))
                    .map(str::to_string)
            })
            .unwrap_or_else(new_correlation_id);
        if let Ok(value) = HeaderValue::from_str(&correlation_id) {
            self.parts.headers.insert(CORRELATION_HEADER, value);
        }
        let query = self
            .parts
            .uri
            .query()
            .and_then(|q| serde_urlencoded::from_str::<Vec<(String, String)>>(q).ok())
            .unwrap_or_default();

        Context {
            inner: Arc::new(Inner {
                parts: self.parts,
                body: self.body,
                correlation_id,
                route: self.route,
                params: self.params,
                query,
                principals: OnceLock::new(),
                locale: self.locale,
                state: self.state,
                environment: self.environment,
                error_handler: self.error_handler,
            }),
        }
    }
}
