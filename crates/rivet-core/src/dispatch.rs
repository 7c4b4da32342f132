//! Request dispatch
//!
//! A built [`Service`] answers every request with exactly one response:
//!
//! 1. route the path through the trie (404, or 405 with `Allow`)
//! 2. run every security provider and check the route's requirements (401)
//! 3. bind and run the handler, answering 501 when it writes nothing
//!
//! A panic in a security provider or the handler becomes a 500.
//!
//! Errors at any step render through the deepest error handler on the
//! matched path. The correlation id is echoed on the response and one
//! access record is written per request.

use crate::access::{AccessLog, AccessRecord};
use crate::context::{Context, ErrorHandler, CORRELATION_HEADER};
use crate::error::{ApiError, Environment};
use crate::handler::BoxedHandler;
use crate::path::{Lookup, NodeId, PathParams, PathTrie};
use crate::response::{Reply, Response};
use crate::security::{Principals, SecurityProvider, SecurityRequirements};
use bytes::Bytes;
use chrono::Utc;
use futures_util::FutureExt;
use http::{header, Extensions, HeaderValue};
use rivet_openapi::Document;
use rivet_validate::Locale;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Handler and effective security of one (node, method) pair.
pub(crate) struct MethodEntry {
    pub handler: BoxedHandler,
    pub security: SecurityRequirements,
}

pub(crate) type Trie = PathTrie<MethodEntry, ErrorHandler>;

pub(crate) struct ServiceParts {
    pub trie: Trie,
    pub providers: Vec<Arc<dyn SecurityProvider>>,
    pub access: AccessLog,
    pub locale: Arc<dyn Locale>,
    pub state: Arc<Extensions>,
    pub environment: Environment,
    pub body_limit: usize,
    pub document: Arc<Document>,
}

/// The built, immutable API. Cloning is cheap.
#[derive(Clone)]
pub struct Service {
    inner: Arc<ServiceParts>,
}

impl Service {
    pub(crate) fn new(parts: ServiceParts) -> Self {
        Self {
            inner: Arc::new(parts),
        }
    }

    /// Answer one request.
    pub async fn dispatch(&self, request: http::Request<Bytes>) -> Response {
        if request.body().len() > self.inner.body_limit {
            let err = ApiError::payload_too_large(self.inner.body_limit);
            return self.run(request, Some(err)).await;
        }
        self.run(request, None).await
    }

    /// Answer a request that was refused before dispatch, e.g. by the
    /// transport while reading the body.
    pub async fn reject(&self, request: http::Request<Bytes>, err: ApiError) -> Response {
        self.run(request, Some(err)).await
    }

    /// The generated OpenAPI document.
    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    pub fn access_log(&self) -> &AccessLog {
        &self.inner.access
    }

    /// Largest accepted request body, in bytes.
    pub fn body_limit(&self) -> usize {
        self.inner.body_limit
    }

    pub fn environment(&self) -> Environment {
        self.inner.environment
    }

    async fn run(&self, request: http::Request<Bytes>, rejected: Option<ApiError>) -> Response {
        let started = Instant::now();
        let timestamp = Utc::now();
        let trie = &self.inner.trie;

        let (node, params, found) = match trie.lookup(request.uri().path()) {
            Lookup::Found { node, params } => (node, params, true),
            Lookup::NotFound { nearest } => (nearest, PathParams::default(), false),
        };

        let mut builder = Context::builder(request)
            .params(params)
            .locale(Arc::clone(&self.inner.locale))
            .state(Arc::clone(&self.inner.state))
            .environment(self.inner.environment)
            .error_handler(trie.error_handler_for(node).cloned());
        if found {
            builder = builder.route(trie.node_path(node));
        }
        let ctx = builder.build();

        let reply = match rejected {
            Some(err) => render(&ctx, err),
            None => self.respond(&ctx, node, found).await,
        };

        let bytes = reply.body().len();
        let mut response = reply.into_response();
        if let Ok(value) = HeaderValue::from_str(ctx.correlation_id()) {
            response.headers_mut().insert(CORRELATION_HEADER, value);
        }

        self.inner.access.write(&AccessRecord {
            timestamp,
            correlation_id: ctx.correlation_id().to_string(),
            method: ctx.method().clone(),
            path: ctx.path().to_string(),
            query: ctx.query_string().map(str::to_string),
            status: response.status(),
            bytes,
            duration: started.elapsed(),
        });
        response
    }

    async fn respond(&self, ctx: &Context, node: NodeId, found: bool) -> Reply {
        let target = self.inner.trie.node(node);
        if !found || !target.has_methods() {
            tracing::debug!(path = %ctx.path(), "no route");
            return render(
                ctx,
                ApiError::not_found(format!("No route found for {} {}", ctx.method(), ctx.path())),
            );
        }

        let Some(entry) = target.method(ctx.method()) else {
            let allowed: Vec<&str> = target.methods().map(|(m, _)| m.as_str()).collect();
            let mut reply = render(ctx, ApiError::method_not_allowed(ctx.method(), ctx.path()));
            if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
                reply.header(header::ALLOW, value);
            }
            return reply;
        };

        let authenticated = AssertUnwindSafe(self.authenticate(ctx, &entry.security))
            .catch_unwind()
            .await;
        match authenticated {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return render(ctx, err),
            Err(panic) => return recover(ctx, panic.as_ref(), "security provider panicked"),
        }

        let handler = Arc::clone(&entry.handler);
        let outcome = AssertUnwindSafe(async { handler(ctx.clone()).await })
            .catch_unwind()
            .await;
        match outcome {
            Ok(reply) if reply.is_set() => reply,
            Ok(_) => render(ctx, ApiError::not_implemented()),
            Err(panic) => recover(ctx, panic.as_ref(), "handler panicked"),
        }
    }

    /// Collect principals from every provider, then check `requirements`.
    async fn authenticate(
        &self,
        ctx: &Context,
        requirements: &SecurityRequirements,
    ) -> Result<(), ApiError> {
        let mut principals = Principals::default();
        for provider in &self.inner.providers {
            if let Some(principal) = provider.authenticate(ctx).await? {
                principals.insert(provider.scheme_key(), principal);
            }
        }
        let satisfied = requirements.is_satisfied_by(&principals);
        ctx.set_principals(principals);
        if satisfied {
            Ok(())
        } else {
            Err(ApiError::unauthorized("Authentication required"))
        }
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("nodes", &self.inner.trie.len())
            .field("providers", &self.inner.providers.len())
            .field("body_limit", &self.inner.body_limit)
            .finish_non_exhaustive()
    }
}

/// Render through the inherited error handler. A handler that panics or
/// writes nothing falls back to the standard error body.
fn render(ctx: &Context, err: ApiError) -> Reply {
    match catch_unwind(AssertUnwindSafe(|| ctx.error(err.clone()))) {
        Ok(reply) if reply.is_set() => reply,
        Ok(_) => ctx.default_error(&err),
        Err(panic) => {
            tracing::error!(
                correlation_id = %ctx.correlation_id(),
                panic = %panic_message(panic.as_ref()),
                "error handler panicked"
            );
            ctx.default_error(&err)
        }
    }
}

/// Log a recovered panic and answer 500.
fn recover(ctx: &Context, panic: &(dyn Any + Send), what: &'static str) -> Reply {
    let message = panic_message(panic);
    tracing::error!(
        correlation_id = %ctx.correlation_id(),
        route = ?ctx.route(),
        panic = %message,
        "{what}"
    );
    render(
        ctx,
        ApiError::internal("Internal server error").with_internal(message),
    )
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessWriter;
    use crate::app::Api;
    use crate::router::get;
    use crate::security::ApiKeyProvider;
    use crate::test_client::{TestClient, TestRequest};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Statuses(Arc<Mutex<Vec<u16>>>);

    impl AccessWriter for Statuses {
        fn write(&self, record: &AccessRecord) {
            self.0.lock().unwrap().push(record.status.as_u16());
        }
    }

    async fn open(_ctx: Context) -> &'static str {
        "open"
    }

    #[tokio::test]
    async fn panicking_provider_becomes_500() {
        let statuses = Statuses::default();
        let client = TestClient::new(
            Api::new("Test", "1.0.0")
                .security_provider(ApiKeyProvider::header("apiKey", |_key| {
                    panic!("provider bug")
                }))
                .access_writer(statuses.clone())
                .route("/open", get(open)),
        );

        let response = client
            .request(TestRequest::get("/open").header("x-api-key", "k"))
            .await;
        response.assert_status(500);
        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["error"]["type"], "internal_error");
        assert!(body["request_id"].is_string());

        // No credentials: the provider is not consulted
        client.get("/open").await.assert_status(200);
        assert_eq!(*statuses.0.lock().unwrap(), vec![500, 200]);
    }

    #[test]
    fn panic_messages_are_extracted() {
        let str_panic = catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(str_panic.as_ref()), "boom");

        let string_panic = catch_unwind(|| panic!("{} failed", "step")).unwrap_err();
        assert_eq!(panic_message(string_panic.as_ref()), "step failed");
    }
}
