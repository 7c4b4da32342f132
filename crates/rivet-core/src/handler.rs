//! Handler trait and endpoints
//!
//! Handlers are async functions taking the request [`Context`] and,
//! optionally, a bound [`Input`]:
//!
//! ```rust,ignore
//! async fn health(_ctx: Context) -> &'static str { "ok" }
//!
//! async fn get_user(ctx: Context, input: UserPath) -> Result<Json<User>, ApiError> { ... }
//!
//! // Receive binding failures instead of the automatic 422
//! async fn lenient(ctx: Context, input: Result<UserPath, ValidationError>) -> Reply { ... }
//! ```
//!
//! An [`Endpoint`] wraps a handler together with its security requirements
//! and documentation. The wrapped handler is compiled against the route when
//! the API is built.

use crate::bind::{BindingPlan, BoundParam, DocParam, Input, Source};
use crate::context::Context;
use crate::error::{ApiError, RegistrationError};
use crate::response::{Output, Reply, ResponseDocs};
use crate::security::SecurityRequirements;
use futures_util::future::{BoxFuture, FutureExt};
use http::Method;
use rivet_openapi::{
    ComponentTable, Describe, Parameter, RefOr, RequestBody, Response, SchemaRegistry, TypeRef,
};
use rivet_validate::ValidationError;
use serde_json::Value;
use std::any::TypeId;
use std::future::Future;
use std::sync::Arc;

/// Type-erased handler stored in the path trie.
pub(crate) type BoxedHandler = Arc<dyn Fn(Context) -> BoxFuture<'static, Reply> + Send + Sync>;

/// Shared component sections filled while registering operations.
pub(crate) struct ComponentTables {
    pub parameters: ComponentTable<Parameter>,
    pub request_bodies: ComponentTable<RequestBody>,
    pub responses: ComponentTable<Response>,
}

impl Default for ComponentTables {
    fn default() -> Self {
        Self {
            parameters: ComponentTable::new("parameters"),
            request_bodies: ComponentTable::new("requestBodies"),
            responses: ComponentTable::new("responses"),
        }
    }
}

/// Registration state of one operation.
pub(crate) struct Contract<'a> {
    /// `METHOD /route`, used in error messages.
    pub route: String,
    pub method: Method,
    pub path_params: Vec<String>,
    pub registry: &'a mut SchemaRegistry,
    pub components: &'a mut ComponentTables,
    pub errors: Vec<RegistrationError>,
    pub parameters: Vec<DocParam>,
    pub request_body: Option<RefOr<RequestBody>>,
    pub bound: Vec<BoundParam>,
    pub responses: ResponseDocs,
    /// The handler binds an input, so it can answer 422.
    pub validates: bool,
}

impl<'a> Contract<'a> {
    pub fn new(
        route: String,
        method: Method,
        path_params: Vec<String>,
        registry: &'a mut SchemaRegistry,
        components: &'a mut ComponentTables,
    ) -> Self {
        Self {
            route,
            method,
            path_params,
            registry,
            components,
            errors: Vec::new(),
            parameters: Vec::new(),
            request_body: None,
            bound: Vec::new(),
            responses: ResponseDocs::default(),
            validates: false,
        }
    }
}

/// Documentation override for a bound parameter.
///
/// The documented type is checked against the binding when the API is
/// built, so the document cannot drift from what the handler binds.
#[derive(Debug, Clone)]
pub struct ParamDoc {
    pub(crate) source: Source,
    pub(crate) name: String,
    pub(crate) doc_type: TypeId,
    pub(crate) doc_type_name: &'static str,
    pub(crate) description: Option<String>,
    pub(crate) deprecated: bool,
    pub(crate) example: Option<Value>,
}

impl ParamDoc {
    pub fn path<T: Describe>(name: &str) -> Self {
        Self::new::<T>(Source::Path, name.to_string())
    }

    pub fn query<T: Describe>(name: &str) -> Self {
        Self::new::<T>(Source::Query, name.to_string())
    }

    pub fn header<T: Describe>(name: &str) -> Self {
        Self::new::<T>(Source::Header, name.to_ascii_lowercase())
    }

    pub fn cookie<T: Describe>(name: &str) -> Self {
        Self::new::<T>(Source::Cookie, name.to_string())
    }

    fn new<T: Describe>(source: Source, name: String) -> Self {
        let ty = TypeRef::of::<T>();
        Self {
            source,
            name,
            doc_type: ty.id(),
            doc_type_name: ty.rust_name(),
            description: None,
            deprecated: false,
            example: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn example(mut self, example: Value) -> Self {
        self.example = Some(example);
        self
    }
}

/// Operation documentation attached to an endpoint.
#[derive(Debug, Clone, Default)]
pub(crate) struct OperationDocs {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub operation_id: Option<String>,
    pub deprecated: bool,
    pub params: Vec<ParamDoc>,
    pub responses: ResponseDocs,
}

type Prepare = Box<dyn FnOnce(&mut Contract<'_>) -> BoxedHandler + Send>;

/// A handler with its security requirements and documentation.
pub struct Endpoint {
    prepare: Prepare,
    pub(crate) security: Option<SecurityRequirements>,
    pub(crate) docs: OperationDocs,
}

impl Endpoint {
    pub fn new<H: Handler<T>, T>(handler: H) -> Self {
        handler.into_endpoint()
    }

    fn from_prepare<P>(prepare: P) -> Self
    where
        P: FnOnce(&mut Contract<'_>) -> BoxedHandler + Send + 'static,
    {
        Self {
            prepare: Box::new(prepare),
            security: None,
            docs: OperationDocs::default(),
        }
    }

    /// Security for this operation. Without it, the requirements of the
    /// nearest ancestor path apply, then the API default.
    pub fn security(mut self, requirements: SecurityRequirements) -> Self {
        self.security = Some(requirements);
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.docs.summary = Some(summary.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.docs.description = Some(description.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.docs.tags.push(tag.into());
        self
    }

    pub fn operation_id(mut self, id: impl Into<String>) -> Self {
        self.docs.operation_id = Some(id.into());
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.docs.deprecated = true;
        self
    }

    pub fn param(mut self, doc: ParamDoc) -> Self {
        self.docs.params.push(doc);
        self
    }

    /// Document a JSON response; `0` is the `default` response.
    pub fn response_json<T: Describe>(mut self, status: u16, description: &str) -> Self {
        self.docs.responses.json::<T>(status, description);
        self
    }

    /// Document a response without a body.
    pub fn response(mut self, status: u16, description: &str) -> Self {
        self.docs.responses.empty(status, description);
        self
    }

    /// Document a response stored once under `components/responses`.
    pub fn shared_response<T: Describe>(mut self, key: &str, status: u16, description: &str) -> Self {
        self.docs.responses.json::<T>(status, description).shared(key);
        self
    }

    pub(crate) fn into_parts(self) -> (Prepare, Option<SecurityRequirements>, OperationDocs) {
        (self.prepare, self.security, self.docs)
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("security", &self.security)
            .field("docs", &self.docs)
            .finish_non_exhaustive()
    }
}

/// Trait representing an async handler function
pub trait Handler<T>: Send + Sized + 'static {
    fn into_endpoint(self) -> Endpoint;
}

impl Handler<Endpoint> for Endpoint {
    fn into_endpoint(self) -> Endpoint {
        self
    }
}

// Context only
impl<F, Fut, O> Handler<()> for F
where
    F: Fn(Context) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
    O: Output,
{
    fn into_endpoint(self) -> Endpoint {
        Endpoint::from_prepare(move |contract| {
            O::responses(&mut contract.responses);
            Arc::new(move |ctx: Context| {
                let f = self.clone();
                async move {
                    let output = f(ctx.clone()).await;
                    let mut reply = Reply::new();
                    output.write(&ctx, &mut reply);
                    reply
                }
                .boxed()
            })
        })
    }
}

// Context and a bound input; binding failures answer 422
impl<F, Fut, I, O> Handler<(I,)> for F
where
    F: Fn(Context, I) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
    I: Input,
    O: Output,
{
    fn into_endpoint(self) -> Endpoint {
        Endpoint::from_prepare(move |contract| {
            let plan = Arc::new(BindingPlan::<I>::compile(contract));
            contract.validates = !plan.is_empty();
            O::responses(&mut contract.responses);
            Arc::new(move |ctx: Context| {
                let f = self.clone();
                let plan = Arc::clone(&plan);
                async move {
                    let mut reply = Reply::new();
                    match plan.bind(&ctx) {
                        Ok(input) => f(ctx.clone(), input).await.write(&ctx, &mut reply),
                        Err(err) => {
                            reply.set(ctx.error(ApiError::validation(err)));
                        }
                    }
                    reply
                }
                .boxed()
            })
        })
    }
}

/// Marker for handlers that receive binding failures themselves.
pub struct Checked;

// Context and the binding outcome
impl<F, Fut, I, O> Handler<(Checked, I)> for F
where
    F: Fn(Context, Result<I, ValidationError>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
    I: Input,
    O: Output,
{
    fn into_endpoint(self) -> Endpoint {
        Endpoint::from_prepare(move |contract| {
            let plan = Arc::new(BindingPlan::<I>::compile(contract));
            O::responses(&mut contract.responses);
            Arc::new(move |ctx: Context| {
                let f = self.clone();
                let plan = Arc::clone(&plan);
                async move {
                    let bound = plan.bind(&ctx);
                    let mut reply = Reply::new();
                    f(ctx.clone(), bound).await.write(&ctx, &mut reply);
                    reply
                }
                .boxed()
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::Bindings;
    use crate::response::Json;
    use bytes::Bytes;
    use http::StatusCode;

    #[derive(Default)]
    struct Page {
        limit: u8,
    }

    impl Input for Page {
        fn declare(b: &mut Bindings<Self>) {
            b.query("limit", |s| &mut s.limit);
        }
    }

    async fn plain(_ctx: Context) -> &'static str {
        "ok"
    }

    async fn paged(_ctx: Context, page: Page) -> Json<u8> {
        Json(page.limit)
    }

    async fn checked(_ctx: Context, page: Result<Page, ValidationError>) -> String {
        match page {
            Ok(page) => page.limit.to_string(),
            Err(err) => format!("{} errors", err.len()),
        }
    }

    fn prepare(endpoint: Endpoint) -> (BoxedHandler, ResponseDocs, bool) {
        let mut registry = SchemaRegistry::new();
        let mut components = ComponentTables::default();
        let mut contract = Contract::new(
            "GET /test".into(),
            Method::GET,
            Vec::new(),
            &mut registry,
            &mut components,
        );
        let (compile, _, _) = endpoint.into_parts();
        let handler = compile(&mut contract);
        assert!(contract.errors.is_empty());
        (handler, contract.responses, contract.validates)
    }

    fn ctx(uri: &str) -> Context {
        Context::builder(http::Request::builder().uri(uri).body(Bytes::new()).unwrap()).build()
    }

    #[tokio::test]
    async fn context_only_handler() {
        let (handler, docs, validates) = prepare(Endpoint::new(plain));
        let reply = handler(ctx("/test")).await;
        assert_eq!(reply.body().as_ref(), b"ok");
        assert_eq!(docs.iter().map(|d| d.status).collect::<Vec<_>>(), vec![200]);
        assert!(!validates);
    }

    #[tokio::test]
    async fn bound_handler_answers_422_on_failure() {
        let (handler, _, validates) = prepare(Endpoint::new(paged));
        assert!(validates);

        let ok = handler(ctx("/test?limit=9")).await;
        assert_eq!(ok.body().as_ref(), b"9");

        let bad = handler(ctx("/test?limit=900")).await;
        assert_eq!(bad.status_code(), Some(StatusCode::UNPROCESSABLE_ENTITY));
        let body: Value = serde_json::from_slice(bad.body()).unwrap();
        assert_eq!(body["error"]["fields"][0]["field"], "query/limit");
    }

    #[tokio::test]
    async fn checked_handler_sees_the_failure() {
        let (handler, _, _) = prepare(Endpoint::new(checked));
        let reply = handler(ctx("/test")).await;
        assert_eq!(reply.status_code(), Some(StatusCode::OK));
        assert_eq!(reply.body().as_ref(), b"1 errors");
    }

    #[test]
    fn endpoint_builder_collects_docs() {
        let endpoint = Endpoint::new(plain)
            .summary("Health")
            .tag("ops")
            .param(ParamDoc::query::<u8>("limit").description("Page size"))
            .response(503, "Unavailable")
            .security(SecurityRequirements::authenticated());
        assert_eq!(endpoint.docs.summary.as_deref(), Some("Health"));
        assert_eq!(endpoint.docs.tags, vec!["ops"]);
        assert_eq!(endpoint.docs.params.len(), 1);
        assert!(endpoint.security.is_some());
    }
}
