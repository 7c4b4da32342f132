//! # Rivet Core
//!
//! Core library providing the path trie, request binding, security
//! providers, dispatch and the hyper server for Rivet.
//!
//! This crate is not meant to be used directly. Use `rivet-rs` instead.

mod access;
mod app;
mod bind;
mod config;
mod context;
mod dispatch;
mod docs;
mod error;
mod handler;
pub mod path;
mod response;
mod router;
mod security;
mod server;
#[cfg(any(test, feature = "test-utils"))]
mod test_client;

// Referenced by `scalar_param!`
pub use rivet_openapi as openapi;

// Public API
pub use access::{AccessLog, AccessRecord, AccessWriter, TextAccessWriter, TracingAccessWriter};
pub use app::Api;
pub use async_trait::async_trait;
pub use bind::{Arity, Bindings, Delimiter, Input, Param, RuleBuilder, Source};
pub use config::{ConfigError, ServerConfig, DEFAULT_ADDR, DEFAULT_BODY_LIMIT};
pub use context::{
    is_correlation_id, new_correlation_id, Context, ContextBuilder, ErrorHandler, CORRELATION_HEADER,
};
pub use dispatch::Service;
pub use error::{
    get_environment, ApiError, Environment, RegistrationError, RegistrationErrors, Result,
};
pub use handler::{Checked, Endpoint, Handler, ParamDoc};
pub use path::{Lookup, NodeId, PathError, PathParams, PathTrie};
pub use response::{
    Created, ErrorDocument, Json, NoContent, Output, Redirect, Reply, Response, ResponseDoc,
    ResponseDocs, WithStatus,
};
pub use router::{delete, get, head, options, patch, post, put, MethodRouter};
pub use security::{
    ApiKeyProvider, BasicAuthProvider, Principal, Principals, SecurityProvider,
    SecurityRequirement, SecurityRequirements, SimplePrincipal,
};
pub use server::{Server, ServerError};
#[cfg(any(test, feature = "test-utils"))]
pub use test_client::{TestClient, TestRequest, TestResponse};
