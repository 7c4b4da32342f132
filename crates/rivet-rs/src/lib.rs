//! # Rivet
//!
//! A REST framework built around a path trie, declared request bindings and
//! OpenAPI documents generated from the same declarations.
//!
//! ```rust,ignore
//! use rivet_rs::prelude::*;
//!
//! #[derive(Default)]
//! struct UserPath {
//!     id: u64,
//! }
//!
//! impl Input for UserPath {
//!     fn declare(b: &mut Bindings<Self>) {
//!         b.path("id", |s| &mut s.id);
//!     }
//! }
//!
//! async fn get_user(_ctx: Context, input: UserPath) -> Json<u64> {
//!     Json(input.id)
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     Api::new("Users", "1.0.0")
//!         .route("/user/:id", get(get_user))
//!         .serve_spec("/openapi.json")
//!         .run("127.0.0.1:8080")
//!         .await
//! }
//! ```

// Re-export core functionality
pub use rivet_core::*;

pub use rivet_validate as validate;

/// Prelude module - import everything you need with `use rivet_rs::prelude::*`
pub mod prelude {
    pub use rivet_core::{
        async_trait,
        delete,
        get,
        head,
        options,
        patch,
        post,
        put,
        AccessWriter,
        // App builder
        Api,
        // Security
        ApiKeyProvider,
        BasicAuthProvider,
        // Binding
        Bindings,
        Context,
        Created,
        Delimiter,
        Endpoint,
        // Error handling
        ApiError,
        Input,
        Json,
        MethodRouter,
        NoContent,
        Output,
        ParamDoc,
        Principal,
        Redirect,
        RegistrationError,
        RegistrationErrors,
        Reply,
        SecurityProvider,
        SecurityRequirement,
        SecurityRequirements,
        ServerConfig,
        SimplePrincipal,
        TextAccessWriter,
        TracingAccessWriter,
        WithStatus,
    };

    pub use rivet_openapi::{Describe, NamingStyle, ParameterLocation, Shape, Tag};
    pub use rivet_validate::{FromWire, ValidationError};

    // Re-export commonly used external types
    pub use serde::{Deserialize, Serialize};
    pub use tracing::{debug, error, info, trace, warn};
}
