//! Method routing for a single path
//!
//! Routes are registered on an [`Api`](crate::Api) with a path pattern and a
//! [`MethodRouter`] holding one [`Endpoint`] per HTTP method.
//!
//! # Path Patterns
//!
//! - `/users` - Static path
//! - `/users/:id` - Named parameter, captures one segment
//! - `/files/*rest` - Wildcard, captures the remainder of the path
//!
//! Literal segments win over the variable segment of the same parent, and a
//! parent holds at most one variable segment.
//!
//! # Method Chaining
//!
//! ```rust,ignore
//! use rivet_core::{Api, get, post, put, delete};
//!
//! let api = Api::new("Users", "1.0.0")
//!     .route("/users", get(list).post(create))
//!     .route("/users/:id", get(show).put(update).delete(destroy));
//! ```

use crate::handler::{Endpoint, Handler};
use http::Method;

/// HTTP method router for a single path
#[derive(Debug, Default)]
pub struct MethodRouter {
    pub(crate) endpoints: Vec<(Method, Endpoint)>,
}

impl MethodRouter {
    /// Create a new empty method router
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for any method.
    ///
    /// Registering the same method twice is reported when the API is built.
    pub fn on<H: Handler<T>, T>(mut self, method: Method, handler: H) -> Self {
        self.endpoints.push((method, handler.into_endpoint()));
        self
    }

    pub fn get<H: Handler<T>, T>(self, handler: H) -> Self {
        self.on(Method::GET, handler)
    }

    pub fn post<H: Handler<T>, T>(self, handler: H) -> Self {
        self.on(Method::POST, handler)
    }

    pub fn put<H: Handler<T>, T>(self, handler: H) -> Self {
        self.on(Method::PUT, handler)
    }

    pub fn patch<H: Handler<T>, T>(self, handler: H) -> Self {
        self.on(Method::PATCH, handler)
    }

    pub fn delete<H: Handler<T>, T>(self, handler: H) -> Self {
        self.on(Method::DELETE, handler)
    }

    pub fn head<H: Handler<T>, T>(self, handler: H) -> Self {
        self.on(Method::HEAD, handler)
    }

    pub fn options<H: Handler<T>, T>(self, handler: H) -> Self {
        self.on(Method::OPTIONS, handler)
    }

    /// Methods in registration order
    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.endpoints.iter().map(|(method, _)| method)
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Create a GET route handler
pub fn get<H: Handler<T>, T>(handler: H) -> MethodRouter {
    MethodRouter::new().get(handler)
}

/// Create a POST route handler
pub fn post<H: Handler<T>, T>(handler: H) -> MethodRouter {
    MethodRouter::new().post(handler)
}

/// Create a PUT route handler
pub fn put<H: Handler<T>, T>(handler: H) -> MethodRouter {
    MethodRouter::new().put(handler)
}

/// Create a PATCH route handler
pub fn patch<H: Handler<T>, T>(handler: H) -> MethodRouter {
    MethodRouter::new().patch(handler)
}

/// Create a DELETE route handler
pub fn delete<H: Handler<T>, T>(handler: H) -> MethodRouter {
    MethodRouter::new().delete(handler)
}

pub fn head<H: Handler<T>, T>(handler: H) -> MethodRouter {
    MethodRouter::new().head(handler)
}

pub fn options<H: Handler<T>, T>(handler: H) -> MethodRouter {
    MethodRouter::new().options(handler)
}
