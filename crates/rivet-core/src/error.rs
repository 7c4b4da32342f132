//! Error types for Rivet

use crate::path::PathError;
use http::{Method, StatusCode};
use rivet_openapi::{ComponentConflict, SchemaError};
use rivet_validate::{FieldError, ValidationError};
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Result type alias for request-time operations
pub type Result<T, E = ApiError> = std::result::Result<T, E>;

/// Deployment environment, decides whether internal details are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Read `RIVET_ENV`; `production` or `prod` selects production.
    pub fn from_env() -> Self {
        match std::env::var("RIVET_ENV") {
            Ok(value) => Self::parse(&value),
            Err(_) => Environment::Development,
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

/// Process environment, read once.
pub fn get_environment() -> Environment {
    *ENVIRONMENT.get_or_init(Environment::from_env)
}

/// Request-time error rendered as a JSON response.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    /// Error type identifier
    pub error_type: String,
    pub message: String,
    /// Field-level binding errors
    pub fields: Option<Vec<FieldError>>,
    /// Logged but never rendered in production
    pub(crate) internal: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error_type: error_type.into(),
            message: message.into(),
            fields: None,
            internal: None,
        }
    }

    /// 422 carrying every field error of a failed bind.
    pub fn validation(err: ValidationError) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            error_type: "validation_error".to_string(),
            message: err.message,
            fields: Some(err.fields),
            internal: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn method_not_allowed(method: &Method, path: &str) -> Self {
        Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            format!("Method {method} not allowed for {path}"),
        )
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            format!("Request body exceeds {limit} bytes"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    pub fn not_implemented() -> Self {
        Self::new(
            StatusCode::NOT_IMPLEMENTED,
            "not_implemented",
            "The handler produced no response",
        )
    }

    /// Add internal details (for logging, hidden from response in prod)
    pub fn with_internal(mut self, details: impl Into<String>) -> Self {
        self.internal = Some(details.into());
        self
    }

    pub fn internal_details(&self) -> Option<&str> {
        self.internal.as_deref()
    }

    pub(crate) fn to_body(&self, request_id: Option<&str>, env: Environment) -> ErrorResponse {
        let message = match (&self.internal, env) {
            (Some(details), Environment::Development) => format!("{} ({details})", self.message),
            _ => self.message.clone(),
        };
        ErrorResponse {
            error: ErrorBody {
                error_type: self.error_type.clone(),
                message,
                fields: self.fields.clone(),
            },
            request_id: request_id.map(str::to_string),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

impl std::error::Error for ApiError {}

/// JSON representation of API error response
#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub error: ErrorBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::bad_request(format!("Invalid JSON: {err}"))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::internal("I/O error").with_internal(err.to_string())
    }
}

/// A declaration mistake found while building the API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("{route}: {source}")]
    Schema {
        route: String,
        #[source]
        source: SchemaError,
    },

    #[error(transparent)]
    Component(#[from] ComponentConflict),

    #[error("{route}: more than one binding targets the request body")]
    MultipleBodies { route: String },

    #[error("{route}: {method} operations cannot declare a request body")]
    BodyNotAllowed { route: String, method: Method },

    #[error("{route}: {location} parameter {name:?} is bound more than once")]
    DuplicateBinding {
        route: String,
        location: &'static str,
        name: String,
    },

    #[error("{route}: path parameter {name:?} is not a segment of the route")]
    UnknownPathParam { route: String, name: String },

    #[error("{route}: {location} parameter {name:?} cannot take multiple values")]
    MultiValueNotAllowed {
        route: String,
        location: &'static str,
        name: String,
    },

    #[error("{route}: {binding} takes a single value and cannot split on a delimiter")]
    DelimiterNotAllowed { route: String, binding: String },

    #[error("{route}: {binding} is {wire} on the wire but its schema is {schema}")]
    TypeMismatch {
        route: String,
        binding: String,
        wire: &'static str,
        schema: String,
    },

    #[error("{route}: {binding} has an invalid pattern: {message}")]
    InvalidPattern {
        route: String,
        binding: String,
        message: String,
    },

    #[error("{route}: documented parameter {name:?} in {location} is not bound")]
    UndocumentedParam {
        route: String,
        location: &'static str,
        name: String,
    },

    #[error("{route}: documented parameter {name:?} has type {documented}, binding has {bound}")]
    DocumentedTypeMismatch {
        route: String,
        name: String,
        documented: &'static str,
        bound: &'static str,
    },

    #[error("{route}: response status {status} declared more than once")]
    DuplicateResponse { route: String, status: u16 },

    #[error("security scheme {0:?} is registered more than once")]
    DuplicateProvider(String),

    #[error("{route}: security requirement names unknown scheme {scheme:?}")]
    UnknownScheme { route: String, scheme: String },
}

/// Every registration fault found while building, reported together.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationErrors(pub Vec<RegistrationError>);

impl RegistrationErrors {
    pub fn iter(&self) -> impl Iterator<Item = &RegistrationError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RegistrationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} registration error(s):", self.0.len())?;
        for err in &self.0 {
            writeln!(f, "  - {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RegistrationErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_details_hidden_in_production() {
        let err = ApiError::internal("boom").with_internal("stack");
        let dev = err.to_body(Some("ABC"), Environment::Development);
        let prod = err.to_body(Some("ABC"), Environment::Production);
        assert_eq!(dev.error.message, "boom (stack)");
        assert_eq!(prod.error.message, "boom");
        assert_eq!(prod.request_id.as_deref(), Some("ABC"));
    }

    #[test]
    fn validation_error_keeps_fields() {
        let mut v = ValidationError::default();
        v.add(FieldError::new("query/a", "required", "requires a value"));
        v.add(FieldError::new("query/b", "required", "requires a value"));
        let err = ApiError::from(v);
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.fields.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn environment_parse() {
        assert_eq!(Environment::parse("PROD"), Environment::Production);
        assert_eq!(Environment::parse("staging"), Environment::Development);
    }

    #[test]
    fn registration_errors_list_every_fault() {
        let errs = RegistrationErrors(vec![
            RegistrationError::DuplicateProvider("basic".into()),
            RegistrationError::MultipleBodies { route: "PUT /user".into() },
        ]);
        let text = errs.to_string();
        assert!(text.starts_with("2 registration error(s):"));
        assert!(text.contains("PUT /user: more than one binding"));
    }
}
