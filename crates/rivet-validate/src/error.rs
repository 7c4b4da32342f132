//! Coercion faults and the aggregate, field-path keyed validation error.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure converting one raw wire token into a typed value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionError {
    /// The text cannot be interpreted as the target type.
    #[error("cannot parse {raw:?} as {target}")]
    Format { raw: String, target: &'static str },

    /// The text is numeric but does not fit the target width.
    #[error("value {raw:?} is too big to fit the target type {target}")]
    Overflow { raw: String, target: &'static str },

    #[error("value {raw:?} does not match pattern {pattern:?}")]
    Pattern { raw: String, pattern: String },

    #[error("length {len} is outside the allowed range {}", describe_range(.min, .max))]
    Length {
        len: usize,
        min: Option<usize>,
        max: Option<usize>,
    },

    #[error("value {raw:?} is not one of {allowed:?}")]
    Enum { raw: String, allowed: Vec<String> },

    #[error("value {raw:?} is outside the allowed range {}", describe_bounds(.minimum, .maximum))]
    Range {
        raw: String,
        minimum: Option<f64>,
        maximum: Option<f64>,
    },
}

impl CoercionError {
    pub fn format(raw: impl Into<String>, target: &'static str) -> Self {
        CoercionError::Format {
            raw: raw.into(),
            target,
        }
    }

    pub fn overflow(raw: impl Into<String>, target: &'static str) -> Self {
        CoercionError::Overflow {
            raw: raw.into(),
            target,
        }
    }

    /// Machine readable code used in [`FieldError::code`].
    pub fn code(&self) -> &'static str {
        match self {
            CoercionError::Format { .. } => "format",
            CoercionError::Overflow { .. } => "overflow",
            CoercionError::Pattern { .. } => "pattern",
            CoercionError::Length { .. } => "length",
            CoercionError::Enum { .. } => "enum",
            CoercionError::Range { .. } => "range",
        }
    }
}

fn describe_bounds(min: &Option<f64>, max: &Option<f64>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("[{min}, {max}]"),
        (Some(min), None) => format!("[{min}, ..)"),
        (None, Some(max)) => format!("(.., {max}]"),
        (None, None) => "(.., ..)".to_string(),
    }
}

fn describe_range(min: &Option<usize>, max: &Option<usize>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("[{min}, {max}]"),
        (Some(min), None) => format!("[{min}, ..)"),
        (None, Some(max)) => format!("[0, {max}]"),
        (None, None) => "[0, ..)".to_string(),
    }
}

/// Why a single field could not be bound.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldFault {
    #[error("requires a value")]
    Required,

    #[error("expected {expected} values, got {actual}")]
    Count { expected: usize, actual: usize },

    #[error("value {0:?} is repeated")]
    Duplicate(String),

    #[error(transparent)]
    Coercion(#[from] CoercionError),

    /// A structured payload (request body) was rejected by its decoder.
    #[error("{0}")]
    Invalid(String),
}

impl FieldFault {
    pub fn code(&self) -> &'static str {
        match self {
            FieldFault::Required => "required",
            FieldFault::Count { .. } => "count",
            FieldFault::Duplicate(_) => "unique",
            FieldFault::Coercion(err) => err.code(),
            FieldFault::Invalid(_) => "invalid",
        }
    }
}

/// A single field validation error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field path, e.g. `query/limit` or `header/x-tags`
    pub field: String,
    /// Rule code (`required`, `count`, `unique`, `format`, `overflow`, `range`, ...)
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl FieldError {
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn from_fault(field: impl Into<String>, fault: &FieldFault) -> Self {
        Self::new(field, fault.code(), fault.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
    fields: Vec<FieldError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

/// Every field error collected while binding one request.
///
/// Binding never stops at the first failing field; callers receive all of
/// them at once. Serializes as:
///
/// ```json
/// {
///   "error": {
///     "type": "validation_error",
///     "message": "Validation failed",
///     "fields": [{"field": "query/limit", "code": "overflow", "message": "..."}]
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationError {
    pub fields: Vec<FieldError>,
    pub message: String,
}

impl ValidationError {
    pub fn new(fields: Vec<FieldError>) -> Self {
        Self {
            fields,
            message: "Validation failed".to_string(),
        }
    }

    pub fn field(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(vec![FieldError::new(field, code, message)])
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn add(&mut self, error: FieldError) {
        self.fields.push(error);
    }

    /// Record a fault for `field`.
    pub fn add_fault(&mut self, field: impl Into<String>, fault: &FieldFault) {
        self.fields.push(FieldError::from_fault(field, fault));
    }

    /// Merge another aggregate, prefixing each of its paths with `prefix`.
    pub fn extend_prefixed(&mut self, prefix: &str, other: ValidationError) {
        for mut error in other.fields {
            if !prefix.is_empty() {
                error.field = if error.field.is_empty() {
                    prefix.to_string()
                } else {
                    format!("{prefix}.{}", error.field)
                };
            }
            self.fields.push(error);
        }
    }

    /// Field errors recorded under `field`.
    pub fn get(&self, field: &str) -> Vec<&FieldError> {
        self.fields.iter().filter(|e| e.field == field).collect()
    }

    /// `Ok(value)` when nothing was recorded, otherwise `Err(self)`.
    pub fn into_result<T>(self, value: T) -> Result<T, ValidationError> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.wrapper()).unwrap_or_default()
    }

    fn wrapper(&self) -> ErrorWrapper {
        ErrorWrapper {
            error: ErrorBody {
                error_type: "validation_error".to_string(),
                message: self.message.clone(),
                fields: self.fields.clone(),
            },
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.message)?;
        let details: Vec<String> = self
            .fields
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", details.join(", "))
    }
}

impl std::error::Error for ValidationError {}

impl Serialize for ValidationError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.wrapper().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_keeps_every_field() {
        let mut err = ValidationError::default();
        err.add_fault("query/a", &FieldFault::Required);
        err.add_fault("query/b", &FieldFault::Count { expected: 3, actual: 1 });

        assert_eq!(err.len(), 2);
        assert_eq!(err.get("query/b")[0].code, "count");
        assert_eq!(err.get("query/b")[0].message, "expected 3 values, got 1");
    }

    #[test]
    fn prefixing_nests_paths() {
        let mut outer = ValidationError::default();
        let inner = ValidationError::field("city", "required", "requires a value");
        outer.extend_prefixed("address", inner);
        assert_eq!(outer.fields[0].field, "address.city");
    }

    #[test]
    fn serializes_to_error_envelope() {
        let err = ValidationError::field("path/id", "format", "bad");
        let json = err.to_json();
        assert_eq!(json["error"]["type"], "validation_error");
        assert_eq!(json["error"]["fields"][0]["field"], "path/id");
    }

    #[test]
    fn coercion_codes() {
        assert_eq!(CoercionError::overflow("1", "i8").code(), "overflow");
        assert_eq!(FieldFault::from(CoercionError::format("x", "i8")).code(), "format");
        let length = CoercionError::Length { len: 9, min: Some(1), max: Some(4) };
        assert_eq!(length.to_string(), "length 9 is outside the allowed range [1, 4]");
    }

    #[test]
    fn empty_error_converts_to_ok() {
        assert_eq!(ValidationError::default().into_result(5), Ok(5));
    }
}
