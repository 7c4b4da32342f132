//! # Rivet Validate
//!
//! Value coercion for wire inputs and the aggregate error type binding reports.
//!
//! ```rust
//! use rivet_validate::{DefaultLocale, FromWire, CoercionError};
//!
//! assert_eq!(i16::from_wire("32767", &DefaultLocale), Ok(32767));
//! assert!(matches!(
//!     i16::from_wire("32768", &DefaultLocale),
//!     Err(CoercionError::Overflow { .. })
//! ));
//! ```

mod coerce;
mod error;
mod locale;
mod numeric;

pub use coerce::{Constraints, FromWire, ToWire, WireKind};
pub use error::{CoercionError, FieldError, FieldFault, ValidationError};
pub use locale::{DecimalComma, DefaultLocale, Locale};
pub use numeric::{FloatWidth, IntWidth};
pub use regex::Error as PatternError;
