//! Typed conversion of single wire tokens.

use crate::error::{CoercionError, FieldFault};
use crate::locale::Locale;
use crate::numeric::{FloatWidth, IntWidth};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;

/// Primitive family a wire token decodes into.
///
/// Compared against the schema type of a binding at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireKind {
    Boolean,
    Integer,
    Number,
    String,
}

impl WireKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            WireKind::Boolean => "boolean",
            WireKind::Integer => "integer",
            WireKind::Number => "number",
            WireKind::String => "string",
        }
    }
}

/// Decode a value from one raw token.
pub trait FromWire: Sized {
    const KIND: WireKind;

    fn from_wire(raw: &str, locale: &dyn Locale) -> Result<Self, CoercionError>;
}

/// Render a value as one raw token.
pub trait ToWire {
    fn to_wire(&self, locale: &dyn Locale) -> String;
}

macro_rules! signed_wire {
    ($($ty:ty => $width:expr),* $(,)?) => {$(
        impl FromWire for $ty {
            const KIND: WireKind = WireKind::Integer;

            fn from_wire(raw: &str, locale: &dyn Locale) -> Result<Self, CoercionError> {
                let value = locale.parse_int(raw, $width)?;
                <$ty>::try_from(value).map_err(|_| CoercionError::overflow(raw, $width.type_name()))
            }
        }

        impl ToWire for $ty {
            fn to_wire(&self, locale: &dyn Locale) -> String {
                locale.format_int(*self as i64)
            }
        }
    )*};
}

macro_rules! unsigned_wire {
    ($($ty:ty => $width:expr),* $(,)?) => {$(
        impl FromWire for $ty {
            const KIND: WireKind = WireKind::Integer;

            fn from_wire(raw: &str, locale: &dyn Locale) -> Result<Self, CoercionError> {
                let value = locale.parse_uint(raw, $width)?;
                <$ty>::try_from(value).map_err(|_| CoercionError::overflow(raw, $width.type_name()))
            }
        }

        impl ToWire for $ty {
            fn to_wire(&self, locale: &dyn Locale) -> String {
                locale.format_uint(*self as u64)
            }
        }
    )*};
}

signed_wire! {
    i8 => IntWidth::I8,
    i16 => IntWidth::I16,
    i32 => IntWidth::I32,
    i64 => IntWidth::I64,
}

unsigned_wire! {
    u8 => IntWidth::U8,
    u16 => IntWidth::U16,
    u32 => IntWidth::U32,
    u64 => IntWidth::U64,
}

impl FromWire for f32 {
    const KIND: WireKind = WireKind::Number;

    fn from_wire(raw: &str, locale: &dyn Locale) -> Result<Self, CoercionError> {
        locale.parse_float(raw, FloatWidth::F32).map(|v| v as f32)
    }
}

impl ToWire for f32 {
    fn to_wire(&self, locale: &dyn Locale) -> String {
        locale.format_float(*self as f64)
    }
}

impl FromWire for f64 {
    const KIND: WireKind = WireKind::Number;

    fn from_wire(raw: &str, locale: &dyn Locale) -> Result<Self, CoercionError> {
        locale.parse_float(raw, FloatWidth::F64)
    }
}

impl ToWire for f64 {
    fn to_wire(&self, locale: &dyn Locale) -> String {
        locale.format_float(*self)
    }
}

impl FromWire for bool {
    const KIND: WireKind = WireKind::Boolean;

    fn from_wire(raw: &str, locale: &dyn Locale) -> Result<Self, CoercionError> {
        locale.parse_bool(raw)
    }
}

impl ToWire for bool {
    fn to_wire(&self, locale: &dyn Locale) -> String {
        locale.format_bool(*self)
    }
}

impl FromWire for String {
    const KIND: WireKind = WireKind::String;

    fn from_wire(raw: &str, _locale: &dyn Locale) -> Result<Self, CoercionError> {
        Ok(raw.to_string())
    }
}

impl ToWire for String {
    fn to_wire(&self, _locale: &dyn Locale) -> String {
        self.clone()
    }
}

impl FromWire for NaiveDate {
    const KIND: WireKind = WireKind::String;

    fn from_wire(raw: &str, locale: &dyn Locale) -> Result<Self, CoercionError> {
        locale.parse_date(raw)
    }
}

impl ToWire for NaiveDate {
    fn to_wire(&self, locale: &dyn Locale) -> String {
        locale.format_date(self)
    }
}

impl FromWire for DateTime<Utc> {
    const KIND: WireKind = WireKind::String;

    fn from_wire(raw: &str, locale: &dyn Locale) -> Result<Self, CoercionError> {
        locale.parse_date_time(raw)
    }
}

impl ToWire for DateTime<Utc> {
    fn to_wire(&self, locale: &dyn Locale) -> String {
        locale.format_date_time(self)
    }
}

/// Rules checked on the raw tokens of one binding.
///
/// Built once per binding from the field's resolved schema. Text rules run
/// on each token before decoding, numeric bounds on each decoded token, and
/// item rules on the token list as a whole.
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<Regex>,
    allowed: Option<Vec<String>>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    min_items: Option<usize>,
    max_items: Option<usize>,
    unique_items: bool,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.pattern = Some(Regex::new(pattern)?);
        Ok(self)
    }

    pub fn one_of(mut self, allowed: Vec<String>) -> Self {
        self.allowed = Some(allowed);
        self
    }

    pub fn range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    pub fn items(mut self, min: Option<usize>, max: Option<usize>, unique: bool) -> Self {
        self.min_items = min;
        self.max_items = max;
        self.unique_items = unique;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.min_length.is_none()
            && self.max_length.is_none()
            && self.pattern.is_none()
            && self.allowed.is_none()
            && !self.has_range()
            && !self.has_items()
    }

    pub fn has_range(&self) -> bool {
        self.minimum.is_some() || self.maximum.is_some()
    }

    pub fn has_items(&self) -> bool {
        self.min_items.is_some() || self.max_items.is_some() || self.unique_items
    }

    pub fn check(&self, raw: &str) -> Result<(), CoercionError> {
        let len = raw.chars().count();
        let too_short = self.min_length.is_some_and(|min| len < min);
        let too_long = self.max_length.is_some_and(|max| len > max);
        if too_short || too_long {
            return Err(CoercionError::Length {
                len,
                min: self.min_length,
                max: self.max_length,
            });
        }
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(raw) {
                return Err(CoercionError::Pattern {
                    raw: raw.to_string(),
                    pattern: pattern.as_str().to_string(),
                });
            }
        }
        if let Some(allowed) = &self.allowed {
            if !allowed.iter().any(|a| a == raw) {
                return Err(CoercionError::Enum {
                    raw: raw.to_string(),
                    allowed: allowed.clone(),
                });
            }
        }
        Ok(())
    }

    /// Check a numeric token against the inclusive bounds.
    ///
    /// Tokens that do not read as a number pass; decoding reports those.
    pub fn check_range(&self, raw: &str, locale: &dyn Locale) -> Result<(), CoercionError> {
        if !self.has_range() {
            return Ok(());
        }
        let Ok(value) = locale.parse_float(raw, FloatWidth::F64) else {
            return Ok(());
        };
        let below = self.minimum.is_some_and(|min| value < min);
        let above = self.maximum.is_some_and(|max| value > max);
        if below || above {
            return Err(CoercionError::Range {
                raw: raw.to_string(),
                minimum: self.minimum,
                maximum: self.maximum,
            });
        }
        Ok(())
    }

    /// Check the token list of a sequence binding.
    pub fn check_items(&self, tokens: &[&str]) -> Result<(), FieldFault> {
        let actual = tokens.len();
        if let Some(min) = self.min_items.filter(|min| actual < *min) {
            return Err(FieldFault::Count { expected: min, actual });
        }
        if let Some(max) = self.max_items.filter(|max| actual > *max) {
            return Err(FieldFault::Count { expected: max, actual });
        }
        if self.unique_items {
            for (i, token) in tokens.iter().enumerate() {
                if tokens[..i].contains(token) {
                    return Err(FieldFault::Duplicate(token.to_string()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::{DecimalComma, DefaultLocale};

    #[test]
    fn i16_boundary() {
        assert_eq!(i16::from_wire("32767", &DefaultLocale), Ok(32767));
        assert_eq!(
            i16::from_wire("32768", &DefaultLocale),
            Err(CoercionError::overflow("32768", "i16"))
        );
        assert_eq!(i16::from_wire("-32768", &DefaultLocale), Ok(-32768));
    }

    #[test]
    fn format_error_carries_raw_text_and_target() {
        match u32::from_wire("twelve", &DefaultLocale) {
            Err(CoercionError::Format { raw, target }) => {
                assert_eq!(raw, "twelve");
                assert_eq!(target, "u32");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn locale_is_pluggable() {
        assert_eq!(f64::from_wire("1,5", &DecimalComma), Ok(1.5));
        assert_eq!(1.5f64.to_wire(&DecimalComma), "1,5");
        assert!(f64::from_wire("1,5", &DefaultLocale).is_err());
    }

    #[test]
    fn kinds() {
        assert_eq!(<u8 as FromWire>::KIND, WireKind::Integer);
        assert_eq!(<f32 as FromWire>::KIND, WireKind::Number);
        assert_eq!(<NaiveDate as FromWire>::KIND, WireKind::String);
    }

    #[test]
    fn constraints_check_text() {
        let c = Constraints::new()
            .length(Some(2), Some(4))
            .pattern("^[a-z]+$")
            .unwrap();
        assert!(c.check("abc").is_ok());
        assert!(matches!(c.check("a"), Err(CoercionError::Length { .. })));
        assert!(matches!(c.check("ABC"), Err(CoercionError::Pattern { .. })));

        let e = Constraints::new().one_of(vec!["asc".into(), "desc".into()]);
        assert!(e.check("asc").is_ok());
        assert!(matches!(e.check("up"), Err(CoercionError::Enum { .. })));
    }

    #[test]
    fn constraints_check_bounds() {
        let c = Constraints::new().range(Some(1.0), Some(10.0));
        assert!(c.check_range("1", &DefaultLocale).is_ok());
        assert!(c.check_range("10", &DefaultLocale).is_ok());
        match c.check_range("11", &DefaultLocale) {
            Err(err @ CoercionError::Range { .. }) => assert_eq!(err.code(), "range"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(c.check_range("0", &DefaultLocale).is_err());

        assert!(c.check_range("ten", &DefaultLocale).is_ok());
        assert!(Constraints::new().is_empty());
    }

    #[test]
    fn constraints_check_items() {
        let c = Constraints::new().items(Some(2), Some(3), true);
        assert!(!c.is_empty());
        assert!(c.check_items(&["a", "b"]).is_ok());
        assert_eq!(
            c.check_items(&["a"]),
            Err(FieldFault::Count { expected: 2, actual: 1 })
        );
        assert_eq!(
            c.check_items(&["a", "b", "c", "d"]),
            Err(FieldFault::Count { expected: 3, actual: 4 })
        );
        let dup = c.check_items(&["a", "b", "a"]).unwrap_err();
        assert_eq!(dup, FieldFault::Duplicate("a".into()));
        assert_eq!(dup.code(), "unique");
    }
}
