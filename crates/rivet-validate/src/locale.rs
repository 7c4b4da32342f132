//! Formatting strategies for wire values.
//!
//! A [`Locale`] decides how primitives render to and parse from text. Binding
//! and schema derivation never look at the text form directly, so swapping the
//! strategy (for example to [`DecimalComma`]) needs no other change.

use crate::error::CoercionError;
use crate::numeric::{FloatWidth, IntWidth};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use std::num::IntErrorKind;

pub trait Locale: Send + Sync {
    fn format_bool(&self, value: bool) -> String {
        value.to_string()
    }

    fn parse_bool(&self, raw: &str) -> Result<bool, CoercionError> {
        match raw {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
            _ => Err(CoercionError::format(raw, "bool")),
        }
    }

    fn format_int(&self, value: i64) -> String {
        value.to_string()
    }

    /// Parse a signed integer and check it against `width`.
    fn parse_int(&self, raw: &str, width: IntWidth) -> Result<i64, CoercionError> {
        let value = raw.parse::<i64>().map_err(|err| match err.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
                CoercionError::overflow(raw, width.type_name())
            }
            _ => CoercionError::format(raw, width.type_name()),
        })?;
        if !width.contains(value as i128) {
            return Err(CoercionError::overflow(raw, width.type_name()));
        }
        Ok(value)
    }

    fn format_uint(&self, value: u64) -> String {
        value.to_string()
    }

    fn parse_uint(&self, raw: &str, width: IntWidth) -> Result<u64, CoercionError> {
        let value = raw.parse::<u64>().map_err(|err| match err.kind() {
            IntErrorKind::PosOverflow => CoercionError::overflow(raw, width.type_name()),
            _ => CoercionError::format(raw, width.type_name()),
        })?;
        if !width.contains(value as i128) {
            return Err(CoercionError::overflow(raw, width.type_name()));
        }
        Ok(value)
    }

    fn format_float(&self, value: f64) -> String {
        value.to_string()
    }

    fn parse_float(&self, raw: &str, width: FloatWidth) -> Result<f64, CoercionError> {
        parse_float_text(raw, raw, width)
    }

    fn format_date(&self, value: &NaiveDate) -> String {
        value.format("%Y-%m-%d").to_string()
    }

    fn parse_date(&self, raw: &str) -> Result<NaiveDate, CoercionError> {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| CoercionError::format(raw, "date"))
    }

    fn format_date_time(&self, value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    fn parse_date_time(&self, raw: &str) -> Result<DateTime<Utc>, CoercionError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| CoercionError::format(raw, "date-time"))
    }
}

/// Base-10 integers, `.` as decimal separator, ISO 8601 dates.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLocale;

impl Locale for DefaultLocale {}

/// Like [`DefaultLocale`] but floats use `,` as decimal separator.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalComma;

impl Locale for DecimalComma {
    fn format_float(&self, value: f64) -> String {
        value.to_string().replace('.', ",")
    }

    fn parse_float(&self, raw: &str, width: FloatWidth) -> Result<f64, CoercionError> {
        if raw.contains('.') {
            return Err(CoercionError::format(raw, width.type_name()));
        }
        parse_float_text(&raw.replace(',', "."), raw, width)
    }
}

fn parse_float_text(text: &str, raw: &str, width: FloatWidth) -> Result<f64, CoercionError> {
    let value = text
        .parse::<f64>()
        .map_err(|_| CoercionError::format(raw, width.type_name()))?;
    if value.is_nan() {
        return Ok(value);
    }
    // Rust parses out-of-range literals to infinity instead of failing.
    let explicit_inf = text.to_ascii_lowercase().contains("inf");
    if !explicit_inf && (value.is_infinite() || value.abs() > width.max()) {
        return Err(CoercionError::overflow(raw, width.type_name()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn int_overflow_vs_format() {
        let l = DefaultLocale;
        assert_eq!(l.parse_int("32767", IntWidth::I16), Ok(32767));
        assert!(matches!(
            l.parse_int("32768", IntWidth::I16),
            Err(CoercionError::Overflow { .. })
        ));
        assert!(matches!(
            l.parse_int("99999999999999999999", IntWidth::I64),
            Err(CoercionError::Overflow { .. })
        ));
        assert!(matches!(
            l.parse_int("4x", IntWidth::I32),
            Err(CoercionError::Format { target: "i32", .. })
        ));
    }

    #[test]
    fn negative_unsigned_is_a_format_error() {
        assert!(matches!(
            DefaultLocale.parse_uint("-1", IntWidth::U8),
            Err(CoercionError::Format { .. })
        ));
        assert!(matches!(
            DefaultLocale.parse_uint("256", IntWidth::U8),
            Err(CoercionError::Overflow { .. })
        ));
    }

    #[test]
    fn float_overflow() {
        assert!(matches!(
            DefaultLocale.parse_float("1e39", FloatWidth::F32),
            Err(CoercionError::Overflow { .. })
        ));
        assert!(DefaultLocale.parse_float("1e39", FloatWidth::F64).is_ok());
        assert!(matches!(
            DefaultLocale.parse_float("1e400", FloatWidth::F64),
            Err(CoercionError::Overflow { .. })
        ));
        assert!(DefaultLocale.parse_float("-inf", FloatWidth::F64).is_ok());
    }

    #[test]
    fn decimal_comma_round_trips_text() {
        let l = DecimalComma;
        assert_eq!(l.parse_float("3,25", FloatWidth::F64), Ok(3.25));
        assert_eq!(l.format_float(3.25), "3,25");
        assert!(l.parse_float("3.25", FloatWidth::F64).is_err());
    }

    #[test]
    fn dates() {
        let l = DefaultLocale;
        let date = l.parse_date("2024-02-29").unwrap();
        assert_eq!(l.format_date(&date), "2024-02-29");
        assert!(l.parse_date("2023-02-29").is_err());
        let dt = l.parse_date_time("2024-01-02T03:04:05+02:00").unwrap();
        assert_eq!(l.format_date_time(&dt), "2024-01-02T01:04:05Z");
    }

    #[test]
    fn bools() {
        assert_eq!(DefaultLocale.parse_bool("T"), Ok(true));
        assert_eq!(DefaultLocale.parse_bool("0"), Ok(false));
        assert!(DefaultLocale.parse_bool("yes").is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_i16_accepts_exactly_its_range(value in -100_000i64..100_000i64) {
            let parsed = DefaultLocale.parse_int(&value.to_string(), IntWidth::I16);
            if (i16::MIN as i64..=i16::MAX as i64).contains(&value) {
                prop_assert_eq!(parsed, Ok(value));
            } else {
                let is_overflow = matches!(parsed, Err(CoercionError::Overflow { .. }));
                prop_assert!(is_overflow);
            }
        }
    }
}
