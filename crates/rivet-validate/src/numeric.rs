//! Numeric width table.
//!
//! The same table drives runtime coercion (overflow checks) and the
//! `minimum`/`maximum`/`format` keywords emitted into schemas.

/// Width and signedness of an integer target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntWidth {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl IntWidth {
    /// Smallest representable value.
    pub const fn min(self) -> i128 {
        match self {
            IntWidth::I8 => i8::MIN as i128,
            IntWidth::I16 => i16::MIN as i128,
            IntWidth::I32 => i32::MIN as i128,
            IntWidth::I64 => i64::MIN as i128,
            IntWidth::U8 | IntWidth::U16 | IntWidth::U32 | IntWidth::U64 => 0,
        }
    }

    /// Largest representable value.
    pub const fn max(self) -> i128 {
        match self {
            IntWidth::I8 => i8::MAX as i128,
            IntWidth::I16 => i16::MAX as i128,
            IntWidth::I32 => i32::MAX as i128,
            IntWidth::I64 => i64::MAX as i128,
            IntWidth::U8 => u8::MAX as i128,
            IntWidth::U16 => u16::MAX as i128,
            IntWidth::U32 => u32::MAX as i128,
            IntWidth::U64 => u64::MAX as i128,
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            IntWidth::I8 | IntWidth::I16 | IntWidth::I32 | IntWidth::I64
        )
    }

    pub fn contains(self, value: i128) -> bool {
        value >= self.min() && value <= self.max()
    }

    /// OpenAPI format tag.
    pub const fn format(self) -> &'static str {
        match self {
            IntWidth::I8 => "int8",
            IntWidth::I16 => "int16",
            IntWidth::I32 => "int32",
            IntWidth::I64 => "int64",
            IntWidth::U8 => "uint8",
            IntWidth::U16 => "uint16",
            IntWidth::U32 => "uint32",
            IntWidth::U64 => "uint64",
        }
    }

    /// Rust type name, used in coercion error messages.
    pub const fn type_name(self) -> &'static str {
        match self {
            IntWidth::I8 => "i8",
            IntWidth::I16 => "i16",
            IntWidth::I32 => "i32",
            IntWidth::I64 => "i64",
            IntWidth::U8 => "u8",
            IntWidth::U16 => "u16",
            IntWidth::U32 => "u32",
            IntWidth::U64 => "u64",
        }
    }
}

/// Precision of a floating point target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatWidth {
    F32,
    F64,
}

impl FloatWidth {
    pub const fn max(self) -> f64 {
        match self {
            FloatWidth::F32 => f32::MAX as f64,
            FloatWidth::F64 => f64::MAX,
        }
    }

    pub const fn format(self) -> &'static str {
        match self {
            FloatWidth::F32 => "float",
            FloatWidth::F64 => "double",
        }
    }

    pub const fn type_name(self) -> &'static str {
        match self {
            FloatWidth::F32 => "f32",
            FloatWidth::F64 => "f64",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_16_bit_bounds_are_exact() {
        assert_eq!(IntWidth::I16.min(), -32768);
        assert_eq!(IntWidth::I16.max(), 32767);
        assert!(IntWidth::I16.contains(32767));
        assert!(!IntWidth::I16.contains(32768));
    }

    #[test]
    fn unsigned_widths_start_at_zero() {
        for width in [IntWidth::U8, IntWidth::U16, IntWidth::U32, IntWidth::U64] {
            assert_eq!(width.min(), 0);
            assert!(!width.is_signed());
            assert!(!width.contains(-1));
        }
        assert_eq!(IntWidth::U64.max(), u64::MAX as i128);
    }

    #[test]
    fn format_tags() {
        assert_eq!(IntWidth::U32.format(), "uint32");
        assert_eq!(FloatWidth::F32.format(), "float");
        assert_eq!(FloatWidth::F64.format(), "double");
    }
}
