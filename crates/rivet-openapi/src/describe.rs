//! Type descriptors.
//!
//! A type describes its wire shape once through [`Describe`]. The schema
//! registry turns shapes into [`Schema`]s and the binder reads the same
//! descriptors, so documentation and request parsing cannot drift apart.
//!
//! ```rust
//! use rivet_openapi::{Describe, Shape};
//! use std::borrow::Cow;
//!
//! struct User {
//!     id: u64,
//!     name: String,
//!     email: Option<String>,
//! }
//!
//! impl Describe for User {
//!     fn type_name() -> Option<Cow<'static, str>> {
//!         Some("User".into())
//!     }
//!
//!     fn shape() -> Shape {
//!         Shape::record()
//!             .field::<u64>("id")
//!             .field::<String>("name")
//!             .field::<Option<String>>("email")
//!             .build()
//!     }
//! }
//! ```

use crate::schema::Schema;
use chrono::{DateTime, NaiveDate, Utc};
use rivet_validate::{FloatWidth, IntWidth};
use std::any::TypeId;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

pub trait Describe: 'static {
    /// Name of a named composite type. Named types are stored once in the
    /// component table and referenced everywhere else.
    fn type_name() -> Option<Cow<'static, str>> {
        None
    }

    fn shape() -> Shape;
}

/// Handle to a described type, resolved lazily so recursive types work.
#[derive(Clone, Copy)]
pub struct TypeRef {
    id: TypeId,
    rust_name: &'static str,
    name: fn() -> Option<Cow<'static, str>>,
    shape: fn() -> Shape,
}

impl TypeRef {
    pub fn of<T: Describe>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            rust_name: std::any::type_name::<T>(),
            name: T::type_name,
            shape: T::shape,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn rust_name(&self) -> &'static str {
        self.rust_name
    }

    pub fn name(&self) -> Option<Cow<'static, str>> {
        (self.name)()
    }

    pub fn shape(&self) -> Shape {
        (self.shape)()
    }
}

impl std::fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TypeRef").field(&self.rust_name).finish()
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Structural kinds a type can take.
#[derive(Debug, Clone)]
pub enum Shape {
    Boolean,
    Integer(IntWidth),
    Number(FloatWidth),
    String(StringShape),
    Sequence(SequenceShape),
    Map { key: TypeRef, value: TypeRef },
    Record(RecordShape),
    /// Nullable wrapper, documented as `oneOf: [T, null]`.
    Optional(TypeRef),
    /// Transparent wrapper with the same schema as the inner type.
    Alias(TypeRef),
    /// Literal schema supplied by the type itself.
    Custom(Schema),
    /// Any JSON value.
    Any,
}

impl Shape {
    pub fn string() -> Shape {
        Shape::String(StringShape::default())
    }

    pub fn record() -> RecordBuilder {
        RecordBuilder::default()
    }

    /// A string restricted to the given values.
    pub fn string_enum<I, S>(values: I) -> Shape
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Shape::String(StringShape::default().one_of(values))
    }

    pub fn sequence<T: Describe>() -> SequenceShape {
        SequenceShape::new(TypeRef::of::<T>())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringShape {
    pub format: Option<Cow<'static, str>>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<String>,
    pub allowed: Option<Vec<String>>,
}

impl StringShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(mut self, format: impl Into<Cow<'static, str>>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone)]
pub struct SequenceShape {
    pub item: TypeRef,
    /// Exact length for fixed-size arrays.
    pub fixed: Option<usize>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub unique: bool,
}

impl SequenceShape {
    pub fn new(item: TypeRef) -> Self {
        Self {
            item,
            fixed: None,
            min_items: None,
            max_items: None,
            unique: false,
        }
    }

    pub fn fixed(mut self, len: usize) -> Self {
        self.fixed = Some(len);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_items = min;
        self.max_items = max;
        self
    }
}

/// One property of a record.
#[derive(Debug, Clone)]
pub struct FieldShape {
    pub name: Cow<'static, str>,
    pub wire_name: Option<Cow<'static, str>>,
    pub required: bool,
    pub skip: bool,
    pub description: Option<String>,
    pub ty: TypeRef,
}

impl FieldShape {
    /// A field named `name`. `Option<T>` fields start out optional.
    pub fn new<T: Describe>(name: impl Into<Cow<'static, str>>) -> Self {
        let ty = TypeRef::of::<T>();
        let required = !matches!(ty.shape(), Shape::Optional(_));
        Self {
            name: name.into(),
            wire_name: None,
            required,
            skip: false,
            description: None,
            ty,
        }
    }

    /// Property name on the wire, defaults to the field name.
    pub fn rename(mut self, wire_name: impl Into<Cow<'static, str>>) -> Self {
        self.wire_name = Some(wire_name.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Exclude the field from the wire shape entirely.
    pub fn skip(mut self) -> Self {
        self.skip = true;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn wire_name(&self) -> &str {
        self.wire_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordShape {
    pub fields: Vec<FieldShape>,
    pub description: Option<String>,
}

#[derive(Debug, Default)]
pub struct RecordBuilder {
    record: RecordShape,
}

impl RecordBuilder {
    pub fn field<T: Describe>(self, name: impl Into<Cow<'static, str>>) -> Self {
        self.with(FieldShape::new::<T>(name))
    }

    pub fn optional<T: Describe>(self, name: impl Into<Cow<'static, str>>) -> Self {
        self.with(FieldShape::new::<T>(name).optional())
    }

    pub fn with(mut self, field: FieldShape) -> Self {
        self.record.fields.push(field);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.record.description = Some(description.into());
        self
    }

    pub fn build(self) -> Shape {
        Shape::Record(self.record)
    }
}

macro_rules! describe_int {
    ($($ty:ty => $width:expr),* $(,)?) => {$(
        impl Describe for $ty {
            fn shape() -> Shape {
                Shape::Integer($width)
            }
        }
    )*};
}

describe_int! {
    i8 => IntWidth::I8,
    i16 => IntWidth::I16,
    i32 => IntWidth::I32,
    i64 => IntWidth::I64,
    isize => IntWidth::I64,
    u8 => IntWidth::U8,
    u16 => IntWidth::U16,
    u32 => IntWidth::U32,
    u64 => IntWidth::U64,
    usize => IntWidth::U64,
}

impl Describe for f32 {
    fn shape() -> Shape {
        Shape::Number(FloatWidth::F32)
    }
}

impl Describe for f64 {
    fn shape() -> Shape {
        Shape::Number(FloatWidth::F64)
    }
}

impl Describe for bool {
    fn shape() -> Shape {
        Shape::Boolean
    }
}

impl Describe for String {
    fn shape() -> Shape {
        Shape::string()
    }
}

impl Describe for NaiveDate {
    fn shape() -> Shape {
        Shape::String(StringShape::new().format("date"))
    }
}

impl Describe for DateTime<Utc> {
    fn shape() -> Shape {
        Shape::String(StringShape::new().format("date-time"))
    }
}

impl Describe for serde_json::Value {
    fn shape() -> Shape {
        Shape::Any
    }
}

impl<T: Describe> Describe for Option<T> {
    fn shape() -> Shape {
        Shape::Optional(TypeRef::of::<T>())
    }
}

impl<T: Describe> Describe for Box<T> {
    fn shape() -> Shape {
        Shape::Alias(TypeRef::of::<T>())
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn shape() -> Shape {
        Shape::Sequence(Shape::sequence::<T>())
    }
}

impl<T: Describe, const N: usize> Describe for [T; N] {
    fn shape() -> Shape {
        Shape::Sequence(Shape::sequence::<T>().fixed(N))
    }
}

impl<T: Describe, S: 'static> Describe for HashSet<T, S> {
    fn shape() -> Shape {
        Shape::Sequence(Shape::sequence::<T>().unique())
    }
}

impl<T: Describe> Describe for BTreeSet<T> {
    fn shape() -> Shape {
        Shape::Sequence(Shape::sequence::<T>().unique())
    }
}

impl<K: Describe, V: Describe, S: 'static> Describe for HashMap<K, V, S> {
    fn shape() -> Shape {
        Shape::Map {
            key: TypeRef::of::<K>(),
            value: TypeRef::of::<V>(),
        }
    }
}

impl<K: Describe, V: Describe> Describe for BTreeMap<K, V> {
    fn shape() -> Shape {
        Shape::Map {
            key: TypeRef::of::<K>(),
            value: TypeRef::of::<V>(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_fields_default_to_optional() {
        assert!(FieldShape::new::<String>("a").required);
        assert!(!FieldShape::new::<Option<String>>("a").required);
    }

    #[test]
    fn wire_name_falls_back_to_field_name() {
        let plain = FieldShape::new::<u8>("age");
        assert_eq!(plain.wire_name(), "age");
        assert_eq!(plain.rename("userAge").wire_name(), "userAge");
    }

    #[test]
    fn fixed_arrays_carry_their_length() {
        match <[u8; 3]>::shape() {
            Shape::Sequence(seq) => assert_eq!(seq.fixed, Some(3)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn type_refs_compare_by_identity() {
        assert_eq!(TypeRef::of::<u8>(), TypeRef::of::<u8>());
        assert_ne!(TypeRef::of::<u8>(), TypeRef::of::<i8>());
    }
}
