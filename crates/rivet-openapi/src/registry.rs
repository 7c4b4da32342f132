//! Schema derivation and the append-only component table.

use crate::describe::{RecordShape, SequenceShape, Shape, StringShape, TypeRef};
use crate::schema::{AdditionalProperties, Schema, SchemaType};
use heck::{ToLowerCamelCase, ToSnakeCase, ToUpperCamelCase};
use rivet_validate::{FloatWidth, IntWidth};
use serde_json::Number;
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("map key type {key_type} must be described as a string, got {found}")]
    MapKey {
        key_type: &'static str,
        found: String,
    },

    /// Only named types can refer to themselves, through a component reference.
    #[error("type {rust_type} contains itself but has no component name")]
    AnonymousRecursion { rust_type: &'static str },
}

/// How component keys are derived from type names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NamingStyle {
    #[default]
    Pascal,
    Camel,
    Snake,
    AsIs,
}

impl NamingStyle {
    pub fn apply(self, name: &str) -> String {
        match self {
            NamingStyle::Pascal => name.to_upper_camel_case(),
            NamingStyle::Camel => name.to_lower_camel_case(),
            NamingStyle::Snake => name.to_snake_case(),
            NamingStyle::AsIs => name.to_string(),
        }
    }
}

/// Derives schemas and deduplicates named types by identity.
///
/// The first type registering a name keeps it; later distinct types with
/// the same name get `Name1`, `Name2`, ...
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    naming: NamingStyle,
    keys: HashMap<TypeId, String>,
    schemas: BTreeMap<String, Schema>,
    reserved: BTreeMap<String, TypeId>,
    /// Anonymous types currently being derived
    deriving: HashSet<TypeId>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_naming(naming: NamingStyle) -> Self {
        Self {
            naming,
            ..Default::default()
        }
    }

    pub fn schema_of<T: crate::Describe>(&mut self) -> Result<Schema, SchemaError> {
        self.schema_for(&TypeRef::of::<T>())
    }

    /// Schema for `ty`; a reference for named types, inline otherwise.
    pub fn schema_for(&mut self, ty: &TypeRef) -> Result<Schema, SchemaError> {
        if let Some(key) = self.keys.get(&ty.id()) {
            return Ok(Schema::reference(key));
        }
        let Some(name) = ty.name() else {
            if !self.deriving.insert(ty.id()) {
                return Err(SchemaError::AnonymousRecursion {
                    rust_type: ty.rust_name(),
                });
            }
            let derived = self.derive(ty.shape());
            self.deriving.remove(&ty.id());
            return derived;
        };

        let key = self.unique_key(&name);
        self.keys.insert(ty.id(), key.clone());
        self.reserved.insert(key.clone(), ty.id());
        match self.derive(ty.shape()) {
            Ok(schema) => {
                tracing::trace!(component = %key, rust_type = ty.rust_name(), "registered schema");
                self.schemas.insert(key.clone(), schema);
                Ok(Schema::reference(&key))
            }
            Err(err) => {
                self.keys.remove(&ty.id());
                self.reserved.remove(&key);
                Err(err)
            }
        }
    }

    /// Follow a component reference to the stored schema.
    pub fn resolve<'a>(&'a self, schema: &'a Schema) -> &'a Schema {
        let mut current = schema;
        // Bounded in case of aliasing cycles.
        for _ in 0..16 {
            match current.reference_key().and_then(|key| self.schemas.get(key)) {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    pub fn get(&self, key: &str) -> Option<&Schema> {
        self.schemas.get(key)
    }

    pub fn key_of(&self, id: TypeId) -> Option<&str> {
        self.keys.get(&id).map(String::as_str)
    }

    pub fn schemas(&self) -> &BTreeMap<String, Schema> {
        &self.schemas
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    fn unique_key(&self, name: &str) -> String {
        let base = self.naming.apply(name);
        if !self.reserved.contains_key(&base) {
            return base;
        }
        (1..)
            .map(|n| format!("{base}{n}"))
            .find(|candidate| !self.reserved.contains_key(candidate))
            .unwrap_or(base)
    }

    fn derive(&mut self, shape: Shape) -> Result<Schema, SchemaError> {
        match shape {
            Shape::Boolean => Ok(Schema::boolean()),
            Shape::Integer(width) => Ok(integer_schema(width)),
            Shape::Number(width) => Ok(number_schema(width)),
            Shape::String(rules) => Ok(string_schema(rules)),
            Shape::Sequence(seq) => self.sequence(seq),
            Shape::Map { key, value } => self.map(&key, &value),
            Shape::Record(record) => self.record(record),
            Shape::Optional(inner) => {
                let inner = self.schema_for(&inner)?;
                Ok(Schema::one_of(vec![inner, Schema::null()]))
            }
            Shape::Alias(inner) => self.schema_for(&inner),
            Shape::Custom(schema) => Ok(schema),
            Shape::Any => Ok(Schema::new()),
        }
    }

    fn sequence(&mut self, seq: SequenceShape) -> Result<Schema, SchemaError> {
        let mut schema = Schema::array(self.schema_for(&seq.item)?);
        match seq.fixed {
            Some(len) => {
                schema.min_items = Some(len as u64);
                schema.max_items = Some(len as u64);
            }
            None => {
                schema.min_items = seq.min_items.map(|n| n as u64);
                schema.max_items = seq.max_items.map(|n| n as u64);
            }
        }
        if seq.unique {
            schema.unique_items = Some(true);
        }
        Ok(schema)
    }

    fn map(&mut self, key: &TypeRef, value: &TypeRef) -> Result<Schema, SchemaError> {
        let key_schema = self.schema_for(key)?;
        let key_schema = self.resolve(&key_schema).clone();
        if key_schema.kind() != crate::SchemaKind::String {
            return Err(SchemaError::MapKey {
                key_type: key.rust_name(),
                found: format!("{:?}", key_schema.kind()).to_lowercase(),
            });
        }

        let value_schema = self.schema_for(value)?;
        let mut schema = Schema {
            schema_type: Some(SchemaType::Object),
            ..Default::default()
        };
        match key_schema.pattern {
            Some(pattern) => {
                schema.pattern_properties = Some(BTreeMap::from([(pattern, value_schema)]));
                schema.additional_properties = Some(AdditionalProperties::Bool(false));
            }
            None => {
                schema.additional_properties =
                    Some(AdditionalProperties::Schema(Box::new(value_schema)));
            }
        }
        Ok(schema)
    }

    fn record(&mut self, record: RecordShape) -> Result<Schema, SchemaError> {
        let mut schema = Schema::object();
        schema.description = record.description;
        for field in record.fields.into_iter().filter(|f| !f.skip) {
            let mut property = self.schema_for(&field.ty)?;
            if let Some(description) = &field.description {
                if property.reference.is_none() {
                    property.description = Some(description.clone());
                }
            }
            let name = field.wire_name().to_string();
            if field.required {
                schema = schema.with_required(name.clone());
            }
            schema = schema.with_property(name, property);
        }
        Ok(schema)
    }
}

fn integer_schema(width: IntWidth) -> Schema {
    // Bounds always fit i64/u64, so precision is never lost.
    let minimum = if width.is_signed() {
        Number::from(width.min() as i64)
    } else {
        Number::from(0u64)
    };
    let maximum = if width.is_signed() {
        Number::from(width.max() as i64)
    } else {
        Number::from(width.max() as u64)
    };
    Schema::integer()
        .with_format(width.format())
        .with_bounds(Some(minimum), Some(maximum))
}

fn number_schema(width: FloatWidth) -> Schema {
    let schema = Schema::number().with_format(width.format());
    match width {
        FloatWidth::F32 => {
            let max = Number::from_f64(width.max());
            let min = Number::from_f64(-width.max());
            schema.with_bounds(min, max)
        }
        FloatWidth::F64 => schema,
    }
}

fn string_schema(rules: StringShape) -> Schema {
    let mut schema = Schema::string();
    schema.format = rules.format.map(|f| f.into_owned());
    schema.min_length = rules.min_length.map(|n| n as u64);
    schema.max_length = rules.max_length.map(|n| n as u64);
    schema.pattern = rules.pattern;
    schema.enum_values = rules
        .allowed
        .map(|values| values.into_iter().map(serde_json::Value::String).collect());
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describe::{Describe, FieldShape};
    use serde_json::json;
    use std::borrow::Cow;
    use std::collections::HashMap;

    struct Address;
    impl Describe for Address {
        fn type_name() -> Option<Cow<'static, str>> {
            Some("Address".into())
        }
        fn shape() -> Shape {
            Shape::record().field::<String>("city").build()
        }
    }

    struct User;
    impl Describe for User {
        fn type_name() -> Option<Cow<'static, str>> {
            Some("User".into())
        }
        fn shape() -> Shape {
            Shape::record()
                .field::<u64>("id")
                .with(FieldShape::new::<String>("display_name").rename("displayName"))
                .field::<Option<Address>>("address")
                .with(FieldShape::new::<String>("password").skip())
                .build()
        }
    }

    mod other {
        use super::*;
        pub struct User;
        impl Describe for User {
            fn type_name() -> Option<Cow<'static, str>> {
                Some("User".into())
            }
            fn shape() -> Shape {
                Shape::record().field::<bool>("admin").build()
            }
        }
    }

    struct Tree;
    impl Describe for Tree {
        fn type_name() -> Option<Cow<'static, str>> {
            Some("Tree".into())
        }
        fn shape() -> Shape {
            Shape::record().field::<Vec<Tree>>("children").build()
        }
    }

    struct Slug;
    impl Describe for Slug {
        fn shape() -> Shape {
            Shape::String(StringShape::new().pattern("^[a-z-]+$"))
        }
    }

    #[test]
    fn i16_bounds_are_exact() {
        let schema = SchemaRegistry::new().schema_of::<i16>().unwrap();
        assert_eq!(
            serde_json::to_value(schema).unwrap(),
            json!({"type": "integer", "format": "int16", "minimum": -32768, "maximum": 32767})
        );
    }

    #[test]
    fn u64_maximum_is_not_rounded() {
        let schema = SchemaRegistry::new().schema_of::<u64>().unwrap();
        assert_eq!(schema.maximum, Some(Number::from(u64::MAX)));
    }

    #[test]
    fn same_type_twice_returns_same_reference() {
        let mut registry = SchemaRegistry::new();
        let first = registry.schema_of::<User>().unwrap();
        let second = registry.schema_of::<User>().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.reference_key(), Some("User"));
        assert!(registry.get("User1").is_none());
        assert_eq!(registry.len(), 2); // User + Address
    }

    #[test]
    fn distinct_types_sharing_a_name_get_suffixes() {
        let mut registry = SchemaRegistry::new();
        let first = registry.schema_of::<User>().unwrap();
        let second = registry.schema_of::<other::User>().unwrap();
        assert_eq!(first.reference_key(), Some("User"));
        assert_eq!(second.reference_key(), Some("User1"));
    }

    #[test]
    fn records_are_closed_with_required_fields() {
        let mut registry = SchemaRegistry::new();
        registry.schema_of::<User>().unwrap();
        let user = registry.get("User").unwrap();
        let names: Vec<&str> = user.properties.as_ref().unwrap().names().collect();
        assert_eq!(names, vec!["id", "displayName", "address"]);
        assert_eq!(user.required, Some(vec!["id".to_string(), "displayName".to_string()]));
        assert_eq!(user.additional_properties, Some(AdditionalProperties::Bool(false)));

        let address = user.properties.as_ref().unwrap().get("address").unwrap();
        assert_eq!(
            serde_json::to_value(address).unwrap(),
            json!({"oneOf": [{"$ref": "#/components/schemas/Address"}, {"type": "null"}]})
        );
    }

    #[test]
    fn recursive_types_terminate_by_reference() {
        let mut registry = SchemaRegistry::new();
        registry.schema_of::<Tree>().unwrap();
        let tree = serde_json::to_value(registry.get("Tree").unwrap()).unwrap();
        assert_eq!(
            tree["properties"]["children"]["items"],
            json!({"$ref": "#/components/schemas/Tree"})
        );
    }

    #[test]
    fn unnamed_recursive_types_are_rejected() {
        struct Node;
        impl Describe for Node {
            fn shape() -> Shape {
                Shape::record().field::<Vec<Node>>("children").build()
            }
        }
        let mut registry = SchemaRegistry::new();
        let err = registry.schema_of::<Node>().unwrap_err();
        assert!(matches!(err, SchemaError::AnonymousRecursion { rust_type } if rust_type.ends_with("Node")));

        // The registry stays usable afterwards
        assert!(registry.schema_of::<Vec<u8>>().is_ok());
    }

    #[test]
    fn unnamed_types_may_repeat_without_recursing() {
        struct Pair;
        impl Describe for Pair {
            fn type_name() -> Option<Cow<'static, str>> {
                Some("Pair".into())
            }
            fn shape() -> Shape {
                Shape::record()
                    .field::<Option<u32>>("left")
                    .field::<Option<u32>>("right")
                    .build()
            }
        }
        assert!(SchemaRegistry::new().schema_of::<Pair>().is_ok());
    }

    #[test]
    fn fixed_length_arrays() {
        let schema = SchemaRegistry::new().schema_of::<[u8; 4]>().unwrap();
        assert_eq!(schema.min_items, Some(4));
        assert_eq!(schema.max_items, Some(4));
        let open = SchemaRegistry::new().schema_of::<Vec<u8>>().unwrap();
        assert_eq!(open.min_items, None);
        assert_eq!(open.max_items, None);
    }

    #[test]
    fn string_keyed_maps_are_open() {
        let schema = SchemaRegistry::new().schema_of::<HashMap<String, i32>>().unwrap();
        match schema.additional_properties {
            Some(AdditionalProperties::Schema(value)) => {
                assert_eq!(value.format.as_deref(), Some("int32"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pattern_keyed_maps_are_closed() {
        let schema = SchemaRegistry::new().schema_of::<BTreeMap<Slug, bool>>().unwrap();
        assert!(schema.pattern_properties.unwrap().contains_key("^[a-z-]+$"));
        assert_eq!(schema.additional_properties, Some(AdditionalProperties::Bool(false)));
    }

    #[test]
    fn non_string_map_keys_are_rejected() {
        let err = SchemaRegistry::new().schema_of::<HashMap<u32, String>>().unwrap_err();
        assert!(matches!(err, SchemaError::MapKey { found, .. } if found == "integer"));
    }

    #[test]
    fn custom_schemas_bypass_derivation() {
        struct Color;
        impl Describe for Color {
            fn shape() -> Shape {
                Shape::Custom(Schema::string().with_format("hex-color"))
            }
        }
        let schema = SchemaRegistry::new().schema_of::<Color>().unwrap();
        assert_eq!(schema.format.as_deref(), Some("hex-color"));
    }

    #[test]
    fn naming_styles() {
        assert_eq!(NamingStyle::Pascal.apply("user_profile"), "UserProfile");
        assert_eq!(NamingStyle::Camel.apply("UserProfile"), "userProfile");
        assert_eq!(NamingStyle::Snake.apply("UserProfile"), "user_profile");
    }
}
