//! JSON Schema 2020-12 subset used by OpenAPI 3.1 documents.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// Primitive `type` keyword values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
    Null,
}

/// Structural classification of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
    Null,
    Reference,
    Union,
    /// No constraints at all (`{}`).
    Any,
}

/// Additional properties can be a boolean or a schema
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Bool(bool),
    Schema(Box<Schema>),
}

/// Object properties in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(Vec<(String, Schema)>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a property, keeping its original position on replace.
    pub fn insert(&mut self, name: impl Into<String>, schema: Schema) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = schema,
            None => self.0.push((name, schema)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Schema)> {
        self.0.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Properties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, schema) in &self.0 {
            map.serialize_entry(name, schema)?;
        }
        map.end()
    }
}

/// A normalized description of a value's shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,

    // String constraints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    // Number constraints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<Number>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<Number>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiple_of: Option<Number>,

    // Array constraints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_items: Option<bool>,

    // Object constraints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_properties: Option<BTreeMap<String, Schema>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<AdditionalProperties>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,

    // Composition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<Schema>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    fn typed(schema_type: SchemaType) -> Self {
        Self {
            schema_type: Some(schema_type),
            ..Default::default()
        }
    }

    pub fn boolean() -> Self {
        Self::typed(SchemaType::Boolean)
    }

    pub fn integer() -> Self {
        Self::typed(SchemaType::Integer)
    }

    pub fn number() -> Self {
        Self::typed(SchemaType::Number)
    }

    pub fn string() -> Self {
        Self::typed(SchemaType::String)
    }

    pub fn null() -> Self {
        Self::typed(SchemaType::Null)
    }

    pub fn array(items: Schema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::typed(SchemaType::Array)
        }
    }

    /// An object with no declared properties that accepts nothing extra.
    pub fn object() -> Self {
        Self {
            additional_properties: Some(AdditionalProperties::Bool(false)),
            ..Self::typed(SchemaType::Object)
        }
    }

    /// A reference into `#/components/schemas`.
    pub fn reference(key: &str) -> Self {
        Self {
            reference: Some(format!("#/components/schemas/{key}")),
            ..Default::default()
        }
    }

    pub fn one_of(variants: Vec<Schema>) -> Self {
        Self {
            one_of: Some(variants),
            ..Default::default()
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_bounds(mut self, minimum: Option<Number>, maximum: Option<Number>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.properties
            .get_or_insert_with(Properties::new)
            .insert(name, schema);
        self
    }

    pub fn with_required(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        let required = self.required.get_or_insert_with(Vec::new);
        if !required.contains(&name) {
            required.push(name);
        }
        self
    }

    pub fn with_example(mut self, example: Value) -> Self {
        self.example = Some(example);
        self
    }

    pub fn kind(&self) -> SchemaKind {
        if self.reference.is_some() {
            return SchemaKind::Reference;
        }
        if self.one_of.is_some() {
            return SchemaKind::Union;
        }
        match self.schema_type {
            Some(SchemaType::Boolean) => SchemaKind::Boolean,
            Some(SchemaType::Integer) => SchemaKind::Integer,
            Some(SchemaType::Number) => SchemaKind::Number,
            Some(SchemaType::String) => SchemaKind::String,
            Some(SchemaType::Array) => SchemaKind::Array,
            Some(SchemaType::Object) => SchemaKind::Object,
            Some(SchemaType::Null) => SchemaKind::Null,
            None => SchemaKind::Any,
        }
    }

    /// Component key when this is a `#/components/schemas/...` reference.
    pub fn reference_key(&self) -> Option<&str> {
        self.reference
            .as_deref()
            .and_then(|r| r.strip_prefix("#/components/schemas/"))
    }

    pub fn is_required(&self, property: &str) -> bool {
        self.required
            .as_ref()
            .is_some_and(|r| r.iter().any(|p| p == property))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn properties_keep_declaration_order() {
        let schema = Schema::object()
            .with_property("zeta", Schema::string())
            .with_property("alpha", Schema::integer())
            .with_required("zeta");
        let text = serde_json::to_string(&schema).unwrap();
        assert!(text.find("zeta").unwrap() < text.find("alpha").unwrap());
        assert!(schema.is_required("zeta"));
        assert!(!schema.is_required("alpha"));
    }

    #[test]
    fn closed_object_serializes_additional_properties_false() {
        let value = serde_json::to_value(Schema::object()).unwrap();
        assert_eq!(value, json!({"type": "object", "additionalProperties": false}));
    }

    #[test]
    fn reference_serializes_as_ref_only() {
        let value = serde_json::to_value(Schema::reference("User")).unwrap();
        assert_eq!(value, json!({"$ref": "#/components/schemas/User"}));
        assert_eq!(Schema::reference("User").reference_key(), Some("User"));
    }

    #[test]
    fn kinds() {
        assert_eq!(Schema::array(Schema::string()).kind(), SchemaKind::Array);
        assert_eq!(Schema::one_of(vec![]).kind(), SchemaKind::Union);
        assert_eq!(Schema::new().kind(), SchemaKind::Any);
    }
}
