//! Structural type descriptors for node sockets.
//!
//! A [`SchemaSpec`] describes the shape a parameter expects or a result
//! produces. Object properties use [`IndexMap`] so declaration order survives
//! serialization and drives deterministic default construction.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level type of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    #[default]
    Any,
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl SchemaType {
    pub fn name(&self) -> &'static str {
        match self {
            SchemaType::Any => "any",
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Boolean => "boolean",
            SchemaType::Object => "object",
            SchemaType::Array => "array",
        }
    }
}

/// Structural type descriptor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSpec {
    #[serde(rename = "type", default)]
    pub schema_type: SchemaType,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, SchemaSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<Box<SchemaSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<SchemaSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,
}

impl SchemaSpec {
    pub fn of(schema_type: SchemaType) -> Self {
        SchemaSpec {
            schema_type,
            ..Default::default()
        }
    }

    pub fn any() -> Self {
        Self::of(SchemaType::Any)
    }

    pub fn string() -> Self {
        Self::of(SchemaType::String)
    }

    pub fn number() -> Self {
        Self::of(SchemaType::Number)
    }

    pub fn boolean() -> Self {
        Self::of(SchemaType::Boolean)
    }

    pub fn array(items: SchemaSpec) -> Self {
        SchemaSpec {
            schema_type: SchemaType::Array,
            items: Some(Box::new(items)),
            ..Default::default()
        }
    }

    pub fn object<K: Into<String>>(properties: impl IntoIterator<Item = (K, SchemaSpec)>) -> Self {
        SchemaSpec {
            schema_type: SchemaType::Object,
            properties: properties.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            ..Default::default()
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_additional_properties(mut self, schema: SchemaSpec) -> Self {
        self.additional_properties = Some(Box::new(schema));
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn is_any(&self) -> bool {
        self.schema_type == SchemaType::Any
    }

    /// Schema of a single array element (`any` when undeclared).
    pub fn item_schema(&self) -> SchemaSpec {
        match &self.items {
            Some(items) => (**items).clone(),
            None => SchemaSpec::any(),
        }
    }

    /// Schema of a named object property, falling back to
    /// `additionalProperties` and then to `any`.
    pub fn property_schema(&self, key: &str) -> SchemaSpec {
        if let Some(schema) = self.properties.get(key) {
            return schema.clone();
        }
        match &self.additional_properties {
            Some(schema) => (**schema).clone(),
            None => SchemaSpec::any(),
        }
    }

    /// Resolves the schema found at a dotted key path, as produced by a
    /// link key projection. Unknown segments resolve to `any`.
    pub fn at_path(&self, path: &str) -> SchemaSpec {
        let mut current = self.clone();
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = match current.schema_type {
                SchemaType::Object => current.property_schema(segment),
                SchemaType::Array if segment.parse::<usize>().is_ok() => current.item_schema(),
                _ => return SchemaSpec::any(),
            };
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_camel_case_json() {
        let schema: SchemaSpec = serde_json::from_value(json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "tags": { "type": "array", "items": { "type": "string" } }
            },
            "additionalProperties": { "type": "number" }
        }))
        .unwrap();

        assert_eq!(schema.schema_type, SchemaType::Object);
        assert_eq!(schema.properties["name"].schema_type, SchemaType::String);
        assert_eq!(schema.properties["tags"].item_schema(), SchemaSpec::string());
        assert_eq!(schema.property_schema("extra"), SchemaSpec::number());
    }

    #[test]
    fn missing_type_is_any() {
        let schema: SchemaSpec = serde_json::from_value(json!({})).unwrap();
        assert!(schema.is_any());
    }

    #[test]
    fn at_path_walks_objects_and_arrays() {
        let schema = SchemaSpec::object([(
            "user",
            SchemaSpec::object([("emails", SchemaSpec::array(SchemaSpec::string()))]),
        )]);
        assert_eq!(schema.at_path("user.emails.0"), SchemaSpec::string());
        assert_eq!(schema.at_path("user.missing"), SchemaSpec::any());
        assert_eq!(schema.at_path("user.emails.first"), SchemaSpec::any());
        assert_eq!(schema.at_path(""), schema);
    }
}
