//! Value coercion against schemas.
//!
//! [`SchemaCodec`] is the seam the evaluation context uses for every runtime
//! conversion the compiler decided to insert. [`DefaultCodec`] implements a
//! lenient coercion policy suited to values typed by hand in an editor:
//!
//! - numbers and booleans render to strings, structured values render as JSON
//! - numeric strings parse to numbers (integral values stay integers)
//! - `"true"`/`"false"` and numbers convert to booleans
//! - JSON-shaped strings parse to objects and arrays
//! - scalars convert to arrays by wrapping them in a single-element array
//! - `null` becomes the schema default unless the schema is optional or
//!   nullable

use serde_json::{Map, Number, Value};

use nodescript_core::schema::{SchemaSpec, SchemaType};

use crate::error::CodecError;

/// Validates and coerces values against schemas.
pub trait SchemaCodec: Send + Sync {
    /// Converts `value` so that it conforms to `schema`.
    fn decode(&self, value: &Value, schema: &SchemaSpec) -> Result<Value, CodecError>;

    /// The value a socket takes when nothing was supplied.
    fn default_value(&self, schema: &SchemaSpec) -> Value;
}

/// Name of the runtime type of a value.
pub fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCodec;

impl SchemaCodec for DefaultCodec {
    fn decode(&self, value: &Value, schema: &SchemaSpec) -> Result<Value, CodecError> {
        self.decode_at(value, schema, "")
    }

    fn default_value(&self, schema: &SchemaSpec) -> Value {
        if let Some(default) = &schema.default {
            return default.clone();
        }
        if schema.optional || schema.nullable {
            return Value::Null;
        }
        match schema.schema_type {
            SchemaType::Any => Value::Null,
            SchemaType::String => Value::String(String::new()),
            SchemaType::Number => Value::Number(Number::from(0)),
            SchemaType::Boolean => Value::Bool(false),
            SchemaType::Array => Value::Array(Vec::new()),
            SchemaType::Object => {
                let mut object = Map::new();
                for (key, prop) in &schema.properties {
                    if !prop.optional {
                        object.insert(key.clone(), self.default_value(prop));
                    }
                }
                Value::Object(object)
            }
        }
    }
}

impl DefaultCodec {
    fn decode_at(&self, value: &Value, schema: &SchemaSpec, path: &str) -> Result<Value, CodecError> {
        if schema.schema_type == SchemaType::Any {
            return Ok(value.clone());
        }
        if value.is_null() {
            if schema.nullable || schema.optional {
                return Ok(Value::Null);
            }
            return Ok(self.default_value(schema));
        }
        let invalid = || CodecError::invalid(schema.schema_type.name(), type_of(value), path);
        match schema.schema_type {
            SchemaType::Any => Ok(value.clone()),
            SchemaType::String => Ok(Value::String(match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => other.to_string(),
            })),
            SchemaType::Number => match value {
                Value::Number(_) => Ok(value.clone()),
                Value::Bool(b) => Ok(Value::Number(Number::from(u8::from(*b)))),
                Value::String(s) => parse_number(s).ok_or_else(invalid),
                _ => Err(invalid()),
            },
            SchemaType::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" | "" => Ok(Value::Bool(false)),
                    _ => Err(invalid()),
                },
                _ => Err(invalid()),
            },
            SchemaType::Object => {
                let object = match value {
                    Value::Object(map) => map.clone(),
                    Value::String(s) => match serde_json::from_str::<Value>(s) {
                        Ok(Value::Object(map)) => map,
                        _ => return Err(invalid()),
                    },
                    _ => return Err(invalid()),
                };
                self.decode_object(object, schema, path)
            }
            SchemaType::Array => {
                let items = schema.item_schema();
                let list = match value {
                    Value::Array(list) => list.clone(),
                    Value::String(s) if s.trim_start().starts_with('[') => {
                        match serde_json::from_str::<Value>(s) {
                            Ok(Value::Array(list)) => list,
                            _ => return Err(invalid()),
                        }
                    }
                    other => vec![other.clone()],
                };
                list.iter()
                    .enumerate()
                    .map(|(i, item)| self.decode_at(item, &items, &join(path, &i.to_string())))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
        }
    }

    fn decode_object(
        &self,
        mut object: Map<String, Value>,
        schema: &SchemaSpec,
        path: &str,
    ) -> Result<Value, CodecError> {
        let mut out = Map::new();
        for (key, prop) in &schema.properties {
            match object.remove(key) {
                Some(v) => {
                    out.insert(key.clone(), self.decode_at(&v, prop, &join(path, key))?);
                }
                None if prop.optional => {}
                None => {
                    out.insert(key.clone(), self.default_value(prop));
                }
            }
        }
        for (key, v) in object {
            let decoded = match &schema.additional_properties {
                Some(extra) => self.decode_at(&v, extra, &join(path, &key))?,
                None => v,
            };
            out.insert(key, decoded);
        }
        Ok(Value::Object(out))
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

/// Parses a numeric string, keeping integral values as JSON integers.
pub(crate) fn parse_number(s: &str) -> Option<Value> {
    let trimmed = s.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Value::Number(Number::from(i)));
    }
    let f = trimmed.parse::<f64>().ok()?;
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        return Some(Value::Number(Number::from(f as i64)));
    }
    Number::from_f64(f).map(Value::Number)
}
