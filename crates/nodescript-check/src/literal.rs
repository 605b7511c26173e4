//! Static conversion of unlinked property literals.
//!
//! Property values are stored as the text the user typed. At compile time
//! they are interpreted against the target parameter schema:
//!
//! - an empty literal is the schema default (`null` for optional or
//!   nullable schemas, the type's zero value otherwise)
//! - `string` sockets take the text verbatim
//! - other typed sockets parse the text as JSON and coerce the result,
//!   falling back to coercing the raw text; literals that cannot be
//!   interpreted at all become the default
//! - `any` sockets take JSON-shaped text as JSON and anything else as a
//!   plain string

use serde_json::Value;

use nodescript_core::schema::{SchemaSpec, SchemaType};

use crate::codec::SchemaCodec;

/// Interprets a literal property value for a socket typed by `schema`.
pub fn convert_static(literal: &str, schema: &SchemaSpec, codec: &dyn SchemaCodec) -> Value {
    if literal.is_empty() {
        return codec.default_value(schema);
    }
    match schema.schema_type {
        SchemaType::String => Value::String(literal.to_string()),
        SchemaType::Any => serde_json::from_str(literal)
            .unwrap_or_else(|_| Value::String(literal.to_string())),
        _ => {
            let decoded = match serde_json::from_str::<Value>(literal) {
                Ok(parsed) => codec.decode(&parsed, schema),
                Err(_) => codec.decode(&Value::String(literal.to_string()), schema),
            };
            decoded.unwrap_or_else(|_| codec.default_value(schema))
        }
    }
}
