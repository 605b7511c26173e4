//! Property tests for schema compatibility and the default codec.

use proptest::prelude::*;
use serde_json::{json, Value};

use nodescript_check::{is_compatible, DefaultCodec, SchemaCodec};
use nodescript_core::{SchemaSpec, SchemaType};

fn schema_strategy() -> impl Strategy<Value = SchemaSpec> {
    let leaf = prop_oneof![
        Just(SchemaSpec::any()),
        Just(SchemaSpec::string()),
        Just(SchemaSpec::number()),
        Just(SchemaSpec::boolean()),
    ];
    let flagged = (leaf, any::<bool>(), any::<bool>()).prop_map(|(s, optional, nullable)| {
        let s = if optional { s.optional() } else { s };
        if nullable {
            s.nullable()
        } else {
            s
        }
    });
    flagged.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            inner.clone().prop_map(SchemaSpec::array),
            prop::collection::vec(("[a-c]", inner), 0..4)
                .prop_map(|props| SchemaSpec::object(props)),
        ]
    })
}

fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        "[a-z0-9 ]{0,6}".prop_map(Value::from),
        Just(json!("12")),
        Just(json!("true")),
    ];
    leaf.prop_recursive(2, 16, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(Value::from),
            prop::collection::btree_map("[a-c]", inner, 0..3)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn every_schema_is_compatible_with_itself(schema in schema_strategy()) {
        prop_assert!(is_compatible(&schema, &schema));
        prop_assert!(is_compatible(&SchemaSpec::any(), &schema));
    }

    #[test]
    fn arrays_follow_their_items(desired in schema_strategy(), actual in schema_strategy()) {
        prop_assert_eq!(
            is_compatible(&SchemaSpec::array(desired.clone()), &SchemaSpec::array(actual.clone())),
            is_compatible(&desired, &actual)
        );
    }

    #[test]
    fn defaults_decode_to_themselves(schema in schema_strategy()) {
        let codec = DefaultCodec;
        let default = codec.default_value(&schema);
        prop_assert_eq!(codec.decode(&default, &schema), Ok(default));
    }

    #[test]
    fn decoding_is_idempotent(schema in schema_strategy(), value in value_strategy()) {
        let codec = DefaultCodec;
        if let Ok(once) = codec.decode(&value, &schema) {
            prop_assert_eq!(codec.decode(&once, &schema), Ok(once.clone()));
        }
    }

    #[test]
    fn non_any_primitives_reject_other_primitives(a in 1..4usize, b in 1..4usize) {
        let types = [SchemaType::Any, SchemaType::String, SchemaType::Number, SchemaType::Boolean];
        let (desired, actual) = (SchemaSpec::of(types[a]), SchemaSpec::of(types[b]));
        prop_assert_eq!(is_compatible(&desired, &actual), a == b);
    }
}
