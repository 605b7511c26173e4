//! Structural schema compatibility.
//!
//! Answers one question: can a value conforming to `actual` be used where
//! `desired` is expected without conversion? The rules are purely
//! structural:
//!
//! - `any` desired accepts everything
//! - primitives require the exact same type
//! - objects: every declared property of `desired` must accept the matching
//!   property of `actual` (missing means `any`), and a declared
//!   `additionalProperties` must accept the actual one (missing means `any`)
//! - arrays: `items` must be compatible (missing means `any`)
//!
//! No coercion happens here; a `false` answer makes the compiler insert an
//! explicit conversion call.

use nodescript_core::schema::{SchemaSpec, SchemaType};

/// Returns `true` if values of `actual` can be used as `desired` as-is.
pub fn is_compatible(desired: &SchemaSpec, actual: &SchemaSpec) -> bool {
    if desired.schema_type == SchemaType::Any {
        return true;
    }
    if desired.schema_type != actual.schema_type {
        return false;
    }
    match desired.schema_type {
        SchemaType::Object => {
            let any = SchemaSpec::any();
            for (key, desired_prop) in &desired.properties {
                let actual_prop = actual.properties.get(key).unwrap_or(&any);
                if !is_compatible(desired_prop, actual_prop) {
                    return false;
                }
            }
            match &desired.additional_properties {
                Some(desired_extra) => {
                    let actual_extra = actual.additional_properties.as_deref().unwrap_or(&any);
                    is_compatible(desired_extra, actual_extra)
                }
                None => true,
            }
        }
        SchemaType::Array => {
            let any = SchemaSpec::any();
            match &desired.items {
                Some(desired_items) => {
                    let actual_items = actual.items.as_deref().unwrap_or(&any);
                    is_compatible(desired_items, actual_items)
                }
                None => true,
            }
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_desired_accepts_everything() {
        for actual in [
            SchemaSpec::any(),
            SchemaSpec::string(),
            SchemaSpec::array(SchemaSpec::number()),
        ] {
            assert!(is_compatible(&SchemaSpec::any(), &actual));
        }
    }

    #[test]
    fn primitives_require_exact_type() {
        assert!(is_compatible(&SchemaSpec::number(), &SchemaSpec::number()));
        assert!(!is_compatible(&SchemaSpec::number(), &SchemaSpec::string()));
        assert!(!is_compatible(&SchemaSpec::number(), &SchemaSpec::any()));
        assert!(!is_compatible(&SchemaSpec::boolean(), &SchemaSpec::number()));
    }

    #[test]
    fn objects_compare_declared_properties() {
        let desired = SchemaSpec::object([("id", SchemaSpec::number())]);
        let exact = SchemaSpec::object([("id", SchemaSpec::number()), ("name", SchemaSpec::string())]);
        let wrong = SchemaSpec::object([("id", SchemaSpec::string())]);
        let missing = SchemaSpec::object([("name", SchemaSpec::string())]);

        assert!(is_compatible(&desired, &exact));
        assert!(!is_compatible(&desired, &wrong));
        // A missing property is `any`, which a number socket does not accept.
        assert!(!is_compatible(&desired, &missing));

        let loose = SchemaSpec::object([("id", SchemaSpec::any())]);
        assert!(is_compatible(&loose, &missing));
    }

    #[test]
    fn objects_compare_additional_properties() {
        let desired = SchemaSpec::object(Vec::<(String, SchemaSpec)>::new())
            .with_additional_properties(SchemaSpec::number());
        let matching = SchemaSpec::object(Vec::<(String, SchemaSpec)>::new())
            .with_additional_properties(SchemaSpec::number());
        let undeclared = SchemaSpec::object(Vec::<(String, SchemaSpec)>::new());

        assert!(is_compatible(&desired, &matching));
        assert!(!is_compatible(&desired, &undeclared));
        assert!(is_compatible(&undeclared, &matching));
    }

    #[test]
    fn arrays_compare_items_recursively() {
        let numbers = SchemaSpec::array(SchemaSpec::number());
        let strings = SchemaSpec::array(SchemaSpec::string());
        let untyped = SchemaSpec::of(SchemaType::Array);

        assert!(is_compatible(&numbers, &numbers));
        assert!(!is_compatible(&numbers, &strings));
        assert!(!is_compatible(&numbers, &untyped));
        assert!(is_compatible(&untyped, &strings));

        let nested = SchemaSpec::array(SchemaSpec::object([("v", SchemaSpec::number())]));
        let nested_wrong = SchemaSpec::array(SchemaSpec::object([("v", SchemaSpec::boolean())]));
        assert!(!is_compatible(&nested, &nested_wrong));
    }
}
