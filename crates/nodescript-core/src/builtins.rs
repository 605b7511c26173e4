//! Built-in node kinds.
//!
//! The set is closed: parameter access, scope (local) access, literal
//! passthrough and output. The compiler emits dedicated bodies for these
//! instead of calling an imported implementation.

use crate::module::{ModuleSpec, ParamSpec, ResultSpec};
use crate::schema::SchemaSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    /// Reads a key from the current scope's entry params.
    Param,
    /// Reads a key from the evaluation context locals.
    Local,
    /// Passes its literal `value` through.
    Input,
    /// Returns its `value`; typically the root of a sub-graph.
    Output,
}

impl BuiltinKind {
    pub const ALL: [BuiltinKind; 4] = [
        BuiltinKind::Param,
        BuiltinKind::Local,
        BuiltinKind::Input,
        BuiltinKind::Output,
    ];

    pub fn from_ref(reference: &str) -> Option<Self> {
        match reference {
            "@system/Param" => Some(BuiltinKind::Param),
            "@system/Local" => Some(BuiltinKind::Local),
            "@system/Input" => Some(BuiltinKind::Input),
            "@system/Output" => Some(BuiltinKind::Output),
            _ => None,
        }
    }

    pub fn reference(&self) -> &'static str {
        match self {
            BuiltinKind::Param => "@system/Param",
            BuiltinKind::Local => "@system/Local",
            BuiltinKind::Input => "@system/Input",
            BuiltinKind::Output => "@system/Output",
        }
    }

    /// Contract of the built-in.
    pub fn module_spec(&self) -> ModuleSpec {
        match self {
            BuiltinKind::Param => ModuleSpec::new("Param")
                .with_param("key", ParamSpec::new(SchemaSpec::string()))
                .with_result(ResultSpec::sync(SchemaSpec::any())),
            BuiltinKind::Local => ModuleSpec::new("Local")
                .with_param("key", ParamSpec::new(SchemaSpec::string()))
                .with_result(ResultSpec::sync(SchemaSpec::any())),
            BuiltinKind::Input => ModuleSpec::new("Input")
                .with_param("value", ParamSpec::new(SchemaSpec::any()))
                .with_result(ResultSpec::sync(SchemaSpec::any())),
            BuiltinKind::Output => ModuleSpec::new("Output")
                .with_param("value", ParamSpec::new(SchemaSpec::any()))
                .with_result(ResultSpec::sync(SchemaSpec::any())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_roundtrip() {
        for kind in BuiltinKind::ALL {
            assert_eq!(BuiltinKind::from_ref(kind.reference()), Some(kind));
        }
        assert_eq!(BuiltinKind::from_ref("Math.Add"), None);
    }

    #[test]
    fn builtins_are_synchronous() {
        for kind in BuiltinKind::ALL {
            assert!(!kind.module_spec().result.is_async);
        }
    }
}
