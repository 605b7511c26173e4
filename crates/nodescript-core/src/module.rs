//! Module contracts.
//!
//! A [`ModuleSpec`] is the read-only contract of a node kind (or of a compiled
//! graph): which parameters it accepts, what it returns, whether the result is
//! produced asynchronously, and how the compiler should treat memoization and
//! evaluation. Module specs are produced by a loader; the compiler never
//! modifies them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::schema::SchemaSpec;

/// Memoization policy of a node within one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Cache when the compiler decides it is needed (fan-out, manual
    /// evaluation, expansion).
    #[default]
    Auto,
    Always,
    Never,
}

/// Evaluation policy of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalMode {
    #[default]
    Auto,
    /// Evaluated on explicit request (step-through tooling).
    Manual,
}

/// Declaration of a single module parameter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamSpec {
    #[serde(default)]
    pub schema: SchemaSpec,
    /// The linked value is passed as a thunk resolved by the module itself.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deferred: bool,
    /// The linked value is passed as a callable evaluated under a nested
    /// scope. Lambda parameters never expand.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub lambda: bool,
}

impl ParamSpec {
    pub fn new(schema: SchemaSpec) -> Self {
        ParamSpec {
            schema,
            deferred: false,
            lambda: false,
        }
    }

    pub fn deferred(schema: SchemaSpec) -> Self {
        ParamSpec {
            deferred: true,
            ..ParamSpec::new(schema)
        }
    }

    pub fn lambda(schema: SchemaSpec) -> Self {
        ParamSpec {
            lambda: true,
            ..ParamSpec::new(schema)
        }
    }

    pub fn can_expand(&self) -> bool {
        !self.lambda
    }
}

/// Result contract of a module.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSpec {
    #[serde(default)]
    pub schema: SchemaSpec,
    #[serde(rename = "async", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_async: bool,
}

impl ResultSpec {
    pub fn sync(schema: SchemaSpec) -> Self {
        ResultSpec {
            schema,
            is_async: false,
        }
    }

    pub fn asynchronous(schema: SchemaSpec) -> Self {
        ResultSpec {
            schema,
            is_async: true,
        }
    }
}

/// Input/output contract of a nested sub-graph hosted by a node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubgraphContract {
    #[serde(default)]
    pub input: IndexMap<String, SchemaSpec>,
    #[serde(default)]
    pub output: SchemaSpec,
}

/// Contract of a node kind or of a compiled graph.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub params: IndexMap<String, ParamSpec>,
    #[serde(default)]
    pub result: ResultSpec,
    #[serde(default)]
    pub cache_mode: CacheMode,
    #[serde(default)]
    pub eval_mode: EvalMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgraph: Option<SubgraphContract>,
}

impl ModuleSpec {
    pub fn new(label: impl Into<String>) -> Self {
        ModuleSpec {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, param: ParamSpec) -> Self {
        self.params.insert(key.into(), param);
        self
    }

    pub fn with_result(mut self, result: ResultSpec) -> Self {
        self.result = result;
        self
    }

    pub fn with_cache_mode(mut self, cache_mode: CacheMode) -> Self {
        self.cache_mode = cache_mode;
        self
    }

    pub fn with_eval_mode(mut self, eval_mode: EvalMode) -> Self {
        self.eval_mode = eval_mode;
        self
    }

    pub fn with_subgraph(mut self, contract: SubgraphContract) -> Self {
        self.subgraph = Some(contract);
        self
    }

    /// Stand-in contract for a reference the loader could not resolve.
    pub fn unresolved(reference: &str) -> Self {
        ModuleSpec {
            label: reference.to_string(),
            description: "Unresolved module".to_string(),
            ..Default::default()
        }
    }
}
