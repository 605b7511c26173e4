//! A small standard node library.
//!
//! Each node comes as a contract (for the graph model and the compiler) and
//! an implementation (for [`Executable`](crate::Executable)), registered
//! under the module reference.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Number, Value};

use nodescript_core::loader::InMemoryLoader;
use nodescript_core::module::{ModuleSpec, ParamSpec, ResultSpec};
use nodescript_core::schema::SchemaSpec;

use crate::context::EvalContext;
use crate::error::RuntimeError;
use crate::registry::NodeRegistry;
use crate::value::Params;

pub const ADD: &str = "Math.Add";
pub const IF: &str = "Logic.If";
pub const FALLBACK: &str = "Logic.Fallback";
pub const MAP: &str = "Array.Map";
pub const CONCAT: &str = "String.Concat";

/// Contracts of every standard node.
pub fn modules() -> Vec<(&'static str, ModuleSpec)> {
    vec![
        (
            ADD,
            ModuleSpec::new("Add")
                .with_param("a", ParamSpec::new(SchemaSpec::number()))
                .with_param("b", ParamSpec::new(SchemaSpec::number()))
                .with_result(ResultSpec::sync(SchemaSpec::number())),
        ),
        (
            IF,
            ModuleSpec::new("If")
                .with_param("condition", ParamSpec::new(SchemaSpec::boolean()))
                .with_param("positive", ParamSpec::deferred(SchemaSpec::any()))
                .with_param("negative", ParamSpec::deferred(SchemaSpec::any()))
                .with_result(ResultSpec::sync(SchemaSpec::any())),
        ),
        (
            FALLBACK,
            ModuleSpec::new("Fallback")
                .with_param("values", ParamSpec::deferred(SchemaSpec::array(SchemaSpec::any())))
                .with_result(ResultSpec::sync(SchemaSpec::any())),
        ),
        (
            MAP,
            ModuleSpec::new("Map")
                .with_param("items", ParamSpec::new(SchemaSpec::array(SchemaSpec::any())))
                .with_param("fn", ParamSpec::lambda(SchemaSpec::any()))
                .with_result(ResultSpec::sync(SchemaSpec::array(SchemaSpec::any()))),
        ),
        (
            CONCAT,
            ModuleSpec::new("Concat")
                .with_param("parts", ParamSpec::new(SchemaSpec::array(SchemaSpec::string())))
                .with_result(ResultSpec::sync(SchemaSpec::string())),
        ),
    ]
}

pub fn loader() -> InMemoryLoader {
    let mut loader = InMemoryLoader::new();
    for (reference, spec) in modules() {
        loader.register(reference, spec);
    }
    loader
}

pub fn registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry
        .register_sync(ADD, add)
        .register(IF, branch)
        .register(FALLBACK, fallback)
        .register(MAP, map)
        .register_sync(CONCAT, concat);
    registry
}

fn add(params: &Params) -> Result<Value, RuntimeError> {
    let a = params.value("a");
    let b = params.value("b");
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Ok(Value::from(sum));
        }
    }
    let sum = a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0);
    Number::from_f64(sum)
        .map(Value::Number)
        .ok_or_else(|| RuntimeError::node(format!("{sum} is not a finite number")))
}

/// Resolves only the taken branch.
fn branch(params: Params, ctx: EvalContext) -> BoxFuture<'static, Result<Value, RuntimeError>> {
    async move {
        let key = if truthy(&params.value("condition")) {
            "positive"
        } else {
            "negative"
        };
        match params.get(key) {
            Some(arg) => ctx.resolve_deferred(arg).await,
            None => Ok(Value::Null),
        }
    }
    .boxed()
}

/// First non-null value. Failing candidates are skipped.
fn fallback(params: Params, ctx: EvalContext) -> BoxFuture<'static, Result<Value, RuntimeError>> {
    async move {
        for candidate in params.items("values") {
            match ctx.resolve_deferred(&candidate).await {
                Ok(Value::Null) => continue,
                Ok(value) => return Ok(value),
                Err(err) if err.is_pending() => return Err(err),
                Err(err) => tracing::debug!(error = %err, "fallback candidate failed"),
            }
        }
        Ok(Value::Null)
    }
    .boxed()
}

/// Calls `fn` once per item with `item` and `index` bound as locals.
fn map(params: Params, ctx: EvalContext) -> BoxFuture<'static, Result<Value, RuntimeError>> {
    async move {
        let items = match params.value("items") {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        let Some(func) = params.lambda("fn").cloned() else {
            return Ok(Value::Array(vec![params.value("fn"); items.len()]));
        };
        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let mut locals = Map::new();
            locals.insert("item".to_string(), item);
            locals.insert("index".to_string(), Value::from(index));
            out.push(func.call(&ctx, locals).await?);
        }
        Ok::<Value, RuntimeError>(Value::Array(out))
    }
    .boxed()
}

fn concat(params: &Params) -> Result<Value, RuntimeError> {
    let joined: String = match params.value("parts") {
        Value::Array(parts) => parts.iter().map(text).collect(),
        other => text(&other),
    };
    Ok(Value::String(joined))
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Arg, Deferred, Lambda};
    use serde_json::json;

    fn params(args: Vec<(&str, Arg)>) -> Params {
        args.into_iter().map(|(k, a)| (k.to_string(), a)).collect()
    }

    #[test]
    fn add_keeps_integers() {
        let p = params(vec![("a", json!(12).into()), ("b", json!(21).into())]);
        assert_eq!(add(&p).unwrap(), json!(33));
        let p = params(vec![("a", json!(0.5).into()), ("b", json!(1).into())]);
        assert_eq!(add(&p).unwrap(), json!(1.5));
    }

    #[test]
    fn branch_resolves_the_taken_side_only() {
        let p = params(vec![
            ("condition", json!(false).into()),
            (
                "positive",
                Arg::Deferred(Deferred::new(|| {
                    async { Err::<Value, RuntimeError>(RuntimeError::node("must not run")) }.boxed()
                })),
            ),
            ("negative", Arg::Deferred(Deferred::ready(json!("no")))),
        ]);
        let value = branch(p, EvalContext::new()).now_or_never().unwrap();
        assert_eq!(value, Ok(json!("no")));
    }

    #[test]
    fn fallback_skips_failures_and_nulls() {
        let p = params(vec![(
            "values",
            Arg::Array(vec![
                Arg::Deferred(Deferred::new(|| async { Err::<Value, RuntimeError>(RuntimeError::node("down")) }.boxed())),
                Arg::Value(Value::Null),
                Arg::Deferred(Deferred::ready(json!("cached"))),
            ]),
        )]);
        let value = fallback(p, EvalContext::new()).now_or_never().unwrap();
        assert_eq!(value, Ok(json!("cached")));
    }

    #[test]
    fn map_binds_item_and_index() {
        let func = Lambda::new(|scope| {
            async move {
                let item = scope.get_local("item").and_then(|v| v.as_i64()).unwrap_or(0);
                let index = scope.get_local("index").and_then(|v| v.as_i64()).unwrap_or(0);
                Ok::<Value, RuntimeError>(json!(item * 10 + index))
            }
            .boxed()
        });
        let p = params(vec![("items", json!([1, 2, 3]).into()), ("fn", Arg::Lambda(func))]);
        let value = map(p, EvalContext::new()).now_or_never().unwrap();
        assert_eq!(value, Ok(json!([10, 21, 32])));
    }

    #[test]
    fn concat_stringifies_parts() {
        let p = params(vec![("parts", json!(["a", 1, null, true]).into())]);
        assert_eq!(concat(&p).unwrap(), json!("a1true"));
    }

    #[test]
    fn every_contract_has_an_implementation() {
        let registry = registry();
        for (reference, _) in modules() {
            assert!(registry.contains(reference), "{reference}");
        }
        assert_eq!(loader().len(), modules().len());
    }
}
