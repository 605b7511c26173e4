//! Argument values passed to node implementations.
//!
//! Most arguments are plain JSON values. Deferred parameters receive a
//! [`Deferred`] thunk the node resolves itself (or never), and lambda
//! parameters receive a [`Lambda`] the node calls under a nested scope.

use std::fmt;
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use nodescript_core::schema::SchemaSpec;

use crate::context::EvalContext;
use crate::error::RuntimeError;

pub type Thunk = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, RuntimeError>> + Send + Sync>;

pub type LambdaFn =
    Arc<dyn Fn(EvalContext) -> BoxFuture<'static, Result<Value, RuntimeError>> + Send + Sync>;

/// A value computed on demand. Every resolution re-runs the upstream node
/// function, which in turn honours its own cache.
#[derive(Clone)]
pub struct Deferred {
    thunk: Thunk,
    schema: Option<SchemaSpec>,
}

impl Deferred {
    pub fn new<F>(thunk: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Value, RuntimeError>> + Send + Sync + 'static,
    {
        Deferred {
            thunk: Arc::new(thunk),
            schema: None,
        }
    }

    /// A thunk that resolves to a fixed value.
    pub fn ready(value: Value) -> Self {
        Deferred::new(move || future::ready(Ok(value.clone())).boxed())
    }

    /// Schema the resolved value is converted to.
    pub fn with_schema(mut self, schema: SchemaSpec) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn schema(&self) -> Option<&SchemaSpec> {
        self.schema.as_ref()
    }

    /// Runs the thunk without conversion.
    pub fn invoke(&self) -> BoxFuture<'static, Result<Value, RuntimeError>> {
        (self.thunk)()
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").field("schema", &self.schema).finish()
    }
}

/// A callable evaluated under a child of the caller's context.
#[derive(Clone)]
pub struct Lambda {
    func: LambdaFn,
}

impl Lambda {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(EvalContext) -> BoxFuture<'static, Result<Value, RuntimeError>> + Send + Sync + 'static,
    {
        Lambda {
            func: Arc::new(func),
        }
    }

    /// A lambda that ignores its scope and returns `value`.
    pub fn constant(value: Value) -> Self {
        Lambda::new(move |_| future::ready(Ok(value.clone())).boxed())
    }

    /// Calls the lambda with `locals` bound in a new scope of `ctx`.
    pub fn call(
        &self,
        ctx: &EvalContext,
        locals: Map<String, Value>,
    ) -> BoxFuture<'static, Result<Value, RuntimeError>> {
        (self.func)(ctx.new_scope(locals))
    }
}

impl fmt::Debug for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Lambda")
    }
}

/// One argument of a node invocation.
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Deferred(Deferred),
    Lambda(Lambda),
    /// Array whose items include thunks.
    Array(Vec<Arg>),
    /// Object whose fields include thunks.
    Object(IndexMap<String, Arg>),
}

impl Arg {
    /// Builds an array argument, collapsing to a plain value when no item
    /// is a thunk.
    pub fn array(items: Vec<Arg>) -> Arg {
        if items.iter().all(|a| matches!(a, Arg::Value(_))) {
            let values = items.into_iter().filter_map(Arg::into_value).collect();
            return Arg::Value(Value::Array(values));
        }
        Arg::Array(items)
    }

    /// Object counterpart of [`Arg::array`].
    pub fn object(fields: IndexMap<String, Arg>) -> Arg {
        if fields.values().all(|a| matches!(a, Arg::Value(_))) {
            let map: Map<String, Value> = fields
                .into_iter()
                .filter_map(|(k, a)| a.into_value().map(|v| (k, v)))
                .collect();
            return Arg::Value(Value::Object(map));
        }
        Arg::Object(fields)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Arg::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Arg::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_lambda(&self) -> Option<&Lambda> {
        match self {
            Arg::Lambda(l) => Some(l),
            _ => None,
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

/// Arguments of a node invocation, keyed by parameter.
#[derive(Debug, Clone, Default)]
pub struct Params {
    args: IndexMap<String, Arg>,
}

impl Params {
    pub fn new(args: IndexMap<String, Arg>) -> Self {
        Params { args }
    }

    pub fn get(&self, key: &str) -> Option<&Arg> {
        self.args.get(key)
    }

    /// Plain value of `key`; `null` when absent or not a plain value.
    pub fn value(&self, key: &str) -> Value {
        self.get(key)
            .and_then(Arg::as_value)
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn lambda(&self, key: &str) -> Option<&Lambda> {
        self.get(key).and_then(Arg::as_lambda)
    }

    /// Items of an array argument. Thunk items are kept as they are; a
    /// non-array value counts as a single item.
    pub fn items(&self, key: &str) -> Vec<Arg> {
        match self.get(key) {
            None => Vec::new(),
            Some(Arg::Array(items)) => items.clone(),
            Some(Arg::Value(Value::Array(values))) => {
                values.iter().cloned().map(Arg::Value).collect()
            }
            Some(Arg::Value(Value::Null)) => Vec::new(),
            Some(other) => vec![other.clone()],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arg)> {
        self.args.iter()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Resolves every thunk and returns the arguments as a JSON object.
    /// Lambdas cannot be resolved and become `null`.
    pub async fn resolve(&self, ctx: &EvalContext) -> Result<Map<String, Value>, RuntimeError> {
        let mut out = Map::new();
        for (key, arg) in &self.args {
            out.insert(key.clone(), ctx.resolve_deferred(arg).await?);
        }
        Ok(out)
    }
}

impl FromIterator<(String, Arg)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, Arg)>>(iter: I) -> Self {
        Params {
            args: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use serde_json::json;

    #[test]
    fn plain_arrays_collapse_to_values() {
        let arg = Arg::array(vec![Arg::Value(json!(1)), Arg::Value(json!(2))]);
        assert_eq!(arg.as_value(), Some(&json!([1, 2])));

        let arg = Arg::array(vec![Arg::Value(json!(1)), Arg::Deferred(Deferred::ready(json!(2)))]);
        assert!(matches!(arg, Arg::Array(ref items) if items.len() == 2));
    }

    #[test]
    fn plain_objects_collapse_to_values() {
        let fields: IndexMap<String, Arg> = [("a".to_string(), Arg::Value(json!("x")))]
            .into_iter()
            .collect();
        assert_eq!(Arg::object(fields).as_value(), Some(&json!({"a": "x"})));
    }

    #[test]
    fn params_items_view() {
        let params: Params = [
            ("list".to_string(), Arg::Value(json!([1, 2]))),
            ("one".to_string(), Arg::Value(json!("x"))),
            ("none".to_string(), Arg::Value(Value::Null)),
        ]
        .into_iter()
        .collect();
        assert_eq!(params.items("list").len(), 2);
        assert_eq!(params.items("one").len(), 1);
        assert!(params.items("none").is_empty());
        assert!(params.items("missing").is_empty());
        assert_eq!(params.value("missing"), Value::Null);
    }

    #[test]
    fn resolve_runs_thunks() {
        let ctx = EvalContext::new();
        let params: Params = [
            ("a".to_string(), Arg::Value(json!(1))),
            ("b".to_string(), Arg::Deferred(Deferred::ready(json!("2")).with_schema(SchemaSpec::number()))),
        ]
        .into_iter()
        .collect();
        let resolved = params.resolve(&ctx).now_or_never().unwrap().unwrap();
        assert_eq!(Value::Object(resolved), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn lambda_sees_its_locals() {
        let ctx = EvalContext::new();
        let lambda = Lambda::new(|scope| {
            async move { Ok::<Value, RuntimeError>(scope.get_local("item").unwrap_or(Value::Null)) }.boxed()
        });
        let mut locals = Map::new();
        locals.insert("item".into(), json!(7));
        let value = lambda.call(&ctx, locals).now_or_never().unwrap().unwrap();
        assert_eq!(value, json!(7));
        assert_eq!(ctx.get_local("item"), None);
    }
}
