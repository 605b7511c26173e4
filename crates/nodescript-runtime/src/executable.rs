//! Loading and evaluating compiled programs.
//!
//! [`Executable`] binds a [`Program`]'s imports to registered node
//! implementations and evaluates it against an [`EvalContext`]. Node
//! functions follow the program exactly: argument expressions are evaluated
//! in declaration order, cache-enabled nodes memoize their outcome in the
//! current scope, introspected nodes report progress, results and errors,
//! and expanding nodes loop over the shortest expanded array.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use serde_json::Value;

use nodescript_compiler::program::ExpandedLine;
use nodescript_compiler::{ArgExpr, CompiledGraph, LinkExpr, NodeUnit, Program, UnitBody};
use nodescript_core::id::{NodeUid, ScopeId};
use nodescript_core::schema::SchemaSpec;

use crate::context::EvalContext;
use crate::error::RuntimeError;
use crate::events::NodeEvent;
use crate::registry::{NodeCompute, NodeRegistry};
use crate::value::{Arg, Deferred, Lambda, Params};

/// A loaded program, ready to be evaluated any number of times.
#[derive(Clone)]
pub struct Executable {
    inner: Arc<Inner>,
}

struct Inner {
    program: Program,
    imports: HashMap<String, Arc<dyn NodeCompute>>,
}

impl Executable {
    /// Binds every import of `program` to its implementation. Imports are
    /// looked up by compute url, then by module reference.
    pub fn load(program: Program, registry: &NodeRegistry) -> Result<Self, RuntimeError> {
        let mut imports = HashMap::with_capacity(program.imports.len());
        for (symbol, import) in &program.imports {
            let node = registry
                .get(&import.url)
                .or_else(|| registry.get(&import.reference))
                .ok_or_else(|| RuntimeError::ImportNotFound {
                    reference: import.reference.clone(),
                    url: import.url.clone(),
                })?;
            imports.insert(symbol.clone(), node);
        }
        Ok(Executable {
            inner: Arc::new(Inner { program, imports }),
        })
    }

    pub fn from_compiled(compiled: &CompiledGraph, registry: &NodeRegistry) -> Result<Self, RuntimeError> {
        Self::load(compiled.program.clone(), registry)
    }

    pub fn program(&self) -> &Program {
        &self.inner.program
    }

    pub fn is_async(&self) -> bool {
        self.inner.program.is_async()
    }

    /// Evaluates a synchronous program to completion on the calling thread.
    pub fn compute(&self, params: Value, ctx: &EvalContext) -> Result<Value, RuntimeError> {
        if self.is_async() {
            return Err(RuntimeError::AsyncProgram);
        }
        self.compute_async(params, ctx)
            .now_or_never()
            .unwrap_or(Err(RuntimeError::UnexpectedSuspension))
    }

    pub async fn compute_async(&self, params: Value, ctx: &EvalContext) -> Result<Value, RuntimeError> {
        let entry = self.inner.program.entry_scope.clone();
        self.inner.call_scope(&entry, Arc::new(params), ctx.clone()).await
    }

    /// Evaluates a single node function through the node map.
    pub async fn compute_node(
        &self,
        uid: &NodeUid,
        params: Value,
        ctx: &EvalContext,
    ) -> Result<Value, RuntimeError> {
        let symbol = self
            .inner
            .program
            .node_symbol(uid)
            .ok_or_else(|| RuntimeError::NodeNotInMap { uid: uid.clone() })?;
        self.inner.call_unit(symbol, Arc::new(params), ctx.clone()).await
    }

    /// [`compute_async`](Self::compute_async), then releases every
    /// disposable registered during the evaluation, whatever the outcome.
    pub async fn compute_scoped(&self, params: Value, ctx: &EvalContext) -> Result<Value, RuntimeError> {
        let outcome = self.compute_async(params, ctx).await;
        ctx.dispose_all();
        outcome
    }
}

impl std::fmt::Debug for Executable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executable")
            .field("entry", &self.inner.program.entry_scope)
            .field("units", &self.inner.program.units.len())
            .field("is_async", &self.is_async())
            .finish()
    }
}

/// Argument with its expanded elements still unbound.
enum Slot {
    Ready(Arg),
    /// Column of an expanded line, read once before the loop.
    Element {
        symbol: String,
        items: Vec<Value>,
        convert: Option<SchemaSpec>,
    },
    Object(Vec<(String, Slot)>),
    Array(Vec<Slot>),
}

type Row<'a> = HashMap<&'a str, &'a Value>;

impl Slot {
    fn columns<'s>(&'s self, out: &mut Vec<(&'s str, &'s [Value])>) {
        match self {
            Slot::Ready(_) => {}
            Slot::Element { symbol, items, .. } => out.push((symbol.as_str(), items.as_slice())),
            Slot::Object(fields) => fields.iter().for_each(|(_, slot)| slot.columns(out)),
            Slot::Array(items) => items.iter().for_each(|slot| slot.columns(out)),
        }
    }

    fn fill(&self, row: &Row<'_>, ctx: &EvalContext) -> Result<Arg, RuntimeError> {
        match self {
            Slot::Ready(arg) => Ok(arg.clone()),
            Slot::Element { symbol, convert, .. } => {
                let value = row.get(symbol.as_str()).map_or(Value::Null, |v| (*v).clone());
                match convert {
                    Some(schema) => Ok(Arg::Value(ctx.convert_type(&value, schema)?)),
                    None => Ok(Arg::Value(value)),
                }
            }
            Slot::Object(fields) => {
                let mut out = IndexMap::with_capacity(fields.len());
                for (key, slot) in fields {
                    out.insert(key.clone(), slot.fill(row, ctx)?);
                }
                Ok(Arg::object(out))
            }
            Slot::Array(items) => {
                let items = items
                    .iter()
                    .map(|slot| slot.fill(row, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Arg::array(items))
            }
        }
    }
}

fn fill_all(slots: &[(String, Slot)], row: &Row<'_>, ctx: &EvalContext) -> Result<Params, RuntimeError> {
    slots
        .iter()
        .map(|(key, slot)| Ok((key.clone(), slot.fill(row, ctx)?)))
        .collect()
}

impl Inner {
    fn unit(&self, symbol: &str) -> Result<&NodeUnit, RuntimeError> {
        self.program
            .unit(symbol)
            .ok_or_else(|| RuntimeError::internal(format!("unknown node function {symbol}")))
    }

    fn call_scope(
        self: &Arc<Self>,
        scope: &ScopeId,
        params: Arc<Value>,
        ctx: EvalContext,
    ) -> BoxFuture<'static, Result<Value, RuntimeError>> {
        Self::run_scope(Arc::clone(self), scope.clone(), params, ctx).boxed()
    }

    async fn run_scope(
        self: Arc<Self>,
        scope: ScopeId,
        params: Arc<Value>,
        ctx: EvalContext,
    ) -> Result<Value, RuntimeError> {
        let root = self
            .program
            .scope(&scope)
            .ok_or_else(|| RuntimeError::internal(format!("unknown scope {scope}")))?
            .root
            .clone();
        match root {
            Some(symbol) => self.call_unit(&symbol, params, ctx).await,
            None => Ok(Value::Null),
        }
    }

    fn call_unit(
        self: &Arc<Self>,
        symbol: &str,
        params: Arc<Value>,
        ctx: EvalContext,
    ) -> BoxFuture<'static, Result<Value, RuntimeError>> {
        Self::run_unit(Arc::clone(self), symbol.to_string(), params, ctx).boxed()
    }

    async fn run_unit(
        self: Arc<Self>,
        symbol: String,
        params: Arc<Value>,
        ctx: EvalContext,
    ) -> Result<Value, RuntimeError> {
        let unit = self.unit(&symbol)?;
        if unit.cached {
            if let Some(hit) = ctx.cached(&unit.uid) {
                return hit;
            }
        }

        tracing::trace!(node = %unit.uid, symbol = %unit.symbol, "evaluating node");
        let outcome = if self.program.introspect {
            self.introspect(unit, &params, &ctx).await
        } else {
            self.evaluate(unit, &params, &ctx).await
        };

        if unit.cached && !outcome.as_ref().is_err_and(RuntimeError::is_pending) {
            ctx.store(unit.uid.clone(), outcome.clone());
        }
        outcome
    }

    async fn introspect(
        self: &Arc<Self>,
        unit: &NodeUnit,
        params: &Arc<Value>,
        ctx: &EvalContext,
    ) -> Result<Value, RuntimeError> {
        ctx.check_pending(&unit.uid)?;
        ctx.emit(NodeEvent::progress(unit.uid.clone(), 0.0));
        let outcome = self.evaluate(unit, params, ctx).await;
        match &outcome {
            Ok(value) => ctx.emit(NodeEvent::result(unit.uid.clone(), value.clone())),
            Err(err) if err.is_pending() => {}
            Err(err) => ctx.emit(NodeEvent::error(unit.uid.clone(), err)),
        }
        outcome
    }

    async fn evaluate(
        self: &Arc<Self>,
        unit: &NodeUnit,
        params: &Arc<Value>,
        ctx: &EvalContext,
    ) -> Result<Value, RuntimeError> {
        if unit.body == UnitBody::Unresolved {
            return Err(unresolved(unit));
        }

        let mut slots = Vec::with_capacity(unit.args.len());
        for (key, expr) in &unit.args {
            slots.push((key.clone(), self.prepare(expr, &unit.expanded, params, ctx).await?));
        }
        if !unit.is_expanding() {
            let args = fill_all(&slots, &Row::new(), ctx)?;
            return self.invoke(unit, args, params, ctx).await;
        }

        let mut columns = Vec::with_capacity(unit.expanded.len());
        for (_, slot) in &slots {
            slot.columns(&mut columns);
        }
        let len = columns.iter().map(|(_, items)| items.len()).min().unwrap_or(0);
        let mut results = Vec::with_capacity(len);
        for index in 0..len {
            let args = {
                let row: Row<'_> = columns
                    .iter()
                    .map(|(symbol, items)| (*symbol, &items[index]))
                    .collect();
                fill_all(&slots, &row, ctx)?
            };
            results.push(self.invoke(unit, args, params, ctx).await?);
            if self.program.introspect {
                let progress = (index + 1) as f64 / len as f64;
                ctx.emit(NodeEvent::progress(unit.uid.clone(), progress));
            }
        }
        Ok(Value::Array(results))
    }

    async fn expanded_items(
        self: &Arc<Self>,
        line: &ExpandedLine,
        params: &Arc<Value>,
        ctx: &EvalContext,
    ) -> Result<Vec<Value>, RuntimeError> {
        let value = self.link_value(&line.source, params, ctx).await?;
        // An expanding upstream already yields one array per evaluation.
        Ok(match value {
            Value::Array(items) if line.upstream_expanded => items,
            other => ctx.to_array(other),
        })
    }

    fn prepare<'a>(
        self: &'a Arc<Self>,
        expr: &'a ArgExpr,
        lines: &'a [ExpandedLine],
        params: &'a Arc<Value>,
        ctx: &'a EvalContext,
    ) -> BoxFuture<'a, Result<Slot, RuntimeError>> {
        async move {
            let slot = match expr {
                ArgExpr::Literal(value) => Slot::Ready(Arg::Value(value.clone())),
                ArgExpr::Link(link) => Slot::Ready(Arg::Value(self.link_value(link, params, ctx).await?)),
                ArgExpr::Deferred(link) => Slot::Ready(Arg::Deferred(self.deferred(link, params, ctx))),
                ArgExpr::Lambda(inner) => Slot::Ready(Arg::Lambda(self.lambda(inner, params)?)),
                ArgExpr::Expanded { symbol, convert } => {
                    let line = lines
                        .iter()
                        .find(|line| &line.symbol == symbol)
                        .ok_or_else(|| RuntimeError::internal(format!("unknown expanded line {symbol}")))?;
                    Slot::Element {
                        symbol: symbol.clone(),
                        items: self.expanded_items(line, params, ctx).await?,
                        convert: convert.clone(),
                    }
                }
                ArgExpr::Object(fields) => {
                    let mut out = Vec::with_capacity(fields.len());
                    for (key, field) in fields {
                        out.push((key.clone(), self.prepare(field, lines, params, ctx).await?));
                    }
                    Slot::Object(out)
                }
                ArgExpr::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.prepare(item, lines, params, ctx).await?);
                    }
                    Slot::Array(out)
                }
            };
            Ok::<Slot, RuntimeError>(slot)
        }
        .boxed()
    }

    /// Upstream call, projected through the link key and converted when the
    /// link carries a conversion.
    fn link_value(
        self: &Arc<Self>,
        link: &LinkExpr,
        params: &Arc<Value>,
        ctx: &EvalContext,
    ) -> BoxFuture<'static, Result<Value, RuntimeError>> {
        let call = self.call_unit(&link.call, Arc::clone(params), ctx.clone());
        let link_key = link.link_key.clone();
        let convert = link.convert.clone();
        let ctx = ctx.clone();
        async move {
            let value = project(call.await?, &link_key);
            match convert {
                Some(schema) => ctx.convert_type(&value, &schema),
                None => Ok(value),
            }
        }
        .boxed()
    }

    fn deferred(self: &Arc<Self>, link: &LinkExpr, params: &Arc<Value>, ctx: &EvalContext) -> Deferred {
        let this = Arc::clone(self);
        let schema = link.convert.clone();
        let link = LinkExpr {
            convert: None,
            ..link.clone()
        };
        let params = Arc::clone(params);
        let ctx = ctx.clone();
        let deferred = Deferred::new(move || this.link_value(&link, &params, &ctx));
        match schema {
            Some(schema) => deferred.with_schema(schema),
            None => deferred,
        }
    }

    fn lambda(self: &Arc<Self>, inner: &ArgExpr, params: &Arc<Value>) -> Result<Lambda, RuntimeError> {
        match inner {
            ArgExpr::Link(link) => {
                let this = Arc::clone(self);
                let link = link.clone();
                let params = Arc::clone(params);
                Ok(Lambda::new(move |scope| this.link_value(&link, &params, &scope)))
            }
            ArgExpr::Literal(value) => Ok(Lambda::constant(value.clone())),
            other => Err(RuntimeError::internal(format!(
                "lambda over unsupported expression {other:?}"
            ))),
        }
    }

    async fn invoke(
        self: &Arc<Self>,
        unit: &NodeUnit,
        args: Params,
        params: &Arc<Value>,
        ctx: &EvalContext,
    ) -> Result<Value, RuntimeError> {
        match &unit.body {
            UnitBody::Param => Ok(params.get(key_arg(&args).as_str()).cloned().unwrap_or(Value::Null)),
            UnitBody::Local => Ok(ctx.get_local(&key_arg(&args)).unwrap_or(Value::Null)),
            UnitBody::Input | UnitBody::Output => Ok(args.value("value")),
            UnitBody::Module { import, .. } => {
                let node = self
                    .imports
                    .get(import)
                    .cloned()
                    .ok_or_else(|| RuntimeError::internal(format!("unbound import {import}")))?;
                node.compute(args, ctx.clone()).await
            }
            UnitBody::Subgraph { scope, .. } => {
                let data = args.resolve(ctx).await?;
                let nested = ctx.new_scope(data.clone());
                self.call_scope(scope, Arc::new(Value::Object(data)), nested).await
            }
            UnitBody::Unresolved => Err(unresolved(unit)),
        }
    }
}

fn unresolved(unit: &NodeUnit) -> RuntimeError {
    RuntimeError::UnresolvedNode {
        node: unit.uid.clone(),
        reference: unit.reference.clone(),
    }
}

fn key_arg(args: &Params) -> String {
    match args.value("key") {
        Value::String(key) => key,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Extracts a dotted key path. Array segments are indices; anything that
/// cannot be followed yields `null`.
fn project(value: Value, link_key: &str) -> Value {
    if link_key.is_empty() {
        return value;
    }
    let mut current = value;
    for segment in link_key.split('.') {
        current = match current {
            Value::Object(mut map) => map.remove(segment).unwrap_or(Value::Null),
            Value::Array(mut items) => match segment.parse::<usize>() {
                Ok(index) if index < items.len() => items.swap_remove(index),
                _ => Value::Null,
            },
            _ => Value::Null,
        };
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn projection_follows_objects_and_indices() {
        let value = json!({"user": {"tags": ["a", "b"]}});
        assert_eq!(project(value.clone(), ""), value);
        assert_eq!(project(value.clone(), "user.tags.1"), json!("b"));
        assert_eq!(project(value.clone(), "user.missing"), Value::Null);
        assert_eq!(project(value, "user.tags.9"), Value::Null);
        assert_eq!(project(json!(3), "a"), Value::Null);
    }

    #[test]
    fn key_argument_is_stringified() {
        let params: Params = [("key".to_string(), Arg::Value(json!(3)))].into_iter().collect();
        assert_eq!(key_arg(&params), "3");
        assert_eq!(key_arg(&Params::default()), "");
    }
}
