//! Evaluation context threaded through every node call.
//!
//! An [`EvalContext`] is a cheap handle onto one scope: its locals, its
//! memoization cache and its parent. Scopes created with
//! [`EvalContext::new_scope`] get a fresh cache and fresh locals but share
//! the codec, the event listeners, the disposables and the pending set with
//! the whole evaluation.

use std::fmt;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use nodescript_check::{type_of, DefaultCodec, SchemaCodec};
use nodescript_core::id::NodeUid;
use nodescript_core::schema::SchemaSpec;

use crate::error::RuntimeError;
use crate::events::{EventEmitter, NodeEvent};
use crate::value::Arg;

/// Cleanup handle registered by a node.
pub type Disposable = Box<dyn FnOnce() -> Result<(), RuntimeError> + Send>;

#[derive(Clone)]
pub struct EvalContext {
    scope: Arc<Scope>,
    shared: Arc<Shared>,
}

struct Scope {
    parent: Option<EvalContext>,
    locals: Map<String, Value>,
    cache: DashMap<NodeUid, Result<Value, RuntimeError>>,
}

struct Shared {
    codec: Arc<dyn SchemaCodec>,
    events: EventEmitter,
    disposables: Mutex<IndexMap<String, Disposable>>,
    pending: DashSet<NodeUid>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::with_codec(Arc::new(DefaultCodec))
    }

    pub fn with_codec(codec: Arc<dyn SchemaCodec>) -> Self {
        EvalContext {
            scope: Arc::new(Scope {
                parent: None,
                locals: Map::new(),
                cache: DashMap::new(),
            }),
            shared: Arc::new(Shared {
                codec,
                events: EventEmitter::new(),
                disposables: Mutex::new(IndexMap::new()),
                pending: DashSet::new(),
            }),
        }
    }

    /// Child scope with `locals` and an empty cache.
    pub fn new_scope(&self, locals: Map<String, Value>) -> EvalContext {
        EvalContext {
            scope: Arc::new(Scope {
                parent: Some(self.clone()),
                locals,
                cache: DashMap::new(),
            }),
            shared: self.shared.clone(),
        }
    }

    pub fn parent(&self) -> Option<&EvalContext> {
        self.scope.parent.as_ref()
    }

    pub fn locals(&self) -> &Map<String, Value> {
        &self.scope.locals
    }

    /// Looks `key` up in this scope, then in each ancestor.
    pub fn get_local(&self, key: &str) -> Option<Value> {
        let mut current = Some(self);
        while let Some(ctx) = current {
            if let Some(value) = ctx.scope.locals.get(key) {
                return Some(value.clone());
            }
            current = ctx.scope.parent.as_ref();
        }
        None
    }

    // --- cache ---

    pub fn cached(&self, uid: &NodeUid) -> Option<Result<Value, RuntimeError>> {
        self.scope.cache.get(uid).map(|entry| entry.value().clone())
    }

    pub fn store(&self, uid: NodeUid, outcome: Result<Value, RuntimeError>) {
        self.scope.cache.insert(uid, outcome);
    }

    pub fn is_cached(&self, uid: &NodeUid) -> bool {
        self.scope.cache.contains_key(uid)
    }

    pub fn cache_len(&self) -> usize {
        self.scope.cache.len()
    }

    // --- type services ---

    pub fn convert_type(&self, value: &Value, schema: &SchemaSpec) -> Result<Value, RuntimeError> {
        Ok(self.shared.codec.decode(value, schema)?)
    }

    pub fn default_value(&self, schema: &SchemaSpec) -> Value {
        self.shared.codec.default_value(schema)
    }

    /// Arrays as they are, anything else as a one-element array.
    pub fn to_array(&self, value: Value) -> Vec<Value> {
        match value {
            Value::Array(items) => items,
            other => vec![other],
        }
    }

    pub fn get_type(&self, value: &Value) -> &'static str {
        type_of(value)
    }

    /// Resolves `arg` to a plain value: thunks are invoked and converted to
    /// their attached schema, collections are resolved item by item in
    /// order. Lambdas resolve to `null`.
    pub fn resolve_deferred<'a>(&'a self, arg: &'a Arg) -> BoxFuture<'a, Result<Value, RuntimeError>> {
        async move {
            match arg {
                Arg::Value(value) => Ok(value.clone()),
                Arg::Deferred(deferred) => {
                    let value = deferred.invoke().await?;
                    match deferred.schema() {
                        Some(schema) => self.convert_type(&value, schema),
                        None => Ok(value),
                    }
                }
                Arg::Lambda(_) => Ok(Value::Null),
                Arg::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.resolve_deferred(item).await?);
                    }
                    Ok(Value::Array(out))
                }
                Arg::Object(fields) => {
                    let mut out = Map::new();
                    for (key, item) in fields {
                        out.insert(key.clone(), self.resolve_deferred(item).await?);
                    }
                    Ok(Value::Object(out))
                }
            }
        }
        .boxed()
    }

    // --- disposables ---

    /// Registers a cleanup under `key`. A cleanup already registered under
    /// the same key is run first.
    pub fn set_disposable(
        &self,
        key: impl Into<String>,
        cleanup: impl FnOnce() -> Result<(), RuntimeError> + Send + 'static,
    ) {
        let key = key.into();
        let previous = self
            .shared
            .disposables
            .lock()
            .insert(key.clone(), Box::new(cleanup));
        if let Some(previous) = previous {
            run_cleanup(&key, previous);
        }
    }

    /// Runs and removes the cleanup under `key`. Returns whether one was
    /// registered.
    pub fn dispose(&self, key: &str) -> bool {
        let cleanup = self.shared.disposables.lock().shift_remove(key);
        match cleanup {
            Some(cleanup) => {
                run_cleanup(key, cleanup);
                true
            }
            None => false,
        }
    }

    /// Runs every registered cleanup in registration order. Failures are
    /// logged and do not stop the remaining cleanups. Returns the number of
    /// cleanups that succeeded.
    pub fn dispose_all(&self) -> usize {
        let drained: Vec<(String, Disposable)> =
            std::mem::take(&mut *self.shared.disposables.lock()).into_iter().collect();
        drained
            .into_iter()
            .map(|(key, cleanup)| run_cleanup(&key, cleanup))
            .filter(|ok| *ok)
            .count()
    }

    pub fn disposable_count(&self) -> usize {
        self.shared.disposables.lock().len()
    }

    // --- step-through ---

    pub fn mark_pending(&self, uid: NodeUid) {
        self.shared.pending.insert(uid);
    }

    pub fn clear_pending(&self, uid: &NodeUid) -> bool {
        self.shared.pending.remove(uid).is_some()
    }

    pub fn is_pending(&self, uid: &NodeUid) -> bool {
        self.shared.pending.contains(uid)
    }

    /// Fails with [`RuntimeError::NodePending`] if `uid` is staged.
    pub fn check_pending(&self, uid: &NodeUid) -> Result<(), RuntimeError> {
        if self.is_pending(uid) {
            return Err(RuntimeError::NodePending { node: uid.clone() });
        }
        Ok(())
    }

    // --- events ---

    pub fn on_event(&self, listener: impl Fn(&NodeEvent) + Send + Sync + 'static) {
        self.shared.events.on(listener);
    }

    pub fn emit(&self, event: NodeEvent) {
        self.shared.events.emit(&event);
    }
}

fn run_cleanup(key: &str, cleanup: Disposable) -> bool {
    match cleanup() {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(key, error = %err, "disposable cleanup failed");
            false
        }
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EvalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalContext")
            .field("locals", &self.scope.locals)
            .field("cached", &self.scope.cache.len())
            .field("root", &self.scope.parent.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn locals(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn locals_walk_up_the_parent_chain() {
        let root = EvalContext::new();
        let outer = root.new_scope(locals(json!({"a": 1, "b": 2})));
        let inner = outer.new_scope(locals(json!({"b": 3})));

        assert_eq!(inner.get_local("a"), Some(json!(1)));
        assert_eq!(inner.get_local("b"), Some(json!(3)));
        assert_eq!(outer.get_local("b"), Some(json!(2)));
        assert_eq!(inner.get_local("c"), None);
        assert_eq!(root.get_local("a"), None);
    }

    #[test]
    fn nested_scopes_have_their_own_cache() {
        let root = EvalContext::new();
        let uid = NodeUid::from("n");
        root.store(uid.clone(), Ok(json!(1)));
        let child = root.new_scope(Map::new());

        assert!(root.is_cached(&uid));
        assert!(!child.is_cached(&uid));
        child.store(uid.clone(), Err(RuntimeError::node("boom")));
        assert_eq!(root.cached(&uid), Some(Ok(json!(1))));
        assert_eq!(child.cached(&uid), Some(Err(RuntimeError::node("boom"))));
    }

    #[test]
    fn type_services() {
        let ctx = EvalContext::new();
        assert_eq!(ctx.to_array(json!([1, 2])), vec![json!(1), json!(2)]);
        assert_eq!(ctx.to_array(json!("x")), vec![json!("x")]);
        assert_eq!(ctx.get_type(&json!({})), "object");
        assert_eq!(ctx.convert_type(&json!("42"), &SchemaSpec::number()).unwrap(), json!(42));
        assert!(matches!(
            ctx.convert_type(&json!("forty"), &SchemaSpec::number()),
            Err(RuntimeError::Conversion(_))
        ));
    }

    #[test]
    fn dispose_all_is_best_effort() {
        let ctx = EvalContext::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        ctx.set_disposable("first", || Err(RuntimeError::node("cannot close")));
        ctx.set_disposable("second", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(ctx.dispose_all(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.disposable_count(), 0);
    }

    #[test]
    fn replacing_a_disposable_runs_the_old_one() {
        let ctx = EvalContext::new();
        let runs = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let counter = runs.clone();
            ctx.set_disposable("conn", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(ctx.dispose("conn"));
        assert!(!ctx.dispose("conn"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn disposables_and_pending_are_shared_with_child_scopes() {
        let root = EvalContext::new();
        let child = root.new_scope(Map::new());
        child.set_disposable("k", || Ok(()));
        assert_eq!(root.disposable_count(), 1);

        let uid = NodeUid::from("step");
        root.mark_pending(uid.clone());
        assert_eq!(
            child.check_pending(&uid),
            Err(RuntimeError::NodePending { node: uid.clone() })
        );
        assert!(child.clear_pending(&uid));
        assert!(root.check_pending(&uid).is_ok());
    }
}
