//! Node implementations keyed by compute url.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use serde_json::Value;

use crate::context::EvalContext;
use crate::error::RuntimeError;
use crate::value::Params;

/// Implementation of a module's `compute(params, ctx)`.
pub trait NodeCompute: Send + Sync {
    fn compute(&self, params: Params, ctx: EvalContext) -> BoxFuture<'static, Result<Value, RuntimeError>>;
}

impl<F, Fut> NodeCompute for F
where
    F: Fn(Params, EvalContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, RuntimeError>> + Send + 'static,
{
    fn compute(&self, params: Params, ctx: EvalContext) -> BoxFuture<'static, Result<Value, RuntimeError>> {
        self(params, ctx).boxed()
    }
}

#[derive(Clone, Default)]
pub struct NodeRegistry {
    nodes: HashMap<String, Arc<dyn NodeCompute>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, url: impl Into<String>, node: impl NodeCompute + 'static) -> &mut Self {
        self.nodes.insert(url.into(), Arc::new(node));
        self
    }

    /// Registers a node that never suspends.
    pub fn register_sync<F>(&mut self, url: impl Into<String>, node: F) -> &mut Self
    where
        F: Fn(&Params) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        self.register(url, move |params: Params, _ctx: EvalContext| {
            future::ready(node(&params))
        })
    }

    pub fn get(&self, url: &str) -> Option<Arc<dyn NodeCompute>> {
        self.nodes.get(url).cloned()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.nodes.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut urls: Vec<&String> = self.nodes.keys().collect();
        urls.sort();
        f.debug_struct("NodeRegistry").field("urls", &urls).finish()
    }
}
