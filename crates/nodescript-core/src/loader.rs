//! The [`ModuleLoader`] seam.
//!
//! Module definitions live outside the engine (catalog services, files on
//! disk). The graph model and the compiler only talk to them through this
//! trait and never perform I/O themselves. [`InMemoryLoader`] is the
//! in-process implementation used by hosts that register modules up front,
//! and by tests.

use futures::future::{self, BoxFuture, FutureExt};
use indexmap::IndexMap;

use crate::builtins::BuiltinKind;
use crate::error::CoreError;
use crate::module::ModuleSpec;

/// Resolves node references to module contracts and implementations.
pub trait ModuleLoader: Send + Sync {
    /// Returns the contract of an already known module.
    fn resolve_module(&self, reference: &str) -> Option<ModuleSpec>;

    /// Loads the contract of a module, possibly fetching it first.
    fn load_module<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, Result<ModuleSpec, CoreError>>;

    /// Locates the implementation of a module so compiled programs can import
    /// it.
    fn resolve_compute_url(&self, reference: &str) -> String;
}

/// Loader backed by an in-memory module table. Built-ins are always known.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoader {
    modules: IndexMap<String, ModuleSpec>,
    compute_urls: IndexMap<String, String>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module whose implementation is located by its reference.
    pub fn register(&mut self, reference: impl Into<String>, spec: ModuleSpec) -> &mut Self {
        self.modules.insert(reference.into(), spec);
        self
    }

    /// Registers a module together with an explicit implementation url.
    pub fn register_with_url(
        &mut self,
        reference: impl Into<String>,
        spec: ModuleSpec,
        url: impl Into<String>,
    ) -> &mut Self {
        let reference = reference.into();
        self.compute_urls.insert(reference.clone(), url.into());
        self.modules.insert(reference, spec);
        self
    }

    pub fn with_module(mut self, reference: impl Into<String>, spec: ModuleSpec) -> Self {
        self.register(reference, spec);
        self
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ModuleLoader for InMemoryLoader {
    fn resolve_module(&self, reference: &str) -> Option<ModuleSpec> {
        if let Some(kind) = BuiltinKind::from_ref(reference) {
            return Some(kind.module_spec());
        }
        self.modules.get(reference).cloned()
    }

    fn load_module<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, Result<ModuleSpec, CoreError>> {
        let result = self
            .resolve_module(reference)
            .ok_or_else(|| CoreError::ModuleLoadFailed {
                reference: reference.to_string(),
                reason: "module not registered".to_string(),
            });
        future::ready(result).boxed()
    }

    fn resolve_compute_url(&self, reference: &str) -> String {
        self.compute_urls
            .get(reference)
            .cloned()
            .unwrap_or_else(|| reference.to_string())
    }
}
