//! Symbol allocation for emitted program entities.
//!
//! Every emitted entity is addressed by a logical key and receives a short
//! unique name built from a prefix and a per-prefix counter (`r1`, `r2`, ...).
//! The table is owned by one compilation and threaded through every scope.

use std::collections::HashMap;

use nodescript_core::id::{NodeId, ScopeId};

use crate::error::CompilerError;

/// Prefix of node function symbols.
pub const NODE_PREFIX: &str = "r";
/// Prefix of imported module handles.
pub const DEF_PREFIX: &str = "d";
/// Prefix of expanded-line temporaries.
pub const LINE_PREFIX: &str = "p";
/// Prefix of nested scope entry functions.
pub const SCOPE_PREFIX: &str = "s";

#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, String>,
    counters: HashMap<String, usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_key(scope: &ScopeId, id: &NodeId) -> String {
        format!("node:{}:{}", scope.as_str(), id.as_str())
    }

    pub fn def_key(reference: &str) -> String {
        format!("def:{reference}")
    }

    pub fn line_key(scope: &ScopeId, line_id: &str) -> String {
        format!("line:{}:{}", scope.as_str(), line_id)
    }

    pub fn scope_key(scope: &ScopeId) -> String {
        format!("scope:{}", scope.as_str())
    }

    /// Returns the symbol of `key`, minting a fresh one with `prefix` on
    /// first use.
    pub fn allocate(&mut self, key: impl Into<String>, prefix: &str) -> String {
        let key = key.into();
        if let Some(symbol) = self.symbols.get(&key) {
            return symbol.clone();
        }
        let counter = self.counters.entry(prefix.to_string()).or_insert(0);
        *counter += 1;
        let symbol = format!("{prefix}{counter}");
        self.symbols.insert(key, symbol.clone());
        symbol
    }

    /// Registers a fixed symbol for `key`.
    pub fn assign(&mut self, key: impl Into<String>, symbol: impl Into<String>) {
        self.symbols.insert(key.into(), symbol.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.symbols.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Result<&str, CompilerError> {
        self.symbols
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| CompilerError::SymbolNotFound {
                key: key.to_string(),
            })
    }
}
