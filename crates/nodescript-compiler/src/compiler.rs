//! Graph compilation.
//!
//! [`compile`] lowers a [`Graph`] into a [`Program`] and renders its listing.
//! Scopes are compiled from the root down: a node hosting a sub-graph
//! triggers compilation of the nested scope before its own unit is built, so
//! the async-ness of the nested entry is known at the call site. Shared
//! sub-graph definitions are compiled once no matter how many nodes call
//! them.
//!
//! Per scope the pipeline is:
//! 1. evaluation order from the scope root ([`Topology::compute_order`]), or
//!    every node when `emit_all` is set
//! 2. strategy per node (built-in, module call, sub-graph call, unresolved)
//! 3. async inference over the emitted nodes only
//! 4. symbol allocation, then one [`NodeUnit`] per node
//!
//! [`Topology::compute_order`]: nodescript_core::Topology::compute_order

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::Value;

use nodescript_check::{convert_static, is_compatible, DefaultCodec, SchemaCodec};
use nodescript_core::builtins::BuiltinKind;
use nodescript_core::graph::{Graph, GraphScope};
use nodescript_core::id::{NodeId, ScopeId};
use nodescript_core::module::{CacheMode, EvalMode, ModuleSpec, ParamSpec, ResultSpec};
use nodescript_core::schema::{SchemaSpec, SchemaType};
use nodescript_core::spec::NodeSpec;

use crate::error::CompilerError;
use crate::listing;
use crate::program::{
    ArgExpr, ExpandedLine, Import, LinkExpr, NodeUnit, Program, ScopeProgram, UnitBody,
    ENTRY_SYMBOL,
};
use crate::symbols::{SymbolTable, DEF_PREFIX, LINE_PREFIX, NODE_PREFIX, SCOPE_PREFIX};
use crate::{CompileOptions, CompiledGraph};

/// Compiles `graph` with the default schema codec.
pub fn compile(graph: &Graph, options: &CompileOptions) -> Result<CompiledGraph, CompilerError> {
    compile_with_codec(graph, options, &DefaultCodec)
}

/// Compiles `graph`, interpreting literal property values with `codec`.
pub fn compile_with_codec(
    graph: &Graph,
    options: &CompileOptions,
    codec: &dyn SchemaCodec,
) -> Result<CompiledGraph, CompilerError> {
    let root_scope = graph.root_scope();
    let root_id = options
        .root_node_id
        .clone()
        .unwrap_or_else(|| root_scope.root_node_id.clone());
    if !root_scope.nodes.contains_key(&root_id) {
        return Err(CompilerError::RootNodeNotFound { id: root_id });
    }

    let mut compiler = Compiler::new(graph, options, codec);
    compiler
        .symbols
        .assign(SymbolTable::scope_key(&root_scope.id), ENTRY_SYMBOL);
    compiler.compile_scope(root_scope, Some(root_id.clone()))?;

    let entry_async = compiler
        .program
        .entry()
        .is_some_and(|scope| scope.is_async);
    let root_symbol = compiler
        .symbols
        .get(&SymbolTable::node_key(&ScopeId::root(), &root_id))?
        .to_string();
    let mut schema = compiler.result_schema(&graph.root_scope(), &root_id);
    if compiler
        .program
        .unit(&root_symbol)
        .is_some_and(NodeUnit::is_expanding)
    {
        schema = SchemaSpec::array(schema);
    }
    let result = ResultSpec {
        schema,
        is_async: entry_async,
    };
    compiler.program.result = result.clone();

    let program = compiler.program;
    let code = listing::render(&program, options.comments);
    Ok(CompiledGraph {
        code,
        program,
        result,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Strategy {
    Builtin(BuiltinKind),
    Module,
    Subgraph(ScopeId),
    Unresolved,
}

/// Facts about the scope currently being lowered.
struct ScopeFacts<'g> {
    scope: GraphScope<'g>,
    is_async: bool,
    emitted: HashSet<NodeId>,
    expanding: HashSet<NodeId>,
}

struct Compiler<'g, 'c> {
    graph: &'g Graph,
    options: &'c CompileOptions,
    codec: &'c dyn SchemaCodec,
    symbols: SymbolTable,
    program: Program,
    compiling: HashSet<ScopeId>,
}

impl<'g, 'c> Compiler<'g, 'c> {
    fn new(graph: &'g Graph, options: &'c CompileOptions, codec: &'c dyn SchemaCodec) -> Self {
        Compiler {
            graph,
            options,
            codec,
            symbols: SymbolTable::new(),
            program: Program {
                imports: IndexMap::new(),
                scopes: IndexMap::new(),
                units: IndexMap::new(),
                entry_scope: ScopeId::root(),
                result: ResultSpec::default(),
                introspect: options.introspect,
                node_map: options.emit_node_map.then(IndexMap::new),
            },
            compiling: HashSet::new(),
        }
    }

    fn compile_scope(
        &mut self,
        scope: GraphScope<'g>,
        root: Option<NodeId>,
    ) -> Result<(), CompilerError> {
        if self.program.scopes.contains_key(&scope.id) || !self.compiling.insert(scope.id.clone()) {
            return Ok(());
        }
        let scope_symbol = self
            .symbols
            .allocate(SymbolTable::scope_key(&scope.id), SCOPE_PREFIX);
        let root_id = root.unwrap_or_else(|| scope.root_node_id.clone());
        let order = self.order(&scope, &root_id);

        let mut strategies = Vec::with_capacity(order.len());
        for id in &order {
            let strategy = self.strategy(&scope, id);
            if let Strategy::Subgraph(child_id) = &strategy {
                let child = self
                    .graph
                    .scope(child_id)
                    .ok_or_else(|| CompilerError::ScopeNotFound {
                        id: child_id.clone(),
                    })?;
                self.compile_scope(child, None)?;
            }
            strategies.push(strategy);
        }

        let is_async = order
            .iter()
            .zip(&strategies)
            .any(|(id, strategy)| self.node_is_async(&scope, id, strategy));

        for id in &order {
            self.symbols
                .allocate(SymbolTable::node_key(&scope.id, id), NODE_PREFIX);
        }

        let emitted: HashSet<NodeId> = order.iter().cloned().collect();
        let expanding = order
            .iter()
            .filter(|id| self.is_expanding(&scope, id, &emitted))
            .cloned()
            .collect();
        let facts = ScopeFacts {
            scope,
            is_async,
            emitted,
            expanding,
        };

        let mut unit_symbols = Vec::with_capacity(order.len());
        for (id, strategy) in order.iter().zip(strategies) {
            let unit = self.build_unit(&facts, id, strategy)?;
            if let Some(map) = &mut self.program.node_map {
                map.insert(unit.uid.clone(), unit.symbol.clone());
            }
            unit_symbols.push(unit.symbol.clone());
            self.program.units.insert(unit.symbol.clone(), unit);
        }

        let root_symbol = if facts.emitted.contains(&root_id) {
            Some(
                self.symbols
                    .get(&SymbolTable::node_key(&facts.scope.id, &root_id))?
                    .to_string(),
            )
        } else {
            None
        };

        tracing::debug!(
            scope = %facts.scope.id,
            nodes = unit_symbols.len(),
            is_async,
            "compiled scope"
        );

        self.program.scopes.insert(
            facts.scope.id.clone(),
            ScopeProgram {
                id: facts.scope.id.clone(),
                symbol: scope_symbol,
                is_async,
                root: root_symbol,
                units: unit_symbols,
            },
        );
        self.compiling.remove(&facts.scope.id);
        Ok(())
    }

    /// Evaluation order of the scope. With `emit_all`, nodes unreachable from
    /// the root follow it, each preceded by its own missing dependencies.
    fn order(&self, scope: &GraphScope<'g>, root: &NodeId) -> Vec<NodeId> {
        let topo = scope.topology();
        let mut order = topo.compute_order(root);
        if self.options.emit_all {
            let mut seen: HashSet<NodeId> = order.iter().cloned().collect();
            for id in scope.nodes.keys() {
                if seen.contains(id) {
                    continue;
                }
                for dep in topo.compute_order(id) {
                    if seen.insert(dep.clone()) {
                        order.push(dep);
                    }
                }
            }
        }
        order
    }

    fn strategy(&self, scope: &GraphScope<'g>, id: &NodeId) -> Strategy {
        let Some(node) = scope.node(id) else {
            return Strategy::Unresolved;
        };
        if node.subgraph.is_some() {
            if let Some(child) = scope.subgraph_scope_of(id) {
                return Strategy::Subgraph(child);
            }
        }
        if let Some(kind) = BuiltinKind::from_ref(&node.reference) {
            return Strategy::Builtin(kind);
        }
        if !self.graph.is_resolved(&node.reference) {
            return Strategy::Unresolved;
        }
        match scope.subgraph_scope_of(id) {
            Some(child) => Strategy::Subgraph(child),
            None => Strategy::Module,
        }
    }

    /// Contract of a node: the resolved module, the inline sub-graph's own
    /// contract when the host reference is unknown, or an unresolved
    /// stand-in.
    fn contract(&self, node: &NodeSpec) -> ModuleSpec {
        if let Some(contract) = self.graph.node_contract(node) {
            return contract.clone();
        }
        if let Some(kind) = BuiltinKind::from_ref(&node.reference) {
            return kind.module_spec();
        }
        ModuleSpec::unresolved(&node.reference)
    }

    fn node_is_async(&self, scope: &GraphScope<'g>, id: &NodeId, strategy: &Strategy) -> bool {
        match strategy {
            Strategy::Module => scope
                .node(id)
                .is_some_and(|node| self.contract(node).result.is_async),
            Strategy::Subgraph(child) => self
                .program
                .scopes
                .get(child)
                .is_some_and(|s| s.is_async),
            Strategy::Builtin(_) | Strategy::Unresolved => false,
        }
    }

    fn result_schema(&self, scope: &GraphScope<'g>, id: &NodeId) -> SchemaSpec {
        scope
            .node(id)
            .map(|node| self.contract(node).result.schema)
            .unwrap_or_default()
    }

    /// Whether the node has at least one expanded line: linked to an
    /// emitted node, flagged `expand`, and on an expansion-eligible param.
    fn is_expanding(&self, scope: &GraphScope<'g>, id: &NodeId, emitted: &HashSet<NodeId>) -> bool {
        let Some(node) = scope.node(id) else {
            return false;
        };
        let contract = self.contract(node);
        node.lines().iter().any(|line| {
            line.expand
                && line.link_id.is_some_and(|l| emitted.contains(l))
                && contract
                    .params
                    .get(line.prop_key)
                    .is_some_and(ParamSpec::can_expand)
        })
    }

    fn build_unit(
        &mut self,
        facts: &ScopeFacts<'g>,
        id: &NodeId,
        strategy: Strategy,
    ) -> Result<NodeUnit, CompilerError> {
        let scope = &facts.scope;
        let symbol = self
            .symbols
            .get(&SymbolTable::node_key(&scope.id, id))?
            .to_string();
        let node = scope.node(id).ok_or_else(|| CompilerError::SymbolNotFound {
            key: SymbolTable::node_key(&scope.id, id),
        })?;
        let contract = self.contract(node);

        let body = match strategy {
            Strategy::Builtin(BuiltinKind::Param) => UnitBody::Param,
            Strategy::Builtin(BuiltinKind::Local) => UnitBody::Local,
            Strategy::Builtin(BuiltinKind::Input) => UnitBody::Input,
            Strategy::Builtin(BuiltinKind::Output) => UnitBody::Output,
            Strategy::Module => {
                let key = SymbolTable::def_key(&node.reference);
                let import = self.symbols.allocate(key, DEF_PREFIX);
                if !self.program.imports.contains_key(&import) {
                    let url = self
                        .graph
                        .module(&node.reference)
                        .map(|m| m.compute_url.clone())
                        .filter(|url| !url.is_empty())
                        .unwrap_or_else(|| node.reference.clone());
                    self.program.imports.insert(
                        import.clone(),
                        Import {
                            reference: node.reference.clone(),
                            url,
                        },
                    );
                }
                UnitBody::Module {
                    import,
                    is_async: contract.result.is_async,
                }
            }
            Strategy::Subgraph(child) => {
                let is_async = self.program.scopes.get(&child).is_some_and(|s| s.is_async);
                UnitBody::Subgraph {
                    scope: child,
                    is_async,
                }
            }
            Strategy::Unresolved => UnitBody::Unresolved,
        };

        let mut expanded = Vec::new();
        let args = if body == UnitBody::Unresolved {
            Vec::new()
        } else {
            self.build_args(facts, id, node, &contract, &mut expanded)?
        };

        let fan_out = scope
            .topology()
            .compute_link_map()
            .get(id)
            .map(|links| {
                links
                    .iter()
                    .filter(|l| facts.emitted.contains(&l.node_id))
                    .count()
            })
            .unwrap_or(0);
        let cached = match contract.cache_mode {
            CacheMode::Always => true,
            CacheMode::Never => false,
            CacheMode::Auto => {
                contract.eval_mode == EvalMode::Manual || fan_out > 1 || !expanded.is_empty()
            }
        };

        let label = if node.label.is_empty() {
            contract.label.clone()
        } else {
            node.label.clone()
        };

        Ok(NodeUnit {
            symbol,
            uid: scope.uid(id),
            node_id: id.clone(),
            scope: scope.id.clone(),
            reference: node.reference.clone(),
            label,
            is_async: facts.is_async,
            cached,
            body,
            args,
            expanded,
        })
    }

    fn build_args(
        &mut self,
        facts: &ScopeFacts<'g>,
        id: &NodeId,
        node: &NodeSpec,
        contract: &ModuleSpec,
        expanded: &mut Vec<ExpandedLine>,
    ) -> Result<Vec<(String, ArgExpr)>, CompilerError> {
        let mut args = Vec::with_capacity(contract.params.len());
        for (key, param) in &contract.params {
            let expr = match node.props.get(key) {
                None => self.literal("", &param.schema, param),
                Some(prop) => match &prop.entries {
                    Some(entries) if param.schema.schema_type == SchemaType::Array => {
                        let item = param.schema.item_schema();
                        let mut list = Vec::with_capacity(entries.len());
                        for entry in entries {
                            let line = Line {
                                id: &entry.id,
                                value: &entry.value,
                                link_id: entry.link_id.as_ref(),
                                link_key: &entry.link_key,
                                expand: entry.expand,
                            };
                            list.push(self.line_expr(facts, &line, &item, param, expanded)?);
                        }
                        ArgExpr::Array(list)
                    }
                    Some(entries) => {
                        let mut fields = Vec::with_capacity(entries.len());
                        for entry in entries {
                            let schema = param.schema.property_schema(&entry.key);
                            let line = Line {
                                id: &entry.id,
                                value: &entry.value,
                                link_id: entry.link_id.as_ref(),
                                link_key: &entry.link_key,
                                expand: entry.expand,
                            };
                            let expr = self.line_expr(facts, &line, &schema, param, expanded)?;
                            fields.push((entry.key.clone(), expr));
                        }
                        ArgExpr::Object(fields)
                    }
                    None => {
                        let line_id = format!("{id}.{key}");
                        let line = Line {
                            id: &line_id,
                            value: &prop.value,
                            link_id: prop.link_id.as_ref(),
                            link_key: &prop.link_key,
                            expand: prop.expand,
                        };
                        self.line_expr(facts, &line, &param.schema, param, expanded)?
                    }
                },
            };
            args.push((key.clone(), expr));
        }
        Ok(args)
    }

    fn literal(&self, value: &str, schema: &SchemaSpec, param: &ParamSpec) -> ArgExpr {
        let value: Value = convert_static(value, schema, self.codec);
        if param.lambda {
            ArgExpr::Lambda(Box::new(ArgExpr::Literal(value)))
        } else {
            ArgExpr::Literal(value)
        }
    }

    fn line_expr(
        &mut self,
        facts: &ScopeFacts<'g>,
        line: &Line<'_>,
        schema: &SchemaSpec,
        param: &ParamSpec,
        expanded: &mut Vec<ExpandedLine>,
    ) -> Result<ArgExpr, CompilerError> {
        let Some(upstream) = line.link_id.filter(|l| facts.emitted.contains(*l)) else {
            return Ok(self.literal(line.value, schema, param));
        };
        let scope = &facts.scope;
        let call = self
            .symbols
            .get(&SymbolTable::node_key(&scope.id, upstream))?
            .to_string();
        let upstream_expanded = facts.expanding.contains(upstream);
        let mut produced = self.result_schema(scope, upstream);
        if upstream_expanded {
            produced = SchemaSpec::array(produced);
        }
        let actual = produced.at_path(line.link_key);

        if line.expand && param.can_expand() {
            let symbol = self
                .symbols
                .allocate(SymbolTable::line_key(&scope.id, line.id), LINE_PREFIX);
            let element = if actual.schema_type == SchemaType::Array {
                actual.item_schema()
            } else {
                actual
            };
            expanded.push(ExpandedLine {
                symbol: symbol.clone(),
                source: LinkExpr {
                    call,
                    is_async: facts.is_async,
                    link_key: line.link_key.to_string(),
                    convert: None,
                },
                upstream_expanded,
            });
            return Ok(ArgExpr::Expanded {
                symbol,
                convert: (!is_compatible(schema, &element)).then(|| schema.clone()),
            });
        }

        let link = LinkExpr {
            call,
            is_async: facts.is_async,
            link_key: line.link_key.to_string(),
            convert: (!is_compatible(schema, &actual)).then(|| schema.clone()),
        };
        Ok(if param.lambda {
            ArgExpr::Lambda(Box::new(ArgExpr::Link(link)))
        } else if param.deferred {
            ArgExpr::Deferred(link)
        } else {
            ArgExpr::Link(link)
        })
    }
}

/// One property line, either a property's own or one of its entries.
struct Line<'a> {
    id: &'a str,
    value: &'a str,
    link_id: Option<&'a NodeId>,
    link_key: &'a str,
    expand: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodescript_core::loader::InMemoryLoader;
    use nodescript_core::spec::{GraphSpec, PropSpec};

    fn loader() -> InMemoryLoader {
        InMemoryLoader::new()
            .with_module(
                "Math.Add",
                ModuleSpec::new("Add")
                    .with_param("a", ParamSpec::new(SchemaSpec::number()))
                    .with_param("b", ParamSpec::new(SchemaSpec::number()))
                    .with_result(ResultSpec::sync(SchemaSpec::number())),
            )
            .with_module(
                "Net.Fetch",
                ModuleSpec::new("Fetch")
                    .with_param("url", ParamSpec::new(SchemaSpec::string()))
                    .with_result(ResultSpec::asynchronous(SchemaSpec::string())),
            )
    }

    fn param(key: &str) -> NodeSpec {
        NodeSpec::new("@system/Param").with_prop("key", PropSpec::literal(key))
    }

    #[test]
    fn missing_root_is_fatal() {
        let graph = Graph::new(GraphSpec::new("nope"), &loader());
        let err = compile(&graph, &CompileOptions::default()).unwrap_err();
        assert_eq!(
            err,
            CompilerError::RootNodeNotFound {
                id: NodeId::new("nope")
            }
        );
    }

    #[test]
    fn root_override_selects_another_node() {
        let spec = GraphSpec::new("add")
            .with_node("x", param("x"))
            .with_node("add", NodeSpec::new("Math.Add").with_prop("a", PropSpec::link("x")));
        let graph = Graph::new(spec, &loader());
        let options = CompileOptions {
            root_node_id: Some(NodeId::new("x")),
            ..Default::default()
        };
        let compiled = compile(&graph, &options).unwrap();
        let entry = compiled.program.entry().unwrap();
        assert_eq!(entry.units.len(), 1);
        assert!(compiled.program.imports.is_empty());
    }

    #[test]
    fn unlinked_params_get_static_literals() {
        let spec = GraphSpec::new("add")
            .with_node("add", NodeSpec::new("Math.Add").with_prop("b", PropSpec::literal("21")));
        let graph = Graph::new(spec, &loader());
        let compiled = compile(&graph, &CompileOptions::default()).unwrap();
        let unit = &compiled.program.units["r1"];
        assert_eq!(
            unit.args,
            vec![
                ("a".to_string(), ArgExpr::Literal(serde_json::json!(0))),
                ("b".to_string(), ArgExpr::Literal(serde_json::json!(21))),
            ]
        );
    }

    #[test]
    fn unreachable_async_node_keeps_program_sync() {
        let spec = GraphSpec::new("add")
            .with_node("add", NodeSpec::new("Math.Add"))
            .with_node("fetch", NodeSpec::new("Net.Fetch"));
        let graph = Graph::new(spec.clone(), &loader());
        let compiled = compile(&graph, &CompileOptions::default()).unwrap();
        assert!(!compiled.result.is_async);
        assert!(!compiled.code.contains("async"));
        assert!(!compiled.code.contains("await"));

        let all = CompileOptions {
            emit_all: true,
            ..Default::default()
        };
        let compiled = compile(&graph, &all).unwrap();
        assert!(compiled.result.is_async);
        assert_eq!(compiled.program.entry().unwrap().units.len(), 2);
    }

    fn unit<'p>(compiled: &'p CompiledGraph, id: &str) -> &'p NodeUnit {
        compiled
            .program
            .units
            .values()
            .find(|u| u.node_id.as_str() == id)
            .unwrap()
    }

    #[test]
    fn link_on_undeclared_key_does_not_pull_its_source() {
        let spec = GraphSpec::new("add")
            .with_node("x", param("x"))
            .with_node("fetch", NodeSpec::new("Net.Fetch"))
            .with_node(
                "add",
                NodeSpec::new("Math.Add")
                    .with_prop("a", PropSpec::link("x"))
                    .with_prop("b", PropSpec::literal("1"))
                    .with_prop("stale", PropSpec::link("fetch")),
            );
        let graph = Graph::new(spec, &loader());
        let compiled = compile(&graph, &CompileOptions::default()).unwrap();

        assert!(!compiled.result.is_async);
        assert_eq!(compiled.program.entry().unwrap().units.len(), 2);
        assert!(compiled.program.imports.values().all(|i| i.reference != "Net.Fetch"));
        assert!(!compiled.code.contains("async"));
    }

    #[test]
    fn link_on_undeclared_key_is_not_a_consumer() {
        let spec = GraphSpec::new("add")
            .with_node("x", param("x"))
            .with_node(
                "add",
                NodeSpec::new("Math.Add")
                    .with_prop("a", PropSpec::link("x"))
                    .with_prop("stale", PropSpec::link("x")),
            );
        let graph = Graph::new(spec, &loader());
        let compiled = compile(&graph, &CompileOptions::default()).unwrap();
        assert!(!unit(&compiled, "x").cached);

        let spec = GraphSpec::new("add")
            .with_node("x", param("x"))
            .with_node(
                "add",
                NodeSpec::new("Math.Add")
                    .with_prop("a", PropSpec::link("x"))
                    .with_prop("b", PropSpec::link("x")),
            );
        let graph = Graph::new(spec, &loader());
        let compiled = compile(&graph, &CompileOptions::default()).unwrap();
        assert!(unit(&compiled, "x").cached);
    }

    #[test]
    fn unresolved_reference_still_compiles() {
        let spec = GraphSpec::new("add")
            .with_node("ghost", NodeSpec::new("Missing.Node"))
            .with_node("add", NodeSpec::new("Math.Add").with_prop("a", PropSpec::link("ghost")));
        let graph = Graph::new(spec, &loader());
        let compiled = compile(&graph, &CompileOptions::default()).unwrap();
        assert_eq!(compiled.program.units["r1"].body, UnitBody::Unresolved);
        assert!(compiled.code.contains("throw unresolved(\"Missing.Node\");"));
    }
}
