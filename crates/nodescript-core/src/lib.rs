pub mod builtins;
pub mod error;
pub mod graph;
pub mod id;
pub mod loader;
pub mod module;
pub mod schema;
pub mod spec;
pub mod topology;

// Re-export commonly used types
pub use builtins::BuiltinKind;
pub use error::CoreError;
pub use graph::{Graph, GraphScope, LoadOptions};
pub use id::{NodeId, NodeUid, ScopeId};
pub use loader::{InMemoryLoader, ModuleLoader};
pub use module::{CacheMode, EvalMode, ModuleSpec, ParamSpec, ResultSpec, SubgraphContract};
pub use schema::{SchemaSpec, SchemaType};
pub use spec::{GraphSpec, NodeSpec, PropEntrySpec, PropSpec, SubgraphSpec};
pub use topology::{Link, LinkMap, ParamLookup, Topology};
