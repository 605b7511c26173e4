//! Evaluation runtime for compiled nodescript programs.
//!
//! # Modules
//!
//! - [`context`] -- Evaluation context: scopes, cache, disposables, events
//! - [`value`] -- Argument values, deferred thunks and lambdas
//! - [`events`] -- Introspection events and listeners
//! - [`registry`] -- Node implementations by compute url
//! - [`executable`] -- Loading and evaluating programs
//! - [`stdlib`] -- Standard node library
//! - [`error`] -- Runtime errors

pub mod context;
pub mod error;
pub mod events;
pub mod executable;
pub mod registry;
pub mod stdlib;
pub mod value;

pub use context::EvalContext;
pub use error::RuntimeError;
pub use events::NodeEvent;
pub use executable::Executable;
pub use registry::{NodeCompute, NodeRegistry};
pub use value::{Arg, Deferred, Lambda, Params};
