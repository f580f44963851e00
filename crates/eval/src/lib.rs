//! vesta-eval: function calls over a vesta-core context.
//!
//! Given an [`EvalContext`](vesta_core::EvalContext) holding classes and
//! variables, the evaluator expands and checks the arguments of a call,
//! dispatches it to a registered built-in and returns a
//! [`FnCallResult`]. Built-ins reach processes, files, the network and
//! digests only through [`Collaborators`].
//!
//! # Public API
//!
//! - [`Evaluator`] -- dispatcher plus per-pass state
//! - [`FunctionRegistry`] / [`FunctionDescriptor`] -- the built-in table
//! - [`ArgContract`] -- per-argument type and pattern checks
//! - [`parse_call`] -- text form `name(arg, ...)` into a [`FnCall`]
//! - [`ModuleProtocol`] -- applies the output of an external module
//! - [`Collaborators`] -- real or fake side-effect providers
//! - [`EvalError`] -- fatal errors; soft failures are
//!   [`FnCallResult::Failure`]

pub mod cache;
pub mod collab;
pub mod contract;
pub mod evaluator;
mod functions;
pub mod module_protocol;
pub mod parse;
pub mod registry;
pub mod types;

pub use cache::UnreliableCache;
pub use collab::Collaborators;
pub use contract::{ArgContract, ArgType};
pub use evaluator::{Evaluator, DEFAULT_WORKDIR};
pub use module_protocol::ModuleProtocol;
pub use parse::{parse_call, ParseError};
pub use registry::{Category, FunctionDescriptor, FunctionRegistry, ReturnKind};
pub use types::{CallValue, EvalError, Expr, FnCall, FnCallResult};
