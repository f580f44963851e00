//! vesta-core: the data side of policy evaluation.
//!
//! # Public API
//!
//! - [`Value`] and [`DataType`] -- the runtime value model
//! - [`ClassTable`] / [`VarTable`] -- insertion-ordered symbol tables
//! - [`EvalContext`] -- global tables plus the local frame stack, with
//!   [`FrameGuard`] and [`IterationGuard`] for scoped state
//! - [`expand_scalar`] -- `$(ref)` expansion against a context
//! - [`ClassExpr`] -- class expression parsing and evaluation
//! - [`ContextError`] -- invariant violations, always fatal

pub mod class_expr;
pub mod class_table;
pub mod context;
pub mod error;
pub mod expand;
pub mod reference;
pub mod value;
pub mod var_table;

// ── Convenience re-exports ───────────────────────────────────────────

pub use class_expr::{ClassExpr, ClassExprError};
pub use class_table::{Class, ClassTable};
pub use context::{
    Bundle, ContextScope, EvalContext, FrameGuard, IterationGuard, SpecialScope, DEFAULT_SCOPE,
};
pub use error::ContextError;
pub use expand::{expand_scalar, has_unexpanded_reference, naked_list_ref};
pub use reference::{canonify, is_valid_identifier, VarRef, DEFAULT_NAMESPACE, THIS_SCOPE};
pub use value::{
    format_real, parse_bool, parse_int, parse_real, parse_list_literal, render_list_literal,
    DataType, ListLiteralError, Value, INFINITY, NULL_SENTINEL,
};
pub use var_table::{VarTable, Variable};
