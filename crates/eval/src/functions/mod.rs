//! The built-in function library.
//!
//! Each submodule registers its functions with [`register`] calls on the
//! shared [`FunctionRegistry`]. Implementations receive expanded
//! arguments that already satisfy their contracts, so slot accessors here
//! only have to deal with shape, not validity.

mod data;
mod io;
mod list;
mod logic;
mod net;
mod process;
mod strings;
mod time;

use std::borrow::Cow;

use regex::Regex;
use serde_json::Value as Json;
use tracing::{debug, warn};
use vesta_core::{naked_list_ref, parse_bool, parse_int, EvalContext, Value, VarRef};

use crate::contract::ArgContract;
use crate::registry::{BuiltinFn, Category, FunctionDescriptor, FunctionRegistry, ReturnKind};

pub(crate) fn register_all(registry: &mut FunctionRegistry) {
    data::register(registry);
    io::register(registry);
    list::register(registry);
    logic::register(registry);
    net::register(registry);
    process::register(registry);
    strings::register(registry);
    time::register(registry);
}

// ── Descriptor helpers ───────────────────────────────────────────────

fn fixed(
    name: &'static str,
    return_kind: ReturnKind,
    args: &'static [ArgContract],
    category: Category,
    synopsis: &'static str,
    implementation: BuiltinFn,
) -> FunctionDescriptor {
    FunctionDescriptor {
        name,
        return_kind,
        args,
        variadic: false,
        synopsis,
        category,
        implementation,
    }
}

fn variadic(
    name: &'static str,
    return_kind: ReturnKind,
    args: &'static [ArgContract],
    category: Category,
    synopsis: &'static str,
    implementation: BuiltinFn,
) -> FunctionDescriptor {
    FunctionDescriptor {
        variadic: true,
        ..fixed(name, return_kind, args, category, synopsis, implementation)
    }
}

// ── Argument accessors ───────────────────────────────────────────────

/// Text of argument `i`. Non-scalars render in their display form.
fn text(args: &[Value], i: usize) -> Cow<'_, str> {
    match args.get(i) {
        Some(Value::Scalar(s)) => Cow::Borrowed(s.as_str()),
        Some(other) => Cow::Owned(other.to_string()),
        None => Cow::Borrowed(""),
    }
}

fn int_arg(args: &[Value], i: usize) -> Option<i64> {
    parse_int(&text(args, i))
}

fn bool_arg(args: &[Value], i: usize) -> bool {
    parse_bool(&text(args, i)).unwrap_or(false)
}

/// Anchored regex. An invalid pattern is logged and yields `None`, which
/// callers turn into a soft failure.
fn full_regex(function: &str, pattern: &str) -> Option<Regex> {
    match Regex::new(&format!("^(?:{})$", pattern)) {
        Ok(re) => Some(re),
        Err(e) => {
            debug!(function, pattern, error = %e, "invalid regular expression");
            None
        }
    }
}

/// Unanchored regex for splitting and searching.
fn search_regex(function: &str, pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            debug!(function, pattern, error = %e, "invalid regular expression");
            None
        }
    }
}

// ── Reference resolution ─────────────────────────────────────────────

/// Parse a variable name argument, bare or wrapped in `@(...)`.
fn reference(name: &str) -> Option<VarRef> {
    VarRef::parse(naked_list_ref(name).unwrap_or(name)).ok()
}

/// Elements of a list-reference argument.
///
/// An inline list is used as it is. A name must resolve to a list
/// variable; anything else is `None`.
fn resolve_list(ctx: &EvalContext, function: &str, arg: &Value) -> Option<Vec<String>> {
    match arg {
        Value::List(_) => arg.list_strings(),
        Value::Scalar(name) => {
            let found = reference(name).and_then(|r| ctx.variable_get(&r));
            match found {
                Some((value @ Value::List(_), _)) => value.list_strings(),
                Some((other, _)) => {
                    debug!(function, name = %name, kind = other.type_name(), "expected a list variable");
                    None
                }
                None => {
                    warn!(function, name = %name, "could not resolve list variable");
                    None
                }
            }
        }
        Value::Container(_) => None,
    }
}

/// The container behind a data-reference argument.
fn resolve_container(ctx: &EvalContext, function: &str, arg: &Value) -> Option<Json> {
    match arg {
        Value::Container(json) => Some(json.clone()),
        Value::Scalar(name) => match reference(name).and_then(|r| ctx.variable_get(&r)) {
            Some((Value::Container(json), _)) => Some(json),
            _ => {
                debug!(function, name = %name, "argument does not resolve to a container");
                None
            }
        },
        Value::List(_) => None,
    }
}

/// Append unless already present.
fn push_unique(out: &mut Vec<String>, item: String) {
    if !out.contains(&item) {
        out.push(item);
    }
}

/// Split `text` on `regex`, keeping at most `max` pieces; the rest of the
/// text past the last kept separator is dropped.
fn split_regex(text: &str, regex: &Regex, max: usize, allow_blanks: bool) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = 0usize;
    for m in regex.find_iter(text) {
        if pieces.len() >= max {
            return pieces;
        }
        if m.end() == m.start() {
            continue;
        }
        let piece = &text[rest..m.start()];
        if allow_blanks || !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        rest = m.end();
    }
    if pieces.len() < max {
        let piece = &text[rest..];
        if allow_blanks || !piece.is_empty() {
            pieces.push(piece.to_string());
        }
    }
    pieces
}
