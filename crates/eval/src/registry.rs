//! Function descriptors and the registry of built-ins.

use std::collections::BTreeMap;
use std::fmt;

use vesta_core::{EvalContext, Value};

use crate::contract::ArgContract;
use crate::evaluator::Evaluator;
use crate::functions;
use crate::types::{EvalError, FnCallResult};

/// Implementation of a built-in. Receives fully expanded arguments that
/// already passed their contracts.
pub type BuiltinFn =
    fn(&mut Evaluator, &mut EvalContext, &[Value]) -> Result<FnCallResult, EvalError>;

/// What a built-in returns on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Scalar,
    List,
    Container,
    /// Boolean rendered as a class expression.
    Class,
    Int,
    Real,
}

impl ReturnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnKind::Scalar => "string",
            ReturnKind::List => "slist",
            ReturnKind::Container => "data",
            ReturnKind::Class => "class",
            ReturnKind::Int => "int",
            ReturnKind::Real => "real",
        }
    }
}

impl fmt::Display for ReturnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Category {
    Data,
    Files,
    Io,
    Communication,
    System,
    Utilities,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Data,
        Category::Files,
        Category::Io,
        Category::Communication,
        Category::System,
        Category::Utilities,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Data => "data",
            Category::Files => "files",
            Category::Io => "io",
            Category::Communication => "communication",
            Category::System => "system",
            Category::Utilities => "utils",
        }
    }

    pub fn from_name(name: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == name || (name == "utilities" && *c == Category::Utilities))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the dispatcher needs to know about a built-in.
#[derive(Clone, Copy)]
pub struct FunctionDescriptor {
    pub name: &'static str,
    pub return_kind: ReturnKind,
    pub args: &'static [ArgContract],
    pub variadic: bool,
    pub synopsis: &'static str,
    pub category: Category,
    pub implementation: BuiltinFn,
}

impl FunctionDescriptor {
    /// `name(arg, arg, ...)` signature line for listings.
    pub fn signature(&self) -> String {
        let mut parts: Vec<String> = self
            .args
            .iter()
            .map(|a| format!("{}: {}", a.description, a.arg_type.as_str()))
            .collect();
        if self.variadic {
            parts.push("...".to_string());
        }
        format!("{}({}) -> {}", self.name, parts.join(", "), self.return_kind)
    }
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("name", &self.name)
            .field("return_kind", &self.return_kind)
            .field("args", &self.args.len())
            .field("variadic", &self.variadic)
            .field("category", &self.category)
            .finish()
    }
}

// ──────────────────────────────────────────────
// FunctionRegistry
// ──────────────────────────────────────────────

/// Name-ordered table of built-ins.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<&'static str, FunctionDescriptor>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the complete built-in library.
    pub fn builtin() -> Self {
        let mut registry = FunctionRegistry::new();
        functions::register_all(&mut registry);
        registry
    }

    /// Add a descriptor, replacing any earlier one with the same name.
    pub fn register(&mut self, descriptor: FunctionDescriptor) {
        self.functions.insert(descriptor.name, descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDescriptor> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Descriptors in name order.
    pub fn iter(&self) -> impl Iterator<Item = &FunctionDescriptor> {
        self.functions.values()
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &FunctionDescriptor> {
        self.iter().filter(move |d| d.category == category)
    }
}
