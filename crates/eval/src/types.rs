//! Core types for function evaluation: errors, call results and the
//! argument expressions the dispatcher expands.

use std::fmt;

use vesta_core::{ContextError, Value};

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Fatal evaluation errors. Any of these aborts the pass.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// No built-in is registered under this name.
    UnknownFunction { name: String },
    /// A fixed-arity function was called with the wrong number of arguments.
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
    },
    /// A fully expanded argument does not satisfy its contract.
    ContractViolation {
        function: String,
        index: usize,
        value: String,
        expected: String,
    },
    /// A variadic function rejected its argument list.
    MalformedVariadic { function: String, message: String },
    /// Call-expression text could not be parsed.
    Parse { message: String },
    /// The evaluation context refused an operation.
    Context(ContextError),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::UnknownFunction { name } => {
                write!(f, "unknown function: {}", name)
            }
            EvalError::ArgumentCount {
                function,
                expected,
                got,
            } => {
                write!(
                    f,
                    "function '{}' expects {} argument(s), got {}",
                    function, expected, got
                )
            }
            EvalError::ContractViolation {
                function,
                index,
                value,
                expected,
            } => {
                write!(
                    f,
                    "argument {} of '{}' is '{}', expected {}",
                    index + 1,
                    function,
                    value,
                    expected
                )
            }
            EvalError::MalformedVariadic { function, message } => {
                write!(f, "bad arguments to '{}': {}", function, message)
            }
            EvalError::Parse { message } => {
                write!(f, "parse error: {}", message)
            }
            EvalError::Context(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for EvalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EvalError::Context(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ContextError> for EvalError {
    fn from(e: ContextError) -> Self {
        EvalError::Context(e)
    }
}

// ──────────────────────────────────────────────
// Call results
// ──────────────────────────────────────────────

/// The value a successful call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CallValue {
    Value(Value),
    /// Result of a boolean-as-class function.
    Bool(bool),
}

impl CallValue {
    /// Legacy rendering: booleans become the class expressions `any` and
    /// `!any`.
    pub fn into_value(self) -> Value {
        match self {
            CallValue::Value(v) => v,
            CallValue::Bool(true) => Value::scalar("any"),
            CallValue::Bool(false) => Value::scalar("!any"),
        }
    }
}

/// Outcome of a function call. `Failure` is soft: the caller treats the
/// expression as not yet resolvable and carries on.
#[derive(Debug, Clone, PartialEq)]
pub enum FnCallResult {
    Success(CallValue),
    Failure,
}

impl FnCallResult {
    pub fn value(v: impl Into<Value>) -> Self {
        FnCallResult::Success(CallValue::Value(v.into()))
    }

    pub fn boolean(b: bool) -> Self {
        FnCallResult::Success(CallValue::Bool(b))
    }

    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FnCallResult::value(Value::list(items))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FnCallResult::Success(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FnCallResult::Success(CallValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            FnCallResult::Success(CallValue::Value(v)) => Some(v),
            _ => None,
        }
    }

    /// The value as the policy language sees it.
    pub fn into_legacy(self) -> Option<Value> {
        match self {
            FnCallResult::Success(v) => Some(v.into_value()),
            FnCallResult::Failure => None,
        }
    }
}

// ──────────────────────────────────────────────
// Argument expressions
// ──────────────────────────────────────────────

/// An unevaluated function argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Scalar(String),
    List(Vec<Expr>),
    Call(FnCall),
}

impl Expr {
    pub fn scalar(s: impl Into<String>) -> Self {
        Expr::Scalar(s.into())
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::Call(FnCall {
            name: name.to_string(),
            args,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnCall {
    pub name: String,
    pub args: Vec<Expr>,
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Scalar(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Expr::List(items) => {
                let parts: Vec<String> = items.iter().map(|e| e.to_string()).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Expr::Call(call) => write!(f, "{}", call),
        }
    }
}

impl fmt::Display for FnCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.args.iter().map(|e| e.to_string()).collect();
        write!(f, "{}({})", self.name, parts.join(", "))
    }
}
