//! The dispatcher: expands arguments, enforces contracts and invokes
//! built-ins.

use std::path::{Path, PathBuf};

use tracing::{debug, error};
use vesta_core::{expand_scalar, EvalContext, Value};

use crate::cache::UnreliableCache;
use crate::collab::Collaborators;
use crate::contract::check_arguments;
use crate::parse::parse_call;
use crate::registry::FunctionRegistry;
use crate::types::{EvalError, Expr, FnCallResult};

/// Default root for `modules/` and other per-host state.
pub const DEFAULT_WORKDIR: &str = "/var/lib/vesta";

/// Runs function calls against an [`EvalContext`].
///
/// Owns the registry, the collaborators and the unreliable-value cache.
/// The context is passed in explicitly on every call.
#[derive(Debug)]
pub struct Evaluator {
    registry: FunctionRegistry,
    collab: Collaborators,
    cache: UnreliableCache,
    workdir: PathBuf,
}

impl Evaluator {
    pub fn new(collab: Collaborators) -> Self {
        Evaluator {
            registry: FunctionRegistry::builtin(),
            collab,
            cache: UnreliableCache::new(),
            workdir: PathBuf::from(DEFAULT_WORKDIR),
        }
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    pub fn with_registry(mut self, registry: FunctionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collab
    }

    pub fn cache(&self) -> &UnreliableCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut UnreliableCache {
        &mut self.cache
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Call a built-in by name.
    ///
    /// Arguments are expanded first; a nested call that fails makes this
    /// call fail. Unknown names, wrong arity and contract violations on
    /// resolved values are fatal.
    pub fn call_function(
        &mut self,
        ctx: &mut EvalContext,
        name: &str,
        args: &[Expr],
    ) -> Result<FnCallResult, EvalError> {
        let Some(descriptor) = self.registry.get(name).copied() else {
            error!(function = %name, "unknown function");
            return Err(EvalError::UnknownFunction {
                name: name.to_string(),
            });
        };

        if !descriptor.variadic && args.len() != descriptor.args.len() {
            error!(
                function = %name,
                expected = descriptor.args.len(),
                got = args.len(),
                "wrong number of arguments"
            );
            return Err(EvalError::ArgumentCount {
                function: name.to_string(),
                expected: descriptor.args.len(),
                got: args.len(),
            });
        }

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match self.expand_argument(ctx, arg)? {
                Some(v) => values.push(v),
                None => {
                    debug!(function = %name, "nested call failed");
                    return Ok(FnCallResult::Failure);
                }
            }
        }

        if !descriptor.variadic {
            if let Err(e) = check_arguments(name, descriptor.args, &values) {
                error!(function = %name, error = %e, "argument contract violated");
                return Err(e);
            }
        }

        let result = (descriptor.implementation)(self, ctx, &values);
        match &result {
            Ok(FnCallResult::Failure) => debug!(function = %name, "call failed"),
            Err(e) => error!(function = %name, error = %e, "fatal error in function"),
            Ok(_) => {}
        }
        result
    }

    /// Evaluate an expression to its legacy value. `None` means a call in
    /// it failed.
    pub fn evaluate(
        &mut self,
        ctx: &mut EvalContext,
        expr: &Expr,
    ) -> Result<Option<Value>, EvalError> {
        self.expand_argument(ctx, expr)
    }

    /// Parse and evaluate a call expression such as `join(",", "hosts")`.
    pub fn call_expression(
        &mut self,
        ctx: &mut EvalContext,
        text: &str,
    ) -> Result<FnCallResult, EvalError> {
        let call = parse_call(text).map_err(|e| EvalError::Parse {
            message: e.to_string(),
        })?;
        self.call_function(ctx, &call.name, &call.args)
    }

    fn expand_argument(
        &mut self,
        ctx: &mut EvalContext,
        arg: &Expr,
    ) -> Result<Option<Value>, EvalError> {
        match arg {
            Expr::Scalar(text) => {
                let expanded =
                    expand_scalar(ctx, text, ctx.current_namespace(), ctx.current_scope());
                Ok(Some(Value::Scalar(expanded)))
            }
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match self.expand_argument(ctx, item)? {
                        Some(Value::List(inner)) => out.extend(inner),
                        Some(v) => out.push(v),
                        None => return Ok(None),
                    }
                }
                Ok(Some(Value::List(out).normalized()))
            }
            Expr::Call(call) => Ok(self
                .call_function(ctx, &call.name, &call.args)?
                .into_legacy()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::fake::FakeExecutor;
    use std::sync::Arc;
    use vesta_core::{DataType, VarRef};

    fn evaluator() -> Evaluator {
        Evaluator::new(Collaborators::system().with_executor(Arc::new(FakeExecutor::new())))
    }

    fn s(text: &str) -> Expr {
        Expr::scalar(text)
    }

    #[test]
    fn unknown_function_is_fatal() {
        let mut ctx = EvalContext::new();
        let err = evaluator()
            .call_function(&mut ctx, "nosuchthing", &[])
            .unwrap_err();
        assert_eq!(
            err,
            EvalError::UnknownFunction {
                name: "nosuchthing".into()
            }
        );
    }

    #[test]
    fn wrong_arity_is_fatal() {
        let mut ctx = EvalContext::new();
        let err = evaluator()
            .call_function(&mut ctx, "canonify", &[s("a"), s("b")])
            .unwrap_err();
        assert_eq!(
            err,
            EvalError::ArgumentCount {
                function: "canonify".into(),
                expected: 1,
                got: 2
            }
        );
    }

    #[test]
    fn resolved_contract_violation_is_fatal() {
        let mut ctx = EvalContext::new();
        let err = evaluator()
            .call_function(&mut ctx, "head", &[s("abc"), s("-1")])
            .unwrap_err();
        assert!(matches!(err, EvalError::ContractViolation { index: 1, .. }));
    }

    #[test]
    fn unresolved_argument_skips_contract() {
        let mut ctx = EvalContext::new();
        let result = evaluator()
            .call_function(&mut ctx, "head", &[s("abc"), s("$(n)")])
            .unwrap();
        assert!(result.is_success());
    }

    #[test]
    fn arguments_are_expanded_before_the_call() {
        let mut ctx = EvalContext::new();
        ctx.variable_put(
            &VarRef::parse("who").unwrap(),
            Value::scalar("World Wide"),
            DataType::String,
        );
        let result = evaluator()
            .call_function(&mut ctx, "canonify", &[s("hello $(who)")])
            .unwrap();
        assert_eq!(result.into_legacy(), Some(Value::scalar("hello_World_Wide")));
    }

    #[test]
    fn nested_failure_fails_the_outer_call() {
        let mut ctx = EvalContext::new();
        let inner = Expr::call("nth", vec![s("missing"), s("0")]);
        let result = evaluator()
            .call_function(&mut ctx, "canonify", &[inner])
            .unwrap();
        assert_eq!(result, FnCallResult::Failure);
    }

    #[test]
    fn nested_boolean_reaches_outer_call_as_class_expression() {
        let mut ctx = EvalContext::new();
        let inner = Expr::call("strcmp", vec![s("a"), s("a")]);
        let result = evaluator()
            .call_function(&mut ctx, "concat", &[inner, s("-x")])
            .unwrap();
        assert_eq!(result.into_legacy(), Some(Value::scalar("any-x")));
    }

    #[test]
    fn call_expression_text() {
        let mut ctx = EvalContext::new();
        let mut ev = evaluator();
        let result = ev
            .call_expression(&mut ctx, r#"join("+", {"a", "b"})"#)
            .unwrap();
        assert_eq!(result.into_legacy(), Some(Value::scalar("a+b")));
        assert!(matches!(
            ev.call_expression(&mut ctx, "join(").unwrap_err(),
            EvalError::Parse { .. }
        ));
    }
}
