//! Line protocol spoken by external module helpers.
//!
//! A helper prints one instruction per line:
//!
//! | Line              | Effect                                          |
//! |-------------------|-------------------------------------------------|
//! | `^context=NAME`   | later variables go to scope `NAME`              |
//! | `+a,b`            | activate soft classes `a` and `b`               |
//! | `-a,b`            | deactivate classes; a hard class is fatal       |
//! | `=NAME=VALUE`     | define scalar `NAME` in the active scope        |
//! | `@NAME=VALUE`     | define list `NAME` from a `{ "x", 'y' }` literal |
//!
//! Anything else is logged and ignored. Malformed lines are skipped with a
//! warning; only negating a hard class aborts the pass.

use tracing::{debug, error, info, warn};
use vesta_core::{
    canonify, is_valid_identifier, parse_list_literal, Class, ContextError, ContextScope,
    DataType, EvalContext, Value, VarRef, DEFAULT_NAMESPACE,
};

use crate::collab::system::split_command_line;
use crate::types::EvalError;

/// Tag on every class a module defines.
pub const MODULE_CLASS_TAG: &str = "source=module";

const MAX_CONTEXT_LEN: usize = 50;

/// One module run: the command, the caller's namespace and the scope that
/// variables currently land in.
#[derive(Debug, Clone)]
pub struct ModuleProtocol {
    command: String,
    namespace: String,
    context: String,
}

impl ModuleProtocol {
    /// The initial scope is the canonified basename of the command's
    /// first word.
    pub fn new(command: &str, namespace: &str) -> Self {
        let arg0 = split_command_line(command).into_iter().next().unwrap_or_default();
        let basename = arg0.rsplit('/').next().unwrap_or(arg0.as_str());
        let context = canonify(basename);
        debug!(command, context = %context, "module context");
        ModuleProtocol {
            command: command.to_string(),
            namespace: namespace.to_string(),
            context,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// Apply every line of a helper's output.
    pub fn feed<'l, I>(&mut self, ctx: &mut EvalContext, lines: I) -> Result<(), EvalError>
    where
        I: IntoIterator<Item = &'l str>,
    {
        for line in lines {
            self.process_line(ctx, line)?;
        }
        Ok(())
    }

    /// Apply one line.
    pub fn process_line(&mut self, ctx: &mut EvalContext, line: &str) -> Result<(), EvalError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(first) = line.chars().next() else {
            return Ok(());
        };
        let rest = &line[first.len_utf8()..];
        match first {
            '^' => self.set_context(rest),
            '+' => self.activate(ctx, rest),
            '-' => self.deactivate(ctx, rest)?,
            '=' => self.define(ctx, rest, false),
            '@' => self.define(ctx, rest, true),
            _ => {
                if !line.trim().is_empty() {
                    info!("M '{}': {}", self.command, line);
                }
            }
        }
        Ok(())
    }

    fn set_context(&mut self, rest: &str) {
        let Some(name) = rest.strip_prefix("context=") else {
            warn!(command = %self.command, line = %rest, "unknown module directive");
            return;
        };
        let valid = !name.is_empty()
            && name.len() <= MAX_CONTEXT_LEN
            && name.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid {
            warn!(command = %self.command, context = %name, "invalid module context, ignored");
            return;
        }
        debug!(from = %self.context, to = %name, "module changed variable context");
        self.context = name.to_string();
    }

    /// Comma-separated class names, all valid identifiers, or `None`.
    fn class_names<'a>(&self, rest: &'a str) -> Option<Vec<&'a str>> {
        let names: Vec<&str> = rest.split(',').map(str::trim).collect();
        if names.iter().all(|n| is_valid_identifier(n)) {
            Some(names)
        } else {
            warn!(command = %self.command, classes = %rest, "illegal class name in module output, line skipped");
            None
        }
    }

    fn activate(&self, ctx: &mut EvalContext, rest: &str) {
        let Some(names) = self.class_names(rest) else {
            return;
        };
        for name in names {
            let result = ctx.class_activate_tagged(
                &self.namespace,
                name,
                true,
                ContextScope::Namespace,
                &[MODULE_CLASS_TAG],
            );
            match result {
                Ok(()) => debug!(class = %name, "module activated class"),
                Err(e) => warn!(command = %self.command, error = %e, "module class not activated"),
            }
        }
    }

    fn deactivate(&self, ctx: &mut EvalContext, rest: &str) -> Result<(), EvalError> {
        let Some(names) = self.class_names(rest) else {
            return Ok(());
        };
        for name in names {
            if self.namespace != DEFAULT_NAMESPACE
                && ctx.class_get(DEFAULT_NAMESPACE, name).is_some_and(Class::is_hard)
            {
                let e = ContextError::HardClassNegation {
                    class: name.to_string(),
                };
                error!(command = %self.command, error = %e, "module tried to negate a hard class");
                return Err(e.into());
            }
            match ctx.class_deactivate(&self.namespace, name) {
                Ok(removed) => debug!(class = %name, removed, "module deactivated class"),
                Err(e @ ContextError::HardClassNegation { .. }) => {
                    error!(command = %self.command, error = %e, "module tried to negate a hard class");
                    return Err(e.into());
                }
                Err(e) => warn!(command = %self.command, error = %e, "module class not deactivated"),
            }
        }
        Ok(())
    }

    fn define(&self, ctx: &mut EvalContext, rest: &str, is_list: bool) {
        let (name, content) = rest.split_once('=').unwrap_or((rest, ""));
        if !is_valid_identifier(name) {
            warn!(command = %self.command, name = %name, "illegal variable name in module output, line skipped");
            return;
        }
        let reference = match VarRef::parse(name) {
            Ok(r) => r.qualify(&self.namespace, &self.context),
            Err(e) => {
                warn!(command = %self.command, error = %e, "bad variable reference in module output");
                return;
            }
        };

        let (value, data_type) = if is_list {
            match parse_list_literal(content) {
                Ok(items) => (Value::list(items), DataType::StringList),
                Err(e) => {
                    warn!(command = %self.command, name = %name, error = %e, "bad list literal in module output");
                    return;
                }
            }
        } else {
            (Value::scalar(content), DataType::String)
        };
        debug!(variable = %reference, "module defined variable");
        ctx.variable_put_global(&reference, value, data_type);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn protocol() -> ModuleProtocol {
        ModuleProtocol::new("/var/lib/vesta/modules/inventory --full", DEFAULT_NAMESPACE)
    }

    fn get(ctx: &EvalContext, name: &str) -> Option<Value> {
        ctx.variable_get(&VarRef::parse(name).unwrap()).map(|(v, _)| v)
    }

    #[test]
    fn default_context_is_command_basename() {
        assert_eq!(protocol().context(), "inventory");
        assert_eq!(ModuleProtocol::new("/x/my-mod.sh", "default").context(), "my_mod_sh");
        assert_eq!(
            ModuleProtocol::new("\"/srv/vesta home/modules/net-scan\" -v", "default").context(),
            "net_scan"
        );
    }

    #[test]
    fn classes_on_and_off() {
        let mut ctx = EvalContext::new();
        let mut p = protocol();
        p.feed(&mut ctx, ["+foo,bar", "-foo"]).unwrap();
        assert!(!ctx.class_is_defined("default", "foo"));
        let bar = ctx.class_get("default", "bar").unwrap();
        assert!(bar.is_soft);
        assert!(bar.tags.contains(MODULE_CLASS_TAG));
    }

    #[test]
    fn context_switch_and_scalars() {
        let mut ctx = EvalContext::new();
        let mut p = protocol();
        p.feed(&mut ctx, ["=early=1", "^context=widget", "=x=42", "=eq=a=b"]).unwrap();
        assert_eq!(get(&ctx, "inventory.early"), Some(Value::scalar("1")));
        assert_eq!(get(&ctx, "widget.x"), Some(Value::scalar("42")));
        assert_eq!(get(&ctx, "widget.eq"), Some(Value::scalar("a=b")));
    }

    #[test]
    fn lists_from_literals() {
        let mut ctx = EvalContext::new();
        let mut p = protocol();
        p.process_line(&mut ctx, r#"@hosts= { "a", 'b' }"#).unwrap();
        p.process_line(&mut ctx, "@broken={ \"a\"").unwrap();
        assert_eq!(get(&ctx, "inventory.hosts"), Some(Value::list(["a", "b"])));
        assert_eq!(get(&ctx, "inventory.broken"), None);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let mut ctx = EvalContext::new();
        let mut p = protocol();
        p.feed(
            &mut ctx,
            ["+bad name!", "+ok,no way", "^context=no-dashes", "=bad name=1", "", "   ", "free text"],
        )
        .unwrap();
        assert_eq!(ctx.global_classes().iter().count(), 0);
        assert_eq!(p.context(), "inventory");
        assert!(ctx.visible_variables().is_empty());
    }

    #[test]
    fn context_length_is_bounded() {
        let mut p = protocol();
        p.set_context(&format!("context={}", "a".repeat(51)));
        assert_eq!(p.context(), "inventory");
        p.set_context(&format!("context={}", "a".repeat(50)));
        assert_eq!(p.context().len(), 50);
    }

    #[test]
    fn negating_a_hard_class_is_fatal() {
        let mut ctx = EvalContext::new();
        ctx.class_put_hard("linux").unwrap();
        let mut p = protocol();
        let err = p.process_line(&mut ctx, "-linux").unwrap_err();
        assert_eq!(
            err,
            EvalError::Context(ContextError::HardClassNegation {
                class: "linux".to_string()
            })
        );
        assert!(ctx.class_is_defined("default", "linux"));
    }

    #[test]
    fn negating_an_environment_class_from_another_namespace_is_fatal() {
        let mut ctx = EvalContext::new();
        ctx.class_put_hard("linux").unwrap();
        ctx.class_activate("ops", "webfront", true, ContextScope::Namespace)
            .unwrap();
        let mut p = ModuleProtocol::new("/var/lib/vesta/modules/inv", "ops");

        p.process_line(&mut ctx, "-webfront").unwrap();
        assert!(!ctx.class_is_defined("ops", "webfront"));

        let err = p.process_line(&mut ctx, "-webfront,linux").unwrap_err();
        assert_eq!(
            err,
            EvalError::Context(ContextError::HardClassNegation {
                class: "linux".to_string()
            })
        );
        assert!(ctx.is_defined_class("linux", "ops"));
    }

    #[test]
    fn activating_over_a_hard_class_is_skipped() {
        let mut ctx = EvalContext::new();
        ctx.class_put_hard("linux").unwrap();
        let mut p = protocol();
        p.process_line(&mut ctx, "+linux").unwrap();
        assert!(ctx.class_get("default", "linux").unwrap().is_hard());
    }

    #[test]
    fn deactivating_unknown_soft_class_is_a_no_op() {
        let mut ctx = EvalContext::new();
        protocol().process_line(&mut ctx, "-never_set").unwrap();
    }
}
