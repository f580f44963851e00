//! Flags that pre-populate the evaluation context.

use std::path::Path;

use clap::Args;
use vesta_core::{
    is_valid_identifier, ContextScope, DataType, EvalContext, Value, VarRef, DEFAULT_SCOPE,
};

use crate::config::VestaConfig;

/// Tag on classes defined from the command line.
const CLI_CLASS_TAG: &str = "source=cli";

#[derive(Debug, Default, Args)]
pub(crate) struct SeedArgs {
    /// Define a soft class (repeatable)
    #[arg(long = "class", value_name = "NAME")]
    pub classes: Vec<String>,

    /// Define a hard class (repeatable)
    #[arg(long = "hard-class", value_name = "NAME")]
    pub hard_classes: Vec<String>,

    /// Define a string variable (repeatable)
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub vars: Vec<String>,

    /// Define a list variable from comma-separated items (repeatable)
    #[arg(long = "list", value_name = "NAME=A,B,...")]
    pub lists: Vec<String>,

    /// Define a container variable from a JSON file (repeatable)
    #[arg(long = "data", value_name = "NAME=FILE")]
    pub data: Vec<String>,
}

fn split_assignment<'a>(flag: &str, text: &'a str) -> Result<(&'a str, &'a str), String> {
    text.split_once('=')
        .ok_or_else(|| format!("--{} expects NAME=VALUE, got '{}'", flag, text))
}

fn reference(name: &str, ns: &str) -> Result<VarRef, String> {
    VarRef::parse(name)
        .map(|r| r.qualify(ns, DEFAULT_SCOPE))
        .map_err(|e| e.to_string())
}

fn read_json(path: &Path) -> Result<serde_json::Value, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;
    serde_json::from_str(&content)
        .map_err(|e| format!("invalid JSON in '{}': {}", path.display(), e))
}

/// Build a context holding the configured hard classes and everything the
/// seed flags define. Variables land in `<namespace>:main`.
pub(crate) fn seed_context(seed: &SeedArgs, config: &VestaConfig) -> Result<EvalContext, String> {
    let mut ctx = EvalContext::new();
    let ns = config.namespace.as_str();

    for name in config.hard_classes.iter().chain(&seed.hard_classes) {
        if !is_valid_identifier(name) {
            return Err(format!("invalid class name '{}'", name));
        }
        ctx.class_put_hard(name).map_err(|e| e.to_string())?;
    }

    for name in &seed.classes {
        if !is_valid_identifier(name) {
            return Err(format!("invalid class name '{}'", name));
        }
        ctx.class_activate_tagged(ns, name, true, ContextScope::Namespace, &[CLI_CLASS_TAG])
            .map_err(|e| e.to_string())?;
    }

    for assignment in &seed.vars {
        let (name, value) = split_assignment("var", assignment)?;
        ctx.variable_put_global(&reference(name, ns)?, Value::scalar(value), DataType::String);
    }

    for assignment in &seed.lists {
        let (name, items) = split_assignment("list", assignment)?;
        let items: Vec<&str> = if items.is_empty() {
            Vec::new()
        } else {
            items.split(',').map(str::trim).collect()
        };
        ctx.variable_put_global(&reference(name, ns)?, Value::list(items), DataType::StringList);
    }

    for assignment in &seed.data {
        let (name, file) = split_assignment("data", assignment)?;
        let json = read_json(Path::new(file))?;
        ctx.variable_put_global(&reference(name, ns)?, Value::Container(json), DataType::Container);
    }

    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn get(ctx: &EvalContext, name: &str) -> Option<Value> {
        ctx.variable_get(&VarRef::parse(name).unwrap()).map(|(v, _)| v)
    }

    #[test]
    fn seeds_classes_and_variables() {
        let seed = SeedArgs {
            classes: vec!["web".into()],
            hard_classes: vec!["linux".into()],
            vars: vec!["greeting=a=b".into()],
            lists: vec!["hosts=a, b,c".into(), "none=".into()],
            data: Vec::new(),
        };
        let ctx = seed_context(&seed, &VestaConfig::default()).unwrap();
        assert!(ctx.class_get("default", "linux").unwrap().is_hard());
        assert!(ctx.class_get("default", "web").unwrap().is_soft);
        assert_eq!(get(&ctx, "main.greeting"), Some(Value::scalar("a=b")));
        assert_eq!(get(&ctx, "main.hosts"), Some(Value::list(["a", "b", "c"])));
        assert_eq!(get(&ctx, "main.none"), Some(Value::empty_list()));
    }

    #[test]
    fn config_hard_classes_are_seeded() {
        let config = VestaConfig {
            hard_classes: vec!["x86_64".into()],
            ..VestaConfig::default()
        };
        let ctx = seed_context(&SeedArgs::default(), &config).unwrap();
        assert!(ctx.class_is_defined("default", "x86_64"));
    }

    #[test]
    fn malformed_flags_are_errors() {
        let bad_var = SeedArgs {
            vars: vec!["novalue".into()],
            ..SeedArgs::default()
        };
        assert!(seed_context(&bad_var, &VestaConfig::default()).is_err());

        let bad_class = SeedArgs {
            classes: vec!["no way".into()],
            ..SeedArgs::default()
        };
        assert!(seed_context(&bad_class, &VestaConfig::default()).is_err());
    }
}
