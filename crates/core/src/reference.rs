//! Class and variable references.
//!
//! Textual forms:
//! - class: `[ns:]name`
//! - variable: `[ns:][scope.]lval[index]...`
//!
//! Unqualified parts are filled in from the active bundle when the
//! reference is resolved.

use std::fmt;

use crate::error::ContextError;

/// Namespace used when a policy never names one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Scope that holds per-iteration bindings.
pub const THIS_SCOPE: &str = "this";

/// A reference to a variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarRef {
    pub ns: Option<String>,
    pub scope: Option<String>,
    pub lval: String,
    pub indices: Vec<String>,
}

impl VarRef {
    pub fn new(ns: Option<&str>, scope: Option<&str>, lval: &str) -> Self {
        VarRef {
            ns: ns.map(str::to_owned),
            scope: scope.map(str::to_owned),
            lval: lval.to_string(),
            indices: Vec::new(),
        }
    }

    /// A fully qualified reference.
    pub fn qualified(ns: &str, scope: &str, lval: &str) -> Self {
        VarRef::new(Some(ns), Some(scope), lval)
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.indices.push(index.into());
        self
    }

    /// Parse `[ns:][scope.]lval[idx]...`.
    pub fn parse(text: &str) -> Result<VarRef, ContextError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ContextError::invalid_reference(text, "empty reference"));
        }

        let head_end = text.find('[').unwrap_or(text.len());
        let (head, tail) = text.split_at(head_end);

        let (ns, rest) = match head.split_once(':') {
            Some((ns, rest)) => (Some(ns), rest),
            None => (None, head),
        };
        let (scope, lval) = match rest.split_once('.') {
            Some((scope, lval)) => (Some(scope), lval),
            None => (None, rest),
        };

        if lval.is_empty() {
            return Err(ContextError::invalid_reference(text, "missing variable name"));
        }
        if ns.is_some_and(str::is_empty) || scope.is_some_and(str::is_empty) {
            return Err(ContextError::invalid_reference(text, "empty namespace or scope"));
        }

        let indices = parse_indices(text, tail)?;

        Ok(VarRef {
            ns: ns.map(str::to_owned),
            scope: scope.map(str::to_owned),
            lval: lval.to_string(),
            indices,
        })
    }

    /// Fill in a missing namespace and scope.
    pub fn qualify(&self, ns: &str, scope: &str) -> VarRef {
        let mut out = self.clone();
        if out.ns.is_none() {
            out.ns = Some(ns.to_string());
        }
        if out.scope.is_none() {
            out.scope = Some(scope.to_string());
        }
        out
    }

    pub fn is_qualified(&self) -> bool {
        self.ns.is_some() && self.scope.is_some()
    }

    /// True for references into the iteration scope (`this.x` or `this`).
    pub fn is_special(&self) -> bool {
        self.scope.as_deref() == Some(THIS_SCOPE)
    }

    /// The same reference without indices.
    pub fn base(&self) -> VarRef {
        VarRef {
            indices: Vec::new(),
            ..self.clone()
        }
    }
}

fn parse_indices(whole: &str, tail: &str) -> Result<Vec<String>, ContextError> {
    let mut indices = Vec::new();
    let mut chars = tail.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c != '[' {
            return Err(ContextError::invalid_reference(
                whole,
                format!("unexpected '{}' after index", c),
            ));
        }
        let mut depth = 1usize;
        let mut end = None;
        for (i, c) in chars.by_ref() {
            match c {
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let Some(end) = end else {
            return Err(ContextError::invalid_reference(whole, "unbalanced '['"));
        };
        indices.push(tail[start + 1..end].to_string());
    }
    Ok(indices)
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ns) = &self.ns {
            write!(f, "{}:", ns)?;
        }
        if let Some(scope) = &self.scope {
            write!(f, "{}.", scope)?;
        }
        write!(f, "{}", self.lval)?;
        for index in &self.indices {
            write!(f, "[{}]", index)?;
        }
        Ok(())
    }
}

/// Split a class reference `ns:name` into its parts.
pub fn parse_class_ref(text: &str) -> (Option<&str>, &str) {
    match text.split_once(':') {
        Some((ns, name)) => (Some(ns), name),
        None => (None, text),
    }
}

/// Render a class the way `classesmatching` reports it: the default
/// namespace is implicit.
pub fn class_ref_to_string(ns: &str, name: &str) -> String {
    if ns == DEFAULT_NAMESPACE {
        name.to_string()
    } else {
        format!("{}:{}", ns, name)
    }
}

/// Replace every character that is not legal in a class name with `_`.
pub fn canonify(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// True if `id` is a non-empty identifier over `[A-Za-z0-9._[]-]`.
pub fn is_valid_identifier(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '[' | ']'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_name() {
        let r = VarRef::parse("hosts").unwrap();
        assert_eq!(r, VarRef::new(None, None, "hosts"));
    }

    #[test]
    fn parse_fully_qualified_with_indices() {
        let r = VarRef::parse("web:main.conf[port][0]").unwrap();
        assert_eq!(r.ns.as_deref(), Some("web"));
        assert_eq!(r.scope.as_deref(), Some("main"));
        assert_eq!(r.lval, "conf");
        assert_eq!(r.indices, vec!["port", "0"]);
        assert_eq!(r.to_string(), "web:main.conf[port][0]");
    }

    #[test]
    fn index_may_contain_dots_and_nested_brackets() {
        let r = VarRef::parse("arr[a.b][x[1]]").unwrap();
        assert_eq!(r.scope, None);
        assert_eq!(r.indices, vec!["a.b", "x[1]"]);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(VarRef::parse("").is_err());
        assert!(VarRef::parse("scope.").is_err());
        assert!(VarRef::parse(":x").is_err());
        assert!(VarRef::parse("a[1").is_err());
        assert!(VarRef::parse("a[1]b").is_err());
    }

    #[test]
    fn qualify_only_fills_missing_parts() {
        let r = VarRef::parse("this.k").unwrap().qualify("default", "main");
        assert_eq!(r.to_string(), "default:this.k");
        assert!(r.is_special());
        let r = VarRef::parse("x").unwrap().qualify("ns1", "b1");
        assert_eq!(r.to_string(), "ns1:b1.x");
        assert!(r.is_qualified());
    }

    #[test]
    fn class_ref_split() {
        assert_eq!(parse_class_ref("linux"), (None, "linux"));
        assert_eq!(parse_class_ref("web:ready"), (Some("web"), "ready"));
        assert_eq!(class_ref_to_string("default", "a"), "a");
        assert_eq!(class_ref_to_string("web", "a"), "web:a");
    }

    #[test]
    fn canonify_replaces_illegal_characters() {
        assert_eq!(canonify("/usr/bin/my-tool 2.0"), "_usr_bin_my_tool_2_0");
    }

    #[test]
    fn identifier_charset() {
        assert!(is_valid_identifier("foo.bar-baz_1[x]"));
        assert!(!is_valid_identifier("bad name!"));
        assert!(!is_valid_identifier("a,b"));
        assert!(!is_valid_identifier(""));
    }
}
