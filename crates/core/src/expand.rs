//! `$(ref)` / `${ref}` reference expansion.

use crate::context::EvalContext;
use crate::reference::VarRef;
use crate::value::Value;

/// Expand every scalar reference in `text`.
///
/// References nested inside a token are expanded first, so
/// `$(list[$(i)])` works. Tokens that do not resolve to a scalar are kept
/// verbatim.
pub fn expand_scalar(ctx: &EvalContext, text: &str, ns: &str, scope: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = find_token_start(rest) {
        out.push_str(&rest[..start]);
        let token = &rest[start..];
        match token_end(token) {
            Some(end) => {
                let inner = &token[2..end];
                let inner = expand_scalar(ctx, inner, ns, scope);
                match resolve_scalar(ctx, &inner, ns, scope) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&token[..=end]),
                }
                rest = &token[end + 1..];
            }
            None => {
                out.push_str(token);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_scalar(ctx: &EvalContext, inner: &str, ns: &str, scope: &str) -> Option<String> {
    let reference = VarRef::parse(inner).ok()?;
    match ctx.variable_get_in(&reference, ns, scope)? {
        (Value::Scalar(s), _) => Some(s),
        _ => None,
    }
}

fn find_token_start(s: &str) -> Option<usize> {
    s.char_indices().find_map(|(i, c)| {
        (c == '$' && matches!(s[i + 1..].chars().next(), Some('(' | '{'))).then_some(i)
    })
}

/// Byte index of the bracket closing the token that starts at `s[0..2]`.
fn token_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices().skip(1) {
        match c {
            '(' | '{' => depth += 1,
            ')' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// True if `text` still contains a `$(`, `${`, `@(` or `@{` reference.
pub fn has_unexpanded_reference(text: &str) -> bool {
    ["$(", "${", "@(", "@{"].iter().any(|m| text.contains(m))
}

/// The reference inside a whole-string list reference `@(name)` / `@{name}`.
pub fn naked_list_ref(text: &str) -> Option<&str> {
    let inner = text
        .strip_prefix("@(")
        .and_then(|s| s.strip_suffix(')'))
        .or_else(|| text.strip_prefix("@{").and_then(|s| s.strip_suffix('}')))?;
    (!inner.is_empty()).then_some(inner)
}
