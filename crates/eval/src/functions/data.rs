//! Arrays, containers and mapping functions.

use serde_json::Value as Json;
use tracing::debug;
use vesta_core::{expand_scalar, DataType, EvalContext, Value, VarRef};

use super::io::{ItemKind, LineArray, RowKey};
use super::logic::{matching_regexes, tags_match};
use super::{fixed, full_regex, int_arg, push_unique, reference, resolve_container, resolve_list, text, variadic};
use crate::contract::{ArgContract, ANY_STRING, ID_RANGE, VAL_RANGE};
use crate::evaluator::Evaluator;
use crate::registry::{Category, FunctionRegistry, ReturnKind};
use crate::types::{EvalError, FnCallResult};

type CallResult = Result<FnCallResult, EvalError>;

static ONE_REF: [ArgContract; 1] = [ArgContract::reference(ID_RANGE, "name")];
static MAP_ARGS: [ArgContract; 2] = [
    ArgContract::string(ANY_STRING, "template"),
    ArgContract::reference(ID_RANGE, "name"),
];
static REGARRAY_ARGS: [ArgContract; 2] = [
    ArgContract::reference(ID_RANGE, "array"),
    ArgContract::string(ANY_STRING, "regex"),
];
static PARSEJSON_ARGS: [ArgContract; 1] = [ArgContract::string(ANY_STRING, "json")];
static PARSE_ARRAY_ARGS: [ArgContract; 6] = [
    ArgContract::string(ID_RANGE, "array"),
    ArgContract::string(ANY_STRING, "input"),
    ArgContract::string(ANY_STRING, "comment_regex"),
    ArgContract::string(ANY_STRING, "split_regex"),
    ArgContract::int(VAL_RANGE, "max_entries"),
    ArgContract::int(VAL_RANGE, "max_bytes"),
];
static REGEXTRACT_ARGS: [ArgContract; 3] = [
    ArgContract::string(ANY_STRING, "regex"),
    ArgContract::string(ANY_STRING, "data"),
    ArgContract::string(ID_RANGE, "array"),
];

pub(super) fn register(r: &mut FunctionRegistry) {
    use Category::{Data, Io, Utilities};
    use ReturnKind::{Class, Container, Int, List, Scalar};

    r.register(fixed("maplist", List, &MAP_ARGS, Data, "Expand a template once per list element, bound to $(this)", maplist));
    r.register(fixed("maparray", List, &MAP_ARGS, Data, "Expand a template per array entry, bound to $(this.k) and $(this.v)", maparray));
    r.register(variadic("mergedata", Container, &[], Data, "Merge containers left to right", mergedata));
    r.register(fixed("getindices", List, &ONE_REF, Data, "Keys of an array or container", getindices));
    r.register(fixed("getvalues", List, &ONE_REF, Data, "Values of an array or container", getvalues));
    r.register(fixed("regarray", Class, &REGARRAY_ARGS, Data, "True if any array value fully matches the regex", regarray));
    r.register(fixed("regextract", Class, &REGEXTRACT_ARGS, Data, "Store the whole match and capture groups of a regex in an array", regextract));
    r.register(fixed("parsestringarray", Int, &PARSE_ARRAY_ARGS, Data, "Fill an array keyed by first field from lines of a string", parsestringarray));
    r.register(fixed("parseintarray", Int, &PARSE_ARRAY_ARGS, Data, "Fill an integer array keyed by first field from lines of a string", parseintarray));
    r.register(fixed("parserealarray", Int, &PARSE_ARRAY_ARGS, Data, "Fill a real array keyed by first field from lines of a string", parserealarray));
    r.register(fixed("parsestringarrayidx", Int, &PARSE_ARRAY_ARGS, Data, "Fill an array keyed by line number from lines of a string", parsestringarrayidx));
    r.register(fixed("parsejson", Container, &PARSEJSON_ARGS, Io, "Parse JSON text into a container", parsejson));
    r.register(fixed("storejson", Scalar, &ONE_REF, Data, "Serialize a container as JSON text", storejson));
    r.register(fixed("isvariable", Class, &ONE_REF, Utilities, "True if the variable is defined", isvariable));
    r.register(variadic("variablesmatching", List, &[], Utilities, "Defined variables matching a regex and optional tag regexes", variablesmatching));
}

fn caller_scope(ctx: &EvalContext) -> (String, String) {
    (
        ctx.current_namespace().to_string(),
        ctx.current_scope().to_string(),
    )
}

fn leftover(expanded: &str, names: &[&str]) -> bool {
    names
        .iter()
        .any(|n| expanded.contains(&format!("$({})", n)) || expanded.contains(&format!("${{{}}}", n)))
}

// ──────────────────────────────────────────────
// Mapping
// ──────────────────────────────────────────────

fn maplist(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let template = text(args, 0).into_owned();
    let Some(items) = resolve_list(ctx, "maplist", &args[1]) else {
        return Ok(FnCallResult::Failure);
    };
    let (ns, scope) = caller_scope(ctx);

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let mut step = ctx.iteration();
        step.bind("this", Value::Scalar(item));
        let expanded = expand_scalar(&step, &template, &ns, &scope);
        if leftover(&expanded, &["this"]) {
            debug!(function = "maplist", template = %template, "template did not expand");
            return Ok(FnCallResult::Failure);
        }
        out.push(expanded);
    }
    Ok(FnCallResult::list(out))
}

/// One-index entries directly below `name`: `(key, value)`.
fn array_items(ctx: &EvalContext, name: &str) -> Vec<(String, Value)> {
    let Some(base) = reference(name) else {
        return Vec::new();
    };
    let depth = base.indices.len();
    ctx.array_entries(&base)
        .into_iter()
        .filter(|v| v.reference.indices.len() == depth + 1)
        .map(|v| (v.reference.indices[depth].clone(), v.value.clone()))
        .collect()
}

fn maparray(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let template = text(args, 0).into_owned();
    let entries = array_items(ctx, &text(args, 1));
    let (ns, scope) = caller_scope(ctx);

    let mut out = Vec::new();
    for (key, value) in entries {
        let values: Vec<String> = match &value {
            Value::Scalar(s) => vec![s.clone()],
            Value::List(_) => value.list_strings().unwrap_or_default(),
            Value::Container(_) => continue,
        };
        for v in values {
            let mut step = ctx.iteration();
            step.bind("k", Value::scalar(key.as_str()));
            step.bind("v", Value::Scalar(v));
            let expanded = expand_scalar(&step, &template, &ns, &scope);
            if leftover(&expanded, &["this.k", "this.v"]) {
                debug!(function = "maparray", template = %template, "template did not expand");
                return Ok(FnCallResult::Failure);
            }
            if value.as_list().is_some() {
                push_unique(&mut out, expanded);
            } else {
                out.push(expanded);
            }
        }
    }
    Ok(FnCallResult::list(out))
}

// ──────────────────────────────────────────────
// Containers
// ──────────────────────────────────────────────

/// Deep merge: objects merge key by key, arrays concatenate, anything
/// else is replaced by the right-hand side.
pub(crate) fn merge_json(left: Json, right: Json) -> Json {
    match (left, right) {
        (Json::Object(mut a), Json::Object(b)) => {
            for (key, value) in b {
                let merged = match a.remove(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => value,
                };
                a.insert(key, merged);
            }
            Json::Object(a)
        }
        (Json::Array(mut a), Json::Array(b)) => {
            a.extend(b);
            Json::Array(a)
        }
        (_, right) => right,
    }
}

fn mergedata(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    if args.is_empty() {
        debug!(function = "mergedata", "needs at least one container reference");
        return Ok(FnCallResult::Failure);
    }
    let mut containers = Vec::with_capacity(args.len());
    for arg in args {
        match resolve_container(ctx, "mergedata", arg) {
            Some(json) => containers.push(json),
            None => return Ok(FnCallResult::Failure),
        }
    }
    let mut iter = containers.into_iter();
    let first = iter.next().unwrap_or(Json::Null);
    Ok(FnCallResult::value(iter.fold(first, merge_json)))
}

fn json_primitive(json: &Json) -> Option<String> {
    match json {
        Json::Bool(b) => Some(b.to_string()),
        Json::Number(n) => Some(n.to_string()),
        Json::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn getindices(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    if let Some(json) = resolve_container(ctx, "getindices", &args[0]) {
        let keys: Vec<String> = match json {
            Json::Object(map) => map.keys().cloned().collect(),
            Json::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        };
        return Ok(FnCallResult::list(keys));
    }
    let mut keys = Vec::new();
    for (key, _) in array_items(ctx, &text(args, 0)) {
        push_unique(&mut keys, key);
    }
    Ok(FnCallResult::list(keys))
}

fn getvalues(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    if let Some(json) = resolve_container(ctx, "getvalues", &args[0]) {
        let values: Vec<String> = match &json {
            Json::Object(map) => map.values().filter_map(json_primitive).collect(),
            Json::Array(items) => items.iter().filter_map(json_primitive).collect(),
            _ => Vec::new(),
        };
        return Ok(FnCallResult::list(values));
    }
    let mut values = Vec::new();
    for (_, value) in array_items(ctx, &text(args, 0)) {
        match &value {
            Value::Scalar(s) => push_unique(&mut values, s.clone()),
            Value::List(_) => {
                for item in value.list_strings().unwrap_or_default() {
                    push_unique(&mut values, item);
                }
            }
            Value::Container(_) => {}
        }
    }
    Ok(FnCallResult::list(values))
}

fn regarray(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(re) = full_regex("regarray", &text(args, 1)) else {
        return Ok(FnCallResult::Failure);
    };
    let Some(base) = reference(&text(args, 0)) else {
        return Ok(FnCallResult::boolean(false));
    };
    let found = ctx
        .array_entries(&base)
        .iter()
        .filter_map(|v| v.value.as_scalar())
        .any(|s| re.is_match(s));
    Ok(FnCallResult::boolean(found))
}

/// Full match of `regex` against `data`. The whole match lands in
/// `array[0]` and each participating group in `array[N]`.
fn regextract(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(re) = full_regex("regextract", &text(args, 0)) else {
        return Ok(FnCallResult::Failure);
    };
    let Some(array) = reference(&text(args, 2)) else {
        return Ok(FnCallResult::Failure);
    };
    let data = text(args, 1);
    let Some(caps) = re.captures(&data) else {
        return Ok(FnCallResult::boolean(false));
    };

    let mut stored = 0usize;
    for (i, group) in caps.iter().enumerate() {
        if let Some(m) = group {
            let entry = array.clone().with_index(i.to_string());
            ctx.variable_put(&entry, Value::scalar(m.as_str()), DataType::String);
            stored += 1;
        }
    }
    Ok(FnCallResult::boolean(stored > 0))
}

// ──────────────────────────────────────────────
// Parsed arrays
// ──────────────────────────────────────────────

/// Like the `read*array` family, but over a string argument. The byte
/// limit truncates the input first.
fn parse_array(ctx: &mut EvalContext, function: &str, args: &[Value], kind: ItemKind, key: RowKey) -> CallResult {
    let Some(array) = reference(&text(args, 0)) else {
        return Ok(FnCallResult::Failure);
    };
    let input = text(args, 1);
    let input: String = match int_arg(args, 5) {
        Some(n) if n > 0 => input.chars().take(usize::try_from(n).unwrap_or(usize::MAX)).collect(),
        _ => input.into_owned(),
    };
    let max_entries = match int_arg(args, 4) {
        Some(n) if n > 0 => usize::try_from(n).unwrap_or(usize::MAX),
        _ => usize::MAX,
    };
    let (comment, split) = (text(args, 2), text(args, 3));
    let lines = LineArray {
        array,
        comment: &comment,
        split: &split,
        max_entries,
        kind,
        key,
    };
    match lines.fill(ctx, function, input) {
        Some(count) => Ok(FnCallResult::value(count.to_string())),
        None => Ok(FnCallResult::Failure),
    }
}

fn parsestringarray(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    parse_array(ctx, "parsestringarray", args, ItemKind::String, RowKey::FirstField)
}

fn parseintarray(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    parse_array(ctx, "parseintarray", args, ItemKind::Int, RowKey::FirstField)
}

fn parserealarray(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    parse_array(ctx, "parserealarray", args, ItemKind::Real, RowKey::FirstField)
}

fn parsestringarrayidx(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    parse_array(ctx, "parsestringarrayidx", args, ItemKind::String, RowKey::LineNumber)
}

fn parsejson(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    match serde_json::from_str::<Json>(&text(args, 0)) {
        Ok(json) => Ok(FnCallResult::value(json)),
        Err(e) => {
            debug!(function = "parsejson", error = %e, "invalid JSON");
            Ok(FnCallResult::Failure)
        }
    }
}

fn storejson(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(json) = resolve_container(ctx, "storejson", &args[0]) else {
        return Ok(FnCallResult::Failure);
    };
    match serde_json::to_string_pretty(&json) {
        Ok(s) => Ok(FnCallResult::value(s)),
        Err(_) => Ok(FnCallResult::Failure),
    }
}

fn isvariable(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let found = VarRef::parse(&text(args, 0))
        .ok()
        .and_then(|r| ctx.variable_get(&r))
        .is_some();
    Ok(FnCallResult::boolean(found))
}

fn variablesmatching(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some((name_re, tag_res)) = matching_regexes("variablesmatching", args)? else {
        return Ok(FnCallResult::Failure);
    };
    let mut out = Vec::new();
    for var in ctx.visible_variables() {
        let name = var.reference.to_string();
        if name_re.is_match(&name) && tags_match(&tag_res, &var.tags) {
            push_unique(&mut out, name);
        }
    }
    Ok(FnCallResult::list(out))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{call, evaluator, put, scalar, strings};
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use vesta_core::{Bundle, ContextScope, DataType};

    fn ctx() -> EvalContext {
        let mut ctx = EvalContext::new();
        put(&mut ctx, "hosts", Value::list(["a", "b"]));
        put(&mut ctx, "conf[port]", Value::scalar("80"));
        put(&mut ctx, "conf[host]", Value::scalar("web"));
        put(&mut ctx, "conf[alias]", Value::list(["w1", "web"]));
        put(&mut ctx, "c1", Value::Container(json!({"k": 1})));
        put(&mut ctx, "c2", Value::Container(json!({"k": 2, "j": 3})));
        ctx
    }

    #[test]
    fn maplist_binds_this() {
        let mut ctx = ctx();
        let mut ev = evaluator();
        assert_eq!(
            strings(&call(&mut ev, &mut ctx, "maplist", &["host-$(this)", "hosts"])),
            vec!["host-a", "host-b"]
        );
        assert_eq!(
            strings(&call(&mut ev, &mut ctx, "maplist", &["${this}!", "@(hosts)"])),
            vec!["a!", "b!"]
        );
        assert!(ctx.variable_get(&VarRef::parse("this").unwrap()).is_none());
    }

    #[test]
    fn maplist_with_empty_list_is_empty() {
        let mut ctx = ctx();
        put(&mut ctx, "none", Value::empty_list());
        let mut ev = evaluator();
        assert!(strings(&call(&mut ev, &mut ctx, "maplist", &["$(this)", "none"])).is_empty());
    }

    #[test]
    fn maparray_binds_key_and_value() {
        let mut ctx = ctx();
        let mut ev = evaluator();
        assert_eq!(
            strings(&call(&mut ev, &mut ctx, "maparray", &["$(this.k)=$(this.v)", "conf"])),
            vec!["port=80", "host=web", "alias=w1", "alias=web"]
        );
    }

    #[test]
    fn maparray_fails_when_expansion_leaves_this() {
        let mut ctx = ctx();
        let mut ev = evaluator();
        put(&mut ctx, "odd[x]", Value::scalar("$(this.k)"));
        assert_eq!(
            call(&mut ev, &mut ctx, "maparray", &["$(this.v)", "odd"]),
            FnCallResult::Failure
        );
    }

    #[test]
    fn mergedata_merges_left_to_right() {
        let mut ctx = ctx();
        let mut ev = evaluator();
        let merged = call(&mut ev, &mut ctx, "mergedata", &["c1", "c2"]);
        assert_eq!(merged.as_value(), Some(&Value::Container(json!({"k": 2, "j": 3}))));

        let copy = call(&mut ev, &mut ctx, "mergedata", &["c1"]);
        assert_eq!(copy.as_value(), Some(&Value::Container(json!({"k": 1}))));

        assert_eq!(call(&mut ev, &mut ctx, "mergedata", &[]), FnCallResult::Failure);
        assert_eq!(call(&mut ev, &mut ctx, "mergedata", &["c1", "hosts"]), FnCallResult::Failure);
    }

    #[test]
    fn deep_merge_rules() {
        let merged = merge_json(
            json!({"a": {"x": 1, "l": [1]}, "b": 1}),
            json!({"a": {"y": 2, "l": [2]}, "b": {"z": true}}),
        );
        assert_eq!(
            merged,
            json!({"a": {"x": 1, "l": [1, 2], "y": 2}, "b": {"z": true}})
        );
    }

    #[test]
    fn indices_and_values_of_arrays() {
        let mut ctx = ctx();
        let mut ev = evaluator();
        assert_eq!(
            strings(&call(&mut ev, &mut ctx, "getindices", &["conf"])),
            vec!["port", "host", "alias"]
        );
        assert_eq!(
            strings(&call(&mut ev, &mut ctx, "getvalues", &["conf"])),
            vec!["80", "web", "w1"]
        );
        assert!(strings(&call(&mut ev, &mut ctx, "getindices", &["nothing"])).is_empty());
    }

    #[test]
    fn indices_and_values_of_containers() {
        let mut ctx = ctx();
        put(
            &mut ctx,
            "doc",
            Value::Container(json!({"b": true, "n": null, "x": 1.5, "o": {"deep": 1}})),
        );
        put(&mut ctx, "arr", Value::Container(json!(["p", "q"])));
        let mut ev = evaluator();
        assert_eq!(
            strings(&call(&mut ev, &mut ctx, "getindices", &["doc"])),
            vec!["b", "n", "x", "o"]
        );
        assert_eq!(strings(&call(&mut ev, &mut ctx, "getindices", &["arr"])), vec!["0", "1"]);
        assert_eq!(
            strings(&call(&mut ev, &mut ctx, "getvalues", &["doc"])),
            vec!["true", "1.5"]
        );
    }

    #[test]
    fn regarray_matches_scalar_values() {
        let mut ctx = ctx();
        let mut ev = evaluator();
        assert_eq!(call(&mut ev, &mut ctx, "regarray", &["conf", "8."]).as_bool(), Some(true));
        assert_eq!(call(&mut ev, &mut ctx, "regarray", &["conf", "w1"]).as_bool(), Some(false));
    }

    fn entry(ctx: &EvalContext, name: &str) -> Option<Value> {
        ctx.variable_get(&VarRef::parse(name).unwrap()).map(|(v, _)| v)
    }

    #[test]
    fn regextract_stores_match_and_groups() {
        let mut ctx = EvalContext::new();
        let mut ev = evaluator();
        let found = call(&mut ev, &mut ctx, "regextract", &["(\\w+)-(\\d+)(x)?", "web-42", "m"]);
        assert_eq!(found.as_bool(), Some(true));
        assert_eq!(entry(&ctx, "m[0]"), Some(Value::scalar("web-42")));
        assert_eq!(entry(&ctx, "m[1]"), Some(Value::scalar("web")));
        assert_eq!(entry(&ctx, "m[2]"), Some(Value::scalar("42")));
        assert_eq!(entry(&ctx, "m[3]"), None);

        let missed = call(&mut ev, &mut ctx, "regextract", &["\\d+", "web-42", "n"]);
        assert_eq!(missed.as_bool(), Some(false));
        assert_eq!(entry(&ctx, "n[0]"), None);
    }

    #[test]
    fn parse_arrays_from_strings() {
        let mut ctx = EvalContext::new();
        let mut ev = evaluator();
        let input = "alice 1001 /home/alice\n# comment\n\nbob 1002 /home/bob\n";
        let count = call(&mut ev, &mut ctx, "parsestringarray", &["users", input, "#[^\\n]*", " ", "10", "0"]);
        assert_eq!(scalar(&count), "2");
        assert_eq!(entry(&ctx, "users[alice][1]"), Some(Value::scalar("1001")));
        assert_eq!(entry(&ctx, "users[bob][2]"), Some(Value::scalar("/home/bob")));

        let count = call(&mut ev, &mut ctx, "parsestringarrayidx", &["rows", input, "#[^\\n]*", " ", "10", "0"]);
        assert_eq!(scalar(&count), "2");
        assert_eq!(entry(&ctx, "rows[1][0]"), Some(Value::scalar("bob")));

        let count = call(&mut ev, &mut ctx, "parseintarray", &["n", "1,2\n3,4", "", ",", "10", "0"]);
        assert_eq!(scalar(&count), "2");
        assert_eq!(entry(&ctx, "n[3][1]"), Some(Value::scalar("4")));

        let count = call(&mut ev, &mut ctx, "parserealarray", &["r", "1.5,2.5", "", ",", "10", "0"]);
        assert_eq!(scalar(&count), "1");
        assert_eq!(entry(&ctx, "r[1.5][1]"), Some(Value::scalar("2.5")));

        assert_eq!(
            call(&mut ev, &mut ctx, "parseintarray", &["bad", "1,x", "", ",", "10", "0"]),
            FnCallResult::Failure
        );
    }

    #[test]
    fn parse_array_honours_byte_limit() {
        let mut ctx = EvalContext::new();
        let mut ev = evaluator();
        let count = call(&mut ev, &mut ctx, "parsestringarray", &["t", "a 1\nb 2\n", "", " ", "10", "4"]);
        assert_eq!(scalar(&count), "1");
        assert_eq!(entry(&ctx, "t[b][0]"), None);
    }

    #[test]
    fn json_round_trip_through_text() {
        let mut ctx = ctx();
        let mut ev = evaluator();
        let parsed = call(&mut ev, &mut ctx, "parsejson", &[r#"{"a": [1, 2]}"#]);
        assert_eq!(parsed.as_value(), Some(&Value::Container(json!({"a": [1, 2]}))));
        assert_eq!(call(&mut ev, &mut ctx, "parsejson", &["{bad"]), FnCallResult::Failure);
        assert_eq!(
            scalar(&call(&mut ev, &mut ctx, "storejson", &["c1"])),
            "{\n  \"k\": 1\n}"
        );
        assert_eq!(call(&mut ev, &mut ctx, "storejson", &["hosts"]), FnCallResult::Failure);
    }

    #[test]
    fn isvariable_and_variablesmatching() {
        let mut ctx = ctx();
        ctx.variable_define(
            &VarRef::parse("tagged").unwrap(),
            Value::scalar("v"),
            DataType::String,
            &["inventory"],
            ContextScope::Namespace,
        );
        let mut ev = evaluator();
        assert_eq!(call(&mut ev, &mut ctx, "isvariable", &["hosts"]).as_bool(), Some(true));
        assert_eq!(call(&mut ev, &mut ctx, "isvariable", &["ghost"]).as_bool(), Some(false));
        assert_eq!(
            strings(&call(&mut ev, &mut ctx, "variablesmatching", &["default:main\\.c[0-9]"])),
            vec!["default:main.c1", "default:main.c2"]
        );
        assert_eq!(
            strings(&call(&mut ev, &mut ctx, "variablesmatching", &[".*", "inv.*"])),
            vec!["default:main.tagged"]
        );
    }

    #[test]
    fn maplist_inside_a_bundle_sees_bundle_variables() {
        let mut ctx = EvalContext::new();
        let mut frame = ctx.push_frame(Bundle::new("ops", "web"));
        put(&mut frame, "suffix", Value::scalar(".example"));
        put(&mut frame, "names", Value::list(["a"]));
        let mut ev = evaluator();
        assert_eq!(
            strings(&call(&mut ev, &mut frame, "maplist", &["$(this)$(suffix)", "names"])),
            vec!["a.example"]
        );
    }
}
