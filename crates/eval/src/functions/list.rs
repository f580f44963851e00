//! List algebra. Every function reads a list reference and builds a new
//! list; the source variable is never modified.

use std::cmp::Ordering;
use std::net::IpAddr;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sha2::{Digest, Sha256};
use vesta_core::{format_real, parse_int, parse_real, EvalContext, Value, INFINITY};

use super::{
    bool_arg, fixed, full_regex, int_arg, push_unique, resolve_list, search_regex, split_regex,
    text,
};
use crate::contract::{
    ArgContract, ANY_STRING, BOOL_OPTIONS, ID_RANGE, INT_RANGE, NAKED_LIST_RANGE, VAL_RANGE,
};
use crate::evaluator::Evaluator;
use crate::registry::{Category, FunctionRegistry, ReturnKind};
use crate::types::{EvalError, FnCallResult};

type CallResult = Result<FnCallResult, EvalError>;

const LIST: ArgContract = ArgContract::reference(ID_RANGE, "list");

static FILTER_ARGS: [ArgContract; 5] = [
    ArgContract::string(ANY_STRING, "pattern"),
    LIST,
    ArgContract::options(BOOL_OPTIONS, "is_regex"),
    ArgContract::options(BOOL_OPTIONS, "invert"),
    ArgContract::int(VAL_RANGE, "max"),
];
static PATTERN_LIST_ARGS: [ArgContract; 2] = [ArgContract::string(ANY_STRING, "regex"), LIST];
static LIST_ARGS: [ArgContract; 1] = [LIST];
static TWO_LIST_ARGS: [ArgContract; 2] = [
    ArgContract::reference(ID_RANGE, "list_a"),
    ArgContract::reference(ID_RANGE, "list_b"),
];
static SORT_ARGS: [ArgContract; 2] = [LIST, ArgContract::options("lex,int,real,IP,ip,MAC,mac", "method")];
static SHUFFLE_ARGS: [ArgContract; 2] = [LIST, ArgContract::string(ANY_STRING, "seed")];
static SUBLIST_ARGS: [ArgContract; 3] = [
    LIST,
    ArgContract::options("head,tail", "end"),
    ArgContract::int(INT_RANGE, "count"),
];
static NTH_ARGS: [ArgContract; 2] = [LIST, ArgContract::int(VAL_RANGE, "offset")];
static JOIN_ARGS: [ArgContract; 2] = [ArgContract::string(ANY_STRING, "glue"), LIST];
static REGLIST_ARGS: [ArgContract; 2] = [
    ArgContract::reference(NAKED_LIST_RANGE, "list"),
    ArgContract::string(ANY_STRING, "regex"),
];
static SPLITSTRING_ARGS: [ArgContract; 3] = [
    ArgContract::string(ANY_STRING, "string"),
    ArgContract::string(ANY_STRING, "regex"),
    ArgContract::int(VAL_RANGE, "max"),
];

pub(super) fn register(r: &mut FunctionRegistry) {
    use Category::Data;
    use ReturnKind::{Class, Int, List, Real, Scalar};

    r.register(fixed("filter", List, &FILTER_ARGS, Data, "Filter a list by exact match or regex, up to max results", filter));
    r.register(fixed("grep", List, &PATTERN_LIST_ARGS, Data, "Elements of a list fully matching a regex", grep));
    r.register(fixed("every", Class, &PATTERN_LIST_ARGS, Data, "True if every element matches the regex", every));
    r.register(fixed("some", Class, &PATTERN_LIST_ARGS, Data, "True if some element matches the regex", some));
    r.register(fixed("none", Class, &PATTERN_LIST_ARGS, Data, "True if no element matches the regex", none));
    r.register(fixed("sort", List, &SORT_ARGS, Data, "Stable sort by lex, int, real, IP or MAC order", sort));
    r.register(fixed("unique", List, &LIST_ARGS, Data, "Drop repeated elements, keeping the first", unique));
    r.register(fixed("reverse", List, &LIST_ARGS, Data, "Reverse a list", reverse));
    r.register(fixed("shuffle", List, &SHUFFLE_ARGS, Data, "Deterministic permutation seeded by a string", shuffle));
    r.register(fixed("sublist", List, &SUBLIST_ARGS, Data, "First or last count elements", sublist));
    r.register(fixed("difference", List, &TWO_LIST_ARGS, Data, "Elements of the first list not in the second", difference));
    r.register(fixed("intersection", List, &TWO_LIST_ARGS, Data, "Elements of the first list also in the second", intersection));
    r.register(fixed("length", Int, &LIST_ARGS, Data, "Number of elements", length));
    r.register(fixed("nth", Scalar, &NTH_ARGS, Data, "Element at a zero-based offset", nth));
    r.register(fixed("join", Scalar, &JOIN_ARGS, Data, "Join elements with a glue string", join));
    r.register(fixed("sum", Real, &LIST_ARGS, Data, "Sum of numeric elements", sum));
    r.register(fixed("product", Real, &LIST_ARGS, Data, "Product of numeric elements", product));
    r.register(fixed("reglist", Class, &REGLIST_ARGS, Data, "True if any element fully matches the regex", reglist));
    r.register(fixed("splitstring", List, &SPLITSTRING_ARGS, Data, "Split a string on a regex into at most max pieces", splitstring));
}

// ──────────────────────────────────────────────
// Filtering
// ──────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quantifier {
    Every,
    Some,
    None,
}

/// Elements matching (or, with `invert`, not matching) `pattern`, at most
/// `max` of them.
fn filter_elements(
    items: &[String],
    pattern: &str,
    is_regex: bool,
    invert: bool,
    max: usize,
    function: &str,
) -> Option<Vec<String>> {
    let regex = if is_regex {
        Some(full_regex(function, pattern)?)
    } else {
        None
    };
    let matches = |item: &str| match &regex {
        Some(re) => re.is_match(item),
        None => item == pattern,
    };
    Some(
        items
            .iter()
            .filter(|item| matches(item) != invert)
            .take(max)
            .cloned()
            .collect(),
    )
}

fn filter(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(items) = resolve_list(ctx, "filter", &args[1]) else {
        return Ok(FnCallResult::Failure);
    };
    let max = int_arg(args, 4).map_or(0, |n| n.max(0) as usize);
    let selected = filter_elements(
        &items,
        &text(args, 0),
        bool_arg(args, 2),
        bool_arg(args, 3),
        max,
        "filter",
    );
    Ok(selected.map_or(FnCallResult::Failure, FnCallResult::list))
}

fn grep(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(items) = resolve_list(ctx, "grep", &args[1]) else {
        return Ok(FnCallResult::Failure);
    };
    let selected = filter_elements(&items, &text(args, 0), true, false, INFINITY as usize, "grep");
    Ok(selected.map_or(FnCallResult::Failure, FnCallResult::list))
}

fn quantify(ctx: &EvalContext, args: &[Value], q: Quantifier, function: &str) -> CallResult {
    let Some(items) = resolve_list(ctx, function, &args[1]) else {
        return Ok(FnCallResult::Failure);
    };
    let Some(re) = full_regex(function, &text(args, 0)) else {
        return Ok(FnCallResult::Failure);
    };
    let result = match q {
        Quantifier::Every => items.iter().all(|i| re.is_match(i)),
        Quantifier::Some => items.iter().any(|i| re.is_match(i)),
        Quantifier::None => !items.iter().any(|i| re.is_match(i)),
    };
    Ok(FnCallResult::boolean(result))
}

fn every(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    quantify(ctx, args, Quantifier::Every, "every")
}

fn some(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    quantify(ctx, args, Quantifier::Some, "some")
}

fn none(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    quantify(ctx, args, Quantifier::None, "none")
}

fn reglist(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(items) = resolve_list(ctx, "reglist", &args[0]) else {
        return Ok(FnCallResult::Failure);
    };
    let Some(re) = full_regex("reglist", &text(args, 1)) else {
        return Ok(FnCallResult::Failure);
    };
    Ok(FnCallResult::boolean(items.iter().any(|i| re.is_match(i))))
}

// ──────────────────────────────────────────────
// Ordering
// ──────────────────────────────────────────────

fn parse_mac(s: &str) -> Option<[u8; 6]> {
    let mut out = [0u8; 6];
    let mut parts = s.split(|c| c == ':' || c == '-');
    for byte in out.iter_mut() {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    parts.next().is_none().then_some(out)
}

/// Stable sort by a parsed key. Elements without a key come first, in
/// their original order.
fn sort_by_key<K, F>(items: &mut [String], key: F)
where
    K: PartialOrd,
    F: Fn(&str) -> Option<K>,
{
    items.sort_by(|a, b| match (key(a), key(b)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    });
}

pub(crate) fn sort_list(mut items: Vec<String>, method: &str) -> Vec<String> {
    match method {
        "int" => sort_by_key(&mut items, parse_int),
        "real" => sort_by_key(&mut items, parse_real),
        "IP" | "ip" => sort_by_key(&mut items, |s| s.trim().parse::<IpAddr>().ok()),
        "MAC" | "mac" => sort_by_key(&mut items, |s| parse_mac(s.trim())),
        _ => items.sort(),
    }
    items
}

fn sort(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(items) = resolve_list(ctx, "sort", &args[0]) else {
        return Ok(FnCallResult::Failure);
    };
    Ok(FnCallResult::list(sort_list(items, &text(args, 1))))
}

fn unique(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(items) = resolve_list(ctx, "unique", &args[0]) else {
        return Ok(FnCallResult::Failure);
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        push_unique(&mut out, item);
    }
    Ok(FnCallResult::list(out))
}

fn reverse(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(mut items) = resolve_list(ctx, "reverse", &args[0]) else {
        return Ok(FnCallResult::Failure);
    };
    items.reverse();
    Ok(FnCallResult::list(items))
}

pub(crate) fn shuffle_list(mut items: Vec<String>, seed: &str) -> Vec<String> {
    let digest = Sha256::digest(seed.as_bytes());
    let mut seed_bytes = [0u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    let mut rng = StdRng::seed_from_u64(u64::from_le_bytes(seed_bytes));
    items.shuffle(&mut rng);
    items
}

fn shuffle(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(items) = resolve_list(ctx, "shuffle", &args[0]) else {
        return Ok(FnCallResult::Failure);
    };
    Ok(FnCallResult::list(shuffle_list(items, &text(args, 1))))
}

fn sublist(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(items) = resolve_list(ctx, "sublist", &args[0]) else {
        return Ok(FnCallResult::Failure);
    };
    let count = int_arg(args, 2).map_or(0, |n| n.max(0) as usize).min(items.len());
    let selected = if text(args, 1) == "head" {
        &items[..count]
    } else {
        &items[items.len() - count..]
    };
    Ok(FnCallResult::list(selected.to_vec()))
}

// ──────────────────────────────────────────────
// Set operations
// ──────────────────────────────────────────────

fn set_operation(ctx: &EvalContext, args: &[Value], keep_common: bool, function: &str) -> CallResult {
    let Some(a) = resolve_list(ctx, function, &args[0]) else {
        return Ok(FnCallResult::Failure);
    };
    let Some(b) = resolve_list(ctx, function, &args[1]) else {
        return Ok(FnCallResult::Failure);
    };
    let mut out = Vec::new();
    for item in a {
        if b.contains(&item) == keep_common {
            push_unique(&mut out, item);
        }
    }
    Ok(FnCallResult::list(out))
}

fn difference(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    set_operation(ctx, args, false, "difference")
}

fn intersection(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    set_operation(ctx, args, true, "intersection")
}

// ──────────────────────────────────────────────
// Reductions
// ──────────────────────────────────────────────

fn length(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(items) = resolve_list(ctx, "length", &args[0]) else {
        return Ok(FnCallResult::Failure);
    };
    Ok(FnCallResult::value(items.len().to_string()))
}

fn nth(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(items) = resolve_list(ctx, "nth", &args[0]) else {
        return Ok(FnCallResult::Failure);
    };
    let item = int_arg(args, 1)
        .and_then(|n| usize::try_from(n).ok())
        .and_then(|n| items.get(n));
    Ok(item.map_or(FnCallResult::Failure, |s| FnCallResult::value(s.as_str())))
}

fn join(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(items) = resolve_list(ctx, "join", &args[1]) else {
        return Ok(FnCallResult::Failure);
    };
    Ok(FnCallResult::value(items.join(&text(args, 0))))
}

fn fold_reals(ctx: &EvalContext, args: &[Value], init: f64, op: fn(f64, f64) -> f64, function: &str) -> CallResult {
    let Some(items) = resolve_list(ctx, function, &args[0]) else {
        return Ok(FnCallResult::Failure);
    };
    let mut acc = init;
    for item in &items {
        match parse_real(item) {
            Some(x) => acc = op(acc, x),
            None => return Ok(FnCallResult::Failure),
        }
    }
    Ok(FnCallResult::value(format_real(acc)))
}

fn sum(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    fold_reals(ctx, args, 0.0, |a, b| a + b, "sum")
}

fn product(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    fold_reals(ctx, args, 1.0, |a, b| a * b, "product")
}

fn splitstring(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let input = text(args, 0);
    if input.is_empty() {
        return Ok(FnCallResult::list(Vec::<String>::new()));
    }
    let Some(re) = search_regex("splitstring", &text(args, 1)) else {
        return Ok(FnCallResult::Failure);
    };
    let max = int_arg(args, 2).map_or(0, |n| n.max(0) as usize);
    Ok(FnCallResult::list(split_regex(&input, &re, max, true)))
}
