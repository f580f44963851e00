//! Class logic and comparisons. Results are booleans unless noted.

use regex::Regex;
use vesta_core::reference::class_ref_to_string;
use vesta_core::{canonify, parse_real, Class, EvalContext, Value};

use super::{fixed, full_regex, text, variadic};
use crate::contract::{ArgContract, ANY_STRING};
use crate::evaluator::Evaluator;
use crate::registry::{Category, FunctionRegistry, ReturnKind};
use crate::types::{EvalError, FnCallResult};

type CallResult = Result<FnCallResult, EvalError>;

/// Bucket count for the splay hash.
const SPLAY_TABLE_SIZE: u64 = 8192;

static ONE_STRING: [ArgContract; 1] = [ArgContract::string(ANY_STRING, "string")];
static ONE_REGEX: [ArgContract; 1] = [ArgContract::string(ANY_STRING, "regex")];
static TWO_STRINGS: [ArgContract; 2] = [
    ArgContract::string(ANY_STRING, "left"),
    ArgContract::string(ANY_STRING, "right"),
];
static REGCMP_ARGS: [ArgContract; 2] = [
    ArgContract::string(ANY_STRING, "regex"),
    ArgContract::string(ANY_STRING, "string"),
];
static SPLAY_ARGS: [ArgContract; 2] = [
    ArgContract::string(ANY_STRING, "string"),
    ArgContract::options("daily,hourly", "interval"),
];

pub(super) fn register(r: &mut FunctionRegistry) {
    use Category::{Data, Utilities};
    use ReturnKind::{Class, Int, List, Scalar};

    r.register(variadic("and", Class, &[], Data, "True if every argument is a defined class expression", and));
    r.register(variadic("or", Class, &[], Data, "True if any argument is a defined class expression", or));
    r.register(fixed("not", Class, &ONE_STRING, Data, "Negate a class expression", not));
    r.register(variadic("ifelse", Scalar, &[], Data, "First value whose class expression holds, else the last argument", ifelse));
    r.register(fixed("classmatch", Class, &ONE_REGEX, Utilities, "True if any defined class matches the regex", classmatch));
    r.register(fixed("countclassesmatching", Int, &ONE_REGEX, Utilities, "Number of defined classes matching the regex", countclassesmatching));
    r.register(variadic("classesmatching", List, &[], Utilities, "Defined classes matching a regex and optional tag regexes", classesmatching));
    r.register(fixed("classify", Class, &ONE_STRING, Data, "Canonify a string and test it as a class", classify));
    r.register(fixed("strcmp", Class, &TWO_STRINGS, Data, "True if the strings are equal", strcmp));
    r.register(fixed("regcmp", Class, &REGCMP_ARGS, Data, "True if the string fully matches the regex", regcmp));
    r.register(fixed("isgreaterthan", Class, &TWO_STRINGS, Data, "Numeric or lexical greater-than", isgreaterthan));
    r.register(fixed("islessthan", Class, &TWO_STRINGS, Data, "Numeric or lexical less-than", islessthan));
    r.register(fixed("splayclass", Class, &SPLAY_ARGS, Utilities, "True in the five-minute slot the string hashes to", splayclass));
}

/// Variadic arguments must all be scalars.
pub(super) fn scalar_args<'a>(function: &str, args: &'a [Value]) -> Result<Vec<&'a str>, EvalError> {
    args.iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_scalar().ok_or_else(|| EvalError::MalformedVariadic {
                function: function.to_string(),
                message: format!("argument {} is a {}, expected a scalar", i + 1, v.type_name()),
            })
        })
        .collect()
}

fn caller_namespace(ctx: &EvalContext) -> String {
    ctx.current_namespace().to_string()
}

// ──────────────────────────────────────────────
// Class expressions
// ──────────────────────────────────────────────

fn and(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let exprs = scalar_args("and", args)?;
    let ns = caller_namespace(ctx);
    Ok(FnCallResult::boolean(
        exprs.iter().all(|e| ctx.is_defined_class(e, &ns)),
    ))
}

fn or(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let exprs = scalar_args("or", args)?;
    let ns = caller_namespace(ctx);
    Ok(FnCallResult::boolean(
        exprs.iter().any(|e| ctx.is_defined_class(e, &ns)),
    ))
}

fn not(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let ns = caller_namespace(ctx);
    Ok(FnCallResult::boolean(!ctx.is_defined_class(&text(args, 0), &ns)))
}

fn ifelse(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let items = scalar_args("ifelse", args)?;
    if items.len() % 2 != 1 {
        return Err(EvalError::MalformedVariadic {
            function: "ifelse".to_string(),
            message: format!("needs an odd number of arguments, got {}", items.len()),
        });
    }
    let ns = caller_namespace(ctx);
    let chosen = items
        .chunks_exact(2)
        .find(|pair| ctx.is_defined_class(pair[0], &ns))
        .map_or(items[items.len() - 1], |pair| pair[1]);
    Ok(FnCallResult::value(chosen))
}

fn classify(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let ns = caller_namespace(ctx);
    Ok(FnCallResult::boolean(
        ctx.is_defined_class(&canonify(&text(args, 0)), &ns),
    ))
}

// ──────────────────────────────────────────────
// Class table searches
// ──────────────────────────────────────────────

/// Defined classes, global table first, then local frames.
fn defined_classes(ctx: &EvalContext) -> impl Iterator<Item = &Class> {
    ctx.global_classes().iter().chain(ctx.local_classes())
}

fn class_name(class: &Class) -> String {
    class_ref_to_string(&class.ns, &class.name)
}

fn classmatch(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(re) = full_regex("classmatch", &text(args, 0)) else {
        return Ok(FnCallResult::Failure);
    };
    Ok(FnCallResult::boolean(
        defined_classes(ctx).any(|c| re.is_match(&class_name(c))),
    ))
}

fn countclassesmatching(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(re) = full_regex("countclassesmatching", &text(args, 0)) else {
        return Ok(FnCallResult::Failure);
    };
    let count = defined_classes(ctx)
        .filter(|c| re.is_match(&class_name(c)))
        .count();
    Ok(FnCallResult::value(count.to_string()))
}

/// Compile a name regex plus tag regexes for the `*matching` functions.
pub(super) fn matching_regexes(
    function: &str,
    args: &[Value],
) -> Result<Option<(Regex, Vec<Regex>)>, EvalError> {
    let patterns = scalar_args(function, args)?;
    let Some((name, tags)) = patterns.split_first() else {
        return Err(EvalError::MalformedVariadic {
            function: function.to_string(),
            message: "requires at least one argument".to_string(),
        });
    };
    let Some(name_re) = full_regex(function, name) else {
        return Ok(None);
    };
    let mut tag_res = Vec::with_capacity(tags.len());
    for tag in tags {
        match full_regex(function, tag) {
            Some(re) => tag_res.push(re),
            None => return Ok(None),
        }
    }
    Ok(Some((name_re, tag_res)))
}

/// Every tag regex must match at least one of the tags.
pub(super) fn tags_match<'a, I>(tag_res: &[Regex], tags: I) -> bool
where
    I: IntoIterator<Item = &'a String> + Clone,
{
    tag_res
        .iter()
        .all(|re| tags.clone().into_iter().any(|t| re.is_match(t)))
}

fn classesmatching(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some((name_re, tag_res)) = matching_regexes("classesmatching", args)? else {
        return Ok(FnCallResult::Failure);
    };
    let mut out: Vec<String> = Vec::new();
    for class in defined_classes(ctx) {
        let name = class_name(class);
        if name_re.is_match(&name) && tags_match(&tag_res, &class.tags) && !out.contains(&name) {
            out.push(name);
        }
    }
    Ok(FnCallResult::list(out))
}

// ──────────────────────────────────────────────
// Comparisons
// ──────────────────────────────────────────────

fn strcmp(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    Ok(FnCallResult::boolean(text(args, 0) == text(args, 1)))
}

fn regcmp(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(re) = full_regex("regcmp", &text(args, 0)) else {
        return Ok(FnCallResult::Failure);
    };
    Ok(FnCallResult::boolean(re.is_match(&text(args, 1))))
}

fn compare(args: &[Value]) -> std::cmp::Ordering {
    let (a, b) = (text(args, 0), text(args, 1));
    match (parse_real(&a), parse_real(&b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.as_bytes().cmp(b.as_bytes()),
    }
}

fn isgreaterthan(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    Ok(FnCallResult::boolean(compare(args).is_gt()))
}

fn islessthan(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    Ok(FnCallResult::boolean(compare(args).is_lt()))
}

// ──────────────────────────────────────────────
// Splay classes
// ──────────────────────────────────────────────

/// One-at-a-time hash of `s`, reduced to `[0, SPLAY_TABLE_SIZE)`.
fn splay_hash(s: &str) -> u64 {
    let mut h: u32 = 0;
    for b in s.bytes() {
        h = h.wrapping_add(b as u32);
        h = h.wrapping_add(h << 10);
        h ^= h >> 6;
    }
    h = h.wrapping_add(h << 3);
    h ^= h >> 11;
    h = h.wrapping_add(h << 15);
    h as u64 & (SPLAY_TABLE_SIZE - 1)
}

/// The time class `s` is splayed into.
pub(crate) fn splay_class_name(s: &str, hourly: bool) -> String {
    let hash = splay_hash(s);
    if hourly {
        let slot = hash * 12 / SPLAY_TABLE_SIZE;
        format!("Min{:02}_{:02}", slot * 5, ((slot + 1) * 5) % 60)
    } else {
        let dayslot = hash * 12 * 24 / SPLAY_TABLE_SIZE;
        let (hour, slot) = (dayslot / 12, dayslot % 12);
        format!("Min{:02}_{:02}.Hr{:02}", slot * 5, ((slot + 1) * 5) % 60, hour)
    }
}

fn splayclass(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let class = splay_class_name(&text(args, 0), text(args, 1) == "hourly");
    let ns = caller_namespace(ctx);
    Ok(FnCallResult::boolean(ctx.is_defined_class(&class, &ns)))
}
