//! String transforms and `format`.

use tracing::debug;
use vesta_core::{canonify, EvalContext, Value};

use super::logic::scalar_args;
use super::{fixed, int_arg, search_regex, split_regex, text, variadic};
use crate::collab::HashAlgorithm;
use crate::contract::{ArgContract, ANY_STRING, VAL_RANGE};
use crate::evaluator::Evaluator;
use crate::registry::{Category, FunctionRegistry, ReturnKind};
use crate::types::{EvalError, FnCallResult};

type CallResult = Result<FnCallResult, EvalError>;

static ONE_STRING: [ArgContract; 1] = [ArgContract::string(ANY_STRING, "string")];
static SUBSTR_ARGS: [ArgContract; 2] = [
    ArgContract::string(ANY_STRING, "string"),
    ArgContract::int(VAL_RANGE, "count"),
];
static LASTNODE_ARGS: [ArgContract; 2] = [
    ArgContract::string(ANY_STRING, "string"),
    ArgContract::string(ANY_STRING, "separator"),
];
static HASH_ARGS: [ArgContract; 2] = [
    ArgContract::string(ANY_STRING, "input"),
    ArgContract::options("md5,sha1,sha256,sha512,sha384", "algorithm"),
];

pub(super) fn register(r: &mut FunctionRegistry) {
    use Category::{Data, Files};
    use ReturnKind::{Int, Scalar};

    r.register(variadic("concat", Scalar, &[], Data, "Concatenate all arguments", concat));
    r.register(fixed("canonify", Scalar, &ONE_STRING, Data, "Replace characters illegal in class names with _", canonify_fn));
    r.register(fixed("canonifyuniquely", Scalar, &ONE_STRING, Data, "Canonify with a SHA-1 suffix so distinct inputs stay distinct", canonifyuniquely));
    r.register(fixed("downcase", Scalar, &ONE_STRING, Data, "Convert to lowercase", downcase));
    r.register(fixed("upcase", Scalar, &ONE_STRING, Data, "Convert to uppercase", upcase));
    r.register(fixed("reversestring", Scalar, &ONE_STRING, Data, "Reverse a string", reversestring));
    r.register(fixed("strlen", Int, &ONE_STRING, Data, "Length in characters", strlen));
    r.register(fixed("head", Scalar, &SUBSTR_ARGS, Data, "First count characters", head));
    r.register(fixed("tail", Scalar, &SUBSTR_ARGS, Data, "Last count characters", tail));
    r.register(fixed("lastnode", Scalar, &LASTNODE_ARGS, Data, "Last piece after splitting on a regex", lastnode));
    r.register(fixed("dirname", Scalar, &ONE_STRING, Files, "Parent directory of a path", dirname));
    r.register(fixed("escape", Scalar, &ONE_STRING, Data, "Escape regex metacharacters", escape));
    r.register(variadic("format", Scalar, &[], Data, "printf-style formatting of the remaining arguments", format));
    r.register(fixed("hash", Scalar, &HASH_ARGS, Data, "Hex digest of a string", hash));
}

fn concat(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let parts = scalar_args("concat", args)?;
    Ok(FnCallResult::value(parts.concat()))
}

fn canonify_fn(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    Ok(FnCallResult::value(canonify(&text(args, 0))))
}

fn canonifyuniquely(ev: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let s = text(args, 0);
    let digest = ev
        .collaborators()
        .hasher
        .hex_digest(s.as_bytes(), HashAlgorithm::Sha1);
    Ok(FnCallResult::value(canonify(&format!("{}_{}", s, digest))))
}

fn downcase(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    Ok(FnCallResult::value(text(args, 0).to_lowercase()))
}

fn upcase(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    Ok(FnCallResult::value(text(args, 0).to_uppercase()))
}

fn reversestring(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    Ok(FnCallResult::value(text(args, 0).chars().rev().collect::<String>()))
}

fn strlen(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    Ok(FnCallResult::value(text(args, 0).chars().count().to_string()))
}

fn count_arg(args: &[Value]) -> usize {
    int_arg(args, 1).map_or(0, |n| usize::try_from(n).unwrap_or(0))
}

fn head(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let n = count_arg(args);
    Ok(FnCallResult::value(text(args, 0).chars().take(n).collect::<String>()))
}

fn tail(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let s = text(args, 0);
    let skip = s.chars().count().saturating_sub(count_arg(args));
    Ok(FnCallResult::value(s.chars().skip(skip).collect::<String>()))
}

fn lastnode(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(re) = search_regex("lastnode", &text(args, 1)) else {
        return Ok(FnCallResult::Failure);
    };
    match split_regex(&text(args, 0), &re, usize::MAX, true).pop() {
        Some(last) => Ok(FnCallResult::value(last)),
        None => Ok(FnCallResult::Failure),
    }
}

/// Parent of `path`. A single trailing slash is ignored; a path with no
/// separator has parent `.`.
pub(crate) fn parent_dir(path: &str) -> String {
    let trimmed = match path.strip_suffix('/') {
        Some(rest) if !rest.is_empty() => rest,
        _ => path,
    };
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(i) => trimmed[..i].to_string(),
        None => ".".to_string(),
    }
}

fn dirname(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    Ok(FnCallResult::value(parent_dir(&text(args, 0))))
}

fn escape(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    Ok(FnCallResult::value(regex::escape(&text(args, 0))))
}

fn hash(ev: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(algorithm) = HashAlgorithm::from_name(&text(args, 1)) else {
        return Ok(FnCallResult::Failure);
    };
    let digest = ev
        .collaborators()
        .hasher
        .hex_digest(text(args, 0).as_bytes(), algorithm);
    Ok(FnCallResult::value(digest))
}

// ──────────────────────────────────────────────
// format
// ──────────────────────────────────────────────

const CONVERSIONS: &str = "diouxXeEfFgGaAcsCSpnm";
const BAD_MODIFIERS: &str = "hLqjzt";
const UNHANDLED: &str = "(unhandled format)";
/// Largest width or precision a directive may ask for.
const MAX_FIELD: usize = 4096;

#[derive(Debug, Default, Clone, Copy)]
struct Directive {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    alt: bool,
    width: usize,
    precision: Option<usize>,
    conversion: char,
}

impl Directive {
    /// Parse the text between `%` and the conversion character. `None`
    /// for anything this formatter does not understand.
    fn parse(spec: &str, conversion: char) -> Option<Directive> {
        let mut d = Directive {
            conversion,
            ..Directive::default()
        };
        let mut chars = spec.chars().peekable();
        while let Some(&c) = chars.peek() {
            match c {
                '-' => d.left = true,
                '0' => d.zero = true,
                '+' => d.plus = true,
                ' ' => d.space = true,
                '#' => d.alt = true,
                _ => break,
            }
            chars.next();
        }
        let mut width = String::new();
        while let Some(c) = chars.next_if(char::is_ascii_digit) {
            width.push(c);
        }
        d.width = if width.is_empty() { 0 } else { width.parse().ok()? };
        if chars.next_if_eq(&'.').is_some() {
            let mut precision = String::new();
            while let Some(c) = chars.next_if(char::is_ascii_digit) {
                precision.push(c);
            }
            d.precision = Some(if precision.is_empty() { 0 } else { precision.parse().ok()? });
        }
        while chars.next_if_eq(&'l').is_some() {}
        chars.next().is_none().then_some(d)
    }

    fn pad(&self, sign: &str, body: &str, numeric: bool) -> String {
        let len = sign.chars().count() + body.chars().count();
        if len >= self.width {
            return format!("{}{}", sign, body);
        }
        let fill = self.width - len;
        if self.left {
            format!("{}{}{}", sign, body, " ".repeat(fill))
        } else if self.zero && numeric {
            format!("{}{}{}", sign, "0".repeat(fill), body)
        } else {
            format!("{}{}{}", " ".repeat(fill), sign, body)
        }
    }

    fn sign(&self, negative: bool) -> &'static str {
        if negative {
            "-"
        } else if self.plus {
            "+"
        } else if self.space {
            " "
        } else {
            ""
        }
    }

    fn render_int(&self, x: i64) -> String {
        let (sign, mut digits) = match self.conversion {
            'd' | 'i' => (self.sign(x < 0), x.unsigned_abs().to_string()),
            'u' => ("", (x as u64).to_string()),
            'o' => ("", format!("{:o}", x as u64)),
            'x' => ("", format!("{:x}", x as u64)),
            _ => ("", format!("{:X}", x as u64)),
        };
        if let Some(p) = self.precision {
            if p == 0 && x == 0 {
                digits.clear();
            } else if digits.len() < p {
                digits = format!("{}{}", "0".repeat(p - digits.len()), digits);
            }
        }
        if self.alt && x != 0 {
            match self.conversion {
                'o' if !digits.starts_with('0') => digits.insert(0, '0'),
                'x' => digits.insert_str(0, "0x"),
                'X' => digits.insert_str(0, "0X"),
                _ => {}
            }
        }
        let numeric = self.precision.is_none();
        self.pad(sign, &digits, numeric)
    }

    fn render_real(&self, x: f64) -> String {
        let sign = self.sign(x.is_sign_negative() && x != 0.0);
        let v = x.abs();
        let upper = self.conversion.is_ascii_uppercase();
        if !v.is_finite() {
            let word = if v.is_nan() { "nan" } else { "inf" };
            let word = if upper { word.to_uppercase() } else { word.to_string() };
            return self.pad(sign, &word, false);
        }
        let precision = self.precision.unwrap_or(6);
        let body = match self.conversion.to_ascii_lowercase() {
            'f' => format!("{:.*}", precision, v),
            'e' => c_exponent(v, precision, upper),
            _ => self.general(v, precision, upper),
        };
        self.pad(sign, &body, true)
    }

    /// `%g`: the shorter of fixed and exponent form for the precision.
    fn general(&self, v: f64, precision: usize, upper: bool) -> String {
        let p = precision.max(1);
        let exponent = if v == 0.0 { 0 } else { exponent_of(v, p - 1) };
        let mut body = if exponent < -4 || exponent >= p as i32 {
            c_exponent(v, p - 1, upper)
        } else {
            format!("{:.*}", (p as i32 - 1 - exponent).max(0) as usize, v)
        };
        if !self.alt {
            body = strip_fraction_zeros(&body);
        }
        body
    }
}

fn exponent_of(v: f64, precision: usize) -> i32 {
    let repr = format!("{:.*e}", precision, v);
    repr.rsplit_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0)
}

/// Exponent notation with at least two exponent digits and an explicit
/// sign, as in `1.500000e+02`.
fn c_exponent(v: f64, precision: usize, upper: bool) -> String {
    let repr = format!("{:.*e}", precision, v);
    let (mantissa, exp) = repr.rsplit_once('e').unwrap_or((repr.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    let e = if upper { 'E' } else { 'e' };
    format!("{}{}{}{:02}", mantissa, e, sign, exp.abs())
}

fn strip_fraction_zeros(body: &str) -> String {
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(i) => body.split_at(i),
        None => (body, ""),
    };
    if !mantissa.contains('.') {
        return body.to_string();
    }
    let mantissa = mantissa.trim_end_matches('0').trim_end_matches('.');
    format!("{}{}", mantissa, exponent)
}

/// Integer prefix of `s` in the manner of `strtol`: leading whitespace,
/// optional sign, digits. Zero when there are none.
fn leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .take_while(|&(i, c)| c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    s[..end].parse().unwrap_or(0)
}

/// Longest prefix of `s` that reads as a real; zero when there is none.
fn leading_real(s: &str) -> f64 {
    let s = s.trim_start();
    let candidate: String = s
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
        .collect();
    (1..=candidate.len())
        .rev()
        .find_map(|end| candidate[..end].parse::<f64>().ok())
        .unwrap_or(0.0)
}

pub(crate) fn format_values(fmt: &str, values: &[&str]) -> Option<String> {
    let mut out = String::with_capacity(fmt.len());
    let mut values = values.iter();
    let mut rest = fmt;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        if let Some(tail) = after.strip_prefix('%') {
            out.push('%');
            rest = tail;
            continue;
        }
        let end = after.find(|c: char| CONVERSIONS.contains(c) || c == '%');
        let Some(end) = end.filter(|&i| after[i..].chars().next() != Some('%')) else {
            // not a directive: the rest is literal text
            out.push_str(&rest[start..]);
            return Some(out);
        };
        let spec = &after[..end];
        let conversion = after[end..].chars().next().unwrap_or('s');
        let piece = format!("%{}{}", spec, conversion);

        let Some(data) = values.next() else {
            debug!(function = "format", directive = %piece, "not enough arguments");
            return None;
        };
        if let Some(bad) = spec.chars().find(|c| BAD_MODIFIERS.contains(*c)) {
            debug!(function = "format", directive = %piece, modifier = %bad, "modifier not allowed");
            return None;
        }
        if exceeds_field_limit(spec) {
            debug!(function = "format", directive = %piece, limit = MAX_FIELD, "width or precision too large");
            return None;
        }

        let rendered = Directive::parse(spec, conversion).and_then(|d| match conversion {
            'd' | 'i' | 'u' | 'o' | 'x' | 'X' => Some(d.render_int(leading_int(data))),
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' => Some(d.render_real(leading_real(data))),
            's' => {
                let s: String = match d.precision {
                    Some(p) => data.chars().take(p).collect(),
                    None => data.to_string(),
                };
                Some(d.pad("", &s, false))
            }
            _ => None,
        });
        out.push_str(rendered.as_deref().unwrap_or(UNHANDLED));
        rest = &after[end + conversion.len_utf8()..];
    }
    out.push_str(rest);
    Some(out)
}

fn exceeds_field_limit(spec: &str) -> bool {
    spec.split(|c: char| !c.is_ascii_digit())
        .any(|digits| digits.parse::<usize>().map_or(!digits.is_empty(), |n| n > MAX_FIELD))
}

fn format(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let parts = scalar_args("format", args)?;
    let Some((fmt, values)) = parts.split_first() else {
        return Ok(FnCallResult::Failure);
    };
    match format_values(fmt, values) {
        Some(s) => Ok(FnCallResult::value(s)),
        None => Ok(FnCallResult::Failure),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{call, evaluator, scalar};
    use super::*;
    use pretty_assertions::assert_eq;
    use vesta_core::EvalContext;

    fn run(name: &str, args: &[&str]) -> FnCallResult {
        let mut ctx = EvalContext::new();
        let mut ev = evaluator();
        call(&mut ev, &mut ctx, name, args)
    }

    fn fmt(f: &str, values: &[&str]) -> String {
        format_values(f, values).unwrap()
    }

    #[test]
    fn simple_transforms() {
        assert_eq!(scalar(&run("concat", &["a", "b", "c"])), "abc");
        assert_eq!(scalar(&run("canonify", &["a b/c"])), "a_b_c");
        assert_eq!(scalar(&run("downcase", &["MiXed"])), "mixed");
        assert_eq!(scalar(&run("upcase", &["MiXed"])), "MIXED");
        assert_eq!(scalar(&run("reversestring", &["abc"])), "cba");
        assert_eq!(scalar(&run("strlen", &["héllo"])), "5");
        assert_eq!(scalar(&run("head", &["abcdef", "3"])), "abc");
        assert_eq!(scalar(&run("head", &["ab", "10"])), "ab");
        assert_eq!(scalar(&run("tail", &["abcdef", "2"])), "ef");
        assert_eq!(scalar(&run("escape", &["a.b*"])), r"a\.b\*");
    }

    #[test]
    fn canonifyuniquely_appends_sha1() {
        assert_eq!(
            scalar(&run("canonifyuniquely", &["a b"])),
            format!("a_b_{}", sha1_of("a b"))
        );
    }

    fn sha1_of(s: &str) -> String {
        use sha1::{Digest, Sha1};
        crate::collab::to_hex(&Sha1::digest(s.as_bytes()))
    }

    #[test]
    fn concat_rejects_lists() {
        let mut ctx = EvalContext::new();
        let mut ev = evaluator();
        let args = [
            crate::types::Expr::scalar("a"),
            crate::types::Expr::List(vec![crate::types::Expr::scalar("b")]),
        ];
        let err = ev.call_function(&mut ctx, "concat", &args).unwrap_err();
        assert!(matches!(err, EvalError::MalformedVariadic { .. }));
    }

    #[test]
    fn lastnode_and_dirname() {
        assert_eq!(scalar(&run("lastnode", &["/etc/ssh/sshd_config", "/"])), "sshd_config");
        assert_eq!(scalar(&run("lastnode", &["a:b:c", ":"])), "c");
        assert_eq!(parent_dir("/etc/hosts"), "/etc");
        assert_eq!(parent_dir("/etc/ssh/"), "/etc");
        assert_eq!(parent_dir("/etc"), "/");
        assert_eq!(parent_dir("/"), "/");
        assert_eq!(parent_dir("file"), ".");
    }

    #[test]
    fn hash_uses_lowercase_hex() {
        assert_eq!(
            scalar(&run("hash", &["abc", "md5"])),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            scalar(&run("hash", &["abc", "sha256"])),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn format_strings_and_integers() {
        assert_eq!(fmt("%s-%d", &["a", "42"]), "a-42");
        assert_eq!(fmt("%-4s|%4s", &["ab", "cd"]), "ab  |  cd");
        assert_eq!(fmt("%.2s", &["abcdef"]), "ab");
        assert_eq!(fmt("%05d", &["42"]), "00042");
        assert_eq!(fmt("%+d %d", &["5", "-5"]), "+5 -5");
        assert_eq!(fmt("%x %X %o", &["255", "255", "8"]), "ff FF 10");
        assert_eq!(fmt("%#x", &["255"]), "0xff");
        assert_eq!(fmt("%ld", &["12abc"]), "12");
        assert_eq!(fmt("100%%", &[]), "100%");
    }

    #[test]
    fn format_reals() {
        assert_eq!(fmt("%f", &["1.5"]), "1.500000");
        assert_eq!(fmt("%5.2f", &["3.14159"]), " 3.14");
        assert_eq!(fmt("%e", &["1234.5"]), "1.234500e+03");
        assert_eq!(fmt("%g", &["0.0001"]), "0.0001");
        assert_eq!(fmt("%g", &["1234567"]), "1.23457e+06");
        assert_eq!(fmt("%g", &["100000"]), "100000");
        assert_eq!(fmt("%f", &["junk"]), "0.000000");
    }

    #[test]
    fn format_failures_and_unhandled() {
        assert_eq!(format_values("%s %s", &["a"]), None);
        assert_eq!(format_values("%hd", &["1"]), None);
        assert_eq!(fmt("<%c>", &["x"]), "<(unhandled format)>");
        assert_eq!(fmt("50%", &[]), "50%");
        assert_eq!(run("format", &[]), FnCallResult::Failure);
        assert_eq!(scalar(&run("format", &["%s=%s", "k", "v"])), "k=v");
    }

    #[test]
    fn format_rejects_huge_fields() {
        assert_eq!(run("format", &["%99999999999999s", "x"]), FnCallResult::Failure);
        assert_eq!(run("format", &["%.99999999999999999999f", "1"]), FnCallResult::Failure);
        assert_eq!(run("format", &["%5000d", "1"]), FnCallResult::Failure);
        assert_eq!(fmt("%4096s", &["x"]).len(), 4096);
    }
}
