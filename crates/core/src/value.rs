//! Runtime value model.
//!
//! Every datum the evaluator manipulates is a [`Value`]: a textual scalar,
//! an ordered list, or a JSON-like container. Numbers and booleans are
//! scalars parsed on demand.
//!
//! Lists are genuinely empty inside the evaluator. The legacy policy
//! language represents an empty list as a single [`NULL_SENTINEL`]
//! element; conversion to and from that form only happens at the edges
//! ([`Value::from_legacy_list`], [`Value::to_legacy_list`],
//! [`parse_list_literal`]).

use std::fmt;
use std::str::FromStr;

use serde_json::Value as Json;

/// Marker element the legacy list representation uses for "no elements".
pub const NULL_SENTINEL: &str = "cf_null";

/// Integer value the policy language treats as unbounded.
pub const INFINITY: i64 = 999_999_999;

// ──────────────────────────────────────────────
// Value
// ──────────────────────────────────────────────

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(String),
    List(Vec<Value>),
    Container(Json),
}

impl Value {
    pub fn scalar(s: impl Into<String>) -> Value {
        Value::Scalar(s.into())
    }

    /// Build a list of scalars. Sentinel elements are dropped.
    pub fn list<I, S>(items: I) -> Value
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(
            items
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| s != NULL_SENTINEL)
                .map(Value::Scalar)
                .collect(),
        )
    }

    pub fn empty_list() -> Value {
        Value::List(Vec::new())
    }

    /// Decode a list that may carry the legacy empty-list sentinel.
    pub fn from_legacy_list(items: Vec<String>) -> Value {
        Value::list(items)
    }

    /// Render a list in legacy form: an empty list becomes `[cf_null]`.
    ///
    /// Returns `None` for non-list values.
    pub fn to_legacy_list(&self) -> Option<Vec<String>> {
        let items = self.list_strings()?;
        if items.is_empty() {
            Some(vec![NULL_SENTINEL.to_string()])
        } else {
            Some(items)
        }
    }

    /// Returns a human-readable kind name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::List(_) => "list",
            Value::Container(_) => "container",
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&Json> {
        match self {
            Value::Container(json) => Some(json),
            _ => None,
        }
    }

    /// String forms of the elements of a list, sentinel elements skipped.
    pub fn list_strings(&self) -> Option<Vec<String>> {
        let items = self.as_list()?;
        Some(
            items
                .iter()
                .map(|v| v.to_string())
                .filter(|s| s != NULL_SENTINEL)
                .collect(),
        )
    }

    /// Logical length of a list. `None` for non-lists.
    pub fn list_len(&self) -> Option<usize> {
        self.list_strings().map(|items| items.len())
    }

    /// Strip sentinel elements from lists, recursively.
    pub fn normalized(self) -> Value {
        match self {
            Value::List(items) => Value::List(
                items
                    .into_iter()
                    .filter(|v| v.as_scalar() != Some(NULL_SENTINEL))
                    .map(Value::normalized)
                    .collect(),
            ),
            other => other,
        }
    }

    /// JSON rendering used by the CLI and `storejson`-style output.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Scalar(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Container(json) => json.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(s) => write!(f, "{}", s),
            Value::List(_) => {
                let items = self.to_legacy_list().unwrap_or_default();
                write!(f, "{}", render_list_literal(&items))
            }
            Value::Container(json) => write!(f, "{}", json),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Scalar(s)
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Value::Container(json)
    }
}

// ──────────────────────────────────────────────
// Declared types
// ──────────────────────────────────────────────

/// The type a variable was declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    String,
    StringList,
    Int,
    IntList,
    Real,
    RealList,
    Container,
    Context,
    None,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::StringList => "slist",
            DataType::Int => "int",
            DataType::IntList => "ilist",
            DataType::Real => "real",
            DataType::RealList => "rlist",
            DataType::Container => "data",
            DataType::Context => "context",
            DataType::None => "none",
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(
            self,
            DataType::StringList | DataType::IntList | DataType::RealList
        )
    }

    /// The declared type a value gets when nothing more specific is known.
    pub fn of(value: &Value) -> DataType {
        match value {
            Value::Scalar(_) => DataType::String,
            Value::List(_) => DataType::StringList,
            Value::Container(_) => DataType::Container,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(DataType::String),
            "slist" => Ok(DataType::StringList),
            "int" => Ok(DataType::Int),
            "ilist" => Ok(DataType::IntList),
            "real" => Ok(DataType::Real),
            "rlist" => Ok(DataType::RealList),
            "data" => Ok(DataType::Container),
            "context" => Ok(DataType::Context),
            "none" => Ok(DataType::None),
            other => Err(format!("unknown data type '{}'", other)),
        }
    }
}

// ──────────────────────────────────────────────
// Scalar coercions
// ──────────────────────────────────────────────

fn split_multiplier(s: &str) -> (&str, f64) {
    let Some(last) = s.chars().last() else {
        return (s, 1.0);
    };
    let factor = match last {
        'k' => 1_000.0,
        'K' => 1_024.0,
        'm' => 1_000_000.0,
        'M' => 1_048_576.0,
        'g' => 1_000_000_000.0,
        'G' => 1_073_741_824.0,
        _ => return (s, 1.0),
    };
    (&s[..s.len() - 1], factor)
}

/// Parse an integer scalar.
///
/// Accepts an optional `k`/`K`/`m`/`M`/`g`/`G` multiplier suffix and the
/// words `inf` (unbounded) and `now` (returns `None`; callers substitute
/// the pass start time).
pub fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    if s == "inf" {
        return Some(INFINITY);
    }
    if let Ok(n) = s.parse::<i64>() {
        return Some(n);
    }
    let (digits, factor) = split_multiplier(s);
    if factor == 1.0 {
        return None;
    }
    let base: i64 = digits.parse().ok()?;
    let scaled = base as f64 * factor;
    if scaled.abs() > i64::MAX as f64 {
        return None;
    }
    Some(scaled as i64)
}

/// Parse a real scalar, with the same multiplier suffixes as [`parse_int`].
pub fn parse_real(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(x) = s.parse::<f64>() {
        return x.is_finite().then_some(x);
    }
    let (digits, factor) = split_multiplier(s);
    if factor == 1.0 {
        return None;
    }
    let base: f64 = digits.parse().ok()?;
    Some(base * factor)
}

/// Parse a policy boolean (`true`/`yes`/`on` or `false`/`no`/`off`).
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim() {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Render a real the way the policy language prints reals (six decimals).
pub fn format_real(x: f64) -> String {
    format!("{:.6}", x)
}

// ──────────────────────────────────────────────
// List literals
// ──────────────────────────────────────────────

/// Error from [`parse_list_literal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListLiteralError {
    pub position: usize,
    pub message: String,
}

impl fmt::Display for ListLiteralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "list literal at {}: {}", self.position, self.message)
    }
}

impl std::error::Error for ListLiteralError {}

/// Parse a serialized list literal such as `{ "a", 'b' }`.
///
/// Elements must be quoted with `"` or `'`; a backslash escapes the next
/// character. The result is in legacy form (it may contain the sentinel).
pub fn parse_list_literal(text: &str) -> Result<Vec<String>, ListLiteralError> {
    let chars: Vec<char> = text.chars().collect();
    let mut pos = 0usize;
    let err = |position: usize, message: &str| ListLiteralError {
        position,
        message: message.to_string(),
    };

    let skip_ws = |pos: &mut usize| {
        while *pos < chars.len() && chars[*pos].is_whitespace() {
            *pos += 1;
        }
    };

    skip_ws(&mut pos);
    if pos >= chars.len() || chars[pos] != '{' {
        return Err(err(pos, "expected '{'"));
    }
    pos += 1;

    let mut items = Vec::new();
    loop {
        skip_ws(&mut pos);
        if pos >= chars.len() {
            return Err(err(pos, "unterminated list"));
        }
        if chars[pos] == '}' && items.is_empty() {
            pos += 1;
            break;
        }

        let quote = chars[pos];
        if quote != '"' && quote != '\'' {
            return Err(err(pos, "expected quoted element"));
        }
        pos += 1;
        let mut item = String::new();
        loop {
            if pos >= chars.len() {
                return Err(err(pos, "unterminated string"));
            }
            let c = chars[pos];
            if c == '\\' && pos + 1 < chars.len() {
                item.push(chars[pos + 1]);
                pos += 2;
                continue;
            }
            pos += 1;
            if c == quote {
                break;
            }
            item.push(c);
        }
        items.push(item);

        skip_ws(&mut pos);
        match chars.get(pos) {
            Some(',') => pos += 1,
            Some('}') => {
                pos += 1;
                break;
            }
            _ => return Err(err(pos, "expected ',' or '}'")),
        }
    }

    skip_ws(&mut pos);
    if pos != chars.len() {
        return Err(err(pos, "trailing characters after list"));
    }
    Ok(items)
}

/// Render elements as a list literal: `{ "a", "b" }`.
pub fn render_list_literal(items: &[String]) -> String {
    let quoted: Vec<String> = items
        .iter()
        .map(|s| format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("{{ {} }}", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_constructor_drops_sentinel() {
        let v = Value::list(["cf_null"]);
        assert_eq!(v, Value::empty_list());
        assert_eq!(v.list_len(), Some(0));
    }

    #[test]
    fn legacy_roundtrip_of_empty_list() {
        let v = Value::from_legacy_list(vec![NULL_SENTINEL.to_string()]);
        assert_eq!(v.list_len(), Some(0));
        assert_eq!(v.to_legacy_list(), Some(vec!["cf_null".to_string()]));
    }

    #[test]
    fn legacy_list_with_members_keeps_order() {
        let v = Value::from_legacy_list(vec!["b".into(), "cf_null".into(), "a".into()]);
        assert_eq!(v.list_strings(), Some(vec!["b".to_string(), "a".to_string()]));
    }

    #[test]
    fn normalized_strips_nested_sentinels() {
        let v = Value::List(vec![
            Value::scalar("cf_null"),
            Value::List(vec![Value::scalar("cf_null"), Value::scalar("x")]),
        ]);
        assert_eq!(v.normalized(), Value::List(vec![Value::list(["x"])]));
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::scalar("abc").to_string(), "abc");
        assert_eq!(Value::list(["a", "b"]).to_string(), r#"{ "a", "b" }"#);
        assert_eq!(Value::empty_list().to_string(), r#"{ "cf_null" }"#);
        assert_eq!(Value::Container(json!({"k": 1})).to_string(), r#"{"k":1}"#);
    }

    #[test]
    fn parse_int_suffixes() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int("-7"), Some(-7));
        assert_eq!(parse_int("2k"), Some(2000));
        assert_eq!(parse_int("1K"), Some(1024));
        assert_eq!(parse_int("inf"), Some(INFINITY));
        assert_eq!(parse_int("abc"), None);
        assert_eq!(parse_int(""), None);
    }

    #[test]
    fn parse_real_accepts_plain_and_suffixed() {
        assert_eq!(parse_real("1.5"), Some(1.5));
        assert_eq!(parse_real("1e3"), Some(1000.0));
        assert_eq!(parse_real("2m"), Some(2_000_000.0));
        assert_eq!(parse_real("x1"), None);
        assert_eq!(parse_real("nan"), None);
    }

    #[test]
    fn parse_bool_words() {
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn list_literal_parses_mixed_quotes() {
        let items = parse_list_literal(r#"{ "a", 'b c', "d\"e" }"#).unwrap();
        assert_eq!(items, vec!["a", "b c", "d\"e"]);
    }

    #[test]
    fn list_literal_empty_braces() {
        assert_eq!(parse_list_literal("{}").unwrap(), Vec::<String>::new());
        assert_eq!(parse_list_literal("  { }  ").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn list_literal_rejects_bare_words() {
        assert!(parse_list_literal("{ a, b }").is_err());
        assert!(parse_list_literal(r#"{ "a" "#).is_err());
        assert!(parse_list_literal(r#""a""#).is_err());
        assert!(parse_list_literal(r#"{ "a" } x"#).is_err());
    }

    #[test]
    fn render_then_parse_keeps_elements() {
        let items = vec!["x".to_string(), "say \"hi\"".to_string()];
        let text = render_list_literal(&items);
        assert_eq!(parse_list_literal(&text).unwrap(), items);
    }

    #[test]
    fn data_type_names() {
        assert_eq!(DataType::StringList.to_string(), "slist");
        assert_eq!("data".parse::<DataType>(), Ok(DataType::Container));
        assert!(DataType::IntList.is_list());
        assert!(!DataType::Context.is_list());
    }
}
