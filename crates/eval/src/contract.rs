//! Declarative argument contracts.
//!
//! Each fixed argument slot of a built-in carries an [`ArgContract`]: a
//! pattern, numeric range or option set plus the declared type. The
//! dispatcher checks every slot once, after expansion and before the
//! implementation runs.

use regex::Regex;
use tracing::debug;
use vesta_core::{has_unexpanded_reference, parse_int, parse_real, Value};

use crate::types::EvalError;

// ── Common patterns and ranges ───────────────────────────────────────

pub const ANY_STRING: &str = ".*";
pub const ID_RANGE: &str = r"[a-zA-Z0-9_$(){}\[\].:]+";
pub const VAL_RANGE: &str = "0,99999999999";
pub const INT_RANGE: &str = "-99999999999,9999999999";
pub const REAL_RANGE: &str = "-9.99999E100,9.99999E100";
pub const BOOL_OPTIONS: &str = "true,false,yes,no,on,off";
pub const ABSPATH: &str = r#""?(/.*)"#;
pub const PATH: &str = r#""?(((/.*)|(\./.*))|(\\.*)|([A-Za-z]:\\.*))"#;
pub const NAKED_LIST_RANGE: &str = r"@[(][a-zA-Z0-9_$(){}\[\].:]+[)]";

/// Declared type of an argument slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    /// Scalar matching an anchored regex.
    String,
    /// Integer within `min,max`.
    Int,
    /// Real within `min,max`.
    Real,
    /// One of a comma-separated option set.
    Options,
    /// Name of a list or container variable. Inline list and container
    /// values are accepted as they are.
    Reference,
}

impl ArgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArgType::String => "string",
            ArgType::Int => "int",
            ArgType::Real => "real",
            ArgType::Options => "option",
            ArgType::Reference => "reference",
        }
    }
}

/// Contract for one argument slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgContract {
    pub pattern: &'static str,
    pub arg_type: ArgType,
    pub description: &'static str,
}

impl ArgContract {
    pub const fn string(pattern: &'static str, description: &'static str) -> Self {
        ArgContract {
            pattern,
            arg_type: ArgType::String,
            description,
        }
    }

    pub const fn int(range: &'static str, description: &'static str) -> Self {
        ArgContract {
            pattern: range,
            arg_type: ArgType::Int,
            description,
        }
    }

    pub const fn real(range: &'static str, description: &'static str) -> Self {
        ArgContract {
            pattern: range,
            arg_type: ArgType::Real,
            description,
        }
    }

    pub const fn options(options: &'static str, description: &'static str) -> Self {
        ArgContract {
            pattern: options,
            arg_type: ArgType::Options,
            description,
        }
    }

    pub const fn reference(pattern: &'static str, description: &'static str) -> Self {
        ArgContract {
            pattern,
            arg_type: ArgType::Reference,
            description,
        }
    }

    /// Human-readable form of what the slot accepts.
    pub fn expectation(&self) -> String {
        match self.arg_type {
            ArgType::String => format!("a value matching '{}'", self.pattern),
            ArgType::Int => format!("integer in {}", self.pattern),
            ArgType::Real => format!("real in {}", self.pattern),
            ArgType::Options => format!("one of {}", self.pattern),
            ArgType::Reference => format!("a variable name matching '{}'", self.pattern),
        }
    }

    fn accepts_scalar(&self, value: &str) -> bool {
        match self.arg_type {
            ArgType::String | ArgType::Reference => full_match(self.pattern, value),
            ArgType::Int => {
                let Some((lo, hi)) = int_bounds(self.pattern) else {
                    return false;
                };
                parse_int(value).is_some_and(|n| lo <= n && n <= hi)
            }
            ArgType::Real => {
                let Some((lo, hi)) = real_bounds(self.pattern) else {
                    return false;
                };
                parse_real(value).is_some_and(|x| lo <= x && x <= hi)
            }
            ArgType::Options => self.pattern.split(',').any(|opt| opt == value),
        }
    }
}

/// `.` spans newlines so multi-line text satisfies `.*` slots.
fn full_match(pattern: &str, value: &str) -> bool {
    Regex::new(&format!("^(?s:{})$", pattern)).is_ok_and(|re| re.is_match(value))
}

fn int_bounds(range: &str) -> Option<(i64, i64)> {
    let (lo, hi) = range.split_once(',')?;
    Some((lo.trim().parse().ok()?, hi.trim().parse().ok()?))
}

fn real_bounds(range: &str) -> Option<(f64, f64)> {
    let (lo, hi) = range.split_once(',')?;
    Some((lo.trim().parse().ok()?, hi.trim().parse().ok()?))
}

/// Check one expanded argument against its slot.
///
/// Values still holding an unexpanded reference are let through: they
/// will be checked again once the reference resolves.
pub fn check_argument(
    function: &str,
    index: usize,
    contract: &ArgContract,
    value: &Value,
) -> Result<(), EvalError> {
    let violation = |shown: String| EvalError::ContractViolation {
        function: function.to_string(),
        index,
        value: shown,
        expected: contract.expectation(),
    };

    match value {
        Value::Scalar(s) => {
            if has_unexpanded_reference(s) {
                debug!(function, arg = index, value = %s, "skipping contract check on unexpanded value");
                return Ok(());
            }
            if contract.accepts_scalar(s) {
                Ok(())
            } else {
                Err(violation(s.clone()))
            }
        }
        Value::List(_) | Value::Container(_) if contract.arg_type == ArgType::Reference => Ok(()),
        Value::List(items) => {
            for item in items {
                check_argument(function, index, contract, item)?;
            }
            Ok(())
        }
        Value::Container(_) => Err(violation(value.to_string())),
    }
}

/// Check every fixed slot. Extra arguments are the arity check's concern.
pub fn check_arguments(
    function: &str,
    contracts: &[ArgContract],
    args: &[Value],
) -> Result<(), EvalError> {
    for (index, (contract, value)) in contracts.iter().zip(args).enumerate() {
        check_argument(function, index, contract, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NTH: [ArgContract; 2] = [
        ArgContract::reference(ID_RANGE, "list"),
        ArgContract::int(VAL_RANGE, "offset"),
    ];

    #[test]
    fn patterns_are_anchored() {
        let c = ArgContract::string(ID_RANGE, "name");
        assert!(check_argument("f", 0, &c, &Value::scalar("a.b[c]")).is_ok());
        assert!(check_argument("f", 0, &c, &Value::scalar("a b")).is_err());
        let abs = ArgContract::string(ABSPATH, "path");
        assert!(check_argument("f", 0, &abs, &Value::scalar("/etc/hosts")).is_ok());
        assert!(check_argument("f", 0, &abs, &Value::scalar("etc/hosts")).is_err());
    }

    #[test]
    fn any_string_accepts_multiline_text() {
        let c = ArgContract::string(ANY_STRING, "input");
        assert!(check_argument("f", 0, &c, &Value::scalar("a 1\nb 2\n")).is_ok());
        let id = ArgContract::string(ID_RANGE, "name");
        assert!(check_argument("f", 0, &id, &Value::scalar("a\nb")).is_err());
    }

    #[test]
    fn ranges_and_options() {
        assert!(check_arguments("nth", &NTH, &[Value::scalar("l"), Value::scalar("3")]).is_ok());
        let err = check_arguments("nth", &NTH, &[Value::scalar("l"), Value::scalar("-1")])
            .unwrap_err();
        assert_eq!(
            err,
            EvalError::ContractViolation {
                function: "nth".into(),
                index: 1,
                value: "-1".into(),
                expected: "integer in 0,99999999999".into(),
            }
        );

        let b = ArgContract::options(BOOL_OPTIONS, "flag");
        assert!(check_argument("f", 0, &b, &Value::scalar("yes")).is_ok());
        assert!(check_argument("f", 0, &b, &Value::scalar("maybe")).is_err());

        let r = ArgContract::real(REAL_RANGE, "x");
        assert!(check_argument("f", 0, &r, &Value::scalar("-2.5")).is_ok());
        assert!(check_argument("f", 0, &r, &Value::scalar("two")).is_err());
    }

    #[test]
    fn unexpanded_values_are_deferred() {
        let c = ArgContract::int(VAL_RANGE, "n");
        assert!(check_argument("f", 0, &c, &Value::scalar("$(count)")).is_ok());
        assert!(check_argument("f", 0, &c, &Value::scalar("${count}")).is_ok());
    }

    #[test]
    fn reference_slots_take_inline_values() {
        let c = ArgContract::reference(ID_RANGE, "list");
        assert!(check_argument("f", 0, &c, &Value::list(["a b", "c"])).is_ok());
        assert!(check_argument("f", 0, &c, &Value::Container(json!({"k": 1}))).is_ok());
    }

    #[test]
    fn list_in_scalar_slot_checks_each_element() {
        let c = ArgContract::int(VAL_RANGE, "n");
        assert!(check_argument("f", 0, &c, &Value::list(["1", "2"])).is_ok());
        assert!(check_argument("f", 0, &c, &Value::list(["1", "x"])).is_err());
        assert!(check_argument("f", 0, &c, &Value::Container(json!(1))).is_err());
    }
}
