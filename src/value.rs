//! JavaScript-flavoured coercions over `serde_json::Value`.
//!
//! `None` stands for `undefined`, the absent sentinel. Every other value is a
//! plain JSON value.

use crate::errors::{EvalError, Result};
use itertools::Itertools;
use serde_json::{Number, Value};

/// Largest integer that round-trips through an `f64` exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

pub fn truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// `Number(v)`; may return NaN.
pub fn to_number(v: Option<&Value>) -> f64 {
    match v {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => {
            let t = s.trim();
            if t.is_empty() {
                0.0
            } else {
                t.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        Some(Value::Array(a)) if a.is_empty() => 0.0,
        Some(Value::Array(a)) if a.len() == 1 => to_number(a.first()),
        Some(_) => f64::NAN,
    }
}

/// Wrap an `f64` result, keeping integral values integral.
pub fn number_value(f: f64) -> Result<Value> {
    if !f.is_finite() {
        return Err(EvalError::Runtime("result is not a finite number".into()));
    }
    if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
        return Ok(Value::from(f as i64));
    }
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| EvalError::Runtime("result is not a finite number".into()))
}

fn format_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => (f as i64).to_string(),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// `String(v)` as a template would render it.
pub fn to_display_string(v: Option<&Value>) -> String {
    match v {
        None => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => format_number(n),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => to_display_string(Some(other)),
            })
            .join(","),
        Some(Value::Object(_)) => "[object Object]".to_string(),
    }
}

pub fn type_of(v: Option<&Value>) -> &'static str {
    match v {
        None => "undefined",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Null) | Some(Value::Array(_)) | Some(Value::Object(_)) => "object",
    }
}

/// Arrays and objects convert to their display string before `+`.
pub fn is_stringish(v: Option<&Value>) -> bool {
    matches!(
        v,
        Some(Value::String(_)) | Some(Value::Array(_)) | Some(Value::Object(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn display_matches_string_conversion() {
        assert_eq!(to_display_string(Some(&json!(4.0))), "4");
        assert_eq!(to_display_string(Some(&json!(0.5))), "0.5");
        assert_eq!(to_display_string(Some(&json!([1, null, "a"]))), "1,,a");
        assert_eq!(to_display_string(Some(&json!({"a": 1}))), "[object Object]");
        assert_eq!(to_display_string(Some(&Value::Null)), "null");
        assert_eq!(to_display_string(None), "undefined");
    }

    #[test]
    fn truthiness_follows_script_rules() {
        assert!(!truthy(Some(&json!(""))));
        assert!(!truthy(Some(&json!(0))));
        assert!(truthy(Some(&json!([]))));
        assert!(!truthy(None));
    }

    #[test]
    fn number_value_rejects_non_finite() {
        assert_eq!(number_value(3.0).unwrap(), json!(3));
        assert!(number_value(f64::INFINITY).is_err());
        assert!(number_value(f64::NAN).is_err());
    }

    #[test]
    fn strings_convert_to_numbers() {
        assert_eq!(to_number(Some(&json!(" 12 "))), 12.0);
        assert_eq!(to_number(Some(&json!(""))), 0.0);
        assert!(to_number(Some(&json!("abc"))).is_nan());
    }
}
