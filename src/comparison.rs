use serde_json::Value;

use crate::value::to_number;

/// Relational comparison (`<`, `<=`, `>`, `>=`).
///
/// Two strings compare lexicographically; anything else compares numerically.
/// Comparisons involving NaN are always false.
pub fn cmp_values<F>(a: Option<&Value>, b: Option<&Value>, pred_on_ord: F) -> bool
where
    F: Fn(i32) -> bool,
{
    match (a, b) {
        (Some(Value::String(sa)), Some(Value::String(sb))) => pred_on_ord(sa.cmp(sb) as i32),
        _ => {
            let (da, db) = (to_number(a), to_number(b));
            if da.is_nan() || db.is_nan() {
                return false;
            }
            let ord = if da == db {
                0
            } else if da < db {
                -1
            } else {
                1
            };
            pred_on_ord(ord)
        }
    }
}

/// `===`. Arrays and objects compare structurally since values are copies.
pub fn strict_eq(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(Value::Number(na)), Some(Value::Number(nb))) => {
            match (na.as_f64(), nb.as_f64()) {
                (Some(da), Some(db)) => da == db,
                _ => na == nb,
            }
        }
        (Some(va), Some(vb)) => va == vb,
        _ => false,
    }
}

/// `==` with the usual null/undefined and numeric coercions.
pub fn loose_eq(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => true,
        (None | Some(Value::Null), _) | (_, None | Some(Value::Null)) => false,
        (Some(Value::Number(_)), Some(Value::String(_)))
        | (Some(Value::String(_)), Some(Value::Number(_)))
        | (Some(Value::Bool(_)), _)
        | (_, Some(Value::Bool(_))) => {
            if matches!(a, Some(Value::Array(_) | Value::Object(_)))
                || matches!(b, Some(Value::Array(_) | Value::Object(_)))
            {
                return false;
            }
            let (da, db) = (to_number(a), to_number(b));
            !da.is_nan() && da == db
        }
        _ => strict_eq(a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_compare_lexicographically() {
        assert!(cmp_values(Some(&json!("apple")), Some(&json!("banana")), |o| o < 0));
        assert!(cmp_values(Some(&json!("10")), Some(&json!(9)), |o| o > 0));
    }

    #[test]
    fn nan_never_compares() {
        assert!(!cmp_values(None, Some(&json!(1)), |o| o <= 0));
        assert!(!cmp_values(None, Some(&json!(1)), |o| o > 0));
    }

    #[test]
    fn loose_equality_coerces() {
        assert!(loose_eq(Some(&json!(1)), Some(&json!("1"))));
        assert!(loose_eq(None, Some(&Value::Null)));
        assert!(loose_eq(Some(&json!(true)), Some(&json!(1))));
        assert!(!loose_eq(Some(&json!(0)), Some(&Value::Null)));
    }

    #[test]
    fn strict_equality_does_not_coerce() {
        assert!(!strict_eq(Some(&json!(1)), Some(&json!("1"))));
        assert!(strict_eq(Some(&json!(2)), Some(&json!(2.0))));
        assert!(!strict_eq(None, Some(&Value::Null)));
    }
}
