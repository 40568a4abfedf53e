//! Value model helpers.
//!
//! Data is `serde_json::Value`; the missing marker (an absent field, an omitted
//! top-level value) is `None` wherever a value is taken as `Option<&Value>`.
use ordered_float::OrderedFloat;
use serde_json::{Number, Value};

/// Canonical structural equality, used for literal types.
///
/// Numbers compare by numeric value (`1 == 1.0`), object keys as a set.
pub fn canonical_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_eq(x, y),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| canonical_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|(k, x)| ys.get(k).is_some_and(|y| canonical_eq(x, y)))
        }
        _ => false,
    }
}

fn numbers_eq(x: &Number, y: &Number) -> bool {
    match (as_integer(x), as_integer(y)) {
        (Some(i), Some(j)) => i == j,
        _ => match (x.as_f64(), y.as_f64()) {
            (Some(f), Some(g)) => OrderedFloat(f) == OrderedFloat(g),
            _ => false,
        },
    }
}

fn as_integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

/// One-line rendering of a value or the missing marker.
pub fn describe(value: Option<&Value>) -> String {
    match value {
        None => "<missing>".to_string(),
        Some(v) => v.to_string(),
    }
}

// ------------------------------- Tests ------------------------------------ //
