use serde_json::Value;
use std::cmp::Ordering;

/// Ordering of two comparable values; `None` when the kinds differ or either
/// side is null (except null against null).
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::String(sa), Value::String(sb)) => Some(sa.cmp(sb)),
        (Value::Number(na), Value::Number(nb)) => match (na.as_i64(), nb.as_i64()) {
            (Some(ia), Some(ib)) => Some(ia.cmp(&ib)),
            _ => na.as_f64()?.partial_cmp(&nb.as_f64()?),
        },
        (Value::Bool(ba), Value::Bool(bb)) => Some(ba.cmp(bb)),
        _ => None,
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Text key for grouping and distinct counts. Integral floats are written as
/// integers so that keys agree with `values_equal`.
pub fn key_fingerprint(v: &Value) -> String {
    normalize_numbers(v).to_string()
}

fn normalize_numbers(v: &Value) -> Value {
    match v {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                Value::from(f as i64)
            }
            _ => v.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(normalize_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), normalize_numbers(v)))
                .collect(),
        ),
        _ => v.clone(),
    }
}

fn rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order used for sorting: nulls first, then by kind, then by value.
pub fn sort_order(a: &Value, b: &Value) -> Ordering {
    rank(a).cmp(&rank(b)).then_with(|| {
        compare_values(a, b).unwrap_or_else(|| a.to_string().cmp(&b.to_string()))
    })
}
