//! Result payload normalization for the wire.
//!
//! Stores that keep every number as an exact decimal hand us whole numbers
//! as floats (`42.0`). Before a payload is pushed to a client those become
//! plain integers so the client sees `42`, not `42.0`.
//!
//! Only whole numbers are rewritten. Fractional values pass through as
//! floats unchanged.

use serde_json::{Number, Value};

// 2^63 and 2^64 as f64. Anything at or above these does not fit.
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;
const U64_UPPER: f64 = 18_446_744_073_709_551_616.0;

/// Recursively rewrite whole-number floats as integers.
pub fn normalize_numbers(value: Value) -> Value {
    match value {
        Value::Number(n) => Value::Number(normalize_number(n)),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize_numbers(v)))
                .collect(),
        ),
        other => other,
    }
}

fn normalize_number(n: Number) -> Number {
    if !n.is_f64() {
        return n;
    }
    let Some(f) = n.as_f64() else {
        return n;
    };
    if !f.is_finite() || f.fract() != 0.0 {
        return n;
    }
    if f >= -I64_UPPER && f < I64_UPPER {
        Number::from(f as i64)
    } else if f >= 0.0 && f < U64_UPPER {
        Number::from(f as u64)
    } else {
        n
    }
}

/// Normalize and serialize a payload into the text frame sent to a client.
pub fn to_wire(value: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(&normalize_numbers(value.clone()))
}
