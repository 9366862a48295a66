//! Attribute record types shared by the mapper and its callers.

use std::collections::BTreeMap;

use serde_json::Value;

/// A flat record keyed by internal attribute name.
///
/// Value order is significant: it is the collation order produced by
/// external -> internal translation.
pub type InternalAttributes = BTreeMap<String, Vec<String>>;

/// A record keyed by external attribute name.
///
/// Values are usually arrays of strings, but nested external names produce
/// nested objects and some protocols deliver plain scalars.
pub type ExternalAttributes = serde_json::Map<String, Value>;

/// Append the attribute values carried by `value` to `out`.
///
/// An array is spread in place and a scalar is appended. Strings are kept as
/// they are, numbers and booleans are stringified. `null`, empty scalar
/// strings, objects, and anything nested inside an array other than a scalar
/// contribute nothing.
///
/// Only the empty string counts as "no value": `false` and `0` are real
/// values and are kept as `"false"` and `"0"`.
pub fn collect_values(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Array(items) => out.extend(items.iter().filter_map(scalar_to_string)),
        Value::String(s) if s.is_empty() => {}
        other => out.extend(scalar_to_string(other)),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Convert internal values into the JSON shape used in external records.
pub fn values_to_json(values: &[String]) -> Value {
    Value::Array(values.iter().cloned().map(Value::String).collect())
}
