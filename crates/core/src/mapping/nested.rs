//! Nested external attribute names such as `address.street_address`.
//!
//! The internal representation is always flat; only external records nest.

use serde_json::{Map, Value};

/// Look up a nested name in an external record.
///
/// Returns `None` as soon as a segment is absent or the value reached so far
/// is not an object.
pub fn get_nested<'a>(
    data: &'a Map<String, Value>,
    nested_name: &str,
    separator: char,
) -> Option<&'a Value> {
    let mut segments = nested_name.split(separator);
    let first = segments.next()?;
    let mut current = data.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Wrap `value` in one object layer per segment, innermost segment last.
///
/// `["address", "street_address"]` with `v` yields
/// `{"address": {"street_address": v}}`. An empty segment list returns the
/// value unchanged.
pub fn construct_nested<S: AsRef<str>>(segments: &[S], value: Value) -> Value {
    match segments.split_first() {
        None => value,
        Some((first, rest)) => {
            let mut layer = Map::new();
            layer.insert(first.as_ref().to_string(), construct_nested(rest, value));
            Value::Object(layer)
        }
    }
}
