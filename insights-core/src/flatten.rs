use serde_json::{Map, Value};

/// Insertion-ordered mapping of dotted key path to primitive value.
pub type FlatRecord = Map<String, Value>;

/// Flatten an arbitrarily nested value into a single level of dotted key paths.
///
/// Mapping entries recurse under `prefix + key + "."`, sequence elements under
/// `prefix + index + "."`. Leaves (including `null`) are stored under the prefix
/// with its trailing dot removed, so `{"a": {"b": 1}, "c": [10, 20]}` becomes
/// `{"a.b": 1, "c.0": 10, "c.1": 20}`.
pub fn flatten(value: &Value) -> FlatRecord {
    let mut out = Map::new();
    flatten_into(value, "", &mut out);
    out
}

/// Same as [`flatten`] with a caller-supplied starting prefix.
pub fn flatten_with_prefix(value: &Value, prefix: &str) -> FlatRecord {
    let mut out = Map::new();
    flatten_into(value, prefix, &mut out);
    out
}

fn flatten_into(value: &Value, prefix: &str, out: &mut FlatRecord) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(child, &format!("{}{}.", prefix, key), out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(child, &format!("{}{}.", prefix, index), out);
            }
        }
        leaf => {
            let key = prefix.strip_suffix('.').unwrap_or(prefix);
            out.insert(key.to_string(), leaf.clone());
        }
    }
}

/// Case-insensitive lookup of the first flattened field whose full path or last
/// path segment equals one of `candidates`, in mapping-iteration order.
pub fn extract_field<'a, S: AsRef<str>>(flat: &'a FlatRecord, candidates: &[S]) -> Option<&'a Value> {
    flat.iter()
        .find(|(key, _)| {
            let last_segment = key.rsplit('.').next().unwrap_or(key);
            candidates.iter().any(|candidate| {
                let candidate = candidate.as_ref();
                key.eq_ignore_ascii_case(candidate) || last_segment.eq_ignore_ascii_case(candidate)
            })
        })
        .map(|(_, value)| value)
}

/// Render a flattened value as text; `None` for null. Containers are written as
/// compact JSON.
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}
