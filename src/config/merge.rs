//! Layered merge of configuration documents.
//!
//! Every source (defaults, file, environment, flags) is turned into a
//! `serde_json::Value` layer. Layers are folded lowest precedence first, so a
//! key present in a later layer replaces the same key in an earlier one while
//! sibling keys survive.

use serde_json::{Map, Value};

/// Deep merge two JSON values, with `overlay` taking precedence over `base`.
///
/// - Objects are merged recursively: keys in overlay override keys in base
/// - Arrays, strings, numbers, booleans are replaced entirely
/// - A null overlay keeps the base value (null means "not specified")
///
/// # Example
/// ```
/// use serde_json::json;
/// use cmdkit::config::deep_merge;
///
/// let file = json!({ "db": { "host": "localhost", "port": 5432 } });
/// let env = json!({ "db": { "port": 6543 } });
/// assert_eq!(
///     deep_merge(file, env),
///     json!({ "db": { "host": "localhost", "port": 6543 } })
/// );
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged_value);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Merge layers in order, later layers taking precedence.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, deep_merge)
}

/// Look up a dotted key (`db.port`) in a document.
///
/// A literal key containing dots wins over the nested interpretation, so
/// files may spell a flag name either way.
pub fn get_path<'a>(doc: &'a Value, key: &str) -> Option<&'a Value> {
    let map = doc.as_object()?;
    if let Some(value) = map.get(key) {
        return Some(value);
    }
    let (head, rest) = key.split_once('.')?;
    get_path(map.get(head)?, rest)
}

/// Insert `value` under a dotted key, creating intermediate objects.
pub fn set_path(doc: &mut Map<String, Value>, key: &str, value: Value) {
    match key.split_once('.') {
        None => {
            doc.insert(key.to_string(), value);
        }
        Some((head, rest)) => {
            let child = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(child) = child {
                set_path(child, rest, value);
            }
        }
    }
}
