//! JSON helpers for server settings.

use serde_json::{Map, Value};

/// Expand dotted keys into nested objects.
///
/// `{"a.b": 1, "a.c": 2}` becomes `{"a": {"b": 1, "c": 2}}`. Object values
/// are expanded too. When a plain value and a nested key collide, the key
/// visited last wins.
pub fn expand_dotted_keys(settings: &Map<String, Value>) -> Value {
    let mut expanded = Value::Object(Map::new());
    for (key, value) in settings {
        let value = match value {
            Value::Object(inner) => expand_dotted_keys(inner),
            other => other.clone(),
        };

        let mut nested = value;
        for part in key.rsplit('.') {
            let mut wrapper = Map::new();
            wrapper.insert(part.to_string(), nested);
            nested = Value::Object(wrapper);
        }
        deep_merge(&mut expanded, nested);
    }
    expanded
}

/// Merge `source` into `target`, recursing into objects present in both.
///
/// Anything that is not an object on both sides is replaced by `source`.
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, source) => *target = source,
    }
}
