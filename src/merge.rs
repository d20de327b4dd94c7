//! Deep merge for layered field mappings.

use serde_json::{Map, Value};

/// Merges `over` onto `base` and returns the result.
///
/// Where both sides hold an object under the same key the two objects are
/// merged recursively; every other value in `over` replaces the one in
/// `base` outright, arrays included. Neither input is modified.
pub fn deep_merge(base: &Map<String, Value>, over: &Map<String, Value>) -> Map<String, Value> {
    let mut out = base.clone();
    for (key, value) in over {
        let merged = match (out.get(key), value) {
            (Some(Value::Object(inner)), Value::Object(patch)) => Value::Object(deep_merge(inner, patch)),
            _ => value.clone(),
        };
        out.insert(key.clone(), merged);
    }
    out
}
