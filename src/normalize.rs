//! Conversion between the source document and the shadow tree.
//!
//! Inbound, `normalize` reshapes arbitrary JSON into the object-only form
//! the filesystem operates on: arrays become objects keyed `@0..@N-1`, a
//! scalar root is wrapped as `{"@scalar": value}`, and `/` inside object
//! keys is replaced by the reserved token. Outbound, `denormalize` rebuilds
//! the original shape. The live tree only ever holds the normalized form;
//! denormalization happens at persist time, on a fresh copy.

use serde_json::{Map, Value};

use crate::paths;

/// Build the shadow form of `value`.
///
/// With `is_root` set the result is always an object, which keeps the
/// mount root presentable as a directory.
pub fn normalize(value: &Value, is_root: bool) -> Value {
    match value {
        Value::Object(map) => {
            let mut obj = Map::new();
            for (key, child) in map {
                obj.insert(paths::escape_slash(key), normalize(child, false));
            }
            Value::Object(obj)
        }
        Value::Array(items) => {
            let mut obj = Map::new();
            for (index, child) in items.iter().enumerate() {
                obj.insert(paths::index_key(index), normalize(child, false));
            }
            Value::Object(obj)
        }
        scalar if is_root => {
            let mut obj = Map::new();
            obj.insert(paths::SCALAR_KEY.to_string(), scalar.clone());
            Value::Object(obj)
        }
        scalar => scalar.clone(),
    }
}

/// Rebuild the original document shape from a shadow tree.
pub fn denormalize(value: &Value) -> Value {
    if let Value::Object(map) = value {
        if map.len() == 1 {
            if let Some(scalar) = map.get(paths::SCALAR_KEY) {
                return scalar.clone();
            }
        }
    }
    rebuild(value)
}

fn rebuild(value: &Value) -> Value {
    let Value::Object(map) = value else {
        return value.clone();
    };
    if let Some(items) = index_run(map) {
        return Value::Array(items.into_iter().map(rebuild).collect());
    }
    let mut obj = Map::new();
    for (key, child) in map {
        obj.insert(paths::unescape_slash(key), rebuild(child));
    }
    Value::Object(obj)
}

/// Children in index order, when the keys are exactly `@0 .. @N-1`.
///
/// An empty object is not an index run; it stays an object.
fn index_run(map: &Map<String, Value>) -> Option<Vec<&Value>> {
    if map.is_empty() {
        return None;
    }
    let mut slots: Vec<Option<&Value>> = vec![None; map.len()];
    for (key, child) in map {
        let index = paths::parse_index_key(key)?;
        *slots.get_mut(index)? = Some(child);
    }
    slots.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_passes_through() {
        let doc = json!({"a": 1, "b": {"c": "x"}});
        assert_eq!(normalize(&doc, true), doc);
    }

    #[test]
    fn arrays_become_indexed_objects() {
        let doc = json!({"arr": [10, 20]});
        assert_eq!(normalize(&doc, true), json!({"arr": {"@0": 10, "@1": 20}}));
    }

    #[test]
    fn nested_arrays_normalize_recursively() {
        let doc = json!([[1], {"k": [true, null]}]);
        let shadow = normalize(&doc, true);
        assert_eq!(
            shadow,
            json!({"@0": {"@0": 1}, "@1": {"k": {"@0": true, "@1": null}}})
        );
    }

    #[test]
    fn scalar_root_is_wrapped() {
        assert_eq!(normalize(&json!(42), true), json!({"@scalar": 42}));
        assert_eq!(normalize(&json!("s"), true), json!({"@scalar": "s"}));
    }

    #[test]
    fn nested_scalars_are_plain_copies() {
        assert_eq!(normalize(&json!(42), false), json!(42));
    }

    #[test]
    fn keys_with_slashes_are_escaped() {
        let doc = json!({"a/b": {"c/d/e": 1}});
        assert_eq!(normalize(&doc, true), json!({"a@2Fb": {"c@2Fd@2Fe": 1}}));
    }

    #[test]
    fn round_trip_preserves_documents() {
        let docs = [
            json!({"a": 1, "b": {"c": "x"}}),
            json!({"arr": [10, 20], "deep": [[1, 2], []]}),
            json!([1, "two", null, {"k": [3.5]}]),
            json!({"a/b": [true], "plain": {"x/y": "v"}}),
            json!(42),
            json!("text"),
            json!(null),
            json!({}),
        ];
        for doc in docs {
            assert_eq!(denormalize(&normalize(&doc, true)), doc);
        }
    }

    #[test]
    fn gap_in_indices_stays_an_object() {
        let shadow = json!({"@0": 1, "@2": 2});
        assert_eq!(denormalize(&shadow), shadow);
    }

    #[test]
    fn foreign_key_blocks_array_detection() {
        let shadow = json!({"@0": 1, "extra": 2});
        assert_eq!(denormalize(&shadow), shadow);
    }

    #[test]
    fn scalar_wrapper_with_siblings_is_kept() {
        let shadow = json!({"@scalar": 1, "other": 2});
        assert_eq!(denormalize(&shadow), shadow);
    }

    #[test]
    fn empty_object_stays_empty_object() {
        assert_eq!(denormalize(&json!({})), json!({}));
    }

    #[test]
    fn normalized_root_is_always_an_object() {
        for doc in [json!(1), json!([1]), json!({"a": 1}), json!(null)] {
            assert!(normalize(&doc, true).is_object());
        }
    }
}
