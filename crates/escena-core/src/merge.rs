//! # Deep Merge
//!
//! Merge rules for free-form JSON payloads (user profiles, business context).
//!
//! ## Merge Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Deep Merge Rules                                │
//! │                                                                         │
//! │  source            target            result                             │
//! │  ──────            ──────            ──────                             │
//! │  null (top level)  anything          target unchanged                   │
//! │  object            object            merged key by key, recursively     │
//! │  object            non-object        source                             │
//! │  array             anything          source (arrays REPLACE)            │
//! │  primitive         anything          source                             │
//! │                                                                         │
//! │  Inside an object, a key whose source value is null is set to null;    │
//! │  keys missing from the source are left alone.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Typed slice fields follow the same policy through their patch types
//! (see [`crate::patch`]); this module covers the opaque payloads.

use serde_json::Value;

/// Merges `source` into `target` in place.
///
/// ```rust
/// use escena_core::merge::deep_merge;
/// use serde_json::json;
///
/// let mut target = json!({"name": "Ana", "prefs": {"a": 1, "b": 2}, "tags": [1, 2]});
/// deep_merge(&mut target, json!({"prefs": {"b": 3}, "tags": [9]}));
/// assert_eq!(target, json!({"name": "Ana", "prefs": {"a": 1, "b": 3}, "tags": [9]}));
/// ```
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (_, Value::Null) => {}
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value);
                    }
                    _ => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target, source) => *target = source,
    }
}

/// Returns a merged copy, leaving both inputs untouched.
pub fn merged(target: &Value, source: &Value) -> Value {
    let mut out = target.clone();
    deep_merge(&mut out, source.clone());
    out
}

/// Applies a nullable patch field to an optional opaque payload.
///
/// - `None`: field absent from the update, target untouched
/// - `Some(None)`: explicit null, target cleared
/// - `Some(Some(v))`: deep merged into the existing payload (or set if empty)
pub fn merge_opaque(target: &mut Option<Value>, patch: Option<Option<Value>>) {
    match patch {
        None => {}
        Some(None) => *target = None,
        Some(Some(value)) => match target {
            Some(existing) => deep_merge(existing, value),
            None => *target = Some(value),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_objects_merge() {
        let mut target = json!({"a": {"x": 1, "y": {"deep": true}}, "b": 2});
        deep_merge(&mut target, json!({"a": {"y": {"other": 5}}}));
        assert_eq!(
            target,
            json!({"a": {"x": 1, "y": {"deep": true, "other": 5}}, "b": 2})
        );
    }

    #[test]
    fn test_arrays_replace() {
        let mut target = json!({"list": [1, 2, 3]});
        deep_merge(&mut target, json!({"list": [4]}));
        assert_eq!(target, json!({"list": [4]}));
    }

    #[test]
    fn test_primitives_replace() {
        let mut target = json!({"n": 1, "s": "old"});
        deep_merge(&mut target, json!({"n": 2, "s": "new"}));
        assert_eq!(target, json!({"n": 2, "s": "new"}));

        let mut target = json!({"a": 1});
        deep_merge(&mut target, json!("scalar"));
        assert_eq!(target, json!("scalar"));
    }

    #[test]
    fn test_null_source_is_noop() {
        let mut target = json!({"a": 1});
        deep_merge(&mut target, Value::Null);
        assert_eq!(target, json!({"a": 1}));
    }

    #[test]
    fn test_nested_null_assigns_null() {
        let mut target = json!({"a": 1, "b": 2});
        deep_merge(&mut target, json!({"a": null}));
        assert_eq!(target, json!({"a": null, "b": 2}));
    }

    #[test]
    fn test_object_replaces_non_object() {
        let mut target = json!({"a": 5});
        deep_merge(&mut target, json!({"a": {"x": 1}}));
        assert_eq!(target, json!({"a": {"x": 1}}));
    }

    #[test]
    fn test_merged_leaves_inputs() {
        let target = json!({"a": 1});
        let source = json!({"b": 2});
        assert_eq!(merged(&target, &source), json!({"a": 1, "b": 2}));
        assert_eq!(target, json!({"a": 1}));
    }

    #[test]
    fn test_merge_opaque() {
        let mut slot = None;
        merge_opaque(&mut slot, None);
        assert_eq!(slot, None);

        merge_opaque(&mut slot, Some(Some(json!({"id": "u1"}))));
        assert_eq!(slot, Some(json!({"id": "u1"})));

        merge_opaque(&mut slot, Some(Some(json!({"name": "Ana"}))));
        assert_eq!(slot, Some(json!({"id": "u1", "name": "Ana"})));

        merge_opaque(&mut slot, Some(None));
        assert_eq!(slot, None);
    }
}
