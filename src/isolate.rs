//! Cycle-safe generic deep copy
//!
//! `isolate` rebuilds a value from plain records and sequences only. Each
//! object or array visited during one call is remembered; a second visit
//! yields the circular marker instead of recursing, so cycles are broken
//! deterministically before any serializer sees them. The copy shares no
//! identity with its input.

use crate::config::{SanitizerConfig, DEFAULT_MAX_DEPTH};
use crate::detect::{is_framework_key, is_platform_handle};
use crate::guard::Watchdog;
use crate::value::{ArrayRef, ObjectRef, Property, RawValue};
use std::collections::HashSet;
use std::sync::Arc;

/// Keys kept by [`strip_to_safe_keys`]
pub const SAFE_KEYS: &[&str] = &[
    "id",
    "title",
    "name",
    "type",
    "media_type",
    "poster_path",
    "poster_url",
    "release_date",
    "first_air_date",
    "vote_average",
    "overview",
    "watched",
    "added_at",
];

const CIRCULAR_MARKER: &str = "[Circular Reference]";

/// Isolate with default settings and no watchdog
pub fn isolate(value: &RawValue) -> RawValue {
    Isolator::default().isolate(value)
}

/// Cycle-safe deep copier
#[derive(Debug, Clone)]
pub struct Isolator {
    max_depth: usize,
    marker: String,
    watchdog: Option<Arc<Watchdog>>,
}

impl Default for Isolator {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            marker: CIRCULAR_MARKER.to_string(),
            watchdog: None,
        }
    }
}

/// What happens to a value that cannot be copied
enum Slot {
    Keep(RawValue),
    Skip,
}

impl Isolator {
    pub fn new(config: &SanitizerConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            marker: config.circular_marker.clone(),
            watchdog: None,
        }
    }

    /// Count skipped contamination on the given watchdog
    pub fn with_watchdog(mut self, watchdog: Arc<Watchdog>) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    /// Copy `value`, keeping only inert data.
    ///
    /// A top-level value that cannot be copied at all becomes `Undefined`.
    pub fn isolate(&self, value: &RawValue) -> RawValue {
        let mut visited = HashSet::new();
        match self.copy(value, &mut visited, 0) {
            Slot::Keep(v) => v,
            Slot::Skip => RawValue::Undefined,
        }
    }

    fn copy(&self, value: &RawValue, visited: &mut HashSet<usize>, depth: usize) -> Slot {
        match value {
            RawValue::Undefined
            | RawValue::Null
            | RawValue::Bool(_)
            | RawValue::Number(_)
            | RawValue::Text(_) => Slot::Keep(value.clone()),
            RawValue::Date(d) => Slot::Keep(RawValue::Date(*d)),
            RawValue::Callable(_) => Slot::Skip,
            RawValue::Array(arr) => {
                if !visited.insert(arr.id()) {
                    return Slot::Keep(RawValue::text(self.marker.as_str()));
                }
                if depth >= self.max_depth {
                    return self.too_deep();
                }
                let copy = ArrayRef::new();
                for item in arr.items() {
                    // Positions are preserved; uncopyable elements become null
                    match self.copy(&item, visited, depth + 1) {
                        Slot::Keep(v) => copy.push(v),
                        Slot::Skip => copy.push(RawValue::Null),
                    }
                }
                Slot::Keep(RawValue::Array(copy))
            }
            RawValue::Object(obj) => {
                if !obj.is_plain() || is_platform_handle(value) {
                    self.note_skip("non-plain object");
                    return Slot::Skip;
                }
                if !visited.insert(obj.id()) {
                    return Slot::Keep(RawValue::text(self.marker.as_str()));
                }
                if depth >= self.max_depth {
                    return self.too_deep();
                }
                Slot::Keep(RawValue::Object(self.copy_record(obj, visited, depth)))
            }
        }
    }

    fn copy_record(&self, obj: &ObjectRef, visited: &mut HashSet<usize>, depth: usize) -> ObjectRef {
        let copy = ObjectRef::plain();
        for (key, prop) in obj.entries() {
            if is_framework_key(&key) {
                self.note_skip("framework key");
                continue;
            }
            let value = match prop {
                Property::Value(v) => v,
                Property::Unreadable(reason) => {
                    tracing::debug!(key = %key, reason = %reason, "Skipping unreadable property");
                    self.note_skip("unreadable property");
                    continue;
                }
            };
            if let Slot::Keep(v) = self.copy(&value, visited, depth + 1) {
                copy.set(key, v);
            }
        }
        copy
    }

    fn too_deep(&self) -> Slot {
        tracing::warn!(limit = self.max_depth, "Nesting bound reached, truncating copy");
        Slot::Keep(RawValue::Null)
    }

    fn note_skip(&self, reason: &str) {
        tracing::debug!(reason, "Skipped value during isolation");
        if let Some(watchdog) = &self.watchdog {
            watchdog.record_contamination();
        }
    }
}

/// Emergency isolation: keep only [`SAFE_KEYS`] holding primitive values.
/// Arrays are mapped element-wise; revisited containers become null.
pub fn strip_to_safe_keys(value: &RawValue) -> RawValue {
    let mut visited = HashSet::new();
    strip(value, &mut visited)
}

fn strip(value: &RawValue, visited: &mut HashSet<usize>) -> RawValue {
    match value {
        RawValue::Array(arr) => {
            if !visited.insert(arr.id()) {
                return RawValue::Null;
            }
            RawValue::Array(ArrayRef::from_vec(
                arr.items().iter().map(|item| strip(item, visited)).collect(),
            ))
        }
        RawValue::Object(obj) => {
            let copy = ObjectRef::plain();
            for key in SAFE_KEYS {
                if let Some(Property::Value(v)) = obj.get(key) {
                    if matches!(
                        v,
                        RawValue::Null
                            | RawValue::Bool(_)
                            | RawValue::Number(_)
                            | RawValue::Text(_)
                    ) {
                        copy.set(*key, v);
                    }
                }
            }
            RawValue::Object(copy)
        }
        RawValue::Callable(_) => RawValue::Undefined,
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::to_json;
    use chrono::Utc;
    use serde_json::json;

    fn json_of(value: &RawValue) -> serde_json::Value {
        to_json(value, DEFAULT_MAX_DEPTH).unwrap()
    }

    #[test]
    fn test_primitives_pass_through() {
        assert!(matches!(isolate(&RawValue::Null), RawValue::Null));
        assert!(matches!(isolate(&RawValue::Undefined), RawValue::Undefined));
        assert!(matches!(isolate(&RawValue::text("s")), RawValue::Text(ref s) if s == "s"));
        assert!(matches!(isolate(&RawValue::Number(1.5)), RawValue::Number(n) if n == 1.5));
        assert!(matches!(isolate(&RawValue::Bool(true)), RawValue::Bool(true)));
    }

    #[test]
    fn test_date_copied_by_value() {
        let now = Utc::now();
        assert!(matches!(isolate(&RawValue::Date(now)), RawValue::Date(d) if d == now));
    }

    #[test]
    fn test_array_is_new_identity() {
        let arr = ArrayRef::from_vec(vec![RawValue::Number(1.0), RawValue::text("x")]);
        let copy = isolate(&RawValue::Array(arr.clone()));
        let copied = copy.as_array().unwrap();
        assert!(!copied.ptr_eq(&arr));
        assert_eq!(json_of(&copy), json!([1, "x"]));
    }

    #[test]
    fn test_filters_framework_keys() {
        let obj = ObjectRef::plain()
            .with("name", "test")
            .with("value", 123i64)
            .with("__reactFiber$abc", "should be removed")
            .with("_reactInternalFiber", "should be removed")
            .with("ref", "should be removed")
            .with("key", "should be removed")
            .with("_owner", "should be removed")
            .with("_store", "should be removed");

        let copy = isolate(&RawValue::Object(obj));
        assert_eq!(json_of(&copy), json!({"name": "test", "value": 123}));
    }

    #[test]
    fn test_nested_objects() {
        let value = RawValue::from(json!({
            "name": "test",
            "nested": {"value": 456, "__reactFiber$abc": "x"},
            "array": [1, {"inner": "value"}]
        }));
        assert_eq!(
            json_of(&isolate(&value)),
            json!({"name": "test", "nested": {"value": 456}, "array": [1, {"inner": "value"}]})
        );
    }

    #[test]
    fn test_self_reference_replaced_by_marker() {
        let obj = ObjectRef::plain().with("name", "loop");
        obj.set("self", obj.clone());

        let copy = isolate(&RawValue::Object(obj.clone()));
        assert_eq!(
            json_of(&copy),
            json!({"name": "loop", "self": "[Circular Reference]"})
        );
        assert!(!copy.as_object().unwrap().ptr_eq(&obj));
    }

    #[test]
    fn test_custom_marker() {
        let config = SanitizerConfig {
            circular_marker: "<cycle>".to_string(),
            ..Default::default()
        };
        let arr = ArrayRef::new();
        arr.push(arr.clone());
        let copy = Isolator::new(&config).isolate(&RawValue::Array(arr));
        assert_eq!(json_of(&copy), json!(["<cycle>"]));
    }

    #[test]
    fn test_skips_callables_and_handles() {
        let obj = ObjectRef::plain()
            .with("title", "Dune")
            .with("onClick", RawValue::callable("onClick"))
            .with("target", ObjectRef::element("button"))
            .with("when", ObjectRef::instance("Moment"));

        let watchdog = Arc::new(Watchdog::new());
        let copy = Isolator::default()
            .with_watchdog(watchdog.clone())
            .isolate(&RawValue::Object(obj));
        assert_eq!(json_of(&copy), json!({"title": "Dune"}));
        assert_eq!(watchdog.contamination_count(), 2);
    }

    #[test]
    fn test_array_positions_preserved() {
        let arr = ArrayRef::from_vec(vec![
            RawValue::Number(1.0),
            RawValue::callable("f"),
            RawValue::Object(ObjectRef::element("div")),
            RawValue::Number(4.0),
        ]);
        assert_eq!(
            json_of(&isolate(&RawValue::Array(arr))),
            json!([1, null, null, 4])
        );
    }

    #[test]
    fn test_top_level_handle_becomes_undefined() {
        let el = RawValue::Object(ObjectRef::element("div"));
        assert!(matches!(isolate(&el), RawValue::Undefined));
    }

    #[test]
    fn test_unreadable_property_dropped() {
        let obj = ObjectRef::plain().with("ok", 1i64);
        obj.set_unreadable("bad", "getter threw");
        assert_eq!(json_of(&isolate(&RawValue::Object(obj))), json!({"ok": 1}));
    }

    #[test]
    fn test_depth_bound() {
        let config = SanitizerConfig {
            max_depth: 2,
            ..Default::default()
        };
        let value = RawValue::from(json!({"a": {"b": {"c": 1}}}));
        let copy = Isolator::new(&config).isolate(&value);
        assert_eq!(json_of(&copy), json!({"a": {"b": null}}));
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let root = ObjectRef::plain();
        let mut cursor = root.clone();
        for _ in 0..1_000 {
            let next = ObjectRef::plain();
            cursor.set("next", next.clone());
            cursor = next;
        }
        let copy = isolate(&RawValue::Object(root));
        assert!(copy.as_object().is_some());
    }

    #[test]
    fn test_strip_to_safe_keys() {
        let value = RawValue::from(json!({
            "id": 1,
            "title": "Movie",
            "poster_path": {"nested": true},
            "character": "Paul",
            "vote_average": 7.2
        }));
        assert_eq!(
            json_of(&strip_to_safe_keys(&value)),
            json!({"id": 1, "title": "Movie", "vote_average": 7.2})
        );
    }

    #[test]
    fn test_strip_arrays_and_primitives() {
        let value = RawValue::from(json!([{"id": 1, "junk": 2}, "text", 3]));
        assert_eq!(
            json_of(&strip_to_safe_keys(&value)),
            json!([{"id": 1}, "text", 3])
        );
        assert!(matches!(strip_to_safe_keys(&RawValue::Null), RawValue::Null));
    }

    #[test]
    fn test_strip_cyclic_array() {
        let arr = ArrayRef::new();
        arr.push(arr.clone());
        assert_eq!(
            json_of(&strip_to_safe_keys(&RawValue::Array(arr))),
            json!([null])
        );
    }
}
