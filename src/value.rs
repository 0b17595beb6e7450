//! Untyped input values of unknown provenance
//!
//! `RawValue` models what an external boundary can hand us: plain records
//! and sequences, live element handles, runtime bookkeeping objects,
//! callables, and properties whose getters fail. Objects and arrays are
//! shared via `Rc<RefCell<..>>` so they carry identity, which makes
//! reference cycles representable (`obj.set("self", obj.clone())`).
//!
//! Cyclic graphs built this way are never freed by reference counting.
//! That is acceptable for short-lived boundary payloads; long-lived state
//! should be projected into a `SafeRecord` instead.

use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A dynamically-typed input value
#[derive(Debug, Clone)]
pub enum RawValue {
    /// Absent value (a missing property or an explicit `undefined`)
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    /// Date-like value, copied by instant
    Date(DateTime<Utc>),
    /// A callable; carries its name for diagnostics only
    Callable(String),
    Array(ArrayRef),
    Object(ObjectRef),
}

impl RawValue {
    /// Create a text value
    pub fn text(s: impl Into<String>) -> Self {
        RawValue::Text(s.into())
    }

    /// Create a callable value
    pub fn callable(name: impl Into<String>) -> Self {
        RawValue::Callable(name.into())
    }

    /// `null` or `undefined`
    pub fn is_nullish(&self) -> bool {
        matches!(self, RawValue::Null | RawValue::Undefined)
    }

    /// Object or array
    pub fn is_container(&self) -> bool {
        matches!(self, RawValue::Object(_) | RawValue::Array(_))
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            RawValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            RawValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Identity of the underlying container, if any
    pub fn identity(&self) -> Option<usize> {
        match self {
            RawValue::Object(obj) => Some(obj.id()),
            RawValue::Array(arr) => Some(arr.id()),
            _ => None,
        }
    }

    /// Short kind name used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            RawValue::Undefined => "undefined",
            RawValue::Null => "null",
            RawValue::Bool(_) => "boolean",
            RawValue::Number(_) => "number",
            RawValue::Text(_) => "string",
            RawValue::Date(_) => "date",
            RawValue::Callable(_) => "function",
            RawValue::Array(_) => "array",
            RawValue::Object(_) => "object",
        }
    }
}

/// Constructor identity of an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectKind {
    /// A plain key-value record
    Plain,
    /// An instance of a named class (runtime objects, element handles, ...)
    Instance(String),
}

/// One own property of an object
#[derive(Debug, Clone)]
pub enum Property {
    /// A readable value
    Value(RawValue),
    /// Reading the property fails with the given reason
    Unreadable(String),
}

#[derive(Debug)]
struct RawObject {
    kind: ObjectKind,
    props: Vec<(String, Property)>,
}

/// Shared handle to an object with identity
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<RawObject>>);

impl ObjectRef {
    /// Create an empty object of the given kind
    pub fn new(kind: ObjectKind) -> Self {
        Self(Rc::new(RefCell::new(RawObject {
            kind,
            props: Vec::new(),
        })))
    }

    /// Create an empty plain record
    pub fn plain() -> Self {
        Self::new(ObjectKind::Plain)
    }

    /// Create an empty class instance
    pub fn instance(class: impl Into<String>) -> Self {
        Self::new(ObjectKind::Instance(class.into()))
    }

    /// Build an object shaped like a live DOM element
    pub fn element(tag: &str) -> Self {
        let style = ObjectRef::instance("CSSStyleDeclaration").with("display", RawValue::text(""));
        let class_list = ObjectRef::instance("DOMTokenList");
        ObjectRef::instance("HTMLElement")
            .with("tagName", RawValue::text(tag.to_ascii_uppercase()))
            .with("nodeType", RawValue::Number(1.0))
            .with("style", RawValue::Object(style))
            .with("classList", RawValue::Object(class_list))
            .with("getAttribute", RawValue::callable("getAttribute"))
            .with("addEventListener", RawValue::callable("addEventListener"))
    }

    /// Set a property, replacing an existing one in place
    pub fn set(&self, key: impl Into<String>, value: impl Into<RawValue>) {
        self.set_property(key.into(), Property::Value(value.into()));
    }

    /// Install a property whose getter fails
    pub fn set_unreadable(&self, key: impl Into<String>, reason: impl Into<String>) {
        self.set_property(key.into(), Property::Unreadable(reason.into()));
    }

    fn set_property(&self, key: String, prop: Property) {
        let mut inner = self.0.borrow_mut();
        match inner.props.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = prop,
            None => inner.props.push((key, prop)),
        }
    }

    /// Builder form of [`ObjectRef::set`]
    pub fn with(self, key: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Remove a property, returning whether it existed
    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.0.borrow_mut();
        let before = inner.props.len();
        inner.props.retain(|(k, _)| k != key);
        inner.props.len() != before
    }

    /// Look up an own property
    pub fn get(&self, key: &str) -> Option<Property> {
        self.0
            .borrow()
            .props
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, p)| p.clone())
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.borrow().props.iter().any(|(k, _)| k == key)
    }

    /// Own property names in insertion order (no getter is invoked)
    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().props.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Snapshot of own properties in insertion order
    pub fn entries(&self) -> Vec<(String, Property)> {
        self.0.borrow().props.clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ObjectKind {
        self.0.borrow().kind.clone()
    }

    pub fn is_plain(&self) -> bool {
        self.0.borrow().kind == ObjectKind::Plain
    }

    /// Stable identity for the lifetime of the object
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ObjectRef {
    // Never recurse: the graph may be cyclic.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        let keys: Vec<&str> = inner.props.iter().map(|(k, _)| k.as_str()).collect();
        write!(f, "Object#{:x}({:?}, keys={:?})", self.id(), inner.kind, keys)
    }
}

/// Shared handle to an array with identity
#[derive(Clone)]
pub struct ArrayRef(Rc<RefCell<Vec<RawValue>>>);

impl ArrayRef {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(Vec::new())))
    }

    pub fn from_vec(items: Vec<RawValue>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }

    pub fn push(&self, value: impl Into<RawValue>) {
        self.0.borrow_mut().push(value.into());
    }

    /// Snapshot of the elements
    pub fn items(&self) -> Vec<RawValue> {
        self.0.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for ArrayRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array#{:x}(len={})", self.id(), self.len())
    }
}

impl From<ObjectRef> for RawValue {
    fn from(obj: ObjectRef) -> Self {
        RawValue::Object(obj)
    }
}

impl From<ArrayRef> for RawValue {
    fn from(arr: ArrayRef) -> Self {
        RawValue::Array(arr)
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

impl From<i64> for RawValue {
    fn from(n: i64) -> Self {
        RawValue::Number(n as f64)
    }
}

impl From<bool> for RawValue {
    fn from(b: bool) -> Self {
        RawValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for RawValue {
    fn from(d: DateTime<Utc>) -> Self {
        RawValue::Date(d)
    }
}

impl From<serde_json::Value> for RawValue {
    fn from(value: serde_json::Value) -> Self {
        RawValue::from(&value)
    }
}

impl From<&serde_json::Value> for RawValue {
    fn from(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => RawValue::Null,
            Value::Bool(b) => RawValue::Bool(*b),
            Value::Number(n) => RawValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => RawValue::Text(s.clone()),
            Value::Array(items) => {
                RawValue::Array(ArrayRef::from_vec(items.iter().map(RawValue::from).collect()))
            }
            Value::Object(map) => {
                let obj = ObjectRef::plain();
                for (k, v) in map {
                    obj.set(k.clone(), RawValue::from(v));
                }
                RawValue::Object(obj)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_in_place() {
        let obj = ObjectRef::plain().with("a", 1i64).with("b", 2i64);
        obj.set("a", "x");
        assert_eq!(obj.keys(), vec!["a", "b"]);
        assert!(matches!(obj.get("a"), Some(Property::Value(RawValue::Text(ref s))) if s == "x"));
    }

    #[test]
    fn test_self_reference_is_representable() {
        let obj = ObjectRef::plain().with("name", "loop");
        obj.set("self", obj.clone());

        match obj.get("self") {
            Some(Property::Value(RawValue::Object(inner))) => assert!(inner.ptr_eq(&obj)),
            other => panic!("unexpected property: {:?}", other),
        }
        // Debug must not recurse into the cycle
        let rendered = format!("{:?}", obj);
        assert!(rendered.contains("self"));
    }

    #[test]
    fn test_unreadable_property() {
        let obj = ObjectRef::plain();
        obj.set_unreadable("secret", "getter threw");
        assert!(obj.has("secret"));
        assert!(matches!(obj.get("secret"), Some(Property::Unreadable(_))));
    }

    #[test]
    fn test_remove() {
        let obj = ObjectRef::plain().with("a", true);
        assert!(obj.remove("a"));
        assert!(!obj.remove("a"));
        assert!(obj.is_empty());
    }

    #[test]
    fn test_distinct_identities() {
        let a = ObjectRef::plain();
        let b = ObjectRef::plain();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn test_element_shape() {
        let el = ObjectRef::element("div");
        assert_eq!(el.kind(), ObjectKind::Instance("HTMLElement".to_string()));
        assert!(el.has("tagName"));
        assert!(el.has("addEventListener"));
        assert!(!el.is_plain());
    }

    #[test]
    fn test_from_json() {
        let raw = RawValue::from(serde_json::json!({
            "id": 7,
            "tags": ["a", "b"],
            "nested": {"ok": true}
        }));
        let obj = raw.as_object().unwrap();
        assert!(obj.is_plain());
        assert_eq!(obj.keys(), vec!["id", "tags", "nested"]);
        match obj.get("tags") {
            Some(Property::Value(RawValue::Array(arr))) => assert_eq!(arr.len(), 2),
            other => panic!("unexpected property: {:?}", other),
        }
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(RawValue::Undefined.kind_name(), "undefined");
        assert_eq!(RawValue::callable("f").kind_name(), "function");
        assert_eq!(RawValue::Array(ArrayRef::new()).kind_name(), "array");
        assert_eq!(RawValue::Object(ObjectRef::plain()).kind_name(), "object");
    }
}
