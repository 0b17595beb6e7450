//! Contamination detection
//!
//! Classifies values that must never be kept: live element handles,
//! retained-mode UI runtime bookkeeping, reference cycles, and objects
//! with unreadable properties. The marker lists below are a blocklist
//! tied to one UI ecosystem's conventions; keep them here and nowhere else.
//!
//! Detectors never fail. They only read property names and kinds, and an
//! unreadable property is reported, not raised.

use crate::value::{ObjectKind, ObjectRef, Property, RawValue};
use std::collections::HashSet;

/// Property names that only live element handles expose
const HANDLE_MARKER_KEYS: &[&str] = &[
    "nodeType",
    "tagName",
    "classList",
    "innerHTML",
    "outerHTML",
    "style",
    "getAttribute",
    "addEventListener",
];

/// Constructor name fragments of live platform objects
const HANDLE_CLASS_FRAGMENTS: &[&str] = &["HTML", "Element", "Node", "Window", "Document", "EventTarget"];

/// Constructor name fragments of UI runtime bookkeeping objects
const RUNTIME_CLASS_FRAGMENTS: &[&str] = &["Fiber", "React"];

/// Result of classifying a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContaminationMarker {
    Clean,
    Cyclic,
    PlatformHandle,
    FrameworkInternal,
    UnreadableProperty,
}

impl ContaminationMarker {
    pub fn is_clean(&self) -> bool {
        *self == ContaminationMarker::Clean
    }
}

/// Which runtime naming convention a key matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameworkKeyKind {
    /// `__`-prefixed or `_react`-prefixed internal state (`__reactFiber$abc`)
    InternalState,
    /// `_owner`
    OwnerBackref,
    /// `_store`
    StoreBackref,
    /// `key`, `ref`
    NodeIdentity,
    /// `child`, `sibling`, `return`, `stateNode`
    TreeLinkage,
}

/// Classify a property name against the runtime bookkeeping conventions
pub fn framework_key_kind(key: &str) -> Option<FrameworkKeyKind> {
    if key.starts_with("__") || key.starts_with("_react") {
        return Some(FrameworkKeyKind::InternalState);
    }
    match key {
        "_owner" => Some(FrameworkKeyKind::OwnerBackref),
        "_store" => Some(FrameworkKeyKind::StoreBackref),
        "key" | "ref" => Some(FrameworkKeyKind::NodeIdentity),
        "child" | "sibling" | "return" | "stateNode" => Some(FrameworkKeyKind::TreeLinkage),
        _ => None,
    }
}

pub fn is_framework_key(key: &str) -> bool {
    framework_key_kind(key).is_some()
}

/// True iff the value represents a live on-screen element (or a UI event
/// still attached to one) rather than data
pub fn is_platform_handle(value: &RawValue) -> bool {
    match value {
        RawValue::Object(obj) => object_is_platform_handle(obj),
        _ => false,
    }
}

fn object_is_platform_handle(obj: &ObjectRef) -> bool {
    if let ObjectKind::Instance(class) = obj.kind() {
        if HANDLE_CLASS_FRAGMENTS.iter().any(|f| class.contains(f)) {
            return true;
        }
    }
    let keys = obj.keys();
    if keys.iter().any(|k| HANDLE_MARKER_KEYS.contains(&k.as_str())) {
        return true;
    }
    // Synthetic UI events keep their native event and target alive
    keys.iter().any(|k| k == "nativeEvent") && keys.iter().any(|k| k == "currentTarget")
}

/// True iff any own key follows a runtime bookkeeping convention, or the
/// object is an instance of a runtime bookkeeping class
pub fn is_framework_internal(value: &RawValue) -> bool {
    match value {
        RawValue::Object(obj) => {
            runtime_class(obj) || obj.keys().iter().any(|k| is_framework_key(k))
        }
        _ => false,
    }
}

/// Narrower check used at the projection root: the object *is* a runtime
/// node (tree linkage or owner/store backrefs), rather than a data record
/// that merely carries an internal-state expando or a `key` field
pub fn is_framework_node(value: &RawValue) -> bool {
    match value {
        RawValue::Object(obj) => {
            runtime_class(obj)
                || obj.keys().iter().any(|k| {
                    matches!(
                        framework_key_kind(k),
                        Some(FrameworkKeyKind::OwnerBackref)
                            | Some(FrameworkKeyKind::StoreBackref)
                            | Some(FrameworkKeyKind::TreeLinkage)
                    )
                })
        }
        _ => false,
    }
}

fn runtime_class(obj: &ObjectRef) -> bool {
    match obj.kind() {
        ObjectKind::Instance(class) => RUNTIME_CLASS_FRAGMENTS.iter().any(|f| class.contains(f)),
        ObjectKind::Plain => false,
    }
}

/// True iff any own property of the object cannot be read
pub fn has_unreadable_property(value: &RawValue) -> bool {
    match value {
        RawValue::Object(obj) => obj
            .entries()
            .iter()
            .any(|(_, p)| matches!(p, Property::Unreadable(_))),
        _ => false,
    }
}

/// True iff a reference cycle is reachable from `value` within `max_depth`
/// levels. Shared (diamond) references are not cycles.
///
/// Each container is explored at most once.
pub fn contains_cycle(value: &RawValue, max_depth: usize) -> bool {
    let mut walk = CycleWalk {
        on_stack: HashSet::new(),
        done: HashSet::new(),
        max_depth,
    };
    walk.visit(value, 0)
}

struct CycleWalk {
    /// Containers on the current path; reaching one again is a cycle
    on_stack: HashSet<usize>,
    /// Containers whose reachable subgraph has been explored
    done: HashSet<usize>,
    max_depth: usize,
}

impl CycleWalk {
    fn visit(&mut self, value: &RawValue, depth: usize) -> bool {
        let id = match value.identity() {
            Some(id) => id,
            None => return false,
        };
        if self.on_stack.contains(&id) {
            return true;
        }
        if self.done.contains(&id) || depth >= self.max_depth {
            return false;
        }
        self.on_stack.insert(id);
        let found = children(value)
            .iter()
            .any(|child| self.visit(child, depth + 1));
        self.on_stack.remove(&id);
        self.done.insert(id);
        found
    }
}

/// True iff `value` can reach the container with identity `target`
pub fn references(value: &RawValue, target: usize, max_depth: usize) -> bool {
    let mut visited = HashSet::new();
    reference_walk(value, target, &mut visited, 0, max_depth)
}

fn reference_walk(
    value: &RawValue,
    target: usize,
    visited: &mut HashSet<usize>,
    depth: usize,
    max_depth: usize,
) -> bool {
    let id = match value.identity() {
        Some(id) => id,
        None => return false,
    };
    if id == target {
        return true;
    }
    if depth >= max_depth || !visited.insert(id) {
        return false;
    }
    children(value)
        .iter()
        .any(|child| reference_walk(child, target, visited, depth + 1, max_depth))
}

fn children(value: &RawValue) -> Vec<RawValue> {
    match value {
        RawValue::Array(arr) => arr.items(),
        RawValue::Object(obj) => obj
            .entries()
            .into_iter()
            .filter_map(|(_, p)| match p {
                Property::Value(v) => Some(v),
                Property::Unreadable(_) => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Classify a value, most severe finding first
pub fn classify(value: &RawValue, max_depth: usize) -> ContaminationMarker {
    if is_platform_handle(value) {
        ContaminationMarker::PlatformHandle
    } else if is_framework_internal(value) {
        ContaminationMarker::FrameworkInternal
    } else if has_unreadable_property(value) {
        ContaminationMarker::UnreadableProperty
    } else if contains_cycle(value, max_depth) {
        ContaminationMarker::Cyclic
    } else {
        ContaminationMarker::Clean
    }
}
