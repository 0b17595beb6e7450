//! # a3s-sanitize
//!
//! Cycle-safe data isolation, whitelist projection, and guarded
//! serialization for the A3S ecosystem.
//!
//! ## Overview
//!
//! `a3s-sanitize` sits at the boundary where untyped, possibly-contaminated
//! values (UI event payloads, live element handles, runtime bookkeeping
//! objects, cyclic graphs) must become plain, serializable records before
//! they are stored or passed on.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_sanitize::{field, project, ObjectRef, RawValue};
//!
//! // An input carrying runtime internals and a self-reference
//! let raw = ObjectRef::plain()
//!     .with("id", 42i64)
//!     .with("title", "Dune")
//!     .with("__reactFiber$abc", ObjectRef::instance("FiberNode"));
//! raw.set("self", raw.clone());
//!
//! let record = project(&RawValue::Object(raw), &field::watchlist_entry());
//! assert_eq!(record.id(), Some(42));
//! assert_eq!(record.get_str("media_type"), Some("movie"));
//! assert!(!record.contains_key("self"));
//! assert!(serde_json::to_string(&record).is_ok());
//! ```
//!
//! ## Components
//!
//! - **detect**: contamination detector (platform handles, runtime internals)
//! - **project**: whitelist projector producing a `SafeRecord` per `FieldSpec`
//! - **isolate**: cycle-safe generic deep copy
//! - **guard**: `SerializationGuard` with the `Watchdog` circuit breaker
//! - **store**: `KeyValueStore` persistence boundary (memory and file backends)
//! - **watchlist**: persisted, projected watchlist built on the above

pub mod config;
pub mod detect;
pub mod error;
pub mod field;
pub mod guard;
pub mod isolate;
pub mod json;
pub mod project;
pub mod store;
pub mod types;
pub mod value;
pub mod watchlist;

// Re-export core types
pub use config::{SanitizerConfig, DEFAULT_MAX_DEPTH};
pub use detect::{
    classify, is_framework_internal, is_framework_node, is_platform_handle, ContaminationMarker,
    FrameworkKeyKind,
};
pub use error::{Result, SanitizeError};
pub use field::{FieldDef, FieldSpec, SemanticType};
pub use guard::{SerializationGuard, Watchdog};
pub use isolate::{isolate, strip_to_safe_keys, Isolator};
pub use json::{parse_or, safe_parse, safe_stringify, to_json, validate_serializable};
pub use project::{fallback_record, project, Projector};
pub use store::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use types::{MediaKind, SafeRecord, WatchlistEntry, WatchlistFilter, WatchlistStats};
pub use value::{ArrayRef, ObjectKind, ObjectRef, Property, RawValue};
pub use watchlist::Watchlist;
