//! Whitelist projection
//!
//! Builds a `SafeRecord` for a `FieldSpec` from an untyped input. Only the
//! whitelisted keys (and their declared aliases) are ever read; every value
//! is coerced to its semantic type or replaced by that type's default.
//! Projection never fails: inputs that cannot be projected produce the
//! spec's fallback record.

use crate::config::{SanitizerConfig, DEFAULT_MAX_DEPTH};
use crate::detect::{is_framework_node, is_platform_handle, references};
use crate::field::{FieldDef, FieldSpec, SemanticType};
use crate::guard::Watchdog;
use crate::json::{number, MAX_SAFE_INTEGER};
use crate::types::SafeRecord;
use crate::value::{ObjectRef, Property, RawValue};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Last identifier handed out by [`next_fallback_id`]
static LAST_FALLBACK_ID: AtomicI64 = AtomicI64::new(0);

/// Issue a fresh identifier: the current Unix time in milliseconds, bumped
/// past the previously issued one so no two calls in a process collide
pub fn next_fallback_id() -> i64 {
    let now = Utc::now().timestamp_millis();
    let prev = LAST_FALLBACK_ID
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    now.max(prev + 1)
}

/// Current time as an ISO-8601 string with millisecond precision
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Project with default settings and no watchdog
pub fn project(raw: &RawValue, spec: &FieldSpec) -> SafeRecord {
    Projector::default().project(raw, spec)
}

/// The record produced when an input cannot be projected: every field at
/// its semantic-type default and a fresh identifier
pub fn fallback_record(spec: &FieldSpec) -> SafeRecord {
    let mut map = Map::new();
    for def in spec.fields() {
        map.insert(def.key.clone(), default_value(def));
    }
    SafeRecord::from_map(map)
}

fn default_value(def: &FieldDef) -> Value {
    match &def.semantic {
        SemanticType::Identifier => Value::from(next_fallback_id()),
        SemanticType::Text { default } => Value::String(truncate(default, def.max_len)),
        SemanticType::Enum { default, .. } => Value::String(default.clone()),
        SemanticType::Flag { default } => Value::Bool(*default),
        SemanticType::Timestamp => Value::String(now_iso()),
        SemanticType::NullableNumber | SemanticType::NullableText => Value::Null,
    }
}

/// Whitelist projector
///
/// Optionally reports contamination to a shared [`Watchdog`].
#[derive(Debug, Clone)]
pub struct Projector {
    max_depth: usize,
    watchdog: Option<Arc<Watchdog>>,
}

impl Default for Projector {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            watchdog: None,
        }
    }
}

impl Projector {
    pub fn new(config: &SanitizerConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            watchdog: None,
        }
    }

    /// Count contamination findings on the given watchdog
    pub fn with_watchdog(mut self, watchdog: Arc<Watchdog>) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    /// Produce a `SafeRecord` for `spec` from `raw`
    pub fn project(&self, raw: &RawValue, spec: &FieldSpec) -> SafeRecord {
        let obj = match self.admit_root(raw, spec) {
            Some(obj) => obj,
            None => return fallback_record(spec),
        };

        let record = match self.project_fields(&obj, spec) {
            Some(record) => record,
            None => {
                tracing::debug!(spec = spec.name(), "Identifier missing, using fallback record");
                return fallback_record(spec);
            }
        };

        if !round_trips(&record) {
            tracing::warn!(spec = spec.name(), "Projected record failed round-trip check");
            return fallback_record(spec);
        }
        record
    }

    fn admit_root(&self, raw: &RawValue, spec: &FieldSpec) -> Option<ObjectRef> {
        let obj = match raw {
            RawValue::Object(obj) => obj,
            other => {
                tracing::debug!(
                    spec = spec.name(),
                    kind = other.kind_name(),
                    "Input is not a record, using fallback record"
                );
                return None;
            }
        };
        if is_platform_handle(raw) {
            self.note_contamination(spec, None, "platform handle");
            return None;
        }
        if is_framework_node(raw) {
            self.note_contamination(spec, None, "framework node");
            return None;
        }
        Some(obj.clone())
    }

    fn project_fields(&self, obj: &ObjectRef, spec: &FieldSpec) -> Option<SafeRecord> {
        let mut map = Map::new();
        for def in spec.fields() {
            let source = self.read_field(obj, def, spec);
            if def.semantic == SemanticType::Identifier && source.is_none() {
                return None;
            }
            map.insert(def.key.clone(), coerce(def, source.as_ref(), obj));
        }
        Some(SafeRecord::from_map(map))
    }

    /// Primary key first, then the alias
    fn read_field(&self, obj: &ObjectRef, def: &FieldDef, spec: &FieldSpec) -> Option<RawValue> {
        self.read_key(obj, &def.key, spec).or_else(|| {
            def.alias
                .as_deref()
                .and_then(|alias| self.read_key(obj, alias, spec))
        })
    }

    /// A readable, non-null, uncontaminated source value
    fn read_key(&self, obj: &ObjectRef, key: &str, spec: &FieldSpec) -> Option<RawValue> {
        match obj.get(key)? {
            Property::Unreadable(reason) => {
                self.note_contamination(spec, Some(key), &reason);
                None
            }
            Property::Value(v) if v.is_nullish() => None,
            Property::Value(v) => {
                if v.is_container() {
                    if is_platform_handle(&v) {
                        self.note_contamination(spec, Some(key), "platform handle");
                        return None;
                    }
                    if references(&v, obj.id(), self.max_depth) {
                        self.note_contamination(spec, Some(key), "cyclic reference to input");
                        return None;
                    }
                }
                Some(v)
            }
        }
    }

    fn note_contamination(&self, spec: &FieldSpec, key: Option<&str>, reason: &str) {
        tracing::warn!(
            spec = spec.name(),
            key = key.unwrap_or("<root>"),
            reason,
            "Dropped contaminated input"
        );
        if let Some(watchdog) = &self.watchdog {
            watchdog.record_contamination();
        }
    }
}

fn coerce(def: &FieldDef, source: Option<&RawValue>, obj: &ObjectRef) -> Value {
    match &def.semantic {
        SemanticType::Identifier => source
            .and_then(as_identifier)
            .map(Value::from)
            .unwrap_or_else(|| Value::from(next_fallback_id())),
        SemanticType::Text { default } => source
            .and_then(|v| as_text(v, def))
            .map(Value::String)
            .unwrap_or_else(|| Value::String(truncate(default, def.max_len))),
        SemanticType::NullableText => source
            .and_then(|v| as_text(v, def))
            .map_or(Value::Null, Value::String),
        SemanticType::Enum { values, default } => {
            let chosen = match (source, &def.infer) {
                (Some(v), _) => v
                    .as_str()
                    .filter(|s| values.iter().any(|allowed| allowed == s))
                    .unwrap_or(default.as_str()),
                (None, Some(infer)) if is_present(obj, &infer.key) => infer.present.as_str(),
                (None, Some(infer)) => infer.absent.as_str(),
                (None, None) => default.as_str(),
            };
            Value::String(chosen.to_string())
        }
        SemanticType::Flag { default } => {
            Value::Bool(source.and_then(as_flag).unwrap_or(*default))
        }
        SemanticType::Timestamp => {
            Value::String(source.and_then(as_timestamp).unwrap_or_else(now_iso))
        }
        SemanticType::NullableNumber => source
            .and_then(as_number)
            .and_then(number)
            .map_or(Value::Null, Value::Number),
    }
}

fn is_present(obj: &ObjectRef, key: &str) -> bool {
    matches!(obj.get(key), Some(Property::Value(v)) if !v.is_nullish())
}

fn integral(n: f64) -> Option<i64> {
    (n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER).then(|| n as i64)
}

fn as_identifier(value: &RawValue) -> Option<i64> {
    match value {
        RawValue::Number(n) => integral(*n),
        RawValue::Text(s) => s
            .parse::<i64>()
            .ok()
            .filter(|n| (*n as f64).abs() <= MAX_SAFE_INTEGER)
            .or_else(|| s.parse::<f64>().ok().and_then(integral)),
        _ => None,
    }
}

fn as_number(value: &RawValue) -> Option<f64> {
    match value {
        RawValue::Number(n) => Some(*n),
        RawValue::Text(s) => s.parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn as_text(value: &RawValue, def: &FieldDef) -> Option<String> {
    match value {
        RawValue::Text(s) => Some(truncate(s, def.max_len)),
        RawValue::Number(n) if def.stringify_scalars && n.is_finite() => {
            Some(truncate(&render_number(*n), def.max_len))
        }
        RawValue::Bool(b) if def.stringify_scalars => Some(b.to_string()),
        _ => None,
    }
}

fn render_number(n: f64) -> String {
    match integral(n) {
        Some(i) => i.to_string(),
        None => n.to_string(),
    }
}

fn as_flag(value: &RawValue) -> Option<bool> {
    match value {
        RawValue::Bool(b) => Some(*b),
        RawValue::Text(s) if s.eq_ignore_ascii_case("true") => Some(true),
        RawValue::Text(s) if s.eq_ignore_ascii_case("false") => Some(false),
        RawValue::Number(n) if !n.is_nan() => Some(*n != 0.0),
        _ => None,
    }
}

fn as_timestamp(value: &RawValue) -> Option<String> {
    match value {
        RawValue::Text(s) => DateTime::parse_from_rfc3339(s).ok().map(|_| s.clone()),
        RawValue::Date(d) => Some(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
        _ => None,
    }
}

fn truncate(s: &str, max_len: Option<usize>) -> String {
    match max_len.and_then(|n| s.char_indices().nth(n)) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Serialize, parse back, and compare
fn round_trips(record: &SafeRecord) -> bool {
    serde_json::to_string(record)
        .ok()
        .and_then(|text| serde_json::from_str::<Value>(&text).ok())
        .map_or(false, |parsed| parsed == record.to_value())
}
