//! Structural JSON rendering of raw values
//!
//! `to_json` follows the usual JSON stringification rules: `undefined` and
//! callables are omitted from records and become `null` in sequences,
//! non-finite numbers become `null`, dates become ISO-8601 strings. Unlike
//! the copier it does not repair anything; a cycle, an unreadable property,
//! or excessive nesting is an error.

use crate::config::{SanitizerConfig, DEFAULT_MAX_DEPTH};
use crate::error::{Result, SanitizeError};
use crate::isolate::Isolator;
use crate::value::{ArrayRef, ObjectRef, Property, RawValue};
use chrono::SecondsFormat;
use serde_json::{Map, Number, Value};

/// Largest integer an IEEE double holds exactly
pub(crate) const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Render a raw value as JSON.
///
/// A top-level `undefined` or callable renders as `null`.
pub fn to_json(value: &RawValue, max_depth: usize) -> Result<Value> {
    let mut walker = Walker {
        ancestors: Vec::new(),
        max_depth,
    };
    Ok(walker.render(value, "$")?.unwrap_or(Value::Null))
}

/// Whether `value` serializes. A cycle yields `Ok(false)`; any other
/// failure is returned as an error.
pub fn validate_serializable(value: &RawValue) -> Result<bool> {
    match to_json(value, DEFAULT_MAX_DEPTH) {
        Ok(_) => Ok(true),
        Err(e) if e.is_cyclic() => {
            tracing::warn!(error = %e, "Value is not serializable");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Isolate, then serialize. Never fails on cycles, since the copy has none.
///
/// With `pretty` the output is indented by two spaces per level.
pub fn safe_stringify(
    value: &RawValue,
    config: &SanitizerConfig,
    pretty: bool,
) -> Result<String> {
    let isolated = Isolator::new(config).isolate(value);
    let json = to_json(&isolated, config.max_depth)?;
    let text = if pretty {
        serde_json::to_string_pretty(&json)?
    } else {
        serde_json::to_string(&json)?
    };
    Ok(text)
}

/// Parse JSON text, logging and swallowing malformed input
pub fn safe_parse(text: &str) -> Option<Value> {
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse JSON");
            None
        }
    }
}

/// Parse JSON text, substituting `fallback` for malformed input
pub fn parse_or(text: &str, fallback: Value) -> Value {
    safe_parse(text).unwrap_or(fallback)
}

/// JSON number for a finite double; integral values render without a fraction
pub(crate) fn number(n: f64) -> Option<Number> {
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Some(Number::from(n as i64));
    }
    Number::from_f64(n)
}

struct Walker {
    /// Identities of the containers on the current path
    ancestors: Vec<usize>,
    max_depth: usize,
}

impl Walker {
    /// `None` means "omit" (undefined or callable)
    fn render(&mut self, value: &RawValue, path: &str) -> Result<Option<Value>> {
        let rendered = match value {
            RawValue::Undefined | RawValue::Callable(_) => return Ok(None),
            RawValue::Null => Value::Null,
            RawValue::Bool(b) => Value::Bool(*b),
            RawValue::Number(n) => number(*n).map_or(Value::Null, Value::Number),
            RawValue::Text(s) => Value::String(s.clone()),
            RawValue::Date(d) => Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            RawValue::Array(arr) => {
                self.enter(arr.id(), path)?;
                let out = self.render_array(arr, path);
                self.ancestors.pop();
                out?
            }
            RawValue::Object(obj) => {
                self.enter(obj.id(), path)?;
                let out = self.render_object(obj, path);
                self.ancestors.pop();
                out?
            }
        };
        Ok(Some(rendered))
    }

    fn enter(&mut self, id: usize, path: &str) -> Result<()> {
        if self.ancestors.contains(&id) {
            return Err(SanitizeError::Cyclic {
                path: path.to_string(),
            });
        }
        if self.ancestors.len() >= self.max_depth {
            return Err(SanitizeError::DepthExceeded {
                limit: self.max_depth,
            });
        }
        self.ancestors.push(id);
        Ok(())
    }

    fn render_array(&mut self, arr: &ArrayRef, path: &str) -> Result<Value> {
        let mut out = Vec::with_capacity(arr.len());
        for (i, item) in arr.items().iter().enumerate() {
            let child = format!("{}[{}]", path, i);
            out.push(self.render(item, &child)?.unwrap_or(Value::Null));
        }
        Ok(Value::Array(out))
    }

    fn render_object(&mut self, obj: &ObjectRef, path: &str) -> Result<Value> {
        let mut out = Map::new();
        for (key, prop) in obj.entries() {
            let value = match prop {
                Property::Value(v) => v,
                Property::Unreadable(reason) => {
                    return Err(SanitizeError::PropertyAccess { key, reason });
                }
            };
            let child = format!("{}.{}", path, key);
            if let Some(rendered) = self.render(&value, &child)? {
                out.insert(key, rendered);
            }
        }
        Ok(Value::Object(out))
    }
}
