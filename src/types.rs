//! Output types for projected data
//!
//! `SafeRecord` is the untyped, always-serializable projection result.
//! `WatchlistEntry` is its typed view for the watchlist shape. Wire names
//! are snake_case to stay compatible with previously persisted lists.

use crate::value::RawValue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The result of a successful projection
///
/// Holds exactly the keys of one `FieldSpec`, in declaration order, each
/// with a value of its declared semantic type. Being plain JSON, it cannot
/// contain callables, live handles, or cycles.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SafeRecord(Map<String, Value>);

impl SafeRecord {
    pub(crate) fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub(crate) fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The `id` field as an integer
    pub fn id(&self) -> Option<i64> {
        self.0.get("id").and_then(Value::as_i64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<&SafeRecord> for RawValue {
    fn from(record: &SafeRecord) -> Self {
        RawValue::from(&Value::Object(record.0.clone()))
    }
}

/// Kind of media in a watchlist entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Movie,
    Tv,
}

/// Typed view of a projected watchlist entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub id: i64,
    pub title: String,
    pub poster_path: Option<String>,
    pub poster_url: Option<String>,
    pub media_type: MediaKind,
    pub release_date: Option<String>,
    pub vote_average: Option<f64>,
    pub overview: Option<String>,
    pub watched: bool,
    /// ISO-8601 timestamp
    pub added_at: String,
}

impl TryFrom<&SafeRecord> for WatchlistEntry {
    type Error = serde_json::Error;

    fn try_from(record: &SafeRecord) -> std::result::Result<Self, Self::Error> {
        serde_json::from_value(record.to_value())
    }
}

/// Watchlist counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistStats {
    pub total: usize,
    pub watched: usize,
    pub unwatched: usize,
    pub movies: usize,
    pub tv_shows: usize,
}

/// Watchlist query; unset criteria match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watched: Option<bool>,

    /// Case-insensitive substring of title or overview
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl WatchlistFilter {
    pub fn matches(&self, entry: &WatchlistEntry) -> bool {
        if let Some(kind) = self.media_type {
            if entry.media_type != kind {
                return false;
            }
        }
        if let Some(watched) = self.watched {
            if entry.watched != watched {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let in_title = entry.title.to_lowercase().contains(&needle);
            let in_overview = entry
                .overview
                .as_ref()
                .map_or(false, |o| o.to_lowercase().contains(&needle));
            if !in_title && !in_overview {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> SafeRecord {
        match value {
            Value::Object(map) => SafeRecord::from_map(map),
            _ => panic!("record must be an object"),
        }
    }

    fn dune() -> SafeRecord {
        record(json!({
            "id": 42,
            "title": "Dune",
            "poster_path": "/x.jpg",
            "poster_url": null,
            "media_type": "movie",
            "release_date": "2021-10-22",
            "vote_average": 8.1,
            "overview": "Spice must flow",
            "watched": false,
            "added_at": "2024-01-01T00:00:00.000Z"
        }))
    }

    #[test]
    fn test_record_accessors() {
        let r = dune();
        assert_eq!(r.id(), Some(42));
        assert_eq!(r.get_str("title"), Some("Dune"));
        assert_eq!(r.get_bool("watched"), Some(false));
        assert_eq!(r.get_f64("vote_average"), Some(8.1));
        assert_eq!(r.get("poster_url"), Some(&Value::Null));
        assert_eq!(r.len(), 10);
        assert_eq!(r.keys().next(), Some("id"));
    }

    #[test]
    fn test_record_serializes_transparently() {
        let json = serde_json::to_string(&dune()).unwrap();
        assert!(json.starts_with("{\"id\":42,\"title\":\"Dune\""));
    }

    #[test]
    fn test_typed_view() {
        let entry = WatchlistEntry::try_from(&dune()).unwrap();
        assert_eq!(entry.id, 42);
        assert_eq!(entry.media_type, MediaKind::Movie);
        assert_eq!(entry.poster_url, None);
        assert_eq!(entry.vote_average, Some(8.1));
    }

    #[test]
    fn test_typed_view_rejects_other_shapes() {
        let summary = record(json!({"id": 1, "title": "X", "media_type": "tv"}));
        assert!(WatchlistEntry::try_from(&summary).is_err());
    }

    #[test]
    fn test_record_into_raw_value() {
        let raw = RawValue::from(&dune());
        let obj = raw.as_object().unwrap();
        assert!(obj.is_plain());
        assert_eq!(obj.len(), 10);
        assert_eq!(obj.keys()[0], "id");
    }

    #[test]
    fn test_media_kind_wire_names() {
        assert_eq!(serde_json::to_string(&MediaKind::Tv).unwrap(), "\"tv\"");
        let parsed: MediaKind = serde_json::from_str("\"movie\"").unwrap();
        assert_eq!(parsed, MediaKind::Movie);
    }

    #[test]
    fn test_stats_serialization() {
        let stats = WatchlistStats {
            total: 3,
            watched: 1,
            unwatched: 2,
            movies: 2,
            tv_shows: 1,
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"tvShows\":1"));
    }

    #[test]
    fn test_filter_matching() {
        let entry = WatchlistEntry::try_from(&dune()).unwrap();

        assert!(WatchlistFilter::default().matches(&entry));
        assert!(WatchlistFilter {
            search: Some("SPICE".to_string()),
            ..Default::default()
        }
        .matches(&entry));
        assert!(!WatchlistFilter {
            media_type: Some(MediaKind::Tv),
            ..Default::default()
        }
        .matches(&entry));
        assert!(!WatchlistFilter {
            watched: Some(true),
            ..Default::default()
        }
        .matches(&entry));
    }

    #[test]
    fn test_filter_skips_empty_fields() {
        let json = serde_json::to_string(&WatchlistFilter::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
