//! Persisted watchlist
//!
//! `Watchlist` keeps an ordered list of projected entries and writes it
//! back to a `KeyValueStore` after every change. Everything entering the
//! list, whether from a caller or from storage, passes through the
//! projector first, and every write goes through the serialization guard.

use crate::config::SanitizerConfig;
use crate::detect::{is_framework_node, is_platform_handle};
use crate::error::{Result, SanitizeError};
use crate::field::{watchlist_entry, FieldSpec};
use crate::guard::{SerializationGuard, Watchdog};
use crate::json::safe_parse;
use crate::project::Projector;
use crate::store::KeyValueStore;
use crate::types::{SafeRecord, WatchlistEntry, WatchlistFilter, WatchlistStats};
use crate::value::{ArrayRef, Property, RawValue};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Ordered, deduplicated, persisted list of watchlist entries
pub struct Watchlist {
    store: Arc<dyn KeyValueStore>,
    guard: SerializationGuard,
    projector: Projector,
    spec: FieldSpec,
    key: String,
    entries: Vec<SafeRecord>,
}

impl Watchlist {
    /// Open the watchlist persisted under `config.watchlist_key`.
    ///
    /// Stored entries are re-projected; entries without an identifier and
    /// repeated identifiers are dropped. Unreadable or malformed storage
    /// yields an empty list.
    pub fn open(
        store: Arc<dyn KeyValueStore>,
        watchdog: Arc<Watchdog>,
        config: SanitizerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let mut list = Self {
            store: store.clone(),
            projector: Projector::new(&config).with_watchdog(watchdog.clone()),
            key: config.watchlist_key.clone(),
            guard: SerializationGuard::new(store, watchdog, config),
            spec: watchlist_entry(),
            entries: Vec::new(),
        };
        list.load();
        Ok(list)
    }

    fn load(&mut self) {
        let text = match self.store.get(&self.key) {
            Ok(Some(text)) => text,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Failed to read watchlist, starting empty");
                return;
            }
        };

        let items = match safe_parse(&text) {
            Some(Value::Array(items)) => items,
            Some(_) => {
                tracing::warn!(key = %self.key, "Stored watchlist is not a list, starting empty");
                return;
            }
            None => return,
        };

        let total = items.len();
        let mut seen = HashSet::new();
        for item in &items {
            let raw = RawValue::from(item);
            if !has_identifier(&raw) {
                continue;
            }
            let record = self.projector.project(&raw, &self.spec);
            if let Some(id) = record.id() {
                if seen.insert(id) {
                    self.entries.push(record);
                }
            }
        }

        tracing::debug!(
            key = %self.key,
            loaded = self.entries.len(),
            dropped = total - self.entries.len(),
            "Watchlist loaded"
        );
    }

    /// Project `raw` and append it.
    ///
    /// Returns `Ok(None)` if an entry with the same identifier is already
    /// present. Inputs that are not records, are live handles or runtime
    /// nodes, or carry no identifier are rejected.
    pub fn add(&mut self, raw: &RawValue) -> Result<Option<SafeRecord>> {
        if raw.as_object().is_none() {
            return Err(SanitizeError::InvalidInput(format!(
                "Cannot add a {} to the watchlist",
                raw.kind_name()
            )));
        }
        if is_platform_handle(raw) || is_framework_node(raw) {
            return Err(SanitizeError::InvalidInput(
                "Cannot add a live handle or runtime node to the watchlist".to_string(),
            ));
        }
        if !has_identifier(raw) {
            return Err(SanitizeError::InvalidInput(
                "Watchlist entries need an identifier".to_string(),
            ));
        }

        let record = self.projector.project(raw, &self.spec);
        let id = match record.id() {
            Some(id) if !self.contains(id) => id,
            _ => return Ok(None),
        };

        self.entries.push(record.clone());
        self.persist()?;

        tracing::info!(
            id,
            title = record.get_str("title").unwrap_or_default(),
            "Added to watchlist"
        );
        Ok(Some(record))
    }

    /// Remove the entry with identifier `id`
    pub fn remove(&mut self, id: i64) -> Result<SafeRecord> {
        let pos = self.position(id)?;
        let record = self.entries.remove(pos);
        self.persist()?;

        tracing::info!(id, "Removed from watchlist");
        Ok(record)
    }

    /// Flip the watched flag; returns the new value
    pub fn toggle_watched(&mut self, id: i64) -> Result<bool> {
        let pos = self.position(id)?;
        let watched = !self.entries[pos].get_bool("watched").unwrap_or(false);
        self.entries[pos].insert("watched", Value::Bool(watched));
        self.persist()?;

        tracing::debug!(id, watched, "Watched flag toggled");
        Ok(watched)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.entries.iter().any(|e| e.id() == Some(id))
    }

    pub fn get(&self, id: i64) -> Option<&SafeRecord> {
        self.entries.iter().find(|e| e.id() == Some(id))
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[SafeRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> WatchlistStats {
        let mut stats = WatchlistStats {
            total: self.entries.len(),
            ..Default::default()
        };
        for entry in &self.entries {
            if entry.get_bool("watched") == Some(true) {
                stats.watched += 1;
            }
            match entry.get_str("media_type") {
                Some("tv") => stats.tv_shows += 1,
                _ => stats.movies += 1,
            }
        }
        stats.unwatched = stats.total - stats.watched;
        stats
    }

    /// Typed entries matching `filter`, in insertion order
    pub fn filter(&self, filter: &WatchlistFilter) -> Vec<WatchlistEntry> {
        self.entries
            .iter()
            .filter_map(|record| WatchlistEntry::try_from(record).ok())
            .filter(|entry| filter.matches(entry))
            .collect()
    }

    /// Drop every entry and the persisted key
    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.store.remove(&self.key)?;
        tracing::info!(key = %self.key, "Watchlist cleared");
        Ok(())
    }

    /// The guard used for writes; shares the watchdog passed to `open`
    pub fn guard(&self) -> &SerializationGuard {
        &self.guard
    }

    fn position(&self, id: i64) -> Result<usize> {
        self.entries
            .iter()
            .position(|e| e.id() == Some(id))
            .ok_or_else(|| SanitizeError::NotFound(format!("Watchlist entry not found: {}", id)))
    }

    /// Write the list back. Storage failures (e.g. a full quota) are logged
    /// and the in-memory list stays authoritative.
    fn persist(&self) -> Result<()> {
        let raw = RawValue::Array(ArrayRef::from_vec(
            self.entries.iter().map(RawValue::from).collect(),
        ));

        if !self.guard.validate_serializable(&raw)? {
            return Ok(());
        }
        let text = match self.guard.guarded_serialize(&raw, "watchlist")? {
            Some(text) => text,
            None => return Ok(()),
        };

        if let Err(e) = self.store.set(&self.key, &text) {
            tracing::error!(key = %self.key, error = %e, "Failed to persist watchlist");
        }
        Ok(())
    }
}

fn has_identifier(raw: &RawValue) -> bool {
    raw.as_object()
        .map_or(false, |obj| matches!(obj.get("id"), Some(Property::Value(v)) if !v.is_nullish()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKeyValueStore;
    use crate::types::MediaKind;
    use crate::value::ObjectRef;
    use serde_json::json;

    const KEY: &str = "entertainment-watchlist";

    fn open(store: Arc<MemoryKeyValueStore>) -> Watchlist {
        Watchlist::open(store, Arc::new(Watchdog::new()), SanitizerConfig::default()).unwrap()
    }

    fn movie(id: i64, title: &str) -> RawValue {
        RawValue::from(json!({"id": id, "title": title, "vote_average": 7.5}))
    }

    fn show(id: i64, name: &str) -> RawValue {
        RawValue::from(json!({"id": id, "name": name, "first_air_date": "2019-01-01"}))
    }

    #[test]
    fn test_add_and_persist() {
        let store = Arc::new(MemoryKeyValueStore::new());
        let mut list = open(store.clone());

        let record = list.add(&movie(1, "Dune")).unwrap().unwrap();
        assert_eq!(record.get_str("media_type"), Some("movie"));
        assert_eq!(list.len(), 1);

        let stored: Value = serde_json::from_str(&store.get(KEY).unwrap().unwrap()).unwrap();
        assert_eq!(stored[0]["id"], 1);
        assert_eq!(stored[0]["title"], "Dune");
    }

    #[test]
    fn test_add_duplicate_is_ignored() {
        let mut list = open(Arc::new(MemoryKeyValueStore::new()));
        list.add(&movie(1, "Dune")).unwrap();
        assert!(list.add(&movie(1, "Dune again")).unwrap().is_none());
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(1).unwrap().get_str("title"), Some("Dune"));
    }

    #[test]
    fn test_add_rejects_contaminated_inputs() {
        let mut list = open(Arc::new(MemoryKeyValueStore::new()));

        let el = RawValue::Object(ObjectRef::element("div"));
        assert!(matches!(list.add(&el), Err(SanitizeError::InvalidInput(_))));

        let node = RawValue::Object(ObjectRef::plain().with("id", 1i64).with("_owner", RawValue::Null));
        assert!(list.add(&node).is_err());

        assert!(list.add(&RawValue::text("Dune")).is_err());
        assert!(list.add(&RawValue::from(json!({"title": "no id"}))).is_err());
        assert!(list.is_empty());
    }

    #[test]
    fn test_add_strips_contamination() {
        let mut list = open(Arc::new(MemoryKeyValueStore::new()));
        let obj = ObjectRef::plain()
            .with("id", 9i64)
            .with("title", "Arrival")
            .with("__reactFiber$abc", ObjectRef::instance("FiberNode"))
            .with("onClick", RawValue::callable("onClick"));
        obj.set("self", obj.clone());

        let record = list.add(&RawValue::Object(obj)).unwrap().unwrap();
        assert_eq!(record.len(), 10);
        assert!(!record.contains_key("__reactFiber$abc"));
        assert!(!record.contains_key("self"));
    }

    #[test]
    fn test_remove_and_not_found() {
        let store = Arc::new(MemoryKeyValueStore::new());
        let mut list = open(store.clone());
        list.add(&movie(1, "Dune")).unwrap();
        list.add(&movie(2, "Heat")).unwrap();

        let removed = list.remove(1).unwrap();
        assert_eq!(removed.id(), Some(1));
        assert!(!list.contains(1));
        assert!(matches!(list.remove(1), Err(SanitizeError::NotFound(_))));

        let stored: Value = serde_json::from_str(&store.get(KEY).unwrap().unwrap()).unwrap();
        assert_eq!(stored.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_toggle_watched() {
        let mut list = open(Arc::new(MemoryKeyValueStore::new()));
        list.add(&movie(1, "Dune")).unwrap();

        assert!(list.toggle_watched(1).unwrap());
        assert_eq!(list.get(1).unwrap().get_bool("watched"), Some(true));
        assert!(!list.toggle_watched(1).unwrap());
        assert!(list.toggle_watched(99).is_err());
    }

    #[test]
    fn test_stats_and_filter() {
        let mut list = open(Arc::new(MemoryKeyValueStore::new()));
        list.add(&movie(1, "Dune")).unwrap();
        list.add(&movie(2, "Heat")).unwrap();
        list.add(&show(3, "Dark")).unwrap();
        list.toggle_watched(2).unwrap();

        let stats = list.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.watched, 1);
        assert_eq!(stats.unwatched, 2);
        assert_eq!(stats.movies, 2);
        assert_eq!(stats.tv_shows, 1);

        let shows = list.filter(&WatchlistFilter {
            media_type: Some(MediaKind::Tv),
            ..Default::default()
        });
        assert_eq!(shows.len(), 1);
        assert_eq!(shows[0].title, "Dark");
        assert_eq!(shows[0].release_date.as_deref(), Some("2019-01-01"));

        let unwatched = list.filter(&WatchlistFilter {
            watched: Some(false),
            ..Default::default()
        });
        assert_eq!(unwatched.len(), 2);
    }

    #[test]
    fn test_reopen_reprojects_and_dedupes() {
        let store = Arc::new(MemoryKeyValueStore::new());
        store
            .set(
                KEY,
                &json!([
                    {"id": 1, "title": "Dune", "_debugOwner": {}, "extra": true},
                    {"id": 1, "title": "Dune duplicate"},
                    {"title": "no id"},
                    "garbage",
                    {"id": "2", "name": "Dark"}
                ])
                .to_string(),
            )
            .unwrap();

        let list = open(store);
        assert_eq!(list.len(), 2);
        assert_eq!(list.entries()[0].get_str("title"), Some("Dune"));
        assert!(!list.entries()[0].contains_key("extra"));
        assert_eq!(list.entries()[1].id(), Some(2));
        assert_eq!(list.entries()[1].get_str("media_type"), Some("tv"));
    }

    #[test]
    fn test_malformed_storage_starts_empty() {
        let store = Arc::new(MemoryKeyValueStore::new());
        store.set(KEY, "{not json").unwrap();
        assert!(open(store.clone()).is_empty());

        store.set(KEY, r#"{"id": 1}"#).unwrap();
        assert!(open(store).is_empty());
    }

    #[test]
    fn test_quota_failure_keeps_memory_state() {
        let store = Arc::new(MemoryKeyValueStore::with_quota(64));
        let mut list = open(store.clone());

        let long = "x".repeat(200);
        let record = list.add(&movie(1, &long)).unwrap();
        assert!(record.is_some());
        assert_eq!(list.len(), 1);
        assert_eq!(store.get(KEY).unwrap(), None);
    }

    #[test]
    fn test_clear() {
        let store = Arc::new(MemoryKeyValueStore::new());
        let mut list = open(store.clone());
        list.add(&movie(1, "Dune")).unwrap();

        list.clear().unwrap();
        assert!(list.is_empty());
        assert_eq!(store.get(KEY).unwrap(), None);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SanitizerConfig {
            watchdog_threshold: 0,
            ..Default::default()
        };
        let result = Watchlist::open(
            Arc::new(MemoryKeyValueStore::new()),
            Arc::new(Watchdog::new()),
            config,
        );
        assert!(result.is_err());
    }
}
