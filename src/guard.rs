//! Serialization guard and watchdog circuit breaker
//!
//! The guard wraps serialization so a cyclic structure never escapes as an
//! error to the caller. Consecutive cyclic failures are counted by a shared
//! [`Watchdog`]; at the configured threshold the persisted watchlist and
//! preferences are cleared, on the assumption that corrupted state is what
//! keeps producing the cycles.

use crate::config::SanitizerConfig;
use crate::error::{Result, SanitizeError};
use crate::json::to_json;
use crate::store::KeyValueStore;
use crate::value::RawValue;
use serde_json::json;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Failure counters shared by everything that sanitizes
///
/// `count` is the number of consecutive cyclic-structure failures since the
/// last success or trip. `contamination_count` is a running total of inputs
/// the projector and copier had to drop or replace.
#[derive(Debug, Default)]
pub struct Watchdog {
    consecutive: AtomicU32,
    trips: AtomicU32,
    contamination: AtomicU64,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consecutive cyclic-structure failures
    pub fn count(&self) -> u32 {
        self.consecutive.load(Ordering::SeqCst)
    }

    /// Times the breaker has cleared persisted state
    pub fn trips(&self) -> u32 {
        self.trips.load(Ordering::SeqCst)
    }

    /// Contaminated inputs seen so far
    pub fn contamination_count(&self) -> u64 {
        self.contamination.load(Ordering::SeqCst)
    }

    /// Zero the consecutive counter
    pub fn reset(&self) {
        self.consecutive.store(0, Ordering::SeqCst);
    }

    /// Record one cyclic failure and return the new count
    pub(crate) fn record_cyclic(&self) -> u32 {
        self.consecutive.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn record_trip(&self) {
        self.trips.fetch_add(1, Ordering::SeqCst);
        self.reset();
    }

    pub(crate) fn record_contamination(&self) {
        self.contamination.fetch_add(1, Ordering::SeqCst);
    }
}

/// Serializes values, degrading cyclic failures to a diagnostic
pub struct SerializationGuard {
    store: Arc<dyn KeyValueStore>,
    watchdog: Arc<Watchdog>,
    config: SanitizerConfig,
}

impl SerializationGuard {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        watchdog: Arc<Watchdog>,
        config: SanitizerConfig,
    ) -> Self {
        Self {
            store,
            watchdog,
            config,
        }
    }

    pub fn watchdog(&self) -> &Arc<Watchdog> {
        &self.watchdog
    }

    pub fn config(&self) -> &SanitizerConfig {
        &self.config
    }

    /// Whether `value` serializes.
    ///
    /// A cyclic structure yields `Ok(false)` with a warning; any other
    /// serialization failure is returned unchanged.
    pub fn validate_serializable(&self, value: &RawValue) -> Result<bool> {
        match to_json(value, self.config.max_depth) {
            Ok(_) => Ok(true),
            Err(e) if e.is_cyclic() => {
                tracing::warn!(error = %e, kind = value.kind_name(), "Value is not serializable");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Serialize `value` to JSON text.
    ///
    /// On a cyclic failure the watchdog is advanced (and may trip), and a
    /// small diagnostic document naming `context` is returned instead. Only
    /// if that too fails is `Ok(None)` returned. Non-cyclic failures are
    /// returned as errors.
    pub fn guarded_serialize(&self, value: &RawValue, context: &str) -> Result<Option<String>> {
        let err = match to_json(value, self.config.max_depth)
            .and_then(|json| serde_json::to_string(&json).map_err(SanitizeError::from))
        {
            Ok(text) => {
                self.watchdog.reset();
                return Ok(Some(text));
            }
            Err(e) if e.is_cyclic() => e,
            Err(e) => return Err(e),
        };

        let count = self.watchdog.record_cyclic();
        tracing::warn!(
            context,
            error = %err,
            count,
            threshold = self.config.watchdog_threshold,
            "Circular structure detected"
        );

        if count >= self.config.watchdog_threshold {
            self.trip();
        }

        let diagnostic = json!({
            "error": "Circular structure detected",
            "context": context,
            "valueKind": value.kind_name(),
        });
        match serde_json::to_string(&diagnostic) {
            Ok(text) => Ok(Some(text)),
            Err(e) => {
                tracing::error!(context, error = %e, "Failed to serialize diagnostic");
                Ok(None)
            }
        }
    }

    /// Clear persisted state and reset the counter. Removal failures are
    /// logged, never returned.
    fn trip(&self) {
        tracing::error!(
            threshold = self.config.watchdog_threshold,
            "Too many circular structure errors, clearing persisted state"
        );
        for key in self.config.persisted_keys() {
            if let Err(e) = self.store.remove(key) {
                tracing::error!(key, error = %e, "Failed to clear persisted key");
            }
        }
        self.watchdog.record_trip();
    }
}
