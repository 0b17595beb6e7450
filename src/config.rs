//! Sanitizer configuration
//!
//! All fields have defaults, so an empty JSON object (or a missing
//! config file) yields a usable configuration.

use crate::error::{Result, SanitizeError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default nesting bound for the copier and the structural serializer.
///
/// Matches serde_json's parser recursion limit so anything that survives
/// isolation can also be parsed back.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Tunables for isolation, serialization, and the watchdog circuit breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizerConfig {
    /// Maximum container nesting depth (default: 128)
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Cyclic-structure failures before the watchdog clears persisted state (default: 5)
    #[serde(default = "default_watchdog_threshold")]
    pub watchdog_threshold: u32,

    /// Persistence key holding the watchlist
    #[serde(default = "default_watchlist_key")]
    pub watchlist_key: String,

    /// Persistence key holding user preferences
    #[serde(default = "default_preferences_key")]
    pub preferences_key: String,

    /// Literal substituted for revisited objects during isolation
    #[serde(default = "default_circular_marker")]
    pub circular_marker: String,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_watchdog_threshold() -> u32 {
    5
}

fn default_watchlist_key() -> String {
    "entertainment-watchlist".to_string()
}

fn default_preferences_key() -> String {
    "entertainment-preferences".to_string()
}

fn default_circular_marker() -> String {
    "[Circular Reference]".to_string()
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            watchdog_threshold: default_watchdog_threshold(),
            watchlist_key: default_watchlist_key(),
            preferences_key: default_preferences_key(),
            circular_marker: default_circular_marker(),
        }
    }
}

impl SanitizerConfig {
    /// Parse and validate a configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SanitizerConfig = serde_json::from_str(json)
            .map_err(|e| SanitizeError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    /// Returns the default config if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            SanitizeError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&content)
    }

    /// Check invariants that serde defaults cannot express
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(SanitizeError::Config(
                "maxDepth must be >= 1".to_string(),
            ));
        }
        if self.watchdog_threshold == 0 {
            return Err(SanitizeError::Config(
                "watchdogThreshold must be >= 1".to_string(),
            ));
        }
        if self.watchlist_key.is_empty() || self.preferences_key.is_empty() {
            return Err(SanitizeError::Config(
                "Persistence keys cannot be empty".to_string(),
            ));
        }
        if self.watchlist_key == self.preferences_key {
            return Err(SanitizeError::Config(format!(
                "Watchlist and preferences keys must differ (both '{}')",
                self.watchlist_key
            )));
        }
        Ok(())
    }

    /// Keys cleared by the watchdog's corrective action
    pub fn persisted_keys(&self) -> [&str; 2] {
        [self.watchlist_key.as_str(), self.preferences_key.as_str()]
    }
}
