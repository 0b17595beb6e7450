//! Error types for a3s-sanitize

use thiserror::Error;

/// Errors that can occur while isolating, serializing, or persisting data
#[derive(Debug, Error)]
pub enum SanitizeError {
    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A reference cycle was found while serializing
    #[error("Converting circular structure to JSON at '{path}'")]
    Cyclic { path: String },

    /// A property could not be read (its getter failed)
    #[error("Failed to read property '{key}': {reason}")]
    PropertyAccess { key: String, reason: String },

    /// Nesting exceeded the configured depth bound
    #[error("Maximum nesting depth of {limit} exceeded")]
    DepthExceeded { limit: usize },

    /// Persistence backend failure
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Entry not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input rejected before processing
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SanitizeError {
    /// Whether this error was caused by a reference cycle
    pub fn is_cyclic(&self) -> bool {
        matches!(self, SanitizeError::Cyclic { .. })
    }
}

/// Result type alias for sanitize operations
pub type Result<T> = std::result::Result<T, SanitizeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyclic_classification_by_variant() {
        let cyclic = SanitizeError::Cyclic {
            path: "$.self".to_string(),
        };
        assert!(cyclic.is_cyclic());
        assert!(cyclic.to_string().contains("circular structure"));

        let other = SanitizeError::PropertyAccess {
            key: "circular".to_string(),
            reason: "circular structure".to_string(),
        };
        assert!(!other.is_cyclic());
    }

    #[test]
    fn test_depth_message() {
        let err = SanitizeError::DepthExceeded { limit: 8 };
        assert_eq!(err.to_string(), "Maximum nesting depth of 8 exceeded");
    }
}
