//! Field specifications: the whitelisted shapes a projection may produce
//!
//! A `FieldSpec` is an ordered list of `FieldDef`s. Each definition names
//! the output key (also the primary source key), an optional alias source
//! key, a semantic type, and an optional length bound for text.

use crate::error::{Result, SanitizeError};
use crate::json::MAX_SAFE_INTEGER;
use serde_json::Value;
use std::collections::HashSet;

/// Semantic type of one output field
#[derive(Debug, Clone, PartialEq)]
pub enum SemanticType {
    /// Integer identifier; invalid values get a fresh unique id
    Identifier,
    /// Required text; invalid values get `default`
    Text { default: String },
    /// One of a fixed set of strings
    Enum { values: Vec<String>, default: String },
    /// Boolean with a declared default
    Flag { default: bool },
    /// ISO-8601 date-time; invalid values get "now"
    Timestamp,
    /// Finite number or null
    NullableNumber,
    /// Text or null
    NullableText,
}

/// Infers an enum value from the presence of another source key when the
/// enum's own source is absent (e.g. "movie" if `title` exists, else "tv")
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceInference {
    pub key: String,
    pub present: String,
    pub absent: String,
}

/// One whitelisted field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Output key, also read from the source
    pub key: String,
    /// Source key consulted when `key` is absent
    pub alias: Option<String>,
    pub semantic: SemanticType,
    /// Maximum length in characters for text types
    pub max_len: Option<usize>,
    /// Accept numbers and booleans for text types by rendering them
    pub stringify_scalars: bool,
    /// Enum inference when the source is absent
    pub infer: Option<PresenceInference>,
}

impl FieldDef {
    fn new(key: impl Into<String>, semantic: SemanticType) -> Self {
        Self {
            key: key.into(),
            alias: None,
            semantic,
            max_len: None,
            stringify_scalars: false,
            infer: None,
        }
    }

    pub fn identifier(key: impl Into<String>) -> Self {
        Self::new(key, SemanticType::Identifier)
    }

    pub fn text(key: impl Into<String>, max_len: usize, default: impl Into<String>) -> Self {
        Self {
            max_len: Some(max_len),
            ..Self::new(
                key,
                SemanticType::Text {
                    default: default.into(),
                },
            )
        }
    }

    pub fn nullable_text(key: impl Into<String>, max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            ..Self::new(key, SemanticType::NullableText)
        }
    }

    pub fn enumeration(key: impl Into<String>, values: &[&str], default: impl Into<String>) -> Self {
        Self::new(
            key,
            SemanticType::Enum {
                values: values.iter().map(|v| v.to_string()).collect(),
                default: default.into(),
            },
        )
    }

    pub fn flag(key: impl Into<String>, default: bool) -> Self {
        Self::new(key, SemanticType::Flag { default })
    }

    pub fn timestamp(key: impl Into<String>) -> Self {
        Self::new(key, SemanticType::Timestamp)
    }

    pub fn nullable_number(key: impl Into<String>) -> Self {
        Self::new(key, SemanticType::NullableNumber)
    }

    /// Declare the alias source key
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Render numbers and booleans as text instead of rejecting them
    pub fn stringify_scalars(mut self) -> Self {
        self.stringify_scalars = true;
        self
    }

    /// Infer the enum value from whether `key` is present in the source
    pub fn infer_from_presence(
        mut self,
        key: impl Into<String>,
        present: impl Into<String>,
        absent: impl Into<String>,
    ) -> Self {
        self.infer = Some(PresenceInference {
            key: key.into(),
            present: present.into(),
            absent: absent.into(),
        });
        self
    }

    /// Whether a JSON value is an admissible output for this field
    fn admits(&self, value: &Value) -> bool {
        let fits = |s: &str| self.max_len.map_or(true, |n| s.chars().count() <= n);
        match (&self.semantic, value) {
            (SemanticType::Identifier, Value::Number(n)) => n
                .as_i64()
                .map_or(false, |i| (i as f64).abs() <= MAX_SAFE_INTEGER),
            (SemanticType::Text { .. }, Value::String(s)) => fits(s),
            (SemanticType::Enum { values, .. }, Value::String(s)) => values.contains(s),
            (SemanticType::Flag { .. }, Value::Bool(_)) => true,
            (SemanticType::Timestamp, Value::String(s)) => {
                chrono::DateTime::parse_from_rfc3339(s).is_ok()
            }
            (SemanticType::NullableNumber, Value::Null) => true,
            (SemanticType::NullableNumber, Value::Number(n)) => {
                n.as_f64().map_or(false, f64::is_finite)
            }
            (SemanticType::NullableText, Value::Null) => true,
            (SemanticType::NullableText, Value::String(s)) => fits(s),
            _ => false,
        }
    }
}

/// A named, ordered whitelist of fields
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    name: String,
    fields: Vec<FieldDef>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field definition
    pub fn field(mut self, def: FieldDef) -> Self {
        self.fields.push(def);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Output keys in declaration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.key.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.iter().any(|f| f.key == key)
    }

    /// The identifier field, if the shape declares one
    pub fn identifier(&self) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|f| f.semantic == SemanticType::Identifier)
    }

    /// Reject malformed specs: duplicate keys, enum defaults outside the
    /// value set, zero-length text bounds, more than one identifier
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for def in &self.fields {
            if !seen.insert(def.key.as_str()) {
                return Err(SanitizeError::Config(format!(
                    "Field spec '{}' declares '{}' twice",
                    self.name, def.key
                )));
            }
            if def.max_len == Some(0) {
                return Err(SanitizeError::Config(format!(
                    "Field '{}' has a zero length bound",
                    def.key
                )));
            }
            if let SemanticType::Enum { values, default } = &def.semantic {
                if !values.contains(default) {
                    return Err(SanitizeError::Config(format!(
                        "Enum field '{}' default '{}' is not one of {:?}",
                        def.key, default, values
                    )));
                }
                if let Some(infer) = &def.infer {
                    if !values.contains(&infer.present) || !values.contains(&infer.absent) {
                        return Err(SanitizeError::Config(format!(
                            "Enum field '{}' infers a value outside {:?}",
                            def.key, values
                        )));
                    }
                }
            }
        }
        let identifiers = self
            .fields
            .iter()
            .filter(|f| f.semantic == SemanticType::Identifier)
            .count();
        if identifiers > 1 {
            return Err(SanitizeError::Config(format!(
                "Field spec '{}' declares {} identifier fields",
                self.name, identifiers
            )));
        }
        Ok(())
    }

    /// Type guard: the value holds exactly this spec's keys, each with an
    /// admissible value
    pub fn conforms(&self, value: &Value) -> bool {
        let map = match value {
            Value::Object(map) => map,
            _ => return false,
        };
        map.len() == self.fields.len()
            && self
                .fields
                .iter()
                .all(|def| map.get(&def.key).map_or(false, |v| def.admits(v)))
    }
}

/// Persisted watchlist entry
///
/// Keys are the persisted wire names: `id` (identifier), `title`,
/// `poster_path`, `poster_url`, `media_type` (media kind), `release_date`,
/// `vote_average` (rating), `overview` (summary), `watched`, `added_at`.
pub fn watchlist_entry() -> FieldSpec {
    FieldSpec::new("watchlist entry")
        .field(FieldDef::identifier("id"))
        .field(
            FieldDef::text("title", 500, "Unknown Title")
                .alias("name")
                .stringify_scalars(),
        )
        .field(FieldDef::nullable_text("poster_path", 200))
        .field(FieldDef::nullable_text("poster_url", 500))
        .field(
            FieldDef::enumeration("media_type", &["movie", "tv"], "movie")
                .infer_from_presence("title", "movie", "tv"),
        )
        .field(FieldDef::nullable_text("release_date", 50).alias("first_air_date"))
        .field(FieldDef::nullable_number("vote_average"))
        .field(FieldDef::nullable_text("overview", 2000))
        .field(FieldDef::flag("watched", false))
        .field(FieldDef::timestamp("added_at"))
}

/// Navigation payload for a movie or show
pub fn content_summary() -> FieldSpec {
    FieldSpec::new("content summary")
        .field(FieldDef::identifier("id"))
        .field(
            FieldDef::text("title", 200, "Unknown")
                .alias("name")
                .stringify_scalars(),
        )
        .field(
            FieldDef::enumeration("media_type", &["movie", "tv"], "movie")
                .infer_from_presence("title", "movie", "tv"),
        )
}

/// The inert part of a UI event. Declares no identifier.
pub fn event_data() -> FieldSpec {
    FieldSpec::new("event data")
        .field(FieldDef::nullable_text("type", 64))
        .field(FieldDef::nullable_number("timeStamp"))
        .field(FieldDef::nullable_number("clientX"))
        .field(FieldDef::nullable_number("clientY"))
        .field(FieldDef::nullable_text("key", 32))
        .field(FieldDef::nullable_number("keyCode"))
}
