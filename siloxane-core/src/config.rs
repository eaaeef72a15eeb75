use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::descriptor::FieldOverrides;

/// Caller-supplied marshaling configuration.
///
/// Every key is optional when deserialized:
///
/// ```
/// use siloxane_core::MarshalConfig;
///
/// let config = MarshalConfig::from_toml(r#"
///     strict = true
///     array_fields = ["tags"]
/// "#).unwrap();
/// assert!(config.strict);
/// assert!(config.auto_detect);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarshalConfig {
    /// Classify fields from their declared types.
    pub auto_detect: bool,
    /// Let auto-detection produce vectors. When off, float sequences are
    /// handled as JSON.
    pub auto_detect_vector: bool,
    /// Abort a decode on the first field failure instead of keeping the
    /// wire value.
    pub strict: bool,
    pub json_fields: BTreeSet<String>,
    pub array_fields: BTreeSet<String>,
    pub vector_fields: BTreeSet<String>,
    pub date_fields: BTreeSet<String>,
}

impl Default for MarshalConfig {
    fn default() -> Self {
        MarshalConfig {
            auto_detect: true,
            auto_detect_vector: true,
            strict: false,
            json_fields: BTreeSet::new(),
            array_fields: BTreeSet::new(),
            vector_fields: BTreeSet::new(),
            date_fields: BTreeSet::new(),
        }
    }
}

fn names<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> impl Iterator<Item = String> {
    fields.into_iter().map(Into::into)
}

impl MarshalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a TOML fragment.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn auto_detect(mut self, auto_detect: bool) -> Self {
        self.auto_detect = auto_detect;
        self
    }

    pub fn auto_detect_vector(mut self, auto_detect_vector: bool) -> Self {
        self.auto_detect_vector = auto_detect_vector;
        self
    }

    pub fn with_json_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.json_fields.extend(names(fields));
        self
    }

    pub fn with_array_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.array_fields.extend(names(fields));
        self
    }

    pub fn with_vector_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.vector_fields.extend(names(fields));
        self
    }

    pub fn with_date_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.date_fields.extend(names(fields));
        self
    }

    /// Adds overrides declared on a record type.
    pub fn with_overrides(mut self, overrides: FieldOverrides) -> Self {
        self.json_fields.extend(overrides.json_fields);
        self.array_fields.extend(overrides.array_fields);
        self.vector_fields.extend(overrides.vector_fields);
        self.date_fields.extend(overrides.date_fields);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MarshalConfig::default();
        assert!(config.auto_detect);
        assert!(config.auto_detect_vector);
        assert!(!config.strict);
        assert!(config.json_fields.is_empty());
        assert!(config.date_fields.is_empty());
    }

    #[test]
    fn toml_fills_missing_keys_with_defaults() {
        let config = MarshalConfig::from_toml(
            r#"
            auto_detect = false
            date_fields = ["created_date", "updated_date"]
            "#,
        )
        .unwrap();
        assert!(!config.auto_detect);
        assert!(!config.strict);
        assert_eq!(config.date_fields.len(), 2);
        assert!(config.date_fields.contains("created_date"));
    }

    #[test]
    fn toml_rejects_wrong_types() {
        assert!(MarshalConfig::from_toml("strict = \"yes\"").is_err());
    }

    #[test]
    fn builders_accumulate() {
        let overrides = FieldOverrides {
            json_fields: BTreeSet::from(["payload".to_string()]),
            ..FieldOverrides::default()
        };
        let config = MarshalConfig::new()
            .strict(true)
            .with_json_fields(["metadata"])
            .with_array_fields(["tags", "categories"])
            .with_overrides(overrides);
        assert!(config.strict);
        assert_eq!(config.json_fields.len(), 2);
        assert_eq!(config.array_fields.len(), 2);
    }
}
