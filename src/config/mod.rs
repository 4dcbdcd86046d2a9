//! Two-tier configuration store.
//!
//! A configuration document carries two namespaces:
//!
//! - `default_fields`: logical key → field metadata (`field_name`,
//!   `default_value`, `required`)
//! - `custom_fields`: flat map of field name → value
//!
//! Custom values are authoritative. Defaults are consulted only when the
//! caller asks for fallback resolution.
//!
//! ```json
//! {
//!   "default_fields": {
//!     "log_file": { "field_name": "log_file", "default_value": "dockhand.log", "required": false }
//!   },
//!   "custom_fields": {
//!     "image_name": "arbitrage-bot",
//!     "os_dependencies": ["docker", "git"]
//!   }
//! }
//! ```

mod value;

#[cfg(test)]
mod tests;

pub use value::ConfigValue;

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Zero or several sources were supplied
    #[error("One of config path, config JSON or config document must be provided (got {0})")]
    AmbiguousSource(usize),

    /// The configuration file could not be read
    #[error("Error loading configuration from file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration text is not a valid document
    #[error("Invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Metadata for a field in the default tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefault {
    /// Name the field is stored under in the custom tier
    #[serde(default)]
    pub field_name: Option<String>,
    /// Value returned by fallback resolution
    #[serde(default)]
    pub default_value: Option<ConfigValue>,
    /// Whether a value must resolve before the pipeline runs
    #[serde(default)]
    pub required: bool,
}

impl FieldDefault {
    pub fn new(field_name: impl Into<String>, default_value: impl Into<ConfigValue>) -> Self {
        Self {
            field_name: Some(field_name.into()),
            default_value: Some(default_value.into()),
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// On-disk shape of the configuration. Unknown top-level keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub default_fields: BTreeMap<String, FieldDefault>,
    #[serde(default, deserialize_with = "skip_null_values")]
    pub custom_fields: BTreeMap<String, ConfigValue>,
}

/// `null` custom values are read as absent keys.
fn skip_null_values<'de, D>(deserializer: D) -> Result<BTreeMap<String, ConfigValue>, D::Error>
where
    D: Deserializer<'de>,
{
    let fields = BTreeMap::<String, Option<ConfigValue>>::deserialize(deserializer)?;
    Ok(fields
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect())
}

/// Where a configuration comes from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    File(PathBuf),
    Json(String),
    Document(ConfigDocument),
}

/// The configuration store shared by every pipeline component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    document: ConfigDocument,
}

impl Config {
    /// Build a configuration from a single source.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the JSON is malformed.
    pub fn load(source: ConfigSource) -> Result<Self, ConfigError> {
        let document = match source {
            ConfigSource::File(path) => {
                debug!("Loading configuration from {:?}", path);
                let content = fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Read { path, source })?;
                serde_json::from_str(&content)?
            }
            ConfigSource::Json(text) => serde_json::from_str(&text)?,
            ConfigSource::Document(document) => document,
        };
        Ok(Self { document })
    }

    /// Build a configuration from optional sources, exactly one of which must be set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::AmbiguousSource`] unless exactly one source is given,
    /// otherwise whatever [`Config::load`] returns.
    pub fn from_sources(
        path: Option<&Path>,
        json: Option<&str>,
        document: Option<ConfigDocument>,
    ) -> Result<Self, ConfigError> {
        let given = usize::from(path.is_some())
            + usize::from(json.is_some())
            + usize::from(document.is_some());

        let source = match (path, json, document) {
            (Some(path), None, None) => ConfigSource::File(path.to_path_buf()),
            (None, Some(json), None) => ConfigSource::Json(json.to_string()),
            (None, None, Some(document)) => ConfigSource::Document(document),
            _ => return Err(ConfigError::AmbiguousSource(given)),
        };
        Self::load(source)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load(ConfigSource::File(path.as_ref().to_path_buf()))
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Self::load(ConfigSource::Json(text.to_string()))
    }

    pub fn from_document(document: ConfigDocument) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    /// Default-tier value for `key`, or `None` if the key has no default.
    pub fn get_default_value(&self, key: &str) -> Option<&ConfigValue> {
        self.document
            .default_fields
            .get(key)
            .and_then(|field| field.default_value.as_ref())
    }

    /// Default-tier field name for `key`, or `None` if the key is unknown.
    pub fn get_default_name(&self, key: &str) -> Option<&str> {
        self.document
            .default_fields
            .get(key)
            .and_then(|field| field.field_name.as_deref())
    }

    /// Custom-tier value for `key`, falling back to the default tier when
    /// `use_default` is set.
    pub fn get_custom_value(&self, key: &str, use_default: bool) -> Option<&ConfigValue> {
        match self.document.custom_fields.get(key) {
            Some(value) => Some(value),
            None if use_default => self.get_default_value(key),
            None => None,
        }
    }

    /// Merge a value into the custom tier.
    ///
    /// Lists added to an existing list append only the items not already
    /// present. Anything else replaces the stored value; a stored list never
    /// holds duplicates.
    pub fn add_custom_value(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        let key = key.into();
        match (self.document.custom_fields.get_mut(&key), value.into()) {
            (Some(ConfigValue::List(existing)), ConfigValue::List(items)) => {
                for item in items {
                    if !existing.contains(&item) {
                        existing.push(item);
                    }
                }
            }
            (_, ConfigValue::List(items)) => {
                let mut unique = Vec::with_capacity(items.len());
                for item in items {
                    if !unique.contains(&item) {
                        unique.push(item);
                    }
                }
                self.document
                    .custom_fields
                    .insert(key, ConfigValue::List(unique));
            }
            (_, value) => {
                self.document.custom_fields.insert(key, value);
            }
        }
    }

    /// Resolve `key` with fallback and read it as a string.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.get_custom_value(key, true).and_then(ConfigValue::as_str)
    }

    /// Resolve `key` with fallback and read it as a boolean.
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.get_custom_value(key, true).and_then(ConfigValue::as_bool)
    }

    /// Resolve `key` with fallback and read it as a list.
    pub fn list(&self, key: &str) -> Option<&[String]> {
        self.get_custom_value(key, true).and_then(ConfigValue::as_list)
    }

    /// Keys flagged `required` in the default tier that resolve to nothing.
    pub fn missing_required(&self) -> Vec<String> {
        self.document
            .default_fields
            .iter()
            .filter(|(_, field)| field.required)
            .filter(|(key, field)| {
                let by_name = field
                    .field_name
                    .as_deref()
                    .and_then(|name| self.document.custom_fields.get(name));
                by_name.is_none() && self.get_custom_value(key, true).is_none()
            })
            .map(|(key, _)| key.clone())
            .collect()
    }
}
