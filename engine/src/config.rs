//! Collection settings loaded from the environment.

use crate::record::{DEFAULT_DELETED_FIELD, DEFAULT_ID_FIELD, DEFAULT_MODIFIED_FIELD};
use crate::FieldNames;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::Path;

pub const ENV_COLLECTION_NAME: &str = "QUIVER_COLLECTION_NAME";
pub const ENV_PARENT_ID: &str = "QUIVER_PARENT_ID";
pub const ENV_ID_FIELD: &str = "QUIVER_ID_FIELD";
pub const ENV_MODIFIED_FIELD: &str = "QUIVER_MODIFIED_FIELD";
pub const ENV_DELETED_FIELD: &str = "QUIVER_DELETED_FIELD";

/// Settings of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Resource name, empty means unscoped
    pub name: String,
    /// Default parent id, empty means unscoped
    pub parent_id: String,
    pub id_field: String,
    pub modified_field: String,
    pub deleted_field: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: String::new(),
            parent_id: String::new(),
            id_field: DEFAULT_ID_FIELD.to_string(),
            modified_field: DEFAULT_MODIFIED_FIELD.to_string(),
            deleted_field: DEFAULT_DELETED_FIELD.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings from a `.env` file, without touching the process
    /// environment.
    pub fn from_dotenv(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut vars = HashMap::new();
        for item in dotenvy::from_path_iter(path.as_ref())? {
            let (key, value) = item?;
            vars.insert(key, value);
        }
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Load settings from any key/value source. Missing keys keep their
    /// defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let settings = Self {
            name: lookup(ENV_COLLECTION_NAME).unwrap_or(defaults.name),
            parent_id: lookup(ENV_PARENT_ID).unwrap_or(defaults.parent_id),
            id_field: lookup(ENV_ID_FIELD).unwrap_or(defaults.id_field),
            modified_field: lookup(ENV_MODIFIED_FIELD).unwrap_or(defaults.modified_field),
            deleted_field: lookup(ENV_DELETED_FIELD).unwrap_or(defaults.deleted_field),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check that reserved field names are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let reserved = [
            (ENV_ID_FIELD, &self.id_field),
            (ENV_MODIFIED_FIELD, &self.modified_field),
            (ENV_DELETED_FIELD, &self.deleted_field),
        ];

        for (key, value) in reserved {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyFieldName(key));
            }
        }
        for (i, (_, a)) in reserved.iter().enumerate() {
            if reserved[i + 1..].iter().any(|(_, b)| a == b) {
                return Err(ConfigError::DuplicateFieldName(a.to_string()));
            }
        }

        Ok(())
    }

    pub fn field_names(&self) -> FieldNames {
        FieldNames::new(&self.id_field, &self.modified_field, &self.deleted_field)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    EmptyFieldName(&'static str),

    #[error("field name '{0}' is used for more than one reserved field")]
    DuplicateFieldName(String),

    #[error("cannot read env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.field_names(), FieldNames::default());
    }

    #[test]
    fn overrides_from_lookup() {
        let settings = Settings::from_lookup(lookup(&[
            (ENV_COLLECTION_NAME, "notes"),
            (ENV_PARENT_ID, "u1"),
            (ENV_MODIFIED_FIELD, "_mtime"),
        ]))
        .unwrap();

        assert_eq!(settings.name, "notes");
        assert_eq!(settings.parent_id, "u1");
        assert_eq!(settings.field_names(), FieldNames::new("id", "_mtime", "deleted"));
    }

    #[test]
    fn rejects_empty_field_name() {
        let result = Settings::from_lookup(lookup(&[(ENV_ID_FIELD, " ")]));
        assert!(matches!(result, Err(ConfigError::EmptyFieldName(ENV_ID_FIELD))));
    }

    #[test]
    fn rejects_duplicate_field_names() {
        let result = Settings::from_lookup(lookup(&[(ENV_DELETED_FIELD, "id")]));
        assert!(matches!(result, Err(ConfigError::DuplicateFieldName(f)) if f == "id"));
    }

    #[test]
    fn reads_dotenv_file() {
        let path = std::env::temp_dir().join(format!("quiver-settings-{}.env", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{ENV_COLLECTION_NAME}=tasks").unwrap();
        writeln!(file, "{ENV_PARENT_ID}=team-7").unwrap();
        drop(file);

        let settings = Settings::from_dotenv(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(settings.name, "tasks");
        assert_eq!(settings.parent_id, "team-7");
    }

    #[test]
    fn missing_dotenv_file() {
        let result = Settings::from_dotenv("/nonexistent/quiver.env");
        assert!(matches!(result, Err(ConfigError::Dotenv(_))));
    }

    #[test]
    fn deserializes_partial_settings() {
        let settings: Settings = serde_json::from_str(r#"{"name": "notes"}"#).unwrap();
        assert_eq!(settings.name, "notes");
        assert_eq!(settings.id_field, "id");
    }
}
