//! Configuration value lookup over the YAML config files
//!
//! Later sources override earlier ones:
//! 1. `<dir>/mars-defaults.yaml`
//! 2. `<dir>/mars-admin.yaml`
//! 3. the `--config` file
//! 4. `-c key=value` overrides

use serde_yaml::{Mapping, Value};
use std::path::Path;

pub const DEFAULTS_FILE_NAME: &str = "mars-defaults.yaml";
pub const CONFIG_FILE_NAME: &str = "mars-admin.yaml";

/// Merged view of every configuration source for one lookup directory
#[derive(Debug, Clone, Default)]
pub struct ConfigValues {
    values: Mapping,
}

impl ConfigValues {
    /// Load the sources for `dir` plus the optional `--config` file and overrides
    pub fn load(
        dir: &Path,
        conf_file: Option<&Path>,
        overrides: &[String],
    ) -> Result<Self, ConfigValueError> {
        let mut values = Self::default();

        for path in [dir.join(DEFAULTS_FILE_NAME), dir.join(CONFIG_FILE_NAME)] {
            if path.is_file() {
                values.merge_file(&path)?;
            }
        }

        if let Some(path) = conf_file {
            if !path.is_file() {
                return Err(ConfigValueError::MissingFile(path.display().to_string()));
            }
            values.merge_file(path)?;
        }

        for entry in overrides {
            values.apply_override(entry)?;
        }

        Ok(values)
    }

    /// Parse a YAML document into a value set
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigValueError> {
        let mut values = Self::default();
        values.merge_yaml(yaml, "<inline>")?;
        Ok(values)
    }

    fn merge_file(&mut self, path: &Path) -> Result<(), ConfigValueError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigValueError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        log::debug!("Merging configuration from {}", path.display());
        self.merge_yaml(&content, &path.display().to_string())
    }

    fn merge_yaml(&mut self, yaml: &str, origin: &str) -> Result<(), ConfigValueError> {
        let parsed: Value = serde_yaml::from_str(yaml).map_err(|e| ConfigValueError::Yaml {
            origin: origin.to_string(),
            source: e,
        })?;

        match parsed {
            Value::Mapping(map) => {
                for (key, value) in map {
                    self.values.insert(key, value);
                }
                Ok(())
            }
            // An empty file parses as null
            Value::Null => Ok(()),
            _ => Err(ConfigValueError::NotAMapping(origin.to_string())),
        }
    }

    /// Apply a `key=value` override; the value is read as a YAML scalar
    pub fn apply_override(&mut self, entry: &str) -> Result<(), ConfigValueError> {
        let (key, raw) = entry
            .split_once('=')
            .ok_or_else(|| ConfigValueError::InvalidOverride(entry.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigValueError::InvalidOverride(entry.to_string()));
        }

        let value =
            serde_yaml::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        self.values.insert(Value::String(key.to_string()), value);
        Ok(())
    }

    /// Rendered value of `name`, `None` when missing or null.
    ///
    /// Flat dotted keys (`mars.admin.log.dir: ...`) are tried first, then
    /// the same path through nested mappings.
    pub fn get(&self, name: &str) -> Option<String> {
        let value = self
            .values
            .get(name)
            .or_else(|| lookup_nested(&self.values, name))?;
        render(value)
    }
}

fn lookup_nested<'a>(map: &'a Mapping, name: &str) -> Option<&'a Value> {
    let mut parts = name.split('.');
    let mut current = map.get(parts.next()?)?;
    for part in parts {
        current = current.as_mapping()?.get(part)?;
    }
    Some(current)
}

fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Sequence(items) => Some(
            items
                .iter()
                .filter_map(render)
                .collect::<Vec<_>>()
                .join(" "),
        ),
        Value::Mapping(_) => serde_yaml::to_string(value)
            .ok()
            .map(|s| s.trim_end().to_string()),
        Value::Tagged(tagged) => render(&tagged.value),
    }
}

/// Errors loading configuration values
#[derive(Debug, thiserror::Error)]
pub enum ConfigValueError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in {origin}: {source}")]
    Yaml {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Configuration in {0} is not a mapping")]
    NotAMapping(String),

    #[error("Configuration file not found: {0}")]
    MissingFile(String),

    #[error("Invalid config override '{0}'. Expected 'key=value'")]
    InvalidOverride(String),
}
