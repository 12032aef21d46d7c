//! `mars_admin_env.ini` loader
//!
//! ```ini
//! [environment]
//! JAVA_HOME = /opt/jdk-17
//! MARS_ADMIN_JAR_JVM_OPTS = -Xmx512m
//! ```
//!
//! Only the `[environment]` section is read. Keys keep their case.

use indexmap::IndexMap;
use std::path::Path;

/// Name of the environment file inside the cluster conf dir
pub const ENV_FILE_NAME: &str = "mars_admin_env.ini";

const ENV_SECTION: &str = "environment";

/// Load the `[environment]` section of `path`.
///
/// A missing file yields an empty map.
pub fn load_env_file(path: &Path) -> Result<IndexMap<String, String>, EnvFileError> {
    if !path.is_file() {
        log::debug!("No environment file at {}", path.display());
        return Ok(IndexMap::new());
    }

    let content = std::fs::read_to_string(path).map_err(|e| EnvFileError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    let env = parse_env_ini(&content).map_err(|e| match e {
        EnvFileError::Syntax { line, message, .. } => EnvFileError::Syntax {
            path: path.display().to_string(),
            line,
            message,
        },
        other => other,
    })?;

    log::debug!("Loaded {} variables from {}", env.len(), path.display());
    Ok(env)
}

/// Parse INI text and return the entries of its `[environment]` section
pub fn parse_env_ini(content: &str) -> Result<IndexMap<String, String>, EnvFileError> {
    let mut env: IndexMap<String, String> = IndexMap::new();
    let mut section: Option<String> = None;
    let mut last_key: Option<String> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        // Indented lines continue the previous value
        if raw.starts_with(char::is_whitespace) && section.is_some() {
            if let Some(value) = last_key.as_ref().and_then(|key| env.get_mut(key)) {
                value.push('\n');
                value.push_str(trimmed);
            }
            continue;
        }

        if let Some(name) = trimmed.strip_prefix('[') {
            let name = name.strip_suffix(']').ok_or_else(|| EnvFileError::Syntax {
                path: String::new(),
                line: line_no,
                message: format!("unclosed section header '{}'", trimmed),
            })?;
            section = Some(name.trim().to_string());
            last_key = None;
            continue;
        }

        let Some(split) = trimmed.find(['=', ':']) else {
            return Err(EnvFileError::Syntax {
                path: String::new(),
                line: line_no,
                message: format!("expected 'key = value', got '{}'", trimmed),
            });
        };

        if section.as_deref() != Some(ENV_SECTION) {
            last_key = None;
            continue;
        }

        let key = trimmed[..split].trim().to_string();
        let value = trimmed[split + 1..].trim().to_string();
        env.insert(key.clone(), value);
        last_key = Some(key);
    }

    Ok(env)
}

/// Errors loading the environment file
#[derive(Debug, thiserror::Error)]
pub enum EnvFileError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Syntax {
        path: String,
        line: usize,
        message: String,
    },
}
