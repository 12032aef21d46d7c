//! PID persistence for the launched service

use std::path::{Path, PathBuf};

/// Plain-text file holding the decimal PID of the last launched child.
///
/// Writes go to a sibling temporary file that is renamed over the target,
/// so concurrent launches never leave a torn or mixed file behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file content with `pid`
    pub fn write(&self, pid: u32) -> Result<(), PidFileError> {
        let io_err = |source: std::io::Error| PidFileError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "pid".into());
        tmp_name.push(format!(".{}.tmp", std::process::id()));
        let tmp_path = self.path.with_file_name(tmp_name);

        std::fs::write(&tmp_path, pid.to_string()).map_err(io_err)?;
        if let Err(e) = std::fs::rename(&tmp_path, &self.path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(io_err(e));
        }
        Ok(())
    }

    /// Read the recorded PID, `None` if the file does not exist
    pub fn read(&self) -> Result<Option<u32>, PidFileError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PidFileError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        content
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| PidFileError::Malformed {
                path: self.path.clone(),
                content,
            })
    }
}

/// Errors reading or writing the PID file
#[derive(Debug, thiserror::Error)]
pub enum PidFileError {
    #[error("PID file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("PID file {} does not hold a PID: {content:?}", .path.display())]
    Malformed { path: PathBuf, content: String },
}
