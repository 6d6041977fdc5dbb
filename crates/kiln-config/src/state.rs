use serde::{Deserialize, Serialize};
use std::path::Path;

/// Location of the build record, relative to the project root.
pub const STATE_FILE: &str = ".kiln/state.toml";

/// The `.kiln/state.toml` record of the last successful run.
///
/// Only the fingerprints of produced files are kept; the files themselves
/// live in the output directory and are what later runs load from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BuildRecord {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetRecord>,
}

/// One completed target of the recorded run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub name: String,
    pub outcome: RecordedOutcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileRecord>,
}

/// How the target was completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordedOutcome {
    Loaded,
    Generated,
}

/// A produced file and the SHA-256 of its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    pub sha256: String,
}

impl BuildRecord {
    /// Read and parse a build record from the given path.
    /// Returns an empty record if the file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or contains invalid TOML.
    pub fn from_path(path: &Path) -> Result<Self, StateError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| StateError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let record: BuildRecord = toml::from_str(&content).map_err(|e| StateError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(record)
    }

    /// Look up a target entry by name.
    pub fn target(&self, name: &str) -> Option<&TargetRecord> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Write the record to disk as human-readable TOML.
    ///
    /// Uses atomic write (write-to-temp-then-rename) so an interrupted run
    /// never leaves a truncated record behind.
    ///
    /// # Errors
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<(), StateError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| StateError::Serialize { source: e })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StateError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        let tmp_path = path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, &content).map_err(|e| StateError::Write {
            path: tmp_path.display().to_string(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, path).map_err(|e| StateError::Write {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid build record at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("cannot serialize build record: {source}")]
    Serialize { source: toml::ser::Error },
    #[error("cannot write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}
