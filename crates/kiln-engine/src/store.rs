//! Read access to the files a previous run persisted.
//!
//! The engine only ever reads through [`OutputStore`]. Writing produced files
//! back is the job of [`crate::persist`].

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::error::StoreError;
use crate::target::{OutputFile, Target};

/// Named byte blobs left behind by earlier runs.
pub trait OutputStore {
    /// Fetch one file by its name.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] when no such file exists, and other
    /// variants for genuine failures.
    fn fetch_by_name(&self, name: &str) -> Result<OutputFile, StoreError>;

    /// Fetch every file whose name matches a glob pattern, sorted by name.
    ///
    /// Matching nothing is not an error; the result is simply empty.
    ///
    /// # Errors
    /// Returns an error if the pattern is invalid or a matched file cannot be read.
    fn fetch_by_pattern(&self, pattern: &str) -> Result<Vec<OutputFile>, StoreError>;
}

/// Reject names that are empty, absolute, or climb out of the store root.
///
/// # Errors
/// Returns [`StoreError::InvalidName`] describing the problem.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let invalid = |reason: &str| StoreError::InvalidName {
        name: name.to_owned(),
        reason: reason.to_owned(),
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    let path = Path::new(name);
    if path.is_absolute() || name.starts_with('/') || name.starts_with('\\') {
        return Err(invalid("name must be relative"));
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => return Err(invalid("name escapes the output directory")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("name must be relative"))
            }
        }
    }
    Ok(())
}

/// A store backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, name: &str) -> Result<OutputFile, StoreError> {
        let path = self.root.join(name);
        match std::fs::read(&path) {
            Ok(data) => Ok(OutputFile::new(name, data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                name: name.to_owned(),
            }),
            Err(source) => Err(StoreError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

impl OutputStore for DirStore {
    fn fetch_by_name(&self, name: &str) -> Result<OutputFile, StoreError> {
        validate_name(name)?;
        self.read(name)
    }

    fn fetch_by_pattern(&self, pattern: &str) -> Result<Vec<OutputFile>, StoreError> {
        validate_name(pattern)?;
        let matches = kiln_util::fs::glob_relative(&self.root, pattern)?;
        matches
            .iter()
            .map(|relative| {
                // Names use forward slashes regardless of platform.
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                self.read(&name)
            })
            .collect()
    }
}

/// An in-memory store, mainly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file.
    pub fn insert(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.insert(name.into(), data.into());
    }

    /// Copy every file a completed target holds into the store.
    pub fn absorb(&mut self, target: &dyn Target) {
        for file in target.files() {
            self.files.insert(file.filename.clone(), file.data.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl OutputStore for MemoryStore {
    fn fetch_by_name(&self, name: &str) -> Result<OutputFile, StoreError> {
        validate_name(name)?;
        self.files
            .get(name)
            .map(|data| OutputFile::new(name, data.clone()))
            .ok_or_else(|| StoreError::NotFound {
                name: name.to_owned(),
            })
    }

    fn fetch_by_pattern(&self, pattern: &str) -> Result<Vec<OutputFile>, StoreError> {
        validate_name(pattern)?;
        let matcher = glob::Pattern::new(pattern).map_err(|e| {
            StoreError::Util(kiln_util::error::UtilError::GlobPattern {
                pattern: pattern.to_owned(),
                message: e.to_string(),
            })
        })?;
        let options = glob::MatchOptions {
            require_literal_separator: true,
            ..glob::MatchOptions::new()
        };
        Ok(self
            .files
            .iter()
            .filter(|(name, _)| matcher.matches_with(name, options))
            .map(|(name, data)| OutputFile::new(name.clone(), data.clone()))
            .collect())
    }
}
