//! Filesystem utilities for kiln.

use std::path::{Path, PathBuf};

use crate::error::UtilError;

/// Create a directory and all parent directories if they do not exist.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> Result<(), UtilError> {
    std::fs::create_dir_all(path).map_err(|source| UtilError::io("create", path, source))
}

/// Write `data` to `path` atomically.
///
/// The bytes go to a sibling temp file first and are renamed into place, so a
/// reader never observes a half-written file. Parent directories are created.
///
/// # Errors
/// Returns an error if the parent directory, the temp file, or the rename fails.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), UtilError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let Some(file_name) = path.file_name() else {
        return Err(UtilError::NotAFile {
            path: path.display().to_string(),
        });
    };
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, data).map_err(|source| UtilError::io("write", &tmp_path, source))?;
    std::fs::rename(&tmp_path, path).map_err(|source| UtilError::io("replace", path, source))?;
    Ok(())
}

/// Remove a directory and all its contents. No error if the directory is absent.
///
/// # Errors
/// Returns an error if the directory exists but cannot be removed.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<(), UtilError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(UtilError::io("remove", path, source)),
    }
}

/// Collect regular files under `dir` matching the glob `pattern`.
///
/// Returned paths are relative to `dir` and sorted. A missing `dir` yields an
/// empty list.
///
/// # Errors
/// Returns an error if the glob pattern is invalid.
pub fn glob_relative(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, UtilError> {
    // Only `pattern` is a glob; the root is matched literally.
    let root = glob::Pattern::escape(&dir.display().to_string());
    let full_pattern_str = Path::new(&root).join(pattern).display().to_string();

    let mut paths: Vec<PathBuf> = glob::glob(&full_pattern_str)
        .map_err(|e| UtilError::GlobPattern {
            pattern: pattern.to_owned(),
            message: e.to_string(),
        })?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .filter_map(|p| p.strip_prefix(dir).ok().map(Path::to_path_buf))
        .collect();

    paths.sort();
    Ok(paths)
}
