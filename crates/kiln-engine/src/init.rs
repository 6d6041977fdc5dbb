//! Project scaffolding for `kiln init`.

use std::path::Path;

use kiln_config::manifest::{Manifest, MANIFEST_FILE};

use crate::error::EngineError;

/// Base domain written into freshly scaffolded manifests.
pub const DEFAULT_BASE_DOMAIN: &str = "example.com";

/// Scaffold a new kiln project.
///
/// Creates the project directory (if it doesn't exist), a `kiln.toml` manifest
/// describing a cluster named `name`, and a `.gitignore` covering generated
/// state.
///
/// # Errors
/// Returns an error if:
/// - A `kiln.toml` already exists in `dir`
/// - `name` is not a valid cluster name
/// - The directory or files cannot be created
pub fn init_project(name: &str, dir: &Path) -> Result<(), EngineError> {
    let manifest_path = dir.join(MANIFEST_FILE);

    if manifest_path.exists() {
        return Err(EngineError::ProjectExists {
            path: manifest_path.display().to_string(),
        });
    }

    let manifest = Manifest::with_cluster(name, DEFAULT_BASE_DOMAIN);
    manifest
        .cluster
        .validate(&manifest_path.display().to_string())?;

    kiln_util::fs::ensure_dir(dir)?;

    let toml_content = manifest.to_toml_string()?;
    std::fs::write(&manifest_path, toml_content).map_err(|source| EngineError::Io {
        path: manifest_path.display().to_string(),
        source,
    })?;

    let gitignore_path = dir.join(".gitignore");
    let gitignore = format!(".kiln/\n/{}/\n", manifest.output.dir);
    std::fs::write(&gitignore_path, gitignore).map_err(|source| EngineError::Io {
        path: gitignore_path.display().to_string(),
        source,
    })?;

    Ok(())
}
