use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// File name of the project manifest.
pub const MANIFEST_FILE: &str = "kiln.toml";

/// The `kiln.toml` project manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub cluster: ClusterSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

/// Cluster parameters every generated asset is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSettings {
    pub name: String,
    pub base_domain: String,
    #[serde(default = "default_replicas")]
    pub control_plane_replicas: u32,
    #[serde(default = "default_replicas")]
    pub compute_replicas: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,
}

/// Where produced files are written between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_replicas() -> u32 {
    3
}

fn default_output_dir() -> String {
    "build".to_owned()
}

impl Manifest {
    /// A manifest with default replica counts and output directory.
    pub fn with_cluster(name: &str, base_domain: &str) -> Self {
        Self {
            cluster: ClusterSettings {
                name: name.to_owned(),
                base_domain: base_domain.to_owned(),
                control_plane_replicas: default_replicas(),
                compute_replicas: default_replicas(),
                ssh_key: None,
            },
            output: OutputSettings::default(),
        }
    }

    /// Read and parse a `kiln.toml` from the given path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, contains invalid TOML, or
    /// fails validation.
    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str_at(&content, &path.display().to_string())
    }

    /// Parse manifest content; `origin` names the source in error messages.
    ///
    /// # Errors
    /// Returns an error if the content is invalid TOML or fails validation.
    pub fn from_str_at(content: &str, origin: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = toml::from_str(content).map_err(|e| ManifestError::Parse {
            path: origin.to_owned(),
            source: e,
        })?;
        manifest.cluster.validate(origin)?;
        manifest.output.validate(origin)?;
        Ok(manifest)
    }

    /// Serialize the manifest as human-readable TOML.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ManifestError> {
        toml::to_string_pretty(self).map_err(|source| ManifestError::Serialize { source })
    }
}

impl OutputSettings {
    /// The output directory is created, overwritten, and removed by kiln, so
    /// it must be a subdirectory of the project root.
    ///
    /// # Errors
    /// Returns `ManifestError::Invalid` for an empty, absolute, or escaping path.
    pub fn validate(&self, origin: &str) -> Result<(), ManifestError> {
        let invalid = |message: &str| ManifestError::Invalid {
            path: origin.to_owned(),
            message: format!("output.dir \"{}\" {message}", self.dir),
        };

        if self.dir.trim().is_empty() {
            return Err(invalid("must not be empty"));
        }
        let path = Path::new(&self.dir);
        if path.is_absolute() || self.dir.starts_with('/') || self.dir.starts_with('\\') {
            return Err(invalid("must be relative to the project root"));
        }
        let mut named = false;
        for component in path.components() {
            match component {
                Component::Normal(_) => named = true,
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(invalid("must not leave the project root"));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(invalid("must be relative to the project root"));
                }
            }
        }
        if !named {
            return Err(invalid("must name a subdirectory of the project root"));
        }
        Ok(())
    }
}

impl ClusterSettings {
    /// Parse a standalone cluster settings document (the `cluster-config.toml` asset).
    ///
    /// # Errors
    /// Returns an error if the content is invalid TOML or fails validation.
    pub fn from_toml(content: &str, origin: &str) -> Result<Self, ManifestError> {
        let settings: ClusterSettings =
            toml::from_str(content).map_err(|e| ManifestError::Parse {
                path: origin.to_owned(),
                source: e,
            })?;
        settings.validate(origin)?;
        Ok(settings)
    }

    /// Serialize the settings as a standalone TOML document.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ManifestError> {
        toml::to_string_pretty(self).map_err(|source| ManifestError::Serialize { source })
    }

    /// Check the invariants every downstream asset relies on.
    ///
    /// # Errors
    /// Returns `ManifestError::Invalid` describing the first violated rule.
    pub fn validate(&self, origin: &str) -> Result<(), ManifestError> {
        let invalid = |message: String| ManifestError::Invalid {
            path: origin.to_owned(),
            message,
        };

        if self.name.is_empty() {
            return Err(invalid("cluster.name must not be empty".to_owned()));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            || self.name.starts_with('-')
            || self.name.ends_with('-')
        {
            return Err(invalid(format!(
                "cluster.name \"{}\" must be lowercase alphanumerics and inner hyphens",
                self.name
            )));
        }
        if self.base_domain.is_empty() || self.base_domain.chars().any(char::is_whitespace) {
            return Err(invalid(format!(
                "cluster.base_domain \"{}\" is not a domain name",
                self.base_domain
            )));
        }
        if self.control_plane_replicas == 0 {
            return Err(invalid(
                "cluster.control_plane_replicas must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    /// Fully qualified cluster domain, `<name>.<base_domain>`.
    pub fn cluster_domain(&self) -> String {
        format!("{}.{}", self.name, self.base_domain)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid TOML at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid settings at {path}: {message}")]
    Invalid { path: String, message: String },
    #[error("cannot serialize settings: {source}")]
    Serialize { source: toml::ser::Error },
}
