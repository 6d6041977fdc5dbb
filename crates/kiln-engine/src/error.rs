//! Error types for kiln-engine.

use kiln_config::manifest::ManifestError;
use kiln_config::state::StateError;
use kiln_util::error::UtilError;

/// Errors raised by an [`OutputStore`](crate::store::OutputStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No file with this name exists. Targets treat this as "must generate".
    #[error("{name} not found")]
    NotFound { name: String },

    /// The name would escape the store or is otherwise unusable.
    #[error("invalid output name \"{name}\": {reason}")]
    InvalidName { name: String, reason: String },

    /// The file exists but could not be read or written.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A filesystem helper failed.
    #[error("{0}")]
    Util(#[from] UtilError),
}

impl StoreError {
    /// Whether this is the normal absence signal rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors raised by a target's own `load` or `generate`.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// The output store failed for a reason other than absence.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// A prior output exists but its content is unusable.
    #[error("cannot parse {name}: {message}")]
    Parse { name: String, message: String },

    /// `generate` asked for a dependency it never declared.
    #[error("dependency {name} is not among the resolved dependencies")]
    MissingParent { name: String },

    /// A dependency completed without the file this target consumes.
    #[error("dependency {name} produced no {file}")]
    MissingFile { name: String, file: String },

    /// A named generation step failed.
    #[error("{step}: {source}")]
    Step {
        step: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl TargetError {
    /// Wrap an underlying failure with the step that produced it.
    pub fn step(
        step: &str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Step {
            step: step.to_owned(),
            source: source.into(),
        }
    }
}

/// Errors produced by engine operations.
///
/// Every failure of a target carries the resolution chain from the requested
/// target down to the one that failed.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A requested or declared target is not registered in the catalog.
    #[error("unknown target {name} (via {chain}) — it is not registered in the catalog")]
    UnknownTarget { name: String, chain: String },

    /// The declared dependencies loop back onto the current resolution path.
    #[error("dependency cycle detected: {cycle}")]
    Cycle {
        cycle: String,
        participants: Vec<String>,
    },

    /// A target's `load` failed for a reason other than absence.
    #[error("failed to load {target} (via {chain}): {source}")]
    Load {
        target: String,
        chain: String,
        source: TargetError,
    },

    /// A target's `generate` failed.
    #[error("failed to generate {target} (via {chain}): {source}")]
    Generate {
        target: String,
        chain: String,
        source: TargetError,
    },

    /// A resolved target did not have the requested concrete type.
    #[error("target {name} was not resolved")]
    NotResolved { name: String },

    /// Writing a target's files back to the output directory failed.
    #[error("cannot persist {target}: {source}")]
    Persist { target: String, source: StoreError },

    /// A filesystem operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A utility operation failed.
    #[error("{0}")]
    Util(#[from] UtilError),

    /// A manifest operation failed.
    #[error("{0}")]
    Manifest(#[from] ManifestError),

    /// The build record could not be read or written.
    #[error("{0}")]
    State(#[from] StateError),

    /// A project already exists at the target path.
    #[error("kiln.toml already exists at {path} — cannot initialize over an existing project")]
    ProjectExists { path: String },
}
