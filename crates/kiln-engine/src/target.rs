//! The contract every node of the build graph implements.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{StoreError, TargetError};
use crate::parents::Parents;
use crate::store::OutputStore;

/// A named byte payload produced (or loaded) by exactly one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    /// Name relative to the output directory. Stable per target kind.
    pub filename: String,
    pub data: Vec<u8>,
}

impl OutputFile {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }

    /// The payload as UTF-8, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

/// Identity of a target kind.
///
/// Identity comes from the concrete Rust type, never from instance data: two
/// values of the same type are the same node of one build. Equality and
/// hashing use only the [`TypeId`]; the name is carried for diagnostics.
#[derive(Clone, Copy)]
pub struct TargetId {
    type_id: TypeId,
    name: &'static str,
}

impl TargetId {
    /// The identity of target kind `T`.
    pub fn of<T: TargetKind>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: T::NAME,
        }
    }

    /// Human-friendly name of the kind.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TargetId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for TargetId {}

impl Hash for TargetId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TargetId({})", self.name)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Upcast helper so resolved targets can be downcast to their concrete kind.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A unit of work in the build graph.
///
/// Per engine run the engine calls `dependencies` (any number of times), then
/// resolves those dependencies, then calls `load`; only if `load` reports
/// `Ok(false)` does it call `generate`. `files` is meaningful afterwards.
pub trait Target: AsAny {
    /// Direct dependencies, in the order they should be resolved.
    ///
    /// Must be pure and return the same list on every call.
    fn dependencies(&self) -> Vec<TargetId>;

    /// Rebuild this target's state from a previous run's output.
    ///
    /// Returns `Ok(false)` when the expected output is absent, which is the
    /// normal first-run case. A present but unusable file is an error.
    ///
    /// # Errors
    /// Returns an error on I/O failure or when prior output cannot be parsed.
    fn load(&mut self, store: &dyn OutputStore) -> Result<bool, TargetError>;

    /// Compute this target's output files from its resolved dependencies.
    ///
    /// # Errors
    /// Returns an error naming the step that failed.
    fn generate(&mut self, parents: &Parents<'_>) -> Result<(), TargetError>;

    /// Files produced by `load` or `generate`; empty before either has run.
    fn files(&self) -> Vec<&OutputFile>;
}

/// A concrete, nameable target kind.
pub trait TargetKind: Target + Sized {
    /// Human-friendly name, also used in error chains.
    const NAME: &'static str;

    fn id() -> TargetId {
        TargetId::of::<Self>()
    }
}

/// Fetch `name` from `store`, mapping absence to `None`.
///
/// Covers the common `load` shape of a target with a single output file.
///
/// # Errors
/// Returns an error for any store failure other than absence.
pub fn fetch_optional(
    store: &dyn OutputStore,
    name: &str,
) -> Result<Option<OutputFile>, TargetError> {
    match store.fetch_by_name(name) {
        Ok(file) => Ok(Some(file)),
        Err(StoreError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
