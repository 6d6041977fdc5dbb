//! The resolved dependencies handed to one `generate` call.

use std::collections::HashMap;

use crate::error::TargetError;
use crate::target::{Target, TargetId, TargetKind};

/// Completed dependency instances, keyed by identity.
///
/// Borrows the engine's build cache for the duration of a single `generate`
/// call, so a target can read from its dependencies but cannot keep them.
pub struct Parents<'a> {
    resolved: HashMap<TargetId, &'a dyn Target>,
}

impl<'a> Parents<'a> {
    pub fn new(resolved: impl IntoIterator<Item = (TargetId, &'a dyn Target)>) -> Self {
        Self {
            resolved: resolved.into_iter().collect(),
        }
    }

    /// The completed dependency of kind `T`.
    ///
    /// # Errors
    /// Returns [`TargetError::MissingParent`] if `T` was not a declared dependency.
    pub fn get<T: TargetKind>(&self) -> Result<&'a T, TargetError> {
        self.resolved
            .get(&T::id())
            .and_then(|target| {
                let target: &'a dyn Target = *target;
                target.as_any().downcast_ref::<T>()
            })
            .ok_or_else(|| TargetError::MissingParent {
                name: T::NAME.to_owned(),
            })
    }

    pub fn contains(&self, id: TargetId) -> bool {
        self.resolved.contains_key(&id)
    }

    /// Identities present, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = TargetId> + '_ {
        self.resolved.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}
