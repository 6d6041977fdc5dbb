//! Explicit registry of the target kinds one build may instantiate.

use crate::target::{Target, TargetId, TargetKind};

type Factory = Box<dyn Fn() -> Box<dyn Target>>;

/// The known target kinds of a build and how to construct each.
///
/// Built once per build invocation and only read while the engine runs.
#[derive(Default)]
pub struct Catalog {
    entries: Vec<(TargetId, Factory)>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T`, constructed with `Default`.
    pub fn register<T: TargetKind + Default>(&mut self) -> &mut Self {
        self.register_with(T::default)
    }

    /// Register `T` with a custom constructor, replacing any earlier entry for `T`.
    pub fn register_with<T: TargetKind>(&mut self, factory: impl Fn() -> T + 'static) -> &mut Self {
        let id = T::id();
        let factory: Factory = Box::new(move || -> Box<dyn Target> { Box::new(factory()) });
        if let Some(entry) = self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            entry.1 = factory;
        } else {
            self.entries.push((id, factory));
        }
        self
    }

    pub fn contains(&self, id: TargetId) -> bool {
        self.entries.iter().any(|(existing, _)| *existing == id)
    }

    /// Registered kinds in registration order.
    pub fn ids(&self) -> Vec<TargetId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    /// Look a kind up by name, ignoring case and treating `-`/`_` as spaces.
    pub fn find(&self, name: &str) -> Option<TargetId> {
        let wanted = normalize(name);
        self.entries
            .iter()
            .map(|(id, _)| *id)
            .find(|id| normalize(id.name()) == wanted)
    }

    /// Construct a fresh, not yet built instance of `id`.
    pub fn instantiate(&self, id: TargetId) -> Option<Box<dyn Target>> {
        self.entries
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, factory)| factory())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c == '-' || c == '_' { ' ' } else { c.to_ascii_lowercase() })
        .collect()
}
