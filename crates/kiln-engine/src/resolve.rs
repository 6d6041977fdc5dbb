//! Depth-first, memoized resolution of the target graph.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::error::EngineError;
use crate::parents::Parents;
use crate::store::OutputStore;
use crate::target::{Target, TargetId, TargetKind};

/// How a target was completed in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Reconstructed from a previous run's output.
    Loaded,
    /// Computed from its dependencies.
    Generated,
}

struct Completed {
    target: Box<dyn Target>,
    outcome: Outcome,
}

impl Completed {
    fn target(&self) -> &dyn Target {
        self.target.as_ref()
    }
}

/// Builds targets from a catalog, at most once each per engine.
///
/// The build cache lives exactly as long as the engine. A failed
/// [`resolve`](Engine::resolve) leaves the engine unusable for a consistent
/// result; callers should drop it rather than persist anything from it.
pub struct Engine<'a> {
    catalog: &'a Catalog,
    store: &'a dyn OutputStore,
    cache: HashMap<TargetId, Completed>,
    /// Completion order, dependencies before dependents.
    order: Vec<TargetId>,
}

impl<'a> Engine<'a> {
    pub fn new(catalog: &'a Catalog, store: &'a dyn OutputStore) -> Self {
        Self {
            catalog,
            store,
            cache: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Resolve the requested targets and everything they depend on.
    ///
    /// # Algorithm
    /// 1. A target already in the build cache is returned as is.
    /// 2. Otherwise it goes onto the in-progress path and its dependencies are
    ///    resolved recursively, in declaration order.
    /// 3. Meeting a target that is already on the path is a cycle.
    /// 4. With all dependencies complete, `load` is attempted; if it finds
    ///    nothing, `generate` runs with the completed dependencies.
    /// 5. The target leaves the path and enters the cache.
    ///
    /// The returned instances are in the order requested.
    ///
    /// # Errors
    /// Returns the first error met along the walk: an unknown target, a cycle,
    /// or a failing `load`/`generate`, annotated with the resolution chain.
    pub fn resolve(&mut self, requested: &[TargetId]) -> Result<Vec<&dyn Target>, EngineError> {
        for id in requested {
            let mut path = Vec::new();
            self.resolve_one(*id, &mut path)?;
        }

        requested
            .iter()
            .map(|id| {
                self.get(*id).ok_or_else(|| EngineError::NotResolved {
                    name: id.name().to_owned(),
                })
            })
            .collect()
    }

    /// Resolve `T` and return it as its concrete type.
    ///
    /// # Errors
    /// Same as [`resolve`](Engine::resolve).
    pub fn fetch<T: TargetKind>(&mut self) -> Result<&T, EngineError> {
        let id = T::id();
        self.resolve_one(id, &mut Vec::new())?;
        self.get(id)
            .and_then(|target| target.as_any().downcast_ref::<T>())
            .ok_or_else(|| EngineError::NotResolved {
                name: T::NAME.to_owned(),
            })
    }

    /// A completed target, if it has been resolved by this engine.
    pub fn get(&self, id: TargetId) -> Option<&dyn Target> {
        self.cache.get(&id).map(Completed::target)
    }

    /// How `id` was completed, if it has been.
    pub fn outcome(&self, id: TargetId) -> Option<Outcome> {
        self.cache.get(&id).map(|c| c.outcome)
    }

    /// Every completed target with its outcome, dependencies first.
    pub fn completed(&self) -> impl Iterator<Item = (TargetId, Outcome, &dyn Target)> + '_ {
        self.order.iter().filter_map(move |id| {
            self.cache
                .get(id)
                .map(|c| (*id, c.outcome, c.target()))
        })
    }

    fn resolve_one(&mut self, id: TargetId, path: &mut Vec<TargetId>) -> Result<(), EngineError> {
        if self.cache.contains_key(&id) {
            debug!(asset = %id, "already built in this run");
            return Ok(());
        }

        if let Some(start) = path.iter().position(|p| *p == id) {
            let participants: Vec<String> = path
                .get(start..)
                .unwrap_or(path.as_slice())
                .iter()
                .map(|p| p.name().to_owned())
                .collect();
            let cycle = participants
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(id.name()))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(EngineError::Cycle {
                cycle,
                participants,
            });
        }

        path.push(id);

        let Some(mut target) = self.catalog.instantiate(id) else {
            return Err(EngineError::UnknownTarget {
                name: id.name().to_owned(),
                chain: chain(path.as_slice()),
            });
        };

        let dependencies = target.dependencies();
        for dep in &dependencies {
            self.resolve_one(*dep, path)?;
        }

        debug!(asset = %id, "attempting to load previous output");
        let found = target
            .load(self.store)
            .map_err(|source| EngineError::Load {
                target: id.name().to_owned(),
                chain: chain(path.as_slice()),
                source,
            })?;

        let outcome = if found {
            info!(asset = %id, "loaded from previous output");
            Outcome::Loaded
        } else {
            let parents = Parents::new(
                dependencies
                    .iter()
                    .filter_map(|dep| self.cache.get(dep).map(|c| (*dep, c.target()))),
            );
            target
                .generate(&parents)
                .map_err(|source| EngineError::Generate {
                    target: id.name().to_owned(),
                    chain: chain(path.as_slice()),
                    source,
                })?;
            info!(asset = %id, files = target.files().len(), "generated");
            Outcome::Generated
        };

        path.pop();
        self.cache.insert(id, Completed { target, outcome });
        self.order.push(id);
        Ok(())
    }
}

fn chain(path: &[TargetId]) -> String {
    path.iter()
        .map(TargetId::name)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::error::TargetError;
    use crate::store::MemoryStore;
    use crate::target::{fetch_optional, OutputFile};

    /// Calls observed across every target of one test, in order.
    type Journal = Rc<RefCell<Vec<String>>>;

    fn record(journal: &Journal, entry: String) {
        journal.borrow_mut().push(entry);
    }

    fn count(journal: &Journal, entry: &str) -> usize {
        journal.borrow().iter().filter(|e| *e == entry).count()
    }

    fn position(journal: &Journal, entry: &str) -> usize {
        journal
            .borrow()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("{entry} never happened"))
    }

    /// Declares a test target kind whose behavior is driven by its fields.
    macro_rules! test_target {
        ($ty:ident, $name:literal, $file:literal, [$($dep:ident),*]) => {
            struct $ty {
                journal: Journal,
                fail_generate: bool,
                file: Option<OutputFile>,
            }

            impl $ty {
                fn with(journal: &Journal) -> Self {
                    Self { journal: Rc::clone(journal), fail_generate: false, file: None }
                }
            }

            impl Target for $ty {
                fn dependencies(&self) -> Vec<TargetId> {
                    vec![$($dep::id()),*]
                }

                fn load(&mut self, store: &dyn OutputStore) -> Result<bool, TargetError> {
                    record(&self.journal, format!("load {}", $name));
                    self.file = fetch_optional(store, $file)?;
                    if let Some(file) = &self.file {
                        if file.data == b"corrupt" {
                            return Err(TargetError::Parse {
                                name: $file.to_owned(),
                                message: "unexpected content".to_owned(),
                            });
                        }
                    }
                    Ok(self.file.is_some())
                }

                fn generate(&mut self, parents: &Parents<'_>) -> Result<(), TargetError> {
                    record(&self.journal, format!("generate {}", $name));
                    if self.fail_generate {
                        return Err(TargetError::step(
                            "failed to render",
                            std::io::Error::new(std::io::ErrorKind::Other, "boom"),
                        ));
                    }
                    #[allow(unused_mut)]
                    let mut data = String::from($name);
                    $(
                        let parent = parents.get::<$dep>()?;
                        for file in parent.files() {
                            data.push('|');
                            data.push_str(&file.filename);
                        }
                    )*
                    let _ = parents;
                    self.file = Some(OutputFile::new($file, data));
                    Ok(())
                }

                fn files(&self) -> Vec<&OutputFile> {
                    self.file.iter().collect()
                }
            }

            impl TargetKind for $ty {
                const NAME: &'static str = $name;
            }
        };
    }

    test_target!(Config, "Config", "config.toml", []);
    test_target!(Bootstrap, "Bootstrap", "bootstrap.ign", [Config]);
    test_target!(Master, "Master", "master.ign", [Config]);
    test_target!(Worker, "Worker", "worker.ign", [Config]);
    test_target!(Final, "Final", "final.json", [Bootstrap, Master, Worker]);

    test_target!(CycleA, "CycleA", "a.txt", [CycleB]);
    test_target!(CycleB, "CycleB", "b.txt", [CycleA]);
    test_target!(SelfLoop, "SelfLoop", "self.txt", [SelfLoop]);
    test_target!(Twice, "Twice", "twice.txt", [Config, Config]);
    test_target!(Orphan, "Orphan", "orphan.txt", [Unregistered]);

    // Never registered and never built; only its id is used.
    #[allow(dead_code)]
    struct Unregistered;

    impl Target for Unregistered {
        fn dependencies(&self) -> Vec<TargetId> {
            Vec::new()
        }

        fn load(&mut self, _store: &dyn OutputStore) -> Result<bool, TargetError> {
            Ok(false)
        }

        fn generate(&mut self, _parents: &Parents<'_>) -> Result<(), TargetError> {
            Ok(())
        }

        fn files(&self) -> Vec<&OutputFile> {
            Vec::new()
        }
    }

    impl TargetKind for Unregistered {
        const NAME: &'static str = "Unregistered";
    }

    fn catalog(journal: &Journal) -> Catalog {
        let mut catalog = Catalog::new();
        let j = Rc::clone(journal);
        catalog.register_with(move || Config::with(&j));
        let j = Rc::clone(journal);
        catalog.register_with(move || Bootstrap::with(&j));
        let j = Rc::clone(journal);
        catalog.register_with(move || Master::with(&j));
        let j = Rc::clone(journal);
        catalog.register_with(move || Worker::with(&j));
        let j = Rc::clone(journal);
        catalog.register_with(move || Final::with(&j));
        let j = Rc::clone(journal);
        catalog.register_with(move || CycleA::with(&j));
        let j = Rc::clone(journal);
        catalog.register_with(move || CycleB::with(&j));
        let j = Rc::clone(journal);
        catalog.register_with(move || SelfLoop::with(&j));
        let j = Rc::clone(journal);
        catalog.register_with(move || Twice::with(&j));
        let j = Rc::clone(journal);
        catalog.register_with(move || Orphan::with(&j));
        catalog
    }

    #[test]
    fn diamond_builds_shared_dependency_once() {
        let journal = Journal::default();
        let catalog = catalog(&journal);
        let store = MemoryStore::new();
        let mut engine = Engine::new(&catalog, &store);

        engine.resolve(&[Final::id()]).unwrap();

        assert_eq!(count(&journal, "load Config"), 1);
        assert_eq!(count(&journal, "generate Config"), 1);
        let config_done = position(&journal, "generate Config");
        for sibling in ["Bootstrap", "Master", "Worker"] {
            let generated = position(&journal, &format!("generate {sibling}"));
            assert!(config_done < generated, "{sibling} generated before Config");
            assert!(generated < position(&journal, "generate Final"));
        }
    }

    #[test]
    fn final_receives_all_three_parent_files() {
        let journal = Journal::default();
        let catalog = catalog(&journal);
        let store = MemoryStore::new();
        let mut engine = Engine::new(&catalog, &store);

        let final_target = engine.fetch::<Final>().unwrap();
        let file = final_target.files().first().copied().unwrap();
        assert_eq!(
            file.as_str(),
            Some("Final|bootstrap.ign|master.ign|worker.ign")
        );
    }

    #[test]
    fn every_requester_sees_the_same_instance() {
        let journal = Journal::default();
        let catalog = catalog(&journal);
        let store = MemoryStore::new();
        let mut engine = Engine::new(&catalog, &store);

        let resolved = engine
            .resolve(&[Config::id(), Final::id(), Config::id()])
            .unwrap();
        assert_eq!(resolved.len(), 3);
        let first: *const dyn Target = resolved.first().copied().unwrap();
        let last: *const dyn Target = resolved.last().copied().unwrap();
        assert!(std::ptr::addr_eq(first, last));

        let again = engine.resolve(&[Config::id()]).unwrap();
        assert!(std::ptr::addr_eq(again.first().copied().unwrap(), first));
        assert_eq!(count(&journal, "generate Config"), 1);
        assert_eq!(count(&journal, "load Config"), 1);
    }

    #[test]
    fn completion_order_is_dependencies_first() {
        let journal = Journal::default();
        let catalog = catalog(&journal);
        let store = MemoryStore::new();
        let mut engine = Engine::new(&catalog, &store);
        engine.resolve(&[Final::id()]).unwrap();

        let order: Vec<&str> = engine.completed().map(|(id, _, _)| id.name()).collect();
        assert_eq!(order, vec!["Config", "Bootstrap", "Master", "Worker", "Final"]);
    }

    #[test]
    fn duplicate_declaration_is_a_cache_hit() {
        let journal = Journal::default();
        let catalog = catalog(&journal);
        let store = MemoryStore::new();
        let mut engine = Engine::new(&catalog, &store);

        let twice = engine.fetch::<Twice>().unwrap();
        assert_eq!(
            twice.files().first().copied().unwrap().as_str(),
            Some("Twice|config.toml|config.toml")
        );
        assert_eq!(count(&journal, "generate Config"), 1);
    }

    #[test]
    fn load_short_circuits_generate() {
        let journal = Journal::default();
        let catalog = catalog(&journal);
        let mut store = MemoryStore::new();
        store.insert("master.ign", "from a previous run");
        let mut engine = Engine::new(&catalog, &store);

        let master = engine.fetch::<Master>().unwrap();
        assert_eq!(
            master.files().first().copied().unwrap().as_str(),
            Some("from a previous run")
        );
        assert_eq!(count(&journal, "generate Master"), 0);
        assert_eq!(engine.outcome(Master::id()), Some(Outcome::Loaded));
        // Dependencies still complete before the dependent.
        assert_eq!(engine.outcome(Config::id()), Some(Outcome::Generated));
    }

    #[test]
    fn not_found_falls_through_to_generate() {
        let journal = Journal::default();
        let catalog = catalog(&journal);
        let store = MemoryStore::new();
        let mut engine = Engine::new(&catalog, &store);

        engine.fetch::<Config>().unwrap();
        assert!(position(&journal, "load Config") < position(&journal, "generate Config"));
        assert_eq!(engine.outcome(Config::id()), Some(Outcome::Generated));
    }

    #[test]
    fn second_run_loads_everything() {
        let journal = Journal::default();
        let catalog = catalog(&journal);
        let store = {
            let first_run = MemoryStore::new();
            let mut engine = Engine::new(&catalog, &first_run);
            engine.resolve(&[Final::id()]).unwrap();
            let mut persisted = MemoryStore::new();
            for (_, _, target) in engine.completed() {
                persisted.absorb(target);
            }
            persisted
        };
        assert_eq!(store.len(), 5);
        journal.borrow_mut().clear();

        let mut engine = Engine::new(&catalog, &store);
        engine.resolve(&[Final::id()]).unwrap();
        assert!(journal.borrow().iter().all(|e| e.starts_with("load ")));
        assert!(engine
            .completed()
            .all(|(_, outcome, _)| outcome == Outcome::Loaded));
    }

    #[test]
    fn two_node_cycle_is_reported_without_generating() {
        let journal = Journal::default();
        let catalog = catalog(&journal);
        let store = MemoryStore::new();
        let mut engine = Engine::new(&catalog, &store);

        let err = engine.resolve(&[CycleA::id()]).err().unwrap();
        match &err {
            EngineError::Cycle {
                cycle,
                participants,
            } => {
                assert_eq!(cycle, "CycleA -> CycleB -> CycleA");
                assert_eq!(participants, &vec!["CycleA".to_owned(), "CycleB".to_owned()]);
            }
            other => panic!("expected a cycle, got: {other}"),
        }
        assert!(err.to_string().contains("cycle"), "error was: {err}");
        assert_eq!(count(&journal, "generate CycleA"), 0);
        assert_eq!(count(&journal, "generate CycleB"), 0);
        assert!(engine.get(CycleA::id()).is_none());
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let journal = Journal::default();
        let catalog = catalog(&journal);
        let store = MemoryStore::new();
        let mut engine = Engine::new(&catalog, &store);

        let err = engine.fetch::<SelfLoop>().err().unwrap();
        assert!(
            err.to_string().contains("SelfLoop -> SelfLoop"),
            "error was: {err}"
        );
    }

    #[test]
    fn generate_failure_names_target_and_chain() {
        let journal = Journal::default();
        let mut catalog = catalog(&journal);
        let j = Rc::clone(&journal);
        catalog.register_with(move || Config {
            fail_generate: true,
            ..Config::with(&j)
        });
        let store = MemoryStore::new();
        let mut engine = Engine::new(&catalog, &store);

        let err = engine.resolve(&[Final::id()]).err().unwrap();
        match &err {
            EngineError::Generate { target, chain, .. } => {
                assert_eq!(target, "Config");
                assert_eq!(chain, "Final -> Bootstrap -> Config");
            }
            other => panic!("expected a generate error, got: {other}"),
        }
        let message = err.to_string();
        assert!(message.contains("failed to render"), "error was: {message}");
        assert!(message.contains("boom"), "error was: {message}");
        // The walk stops at the first failure.
        assert_eq!(count(&journal, "generate Bootstrap"), 0);
        assert_eq!(count(&journal, "load Master"), 0);
        assert_eq!(count(&journal, "generate Final"), 0);
    }

    #[test]
    fn corrupt_prior_output_is_fatal_not_absent() {
        let journal = Journal::default();
        let catalog = catalog(&journal);
        let mut store = MemoryStore::new();
        store.insert("worker.ign", "corrupt");
        let mut engine = Engine::new(&catalog, &store);

        let err = engine.resolve(&[Final::id()]).err().unwrap();
        match &err {
            EngineError::Load {
                target,
                chain,
                source,
            } => {
                assert_eq!(target, "Worker");
                assert_eq!(chain, "Final -> Worker");
                assert!(matches!(source, TargetError::Parse { .. }));
            }
            other => panic!("expected a load error, got: {other}"),
        }
        assert_eq!(count(&journal, "generate Worker"), 0);
        assert_eq!(count(&journal, "generate Final"), 0);
    }

    #[test]
    fn unknown_dependency_is_reported_with_chain() {
        let journal = Journal::default();
        let catalog = catalog(&journal);
        let store = MemoryStore::new();
        let mut engine = Engine::new(&catalog, &store);

        let err = engine.fetch::<Orphan>().err().unwrap();
        match &err {
            EngineError::UnknownTarget { name, chain } => {
                assert_eq!(name, "Unregistered");
                assert_eq!(chain, "Orphan -> Unregistered");
            }
            other => panic!("expected an unknown target, got: {other}"),
        }
        assert_eq!(count(&journal, "load Orphan"), 0);
    }

    #[test]
    fn empty_request_is_ok() {
        let catalog = Catalog::new();
        let store = MemoryStore::new();
        let mut engine = Engine::new(&catalog, &store);
        assert!(engine.resolve(&[]).unwrap().is_empty());
        assert_eq!(engine.completed().count(), 0);
    }
}
