//! Ignition configs for the bootstrap, control-plane, and compute machines.

use std::fmt;
use std::marker::PhantomData;

use kiln_config::ClusterSettings;
use kiln_engine::{
    fetch_optional, OutputFile, OutputStore, Parents, Target, TargetError, TargetId, TargetKind,
};
use serde::{Deserialize, Serialize};

use crate::cluster_config::{ClusterConfig, CLUSTER_CONFIG_FILE};

/// Ignition config version written into every config.
pub const IGNITION_VERSION: &str = "3.2.0";

/// A machine role with its own ignition config.
pub trait Role: 'static {
    /// Role name recorded in the config.
    const ROLE: &'static str;
    /// Output file name.
    const FILE: &'static str;
    /// Human-friendly target name.
    const NAME: &'static str;

    /// How many machines of this role the cluster runs.
    fn replicas(settings: &ClusterSettings) -> u32;
}

pub struct BootstrapRole;
pub struct MasterRole;
pub struct WorkerRole;

impl Role for BootstrapRole {
    const ROLE: &'static str = "bootstrap";
    const FILE: &'static str = "bootstrap.ign";
    const NAME: &'static str = "Bootstrap Ignition Config";

    fn replicas(_settings: &ClusterSettings) -> u32 {
        1
    }
}

impl Role for MasterRole {
    const ROLE: &'static str = "master";
    const FILE: &'static str = "master.ign";
    const NAME: &'static str = "Master Ignition Config";

    fn replicas(settings: &ClusterSettings) -> u32 {
        settings.control_plane_replicas
    }
}

impl Role for WorkerRole {
    const ROLE: &'static str = "worker";
    const FILE: &'static str = "worker.ign";
    const NAME: &'static str = "Worker Ignition Config";

    fn replicas(settings: &ClusterSettings) -> u32 {
        settings.compute_replicas
    }
}

pub type Bootstrap = Ignition<BootstrapRole>;
pub type Master = Ignition<MasterRole>;
pub type Worker = Ignition<WorkerRole>;

/// The on-disk ignition document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnitionDoc {
    pub ignition: IgnitionHeader,
    pub kiln: MachineInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passwd: Option<Passwd>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnitionHeader {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineInfo {
    pub role: String,
    pub cluster: String,
    pub cluster_domain: String,
    pub replicas: u32,
    /// SHA-256 of the `cluster-config.toml` this config was built from.
    pub config_sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passwd {
    pub users: Vec<User>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    #[serde(rename = "sshAuthorizedKeys")]
    pub ssh_authorized_keys: Vec<String>,
}

/// The ignition config for machines of role `R`.
pub struct Ignition<R: Role> {
    doc: Option<IgnitionDoc>,
    file: Option<OutputFile>,
    role: PhantomData<R>,
}

impl<R: Role> Default for Ignition<R> {
    fn default() -> Self {
        Self {
            doc: None,
            file: None,
            role: PhantomData,
        }
    }
}

impl<R: Role> fmt::Debug for Ignition<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ignition")
            .field("role", &R::ROLE)
            .field("doc", &self.doc)
            .finish()
    }
}

impl<R: Role> Ignition<R> {
    pub fn doc(&self) -> Option<&IgnitionDoc> {
        self.doc.as_ref()
    }

    /// The rendered config as text, for embedding in other assets.
    ///
    /// # Errors
    /// Returns an error if the config has not been produced or is not UTF-8.
    pub fn contents(&self) -> Result<&str, TargetError> {
        let file = self.file.as_ref().ok_or_else(|| TargetError::MissingFile {
            name: R::NAME.to_owned(),
            file: R::FILE.to_owned(),
        })?;
        file.as_str().ok_or_else(|| TargetError::Parse {
            name: R::FILE.to_owned(),
            message: "content is not valid UTF-8".to_owned(),
        })
    }

    fn render(config: &ClusterConfig) -> Result<IgnitionDoc, TargetError> {
        let settings = config.require_settings()?;
        let file = config.file().ok_or_else(|| TargetError::MissingFile {
            name: ClusterConfig::NAME.to_owned(),
            file: CLUSTER_CONFIG_FILE.to_owned(),
        })?;
        let config_sha256 = kiln_util::hash::sha256_bytes(&file.data);

        Ok(IgnitionDoc {
            ignition: IgnitionHeader {
                version: IGNITION_VERSION.to_owned(),
            },
            kiln: MachineInfo {
                role: R::ROLE.to_owned(),
                cluster: settings.name.clone(),
                cluster_domain: settings.cluster_domain(),
                replicas: R::replicas(settings),
                config_sha256,
            },
            passwd: settings.ssh_key.as_ref().map(|key| Passwd {
                users: vec![User {
                    name: "core".to_owned(),
                    ssh_authorized_keys: vec![key.clone()],
                }],
            }),
        })
    }
}

impl<R: Role> Target for Ignition<R> {
    fn dependencies(&self) -> Vec<TargetId> {
        vec![ClusterConfig::id()]
    }

    fn load(&mut self, store: &dyn OutputStore) -> Result<bool, TargetError> {
        let Some(file) = fetch_optional(store, R::FILE)? else {
            return Ok(false);
        };
        let doc: IgnitionDoc =
            serde_json::from_slice(&file.data).map_err(|e| TargetError::Parse {
                name: R::FILE.to_owned(),
                message: e.to_string(),
            })?;
        if doc.kiln.role != R::ROLE {
            return Err(TargetError::Parse {
                name: R::FILE.to_owned(),
                message: format!("expected role \"{}\", found \"{}\"", R::ROLE, doc.kiln.role),
            });
        }

        self.doc = Some(doc);
        self.file = Some(file);
        Ok(true)
    }

    fn generate(&mut self, parents: &Parents<'_>) -> Result<(), TargetError> {
        let config = parents.get::<ClusterConfig>()?;
        let doc = Self::render(config)?;
        let data = serde_json::to_vec_pretty(&doc)
            .map_err(|e| TargetError::step("failed to render ignition config", e))?;

        self.file = Some(OutputFile::new(R::FILE, data));
        self.doc = Some(doc);
        Ok(())
    }

    fn files(&self) -> Vec<&OutputFile> {
        self.file.iter().collect()
    }
}

impl<R: Role> TargetKind for Ignition<R> {
    const NAME: &'static str = R::NAME;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use kiln_config::Manifest;
    use kiln_engine::{Catalog, Engine, EngineError, MemoryStore, Outcome};

    use super::*;

    fn catalog(ssh_key: Option<&str>) -> Catalog {
        let mut settings = Manifest::with_cluster("demo", "example.com").cluster;
        settings.compute_replicas = 2;
        settings.ssh_key = ssh_key.map(str::to_owned);
        crate::catalog(settings)
    }

    #[test]
    fn roles_are_distinct_targets() {
        assert_ne!(Bootstrap::id(), Master::id());
        assert_ne!(Master::id(), Worker::id());
        assert_eq!(Worker::id().name(), "Worker Ignition Config");
    }

    #[test]
    fn generate_uses_role_replicas() {
        let catalog = catalog(None);
        let store = MemoryStore::new();
        let mut engine = Engine::new(&catalog, &store);

        let master = engine.fetch::<Master>().unwrap().doc().cloned().unwrap();
        assert_eq!(master.kiln.role, "master");
        assert_eq!(master.kiln.replicas, 3);
        assert_eq!(master.kiln.cluster_domain, "demo.example.com");
        assert_eq!(master.ignition.version, IGNITION_VERSION);
        assert!(master.passwd.is_none());

        let worker = engine.fetch::<Worker>().unwrap().doc().cloned().unwrap();
        assert_eq!(worker.kiln.replicas, 2);

        let bootstrap = engine.fetch::<Bootstrap>().unwrap().doc().cloned().unwrap();
        assert_eq!(bootstrap.kiln.replicas, 1);

        // All three share one cluster config.
        assert_eq!(master.kiln.config_sha256, worker.kiln.config_sha256);
        assert_eq!(master.kiln.config_sha256.len(), 64);
    }

    #[test]
    fn ssh_key_becomes_core_user() {
        let catalog = catalog(Some("ssh-ed25519 AAAA test"));
        let store = MemoryStore::new();
        let mut engine = Engine::new(&catalog, &store);

        let worker = engine.fetch::<Worker>().unwrap();
        let contents = worker.contents().unwrap();
        assert!(contents.contains("sshAuthorizedKeys"), "contents: {contents}");
        let passwd = worker.doc().unwrap().passwd.clone().unwrap();
        assert_eq!(passwd.users.first().unwrap().name, "core");
    }

    #[test]
    fn load_reuses_previous_config() {
        let catalog = catalog(None);
        let mut store = MemoryStore::new();
        {
            let first = MemoryStore::new();
            let mut engine = Engine::new(&catalog, &first);
            store.absorb(engine.fetch::<Bootstrap>().unwrap());
        }

        let mut engine = Engine::new(&catalog, &store);
        engine.fetch::<Bootstrap>().unwrap();
        assert_eq!(engine.outcome(Bootstrap::id()), Some(Outcome::Loaded));
    }

    #[test]
    fn load_rejects_wrong_role() {
        let catalog = catalog(None);
        let mut store = MemoryStore::new();
        {
            let first = MemoryStore::new();
            let mut engine = Engine::new(&catalog, &first);
            let worker = engine.fetch::<Worker>().unwrap();
            store.insert(MasterRole::FILE, worker.contents().unwrap());
        }

        let mut engine = Engine::new(&catalog, &store);
        let err = engine.fetch::<Master>().unwrap_err();
        assert!(matches!(err, EngineError::Load { .. }), "error was: {err}");
        assert!(err.to_string().contains("expected role"), "error was: {err}");
    }

    #[test]
    fn load_rejects_garbage() {
        let mut store = MemoryStore::new();
        store.insert(WorkerRole::FILE, "{ not json");

        let mut worker = Worker::default();
        let err = worker.load(&store).unwrap_err();
        assert!(matches!(err, TargetError::Parse { .. }), "error was: {err}");
    }

    #[test]
    fn contents_before_generate_is_error() {
        let worker = Worker::default();
        assert!(matches!(
            worker.contents(),
            Err(TargetError::MissingFile { .. })
        ));
    }

    #[test]
    fn config_without_file_is_missing() {
        let settings = Manifest::with_cluster("demo", "example.com").cluster;
        let config = ClusterConfig::without_file(settings);
        let parents = Parents::new([(ClusterConfig::id(), &config as &dyn Target)]);

        let mut master = Master::default();
        let err = master.generate(&parents).unwrap_err();
        assert!(matches!(err, TargetError::MissingFile { .. }), "error was: {err}");
        assert!(err.to_string().contains(CLUSTER_CONFIG_FILE), "error was: {err}");
        assert!(master.files().is_empty());
        assert!(master.doc().is_none());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Whatever a previous run left behind, load reports an error
            /// instead of panicking, and only accepts its own role.
            #[test]
            fn load_never_panics(data in proptest::collection::vec(any::<u8>(), 0..512)) {
                let mut store = MemoryStore::new();
                store.insert(WorkerRole::FILE, data);
                let mut worker = Worker::default();
                if let Ok(found) = worker.load(&store) {
                    prop_assert!(found);
                    prop_assert_eq!(worker.doc().map(|d| d.kiln.role.as_str()), Some("worker"));
                }
            }
        }
    }
}
