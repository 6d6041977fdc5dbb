//! Terraform variables tying the cluster settings to the ignition configs.

use kiln_engine::{
    fetch_optional, OutputFile, OutputStore, Parents, Target, TargetError, TargetId, TargetKind,
};
use serde::{Deserialize, Serialize};

use crate::cluster_config::ClusterConfig;
use crate::ignition::{Bootstrap, BootstrapRole, Master, MasterRole, Role, Worker, WorkerRole};

/// File name of the rendered variables.
pub const TFVARS_FILE: &str = "terraform.tfvars.json";

/// Variables handed to terraform when provisioning the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variables {
    pub cluster_name: String,
    pub base_domain: String,
    pub cluster_domain: String,
    pub master_count: u32,
    pub worker_count: u32,
    pub ignition_bootstrap: String,
    pub ignition_master: String,
    pub ignition_worker: String,
    /// Composite digest over the three ignition configs.
    pub ignition_digest: String,
}

#[derive(Debug, Default)]
pub struct TerraformVariables {
    vars: Option<Variables>,
    file: Option<OutputFile>,
}

impl TerraformVariables {
    pub fn variables(&self) -> Option<&Variables> {
        self.vars.as_ref()
    }

    fn render(parents: &Parents<'_>) -> Result<Variables, TargetError> {
        let settings = parents.get::<ClusterConfig>()?.require_settings()?;
        let bootstrap = parents.get::<Bootstrap>()?.contents()?;
        let master = parents.get::<Master>()?.contents()?;
        let worker = parents.get::<Worker>()?.contents()?;

        Ok(Variables {
            cluster_name: settings.name.clone(),
            base_domain: settings.base_domain.clone(),
            cluster_domain: settings.cluster_domain(),
            master_count: settings.control_plane_replicas,
            worker_count: settings.compute_replicas,
            ignition_bootstrap: bootstrap.to_owned(),
            ignition_master: master.to_owned(),
            ignition_worker: worker.to_owned(),
            ignition_digest: kiln_util::hash::digest_files([
                (BootstrapRole::FILE, bootstrap.as_bytes()),
                (MasterRole::FILE, master.as_bytes()),
                (WorkerRole::FILE, worker.as_bytes()),
            ]),
        })
    }
}

impl Target for TerraformVariables {
    fn dependencies(&self) -> Vec<TargetId> {
        vec![
            ClusterConfig::id(),
            Bootstrap::id(),
            Master::id(),
            Worker::id(),
        ]
    }

    fn load(&mut self, store: &dyn OutputStore) -> Result<bool, TargetError> {
        let Some(file) = fetch_optional(store, TFVARS_FILE)? else {
            return Ok(false);
        };
        let vars: Variables =
            serde_json::from_slice(&file.data).map_err(|e| TargetError::Parse {
                name: TFVARS_FILE.to_owned(),
                message: e.to_string(),
            })?;

        self.vars = Some(vars);
        self.file = Some(file);
        Ok(true)
    }

    fn generate(&mut self, parents: &Parents<'_>) -> Result<(), TargetError> {
        let vars = Self::render(parents)?;
        let data = serde_json::to_vec_pretty(&vars)
            .map_err(|e| TargetError::step("failed to render terraform variables", e))?;

        self.file = Some(OutputFile::new(TFVARS_FILE, data));
        self.vars = Some(vars);
        Ok(())
    }

    fn files(&self) -> Vec<&OutputFile> {
        self.file.iter().collect()
    }
}

impl TargetKind for TerraformVariables {
    const NAME: &'static str = "Terraform Variables";
}
