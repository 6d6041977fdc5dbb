//! The cluster asset catalog: install settings, ignition configs, and
//! terraform variables.

pub mod cluster_config;
pub mod ignition;
pub mod tfvars;

use kiln_config::ClusterSettings;
use kiln_engine::Catalog;

pub use cluster_config::ClusterConfig;
pub use ignition::{Bootstrap, Ignition, Master, Role, Worker};
pub use tfvars::TerraformVariables;

/// Every target kind kiln knows how to build, seeded with `settings`.
pub fn catalog(settings: ClusterSettings) -> Catalog {
    let mut catalog = Catalog::new();
    catalog
        .register_with(move || ClusterConfig::seeded(settings.clone()))
        .register::<Bootstrap>()
        .register::<Master>()
        .register::<Worker>()
        .register::<TerraformVariables>();
    catalog
}
