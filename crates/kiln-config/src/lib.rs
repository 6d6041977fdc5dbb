//! Parse and validate `kiln.toml` and the `.kiln/state.toml` build record.

pub mod manifest;
pub mod state;

pub use manifest::{ClusterSettings, Manifest};
pub use state::BuildRecord;
