//! Dependency resolution, memoized construction, and output reuse for kiln targets.

pub mod catalog;
pub mod error;
pub mod init;
pub mod parents;
pub mod persist;
pub mod resolve;
pub mod store;
pub mod target;

pub use catalog::Catalog;
pub use error::{EngineError, StoreError, TargetError};
pub use init::init_project;
pub use parents::Parents;
pub use resolve::{Engine, Outcome};
pub use store::{DirStore, MemoryStore, OutputStore};
pub use target::{fetch_optional, OutputFile, Target, TargetId, TargetKind};
