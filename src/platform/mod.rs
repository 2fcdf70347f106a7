//! Platform tree expansion: typed tree, VM catalog, per-scope artifacts.

pub mod artifact;
pub mod catalog;
pub mod descriptor;
pub mod expander;
pub mod node;

pub use artifact::{read_artifact, write_artifact, ResolvedVm, ScopeConfigArtifact};
pub use catalog::{StandardCatalog, VmClass};
pub use expander::{distribute, DistributionSummary, Expander};
pub use node::{PlatformNode, VmRequest};
