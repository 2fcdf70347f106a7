//! Per-scope configuration artifact (`config.yml`).

use crate::config::{ConfigError, NetworkSpec, ARTIFACT_FILE};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fs::File;
use std::path::{Path, PathBuf};

/// network -> subnet -> VM name -> resolved VM
pub type VmTree = IndexMap<String, IndexMap<String, IndexMap<String, ResolvedVm>>>;

/// Fully resolved configuration of one scope.
///
/// Written once by the expander; later edits happen by re-running it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeConfigArtifact {
    pub network: IndexMap<String, NetworkSpec>,
    pub kubernetes: Value,
    pub policies: Value,
    pub provider: Option<String>,
    pub vm: VmTree,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ansible: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub use_tf_backend: bool,
}

impl ScopeConfigArtifact {
    /// Every (VM name, address) pair of the artifact
    pub fn addresses(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vm
            .values()
            .flat_map(IndexMap::values)
            .flat_map(IndexMap::iter)
            .map(|(name, vm)| (name.as_str(), vm.private_ip.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedVm {
    pub availability_zone: String,
    pub data_volume_size: u64,
    pub group: String,
    pub private_ip: String,
    pub root_volume_size: u64,
    pub system_image: String,
    pub size: VmSize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmSize {
    pub memory: u64,
    pub nb_sockets: u32,
    pub nb_vcpu_per_socket: u32,
}

/// Write the artifact of a scope into `folder`, replacing any previous one
pub fn write_artifact(folder: &Path, artifact: &ScopeConfigArtifact) -> Result<PathBuf, ConfigError> {
    let path = folder.join(ARTIFACT_FILE);
    let file = File::create(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    serde_yaml::to_writer(file, artifact).map_err(|e| ConfigError::Artifact {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    Ok(path)
}

/// Read an artifact written by [`write_artifact`]
pub fn read_artifact(path: &Path) -> Result<ScopeConfigArtifact, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_reader(file).map_err(|e| ConfigError::Artifact {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
