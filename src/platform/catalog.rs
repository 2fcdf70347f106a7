//! Standard VM catalog: default sizing per (provider family, VM type, class).

use crate::config::ConfigError;
use crate::utils::merge::deep_merge;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::fmt;

const BUILTIN_CATALOG: &str = include_str!("../../standard/vm_standard.yml");

/// Environment class of a scope, derived from its folder path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VmClass {
    NonProd,
    Prod,
}

impl VmClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            VmClass::NonProd => "nonprod",
            VmClass::Prod => "prod",
        }
    }
}

impl fmt::Display for VmClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default attributes of one VM role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmStandard {
    pub memory: u64,
    pub nb_sockets: u32,
    pub nb_vcpu_per_socket: u32,
    pub data_volume_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_image: Option<String>,
}

/// family -> type -> class key (`nonprod`/`prod`) -> standard
type VmTypes = IndexMap<String, IndexMap<String, IndexMap<String, VmStandard>>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardCatalog {
    #[serde(default)]
    pub vm_types: VmTypes,
}

impl StandardCatalog {
    /// Built-in catalog, optionally extended by a project catalog
    pub fn load(overlay: Option<&Mapping>) -> Result<Self, ConfigError> {
        let builtin: Mapping = serde_yaml::from_str(BUILTIN_CATALOG)
            .map_err(|e| ConfigError::Catalog(format!("built-in catalog: {}", e)))?;
        let merged = match overlay {
            Some(project) => deep_merge(&builtin, project),
            None => builtin,
        };
        Self::from_mapping(&merged)
    }

    pub fn from_mapping(values: &Mapping) -> Result<Self, ConfigError> {
        serde_yaml::from_value(serde_yaml::Value::Mapping(values.clone()))
            .map_err(|e| ConfigError::Catalog(e.to_string()))
    }

    pub fn lookup(&self, family: &str, vm_type: &str, class: VmClass) -> Option<&VmStandard> {
        self.vm_types.get(family)?.get(vm_type)?.get(class.as_str())
    }
}
