//! Typed platform tree.
//!
//! The `infra` section of a meta-config is an arbitrarily nested mapping in
//! which a key is either a sub-scope or a field of the scope holding it.
//! [`PlatformNode::parse`] classifies every key once, before expansion.

use super::catalog::VmClass;
use crate::config::ConfigError;
use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};

/// Keys that belong to the scope declaring them and are never sub-scopes.
/// Their values are not passed down to child scopes.
pub const NODE_LOCAL_KEYS: &[&str] = &["vms", "kubernetes", "spark_cluster", "environments"];

/// Parameter sections read by the descriptor builder; inherited like scalars
pub const PARAMETER_SECTIONS: &[&str] = &[
    "network",
    "policies",
    "provider",
    "root_volume_size",
    "default_os_images",
    "ansible",
];

/// Child keys that set the environment tier used in VM names
pub const ENVIRONMENT_TIERS: &[&str] = &["preprod", "pprod", "prod", "production"];

/// Path segments that make a scope and its descendants production
pub const PRODUCTION_SEGMENTS: &[&str] = &["prod", "production"];

/// One VM declared in a scope's `vms` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmRequest {
    #[serde(rename = "type")]
    pub vm_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nb_sockets: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nb_vcpu_per_socket: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_volume_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    /// Suffix distinguishing VMs of the same type, e.g. `1` or `a`
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub indice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm_prefix: Option<String>,
}

impl VmRequest {
    pub fn new(vm_type: &str) -> Self {
        VmRequest {
            vm_type: vm_type.to_string(),
            memory: None,
            nb_sockets: None,
            nb_vcpu_per_socket: None,
            data_volume_size: None,
            system_image: None,
            availability_zone: None,
            indice: None,
            vm_prefix: None,
        }
    }
}

fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected a string or a number, found {:?}",
            other
        ))),
    }
}

/// A scope of the platform tree
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformNode {
    /// Segments from the tree root to this scope; empty for the root
    pub path: Vec<String>,
    /// Own fields, merged over the inherited values
    pub fields: Mapping,
    /// VMs declared by this scope, in declaration order
    pub vms: Vec<VmRequest>,
    pub children: IndexMap<String, PlatformNode>,
}

impl PlatformNode {
    /// Parse the root of a platform tree
    pub fn parse_root(infra: &Mapping) -> Result<Self, ConfigError> {
        Self::parse(Vec::new(), infra)
    }

    pub fn parse(path: Vec<String>, declaration: &Mapping) -> Result<Self, ConfigError> {
        let mut node = PlatformNode {
            path,
            fields: Mapping::new(),
            vms: Vec::new(),
            children: IndexMap::new(),
        };

        for (key, value) in declaration {
            let Some(name) = key.as_str() else {
                return Err(ConfigError::InvalidScope {
                    scope: node.scope(),
                    reason: format!("non-string key {:?}", key),
                });
            };

            match value {
                _ if name == "vms" => {
                    node.vms = serde_yaml::from_value(value.clone()).map_err(|e| {
                        ConfigError::InvalidScope {
                            scope: node.scope(),
                            reason: format!("vms: {}", e),
                        }
                    })?;
                }
                Value::Mapping(child) if is_sub_scope_key(name) => {
                    let mut child_path = node.path.clone();
                    child_path.push(name.to_string());
                    let child = PlatformNode::parse(child_path, child)?;
                    node.children.insert(name.to_string(), child);
                }
                _ => {
                    node.fields.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(node)
    }

    /// Scope path for messages and aggregation keys, `.` for the root
    pub fn scope(&self) -> String {
        if self.path.is_empty() {
            ".".to_string()
        } else {
            self.path.join("/")
        }
    }

    pub fn vm_class(&self) -> VmClass {
        if self
            .path
            .iter()
            .any(|segment| PRODUCTION_SEGMENTS.contains(&segment.as_str()))
        {
            VmClass::Prod
        } else {
            VmClass::NonProd
        }
    }

    /// Number of VMs in this scope and all its descendants
    pub fn total_vms(&self) -> usize {
        self.vms.len() + self.children.values().map(PlatformNode::total_vms).sum::<usize>()
    }

    /// Number of scopes in this subtree, this one included
    pub fn total_scopes(&self) -> usize {
        1 + self.children.values().map(PlatformNode::total_scopes).sum::<usize>()
    }
}

fn is_sub_scope_key(name: &str) -> bool {
    !NODE_LOCAL_KEYS.contains(&name) && !PARAMETER_SECTIONS.contains(&name)
}
