use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::path::PathBuf;

/// File name of the per-scope configuration artifact
pub const ARTIFACT_FILE: &str = "config.yml";
/// File name of the platform description read by `distribute`
pub const META_CONFIG_FILE: &str = "meta_config.yml";
/// File name of the address assignment written by `configure-ip`
pub const CONFIG_IPS_FILE: &str = "config_ips.yml";
/// File name of the consolidated document written by `aggregate`
pub const AGGREGATE_FILE: &str = "meta_config_aggregated.yml";

/// Address recorded for a VM whose address is left to the external provisioner
pub const NOT_LEARNED_YET: &str = "not_learned_yet";

/// Top-level platform description.
///
/// Everything that is not the address pool or the `infra` tree is a common
/// value inherited by every scope of the tree.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MetaConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresses_pool: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresses_pool_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresses_pool_end: Option<String>,
    #[serde(default)]
    pub infra: Mapping,
    #[serde(flatten)]
    pub common: Mapping,
}

/// Typed view over the effective (merged) values of one scope
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopeParameters {
    pub client_name: Option<String>,
    pub vm_prefix: Option<String>,
    /// Environment tier used in VM names (`prod`, `preprod`, ...)
    pub environment: Option<String>,
    pub provider: Option<String>,
    /// Catalog family; falls back to `provider`
    pub vm_type_provider: Option<String>,
    #[serde(default)]
    pub root_volume_size: IndexMap<String, u64>,
    #[serde(default)]
    pub default_os_images: IndexMap<String, String>,
    #[serde(default)]
    pub network: IndexMap<String, NetworkSpec>,
    pub kubernetes: Option<Value>,
    pub policies: Option<Value>,
    pub ansible: Option<Value>,
    #[serde(default)]
    pub use_tf_backend: bool,
}

impl ScopeParameters {
    /// Parse the typed parameters out of a merged value mapping
    pub fn from_mapping(scope: &str, values: &Mapping) -> Result<Self, ConfigError> {
        serde_yaml::from_value(Value::Mapping(values.clone())).map_err(|e| {
            ConfigError::InvalidScope {
                scope: scope.to_string(),
                reason: e.to_string(),
            }
        })
    }

    /// Catalog family used to look up VM sizing
    pub fn catalog_family(&self) -> Option<&str> {
        self.vm_type_provider
            .as_deref()
            .or(self.provider.as_deref())
    }

    /// First declared network and its first subnet; VMs of a scope are placed there
    pub fn primary_subnet(&self, scope: &str) -> Result<(&str, &str, &SubnetSpec), ConfigError> {
        let (network_name, network) =
            self.network
                .first()
                .ok_or_else(|| ConfigError::MissingField {
                    scope: scope.to_string(),
                    field: "network".to_string(),
                })?;
        let (subnet_name, subnet) =
            network
                .subnets
                .first()
                .ok_or_else(|| ConfigError::MissingField {
                    scope: scope.to_string(),
                    field: format!("network.{}.subnets", network_name),
                })?;
        Ok((network_name, subnet_name, subnet))
    }
}

/// Network declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NetworkSpec {
    #[serde(default)]
    pub subnets: IndexMap<String, SubnetSpec>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// Subnet declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubnetSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr_block: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    /// Whether addresses in this subnet are assigned by cloudtiger
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub managed_ips: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forbidden_range_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forbidden_range_stop: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// Per-scope configuration as read back for IP reconciliation.
///
/// Hand-edited configs are accepted, so VM entries only need to be
/// mappings; `private_ip` is optional.
#[derive(Debug, Default, Deserialize)]
pub struct ScopeConfig {
    #[serde(default)]
    pub network: IndexMap<String, NetworkSpec>,
    #[serde(default)]
    pub vm: IndexMap<String, IndexMap<String, IndexMap<String, DeclaredVm>>>,
}

impl ScopeConfig {
    pub fn subnet(&self, network: &str, subnet: &str) -> Option<&SubnetSpec> {
        self.network.get(network)?.subnets.get(subnet)
    }
}

/// VM entry of a scope config
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeclaredVm {
    pub private_ip: Option<String>,
    #[serde(flatten)]
    pub attributes: IndexMap<String, Value>,
}

/// Fatal configuration errors. The run aborts on any of these.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("address pool unspecified or malformed: {0}")]
    AddressPool(String),
    #[error("address pool exhausted at scope '{scope}': VM '{vm}' needs pool entry {position} but the pool holds {size} addresses")]
    PoolExhausted {
        scope: String,
        vm: String,
        position: usize,
        size: usize,
    },
    #[error("{vms} VMs declared but the address pool holds {size} addresses")]
    PoolTooSmall { vms: usize, size: usize },
    #[error("no catalog entry for VM type '{vm_type}' (family '{family}', class '{class}') at scope '{scope}'")]
    MissingCatalogEntry {
        scope: String,
        family: String,
        vm_type: String,
        class: String,
    },
    #[error("invalid standard catalog: {0}")]
    Catalog(String),
    #[error("missing required field '{field}' at scope '{scope}'")]
    MissingField { scope: String, field: String },
    #[error("invalid scope '{scope}': {reason}")]
    InvalidScope { scope: String, reason: String },
    #[error("unreadable artifact {}: {reason}", path.display())]
    Artifact { path: PathBuf, reason: String },
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_config_parsing() {
        let yaml = r#"
addresses_pool_start: "10.0.0.2"
addresses_pool_end: "10.0.0.10"
client_name: acme
vm_prefix: ct
provider: vsphere
infra:
  lab:
    vms:
      - type: base
"#;
        let meta: MetaConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(meta.addresses_pool_start.as_deref(), Some("10.0.0.2"));
        assert!(meta.addresses_pool.is_none());
        assert!(meta.infra.contains_key("lab"));

        // Pool and tree keys are not part of the inherited values
        assert!(meta.common.contains_key("client_name"));
        assert!(!meta.common.contains_key("infra"));
        assert!(!meta.common.contains_key("addresses_pool_start"));
    }

    #[test]
    fn test_scope_parameters_primary_subnet() {
        let yaml = r#"
provider: aws
network:
  main:
    subnets:
      front:
        cidr_block: 10.0.0.0/24
        availability_zone: eu-west-1a
        managed_ips: true
      back:
        cidr_block: 10.0.1.0/24
  other:
    subnets: {}
"#;
        let values: Mapping = serde_yaml::from_str(yaml).unwrap();
        let params = ScopeParameters::from_mapping("root", &values).unwrap();
        let (network, subnet, spec) = params.primary_subnet("root").unwrap();
        assert_eq!(network, "main");
        assert_eq!(subnet, "front");
        assert!(spec.managed_ips);
        assert_eq!(spec.availability_zone.as_deref(), Some("eu-west-1a"));
        assert_eq!(params.catalog_family(), Some("aws"));
    }

    #[test]
    fn test_missing_network_is_reported_with_scope() {
        let params = ScopeParameters::default();
        let err = params.primary_subnet("infra/lab").unwrap_err();
        assert!(err.to_string().contains("infra/lab"));
        assert!(err.to_string().contains("network"));
    }

    #[test]
    fn test_vm_type_provider_overrides_provider() {
        let yaml = "provider: vsphere\nvm_type_provider: vsphere_legacy\n";
        let values: Mapping = serde_yaml::from_str(yaml).unwrap();
        let params = ScopeParameters::from_mapping("root", &values).unwrap();
        assert_eq!(params.catalog_family(), Some("vsphere_legacy"));
    }

    #[test]
    fn test_scope_config_lenient_vm_entries() {
        let yaml = r#"
network:
  main:
    subnets:
      front:
        managed_ips: true
vm:
  main:
    front:
      ct_base.acme:
        group: base
      ct_db.acme:
        private_ip: 10.0.0.7
"#;
        let config: ScopeConfig = serde_yaml::from_str(yaml).unwrap();
        let vms = &config.vm["main"]["front"];
        assert!(vms["ct_base.acme"].private_ip.is_none());
        assert_eq!(vms["ct_db.acme"].private_ip.as_deref(), Some("10.0.0.7"));
        assert!(config.subnet("main", "front").unwrap().managed_ips);
        assert!(config.subnet("main", "missing").is_none());
    }
}
