//! Node descriptor builder.
//!
//! Pure function from a scope's effective values to its
//! [`ScopeConfigArtifact`]. Address selection is positional: the VM at list
//! position `i` receives `pool[offset + i]`, so reordering a `vms` list
//! between runs re-addresses the VMs of that scope.

use super::artifact::{ResolvedVm, ScopeConfigArtifact, VmSize, VmTree};
use super::catalog::{StandardCatalog, VmClass, VmStandard};
use super::node::VmRequest;
use crate::config::{ConfigError, ScopeParameters};
use crate::ip::AddressPool;
use indexmap::IndexMap;
use log::{debug, warn};
use serde_yaml::{Mapping, Value};

const DEFAULT_ROOT_VOLUME_SIZE: u64 = 32;

/// Everything needed to resolve the VMs of one scope
pub struct ScopeContext<'a> {
    pub scope: &'a str,
    pub vm_class: VmClass,
    pub params: &'a ScopeParameters,
    pub pool: &'a AddressPool,
    pub catalog: &'a StandardCatalog,
}

impl ScopeContext<'_> {
    fn missing(&self, field: &str) -> ConfigError {
        ConfigError::MissingField {
            scope: self.scope.to_string(),
            field: field.to_string(),
        }
    }

    fn family(&self) -> Result<&str, ConfigError> {
        self.params.catalog_family().ok_or_else(|| self.missing("provider"))
    }

    fn standard(&self, vm: &VmRequest) -> Result<&VmStandard, ConfigError> {
        let family = self.family()?;
        self.catalog
            .lookup(family, &vm.vm_type, self.vm_class)
            .ok_or_else(|| ConfigError::MissingCatalogEntry {
                scope: self.scope.to_string(),
                family: family.to_string(),
                vm_type: vm.vm_type.clone(),
                class: self.vm_class.to_string(),
            })
    }
}

/// Generated VM name: `{prefix}{environment}_{type}{indice}.{client}`
pub fn vm_name(params: &ScopeParameters, vm: &VmRequest, scope: &str) -> Result<String, ConfigError> {
    let prefix = vm
        .vm_prefix
        .as_deref()
        .or(params.vm_prefix.as_deref())
        .ok_or_else(|| ConfigError::MissingField {
            scope: scope.to_string(),
            field: "vm_prefix".to_string(),
        })?;
    let client = params
        .client_name
        .as_deref()
        .ok_or_else(|| ConfigError::MissingField {
            scope: scope.to_string(),
            field: "client_name".to_string(),
        })?;
    let environment = match params.environment.as_deref() {
        Some(env) if !env.is_empty() => format!("{}_", env),
        _ => String::new(),
    };
    Ok(format!(
        "{}{}{}{}.{}",
        prefix,
        environment,
        vm.vm_type,
        vm.indice.as_deref().unwrap_or(""),
        client
    ))
}

/// Resolve one VM: explicit override, then catalog, then scope defaults
pub fn resolve_vm(
    ctx: &ScopeContext<'_>,
    vm: &VmRequest,
    default_zone: Option<&str>,
    private_ip: &str,
) -> Result<ResolvedVm, ConfigError> {
    let availability_zone = vm
        .availability_zone
        .as_deref()
        .or(default_zone)
        .ok_or_else(|| ctx.missing("availability_zone"))?
        .to_string();

    let memory = match vm.memory {
        Some(v) => v,
        None => ctx.standard(vm)?.memory,
    };
    let nb_sockets = match vm.nb_sockets {
        Some(v) => v,
        None => ctx.standard(vm)?.nb_sockets,
    };
    let nb_vcpu_per_socket = match vm.nb_vcpu_per_socket {
        Some(v) => v,
        None => ctx.standard(vm)?.nb_vcpu_per_socket,
    };
    let data_volume_size = match vm.data_volume_size {
        Some(v) => v,
        None => ctx.standard(vm)?.data_volume_size,
    };

    let system_image = match &vm.system_image {
        Some(image) => image.clone(),
        None => {
            let family = ctx.family()?;
            let from_catalog = ctx
                .catalog
                .lookup(family, &vm.vm_type, ctx.vm_class)
                .and_then(|standard| standard.system_image.clone());
            match from_catalog {
                Some(image) => image,
                None => ctx
                    .params
                    .default_os_images
                    .get(family)
                    .cloned()
                    .ok_or_else(|| ctx.missing(&format!("default_os_images.{}", family)))?,
            }
        }
    };

    let root_volume_size = ctx
        .params
        .provider
        .as_deref()
        .and_then(|provider| ctx.params.root_volume_size.get(provider).copied())
        .unwrap_or(DEFAULT_ROOT_VOLUME_SIZE);

    Ok(ResolvedVm {
        availability_zone,
        data_volume_size,
        group: vm.vm_type.clone(),
        private_ip: private_ip.to_string(),
        root_volume_size,
        system_image,
        size: VmSize {
            memory,
            nb_sockets,
            nb_vcpu_per_socket,
        },
    })
}

/// Build the artifact of a scope whose VMs start at `offset` in the pool
pub fn build_artifact(
    ctx: &ScopeContext<'_>,
    vms: &[VmRequest],
    offset: usize,
) -> Result<ScopeConfigArtifact, ConfigError> {
    let params = ctx.params;
    let mut vm_tree = VmTree::new();

    if !vms.is_empty() {
        let (network_name, subnet_name, subnet) = params.primary_subnet(ctx.scope)?;
        let mut resolved = IndexMap::new();

        for (index, vm) in vms.iter().enumerate() {
            let name = vm_name(params, vm, ctx.scope)?;
            let position = offset + index;
            let private_ip = ctx.pool.get(position).ok_or_else(|| ConfigError::PoolExhausted {
                scope: ctx.scope.to_string(),
                vm: name.clone(),
                position,
                size: ctx.pool.len(),
            })?;
            let vm_config = resolve_vm(ctx, vm, subnet.availability_zone.as_deref(), private_ip)?;
            debug!("Scope {}: {} -> {}", ctx.scope, name, private_ip);

            if resolved.insert(name.clone(), vm_config).is_some() {
                warn!(
                    "Scope {}: VM name {} is generated more than once in subnet {}/{}",
                    ctx.scope, name, network_name, subnet_name
                );
            }
        }

        let mut subnets = IndexMap::new();
        subnets.insert(subnet_name.to_string(), resolved);
        vm_tree.insert(network_name.to_string(), subnets);
    }

    Ok(ScopeConfigArtifact {
        network: params.network.clone(),
        kubernetes: section_or_empty(&params.kubernetes),
        policies: section_or_empty(&params.policies),
        provider: params.provider.clone(),
        vm: vm_tree,
        ansible: params.ansible.clone(),
        use_tf_backend: params.use_tf_backend,
    })
}

fn section_or_empty(section: &Option<Value>) -> Value {
    section
        .clone()
        .unwrap_or_else(|| Value::Mapping(Mapping::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALUES: &str = r#"
client_name: acme
vm_prefix: ct
provider: aws
default_os_images: {aws: ami-default}
root_volume_size: {aws: 40}
network:
  main:
    subnets:
      front:
        cidr_block: 10.0.0.0/24
        availability_zone: eu-west-1a
"#;

    fn params(extra: &str) -> ScopeParameters {
        let mut values: Mapping = serde_yaml::from_str(VALUES).unwrap();
        let extra: Mapping = serde_yaml::from_str(extra).unwrap_or_default();
        values.extend(extra);
        ScopeParameters::from_mapping("lab", &values).unwrap()
    }

    fn pool() -> AddressPool {
        AddressPool::build(None, Some("10.0.0.2"), Some("10.0.0.10")).unwrap()
    }

    fn vms(yaml: &str) -> Vec<VmRequest> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_vm_name_composition() {
        let vm = vms("- {type: base, indice: 1}").remove(0);
        assert_eq!(vm_name(&params(""), &vm, "lab").unwrap(), "ctbase1.acme");
        assert_eq!(
            vm_name(&params("environment: prod"), &vm, "lab").unwrap(),
            "ctprod_base1.acme"
        );
        let own_prefix = vms("- {type: db, vm_prefix: xx}").remove(0);
        assert_eq!(vm_name(&params(""), &own_prefix, "lab").unwrap(), "xxdb.acme");
    }

    #[test]
    fn test_addresses_follow_list_position() {
        let params = params("");
        let pool = pool();
        let catalog = StandardCatalog::load(None).unwrap();
        let ctx = ScopeContext {
            scope: "lab",
            vm_class: VmClass::NonProd,
            params: &params,
            pool: &pool,
            catalog: &catalog,
        };
        let artifact =
            build_artifact(&ctx, &vms("- {type: base, indice: 1}\n- {type: base, indice: 2}"), 3)
                .unwrap();
        let subnet = &artifact.vm["main"]["front"];
        assert_eq!(subnet["ctbase1.acme"].private_ip, "10.0.0.5");
        assert_eq!(subnet["ctbase2.acme"].private_ip, "10.0.0.6");
    }

    #[test]
    fn test_override_then_catalog_then_defaults() {
        let params = params("");
        let pool = pool();
        let catalog = StandardCatalog::load(None).unwrap();
        let ctx = ScopeContext {
            scope: "lab",
            vm_class: VmClass::Prod,
            params: &params,
            pool: &pool,
            catalog: &catalog,
        };
        let vm = vms("- {type: base, memory: 1234, availability_zone: eu-west-1c}").remove(0);
        let resolved = resolve_vm(&ctx, &vm, Some("eu-west-1a"), "10.0.0.2").unwrap();
        assert_eq!(resolved.size.memory, 1234);
        assert_eq!(resolved.availability_zone, "eu-west-1c");
        // prod sizing from the built-in catalog
        assert_eq!(resolved.data_volume_size, 50);
        assert_eq!(resolved.size.nb_vcpu_per_socket, 2);
        assert_eq!(resolved.system_image, "ami-default");
        assert_eq!(resolved.root_volume_size, 40);
        assert_eq!(resolved.group, "base");
    }

    #[test]
    fn test_missing_catalog_entry_names_scope() {
        let params = params("");
        let pool = pool();
        let catalog = StandardCatalog::load(None).unwrap();
        let ctx = ScopeContext {
            scope: "prod/eu",
            vm_class: VmClass::Prod,
            params: &params,
            pool: &pool,
            catalog: &catalog,
        };
        let err = build_artifact(&ctx, &vms("- {type: mainframe}"), 0).unwrap_err();
        match err {
            ConfigError::MissingCatalogEntry { scope, vm_type, class, .. } => {
                assert_eq!(scope, "prod/eu");
                assert_eq!(vm_type, "mainframe");
                assert_eq!(class, "prod");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_fully_overridden_vm_needs_no_catalog() {
        let params = params("");
        let pool = pool();
        let catalog = StandardCatalog::default();
        let ctx = ScopeContext {
            scope: "lab",
            vm_class: VmClass::NonProd,
            params: &params,
            pool: &pool,
            catalog: &catalog,
        };
        let vm = vms(
            "- {type: custom, memory: 1, nb_sockets: 1, nb_vcpu_per_socket: 1, data_volume_size: 1, system_image: img}",
        )
        .remove(0);
        assert!(resolve_vm(&ctx, &vm, Some("az"), "10.0.0.2").is_ok());
    }

    #[test]
    fn test_pool_exhaustion_is_fatal() {
        let params = params("");
        let pool = AddressPool::build(Some(&["10.0.0.2".to_string()][..]), None, None).unwrap();
        let catalog = StandardCatalog::load(None).unwrap();
        let ctx = ScopeContext {
            scope: "lab",
            vm_class: VmClass::NonProd,
            params: &params,
            pool: &pool,
            catalog: &catalog,
        };
        let err = build_artifact(&ctx, &vms("- {type: base}\n- {type: base, indice: 2}"), 0)
            .unwrap_err();
        assert!(matches!(err, ConfigError::PoolExhausted { position: 1, size: 1, .. }));
    }

    #[test]
    fn test_scope_without_vms_needs_no_network() {
        let params = ScopeParameters::default();
        let pool = pool();
        let catalog = StandardCatalog::default();
        let ctx = ScopeContext {
            scope: ".",
            vm_class: VmClass::NonProd,
            params: &params,
            pool: &pool,
            catalog: &catalog,
        };
        let artifact = build_artifact(&ctx, &[], 0).unwrap();
        assert!(artifact.vm.is_empty());
        assert_eq!(artifact.kubernetes, Value::Mapping(Mapping::new()));
    }
}
