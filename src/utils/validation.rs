//! Validation of a materialized platform tree.
//!
//! Works on the consolidated `vm` section produced by
//! [`aggregate`](crate::aggregate::aggregate): scope -> network -> subnet ->
//! VM name -> VM attributes.

use crate::aggregate::Aggregate;
use serde_yaml::Value;
use std::collections::HashMap;

/// One VM found while walking a consolidated `vm` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmLocation {
    pub scope: String,
    pub network: String,
    pub subnet: String,
    pub name: String,
    pub private_ip: Option<String>,
}

/// Flatten a consolidated `vm` section, skipping scopes without VMs
pub fn vm_locations(consolidated: &Aggregate) -> Vec<VmLocation> {
    let mut locations = Vec::new();
    for (scope, section) in consolidated {
        let Some(networks) = section.as_mapping() else {
            continue;
        };
        for (network, subnets) in networks {
            let Some(subnets) = subnets.as_mapping() else {
                continue;
            };
            for (subnet, vms) in subnets {
                let Some(vms) = vms.as_mapping() else {
                    continue;
                };
                for (name, vm) in vms {
                    locations.push(VmLocation {
                        scope: scope.clone(),
                        network: key_string(network),
                        subnet: key_string(subnet),
                        name: key_string(name),
                        private_ip: vm
                            .get("private_ip")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    });
                }
            }
        }
    }
    locations
}

fn key_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Fail when two VMs of the tree hold the same address
///
/// # Returns
/// * `Ok(count)` with the number of addressed VMs
/// * `Err(String)` naming both holders of the first duplicate found
pub fn validate_unique_addresses(consolidated: &Aggregate) -> Result<usize, String> {
    let mut holders: HashMap<String, VmLocation> = HashMap::new();

    for location in vm_locations(consolidated) {
        let Some(ip) = location.private_ip.clone() else {
            continue;
        };
        if let Some(previous) = holders.get(&ip) {
            return Err(format!(
                "Duplicate address {}: {} in scope {} and {} in scope {}",
                ip, previous.name, previous.scope, location.name, location.scope
            ));
        }
        holders.insert(ip, location);
    }

    log::info!("Validated {} addressed VMs, no duplicate address", holders.len());
    Ok(holders.len())
}

/// VM names generated by more than one scope, with the scopes generating them
pub fn duplicate_vm_names(consolidated: &Aggregate) -> Vec<(String, Vec<String>)> {
    let mut scopes_by_name: HashMap<String, Vec<String>> = HashMap::new();
    let mut order = Vec::new();

    for location in vm_locations(consolidated) {
        let scopes = scopes_by_name.entry(location.name.clone()).or_default();
        if scopes.is_empty() {
            order.push(location.name.clone());
        }
        scopes.push(location.scope);
    }

    let duplicates: Vec<_> = order
        .into_iter()
        .filter_map(|name| {
            let scopes = scopes_by_name.remove(&name)?;
            (scopes.len() > 1).then_some((name, scopes))
        })
        .collect();

    for (name, scopes) in &duplicates {
        log::warn!("VM name {} is generated by scopes {}", name, scopes.join(", "));
    }
    duplicates
}
