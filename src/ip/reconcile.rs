//! IP reconciliation.
//!
//! Produces the per-scope address assignment (`config_ips.yml`) from the
//! scope's declared VMs, the addresses learned from the previous provisioning
//! run and the free addresses reported by the occupancy probe.
//!
//! Precedence for each VM:
//! 1. address declared in the scope config
//! 2. learned address
//! 3. next free probed address, for managed subnets only
//! 4. [`NOT_LEARNED_YET`] otherwise
//!
//! An address a VM already holds is never changed.

use super::probe::{probe_subnet, ForbiddenRange, FreeAddresses, OccupancyProbe, ProbeError};
use crate::config::{DeclaredVm, ScopeConfig, NOT_LEARNED_YET};
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// VM name -> address learned from a previous run
pub type LearnedAddresses = IndexMap<String, String>;

/// network -> subnet -> addresses
pub type ConfigIps = IndexMap<String, IndexMap<String, SubnetAddresses>>;

/// (network, subnet) -> free addresses
pub type FreeAddressMap = IndexMap<(String, String), FreeAddresses>;

/// Addresses of the VMs of one subnet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetAddresses {
    pub addresses: IndexMap<String, String>,
}

/// A managed subnet ran out of free addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeAnomaly {
    pub network: String,
    pub subnet: String,
    /// VMs left without an address
    pub unassigned: Vec<String>,
}

impl fmt::Display for ProbeAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no free address left in subnet {}/{} for {}",
            self.network,
            self.subnet,
            self.unassigned.join(", ")
        )
    }
}

/// Result of a reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub config_ips: ConfigIps,
    pub anomalies: Vec<ProbeAnomaly>,
}

/// Address already attached to a VM, if any
fn recorded_address<'a>(
    vm_name: &str,
    vm: &'a DeclaredVm,
    learned: &'a LearnedAddresses,
) -> Option<&'a str> {
    let is_address = |ip: &&str| *ip != NOT_LEARNED_YET;
    vm.private_ip
        .as_deref()
        .filter(is_address)
        .or_else(|| learned.get(vm_name).map(String::as_str).filter(is_address))
}

fn is_managed(config: &ScopeConfig, network: &str, subnet: &str) -> bool {
    config
        .subnet(network, subnet)
        .is_some_and(|spec| spec.managed_ips)
}

/// Managed subnets holding at least one VM without a recorded address
pub fn subnets_to_probe(config: &ScopeConfig, learned: &LearnedAddresses) -> Vec<(String, String)> {
    let mut subnets = Vec::new();
    for (network_name, network_subnets) in &config.vm {
        for (subnet_name, subnet_vms) in network_subnets {
            if !is_managed(config, network_name, subnet_name) {
                continue;
            }
            let needs_address = subnet_vms
                .iter()
                .any(|(name, vm)| recorded_address(name, vm, learned).is_none());
            if needs_address {
                subnets.push((network_name.clone(), subnet_name.clone()));
            }
        }
    }
    subnets
}

/// Probe every listed subnet
pub fn probe_free_addresses(
    config: &ScopeConfig,
    subnets: &[(String, String)],
    probe: &dyn OccupancyProbe,
) -> Result<FreeAddressMap, ProbeError> {
    let mut free = FreeAddressMap::new();
    for (network, subnet) in subnets {
        let spec = config.subnet(network, subnet);
        let cidr = spec
            .and_then(|s| s.cidr_block.as_deref())
            .ok_or_else(|| ProbeError::MissingCidr {
                network: network.clone(),
                subnet: subnet.clone(),
            })?;
        let forbidden = ForbiddenRange {
            start: spec.and_then(|s| s.forbidden_range_start.as_deref()),
            stop: spec.and_then(|s| s.forbidden_range_stop.as_deref()),
        };
        let addresses = probe_subnet(probe, network, subnet, cidr, forbidden)?;
        free.insert((network.clone(), subnet.clone()), addresses);
    }
    Ok(free)
}

/// Compute the address of every declared VM
pub fn reconcile(
    config: &ScopeConfig,
    learned: &LearnedAddresses,
    mut free: FreeAddressMap,
) -> Reconciliation {
    let mut config_ips = ConfigIps::new();
    let mut claimed: HashSet<String> = HashSet::new();

    // Recorded addresses first, so fresh allocation can skip them
    for (network_name, network_subnets) in &config.vm {
        let network_entry = config_ips.entry(network_name.clone()).or_default();
        for (subnet_name, subnet_vms) in network_subnets {
            let subnet_entry = network_entry.entry(subnet_name.clone()).or_default();
            for (vm_name, vm) in subnet_vms {
                let address = match recorded_address(vm_name, vm, learned) {
                    Some(ip) => {
                        claimed.insert(ip.to_string());
                        ip.to_string()
                    }
                    None => NOT_LEARNED_YET.to_string(),
                };
                subnet_entry.addresses.insert(vm_name.clone(), address);
            }
        }
    }

    let mut anomalies = Vec::new();
    for (network_name, network_subnets) in config_ips.iter_mut() {
        for (subnet_name, subnet) in network_subnets.iter_mut() {
            if config.subnet(network_name, subnet_name).is_none() {
                warn!(
                    "Subnet {}/{} holds VMs but is not declared in the network section",
                    network_name, subnet_name
                );
            }
            if !is_managed(config, network_name, subnet_name) {
                continue;
            }

            let key = (network_name.clone(), subnet_name.clone());
            let mut unassigned = Vec::new();
            for (vm_name, address) in subnet.addresses.iter_mut() {
                if *address != NOT_LEARNED_YET {
                    continue;
                }
                if !unassigned.is_empty() {
                    unassigned.push(vm_name.clone());
                    continue;
                }
                let next = free.get_mut(&key).and_then(|pool| loop {
                    match pool.next_free() {
                        Some(ip) if claimed.contains(&ip) => continue,
                        other => break other,
                    }
                });
                match next {
                    Some(ip) => {
                        debug!("Assigned {} to {} in {}/{}", ip, vm_name, network_name, subnet_name);
                        claimed.insert(ip.clone());
                        *address = ip;
                    }
                    None => unassigned.push(vm_name.clone()),
                }
            }

            if !unassigned.is_empty() {
                let anomaly = ProbeAnomaly {
                    network: network_name.clone(),
                    subnet: subnet_name.clone(),
                    unassigned,
                };
                warn!("{}", anomaly);
                anomalies.push(anomaly);
            }
        }
    }

    info!(
        "Reconciled {} subnets, {} anomalies",
        config_ips.values().map(IndexMap::len).sum::<usize>(),
        anomalies.len()
    );
    Reconciliation {
        config_ips,
        anomalies,
    }
}
