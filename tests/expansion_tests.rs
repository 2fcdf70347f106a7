//! End-to-end expansion of a platform tree on disk.

use cloudtiger::aggregate::{aggregate, scope_key};
use cloudtiger::config::{ARTIFACT_FILE, META_CONFIG_FILE};
use cloudtiger::orchestrator::{run_aggregate, run_distribute};
use cloudtiger::platform::read_artifact;
use cloudtiger::utils::validation::{validate_unique_addresses, vm_locations};
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const META: &str = r#"
addresses_pool_start: "10.20.0.10"
addresses_pool_end: "10.20.0.40"
client_name: acme
vm_prefix: ct
provider: vsphere
vm_type_provider: vsphere
default_os_images: {vsphere: debian-12-template}
root_volume_size: {vsphere: 48}
network:
  dc:
    subnets:
      servers:
        cidr_block: 10.20.0.0/24
        availability_zone: dc1
infra:
  ansible: {inventory: root}
  vms:
    - type: base
  prod:
    ansible: {inventory: prod}
    eu:
      vms:
        - type: base
          indice: 1
        - type: base
          indice: 2
        - type: kubernetes_worker
          memory: 32768
    us:
      vms:
        - type: base
  lab:
    vm_prefix: lb
    network:
      dc:
        subnets:
          servers:
            availability_zone: dc2
    vms:
      - type: base
      - type: kubernetes_worker
        indice: a
"#;

fn platform() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(META_CONFIG_FILE), META).unwrap();
    dir
}

fn snapshot(root: &Path) -> Vec<(String, String)> {
    let mut files = Vec::new();
    for folder in ["", "prod", "prod/eu", "prod/us", "lab"] {
        let path = root.join(folder).join(ARTIFACT_FILE);
        files.push((folder.to_string(), fs::read_to_string(path).unwrap()));
    }
    files
}

#[test]
fn test_every_scope_gets_a_folder_and_artifact() {
    let dir = platform();
    let summary = run_distribute(dir.path(), None).unwrap();

    assert_eq!(summary.scopes, 5);
    assert_eq!(summary.vms, 7);
    assert_eq!(summary.final_offset, 7);
    for folder in ["prod", "prod/eu", "prod/us", "lab"] {
        assert!(dir.path().join(folder).join(ARTIFACT_FILE).is_file(), "{}", folder);
    }
}

#[test]
fn test_addresses_follow_depth_first_declaration_order() {
    let dir = platform();
    run_distribute(dir.path(), None).unwrap();

    let ips = |folder: &str| -> Vec<String> {
        read_artifact(&dir.path().join(folder).join(ARTIFACT_FILE))
            .unwrap()
            .addresses()
            .map(|(_, ip)| ip.to_string())
            .collect()
    };
    assert_eq!(ips(""), vec!["10.20.0.10"]);
    assert!(ips("prod").is_empty());
    assert_eq!(ips("prod/eu"), vec!["10.20.0.11", "10.20.0.12", "10.20.0.13"]);
    assert_eq!(ips("prod/us"), vec!["10.20.0.14"]);
    assert_eq!(ips("lab"), vec!["10.20.0.15", "10.20.0.16"]);
}

#[test]
fn test_no_two_vms_share_an_address() {
    let dir = platform();
    run_distribute(dir.path(), None).unwrap();

    let vms = aggregate(dir.path(), "vm").unwrap();
    assert_eq!(validate_unique_addresses(&vms), Ok(7));

    let locations = vm_locations(&vms);
    let unique: HashSet<_> = locations.iter().filter_map(|l| l.private_ip.clone()).collect();
    assert_eq!(unique.len(), locations.len());
}

#[test]
fn test_inherited_and_resolved_values() {
    let dir = platform();
    run_distribute(dir.path(), None).unwrap();

    let eu = read_artifact(&dir.path().join("prod/eu").join(ARTIFACT_FILE)).unwrap();
    let servers = &eu.vm["dc"]["servers"];
    let names: Vec<_> = servers.keys().cloned().collect();
    assert_eq!(
        names,
        vec![
            "ctprod_base1.acme",
            "ctprod_base2.acme",
            "ctprod_kubernetes_worker.acme"
        ]
    );
    let worker = &servers["ctprod_kubernetes_worker.acme"];
    assert_eq!(worker.size.memory, 32768);
    assert_eq!(worker.group, "kubernetes_worker");
    assert_eq!(worker.root_volume_size, 48);
    assert_eq!(worker.system_image, "debian-12-template");
    assert_eq!(worker.availability_zone, "dc1");

    let lab = read_artifact(&dir.path().join("lab").join(ARTIFACT_FILE)).unwrap();
    let servers = &lab.vm["dc"]["servers"];
    assert!(servers.contains_key("lbbase.acme"));
    assert!(servers.contains_key("lbkubernetes_workera.acme"));
    // the nested override keeps the sibling keys of the inherited subnet
    assert_eq!(servers["lbbase.acme"].availability_zone, "dc2");
    assert_eq!(
        lab.network["dc"].subnets["servers"].cidr_block.as_deref(),
        Some("10.20.0.0/24")
    );
}

#[test]
fn test_prod_and_nonprod_sizing_differ() {
    let dir = platform();
    run_distribute(dir.path(), None).unwrap();

    let us = read_artifact(&dir.path().join("prod/us").join(ARTIFACT_FILE)).unwrap();
    let lab = read_artifact(&dir.path().join("lab").join(ARTIFACT_FILE)).unwrap();
    let prod_base = &us.vm["dc"]["servers"]["ctprod_base.acme"];
    let lab_base = &lab.vm["dc"]["servers"]["lbbase.acme"];
    assert!(prod_base.size.memory > lab_base.size.memory);
}

#[test]
fn test_redistribution_is_stable() {
    let dir = platform();
    run_distribute(dir.path(), None).unwrap();
    let first = snapshot(dir.path());

    run_distribute(dir.path(), None).unwrap();
    assert_eq!(snapshot(dir.path()), first);
}

#[test]
fn test_aggregate_round_trip() {
    let dir = platform();
    let summary = run_distribute(dir.path(), None).unwrap();

    let output = dir.path().join("inventory.yml");
    run_aggregate(dir.path(), "ansible", Some(&output)).unwrap();
    let document: Mapping = serde_yaml::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let ansible = document["ansible"].as_mapping().unwrap();
    let vms = aggregate(dir.path(), "vm").unwrap();

    assert_eq!(ansible.len(), summary.artifacts.len());
    assert_eq!(vms.len(), summary.artifacts.len());
    for path in &summary.artifacts {
        let key = scope_key(dir.path(), path);
        let artifact = read_artifact(path).unwrap();

        let written = artifact.ansible.clone().unwrap_or(Value::Null);
        assert_eq!(ansible[key.as_str()], written, "ansible of {}", key);
        assert_eq!(vms[&key], serde_yaml::to_value(&artifact.vm).unwrap(), "vm of {}", key);
    }
}
