//! High-level orchestration of the three scope operations.
//!
//! Each entry point takes the scope folder, loads what it needs through
//! [`config_loader`](crate::config_loader), runs the library pass and writes
//! its output next to the inputs.

use crate::aggregate::{aggregate, aggregate_artifacts, write_aggregate};
use crate::config::{AGGREGATE_FILE, ARTIFACT_FILE, CONFIG_IPS_FILE, META_CONFIG_FILE};
use crate::config_loader::{
    load_catalog, load_learned_addresses, load_meta_config, load_scope_config, LEARNED_ADDRESSES,
};
use crate::ip::reconcile::{probe_free_addresses, subnets_to_probe};
use crate::ip::{reconcile, ConfigIps, OccupancyProbe, Reconciliation};
use crate::platform::{distribute, DistributionSummary};
use crate::utils::validation::{duplicate_vm_names, validate_unique_addresses};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use log::info;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Expand `<scope>/meta_config.yml` into per-scope folders, then check the
/// artifacts written by this run for address collisions.
///
/// Folders of scopes no longer declared are left in place and not checked.
pub fn run_distribute(scope: &Path, standard: Option<&Path>) -> Result<DistributionSummary> {
    let meta = load_meta_config(&scope.join(META_CONFIG_FILE))?;
    let catalog = load_catalog(scope, standard)?;

    let summary = distribute(&meta, scope, &catalog)
        .wrap_err_with(|| format!("Failed to distribute platform in '{}'", scope.display()))?;
    info!(
        "Wrote {} scopes, assigned {} of {} pool addresses",
        summary.scopes, summary.final_offset, summary.pool_size
    );

    let vms = aggregate_artifacts(scope, &summary.artifacts, "vm")?;
    duplicate_vm_names(&vms);
    validate_unique_addresses(&vms).map_err(|e| eyre!(e))?;

    Ok(summary)
}

/// Consolidate `section` of every artifact under `scope`.
///
/// Writes to `output`, or to `<scope>/meta_config_aggregated.yml`.
pub fn run_aggregate(scope: &Path, section: &str, output: Option<&Path>) -> Result<PathBuf> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| scope.join(AGGREGATE_FILE));

    let consolidated = aggregate(scope, section)
        .wrap_err_with(|| format!("Failed to aggregate '{}' under '{}'", section, scope.display()))?;
    write_aggregate(&output, section, &consolidated)?;

    info!("Aggregated {} scopes into {:?}", consolidated.len(), output);
    Ok(output)
}

/// Compute the addresses of the VMs of one scope and write `config_ips.yml`.
///
/// The document is written even when a subnet ran out of free addresses; the
/// returned [`Reconciliation`] carries the anomalies for the caller to report.
pub fn configure_ips(
    scope: &Path,
    learned: Option<&Path>,
    probe: &dyn OccupancyProbe,
) -> Result<Reconciliation> {
    let config = load_scope_config(&scope.join(ARTIFACT_FILE))?;
    let learned_path = learned
        .map(Path::to_path_buf)
        .unwrap_or_else(|| scope.join(LEARNED_ADDRESSES));
    let learned = load_learned_addresses(&learned_path)?;

    let subnets = subnets_to_probe(&config, &learned);
    info!("{} managed subnets need free addresses", subnets.len());
    let free = probe_free_addresses(&config, &subnets, probe)
        .wrap_err_with(|| format!("Failed to probe subnets of '{}'", scope.display()))?;

    let reconciliation = reconcile(&config, &learned, free);
    write_config_ips(&scope.join(CONFIG_IPS_FILE), &reconciliation.config_ips)?;

    Ok(reconciliation)
}

pub fn write_config_ips(path: &Path, config_ips: &ConfigIps) -> Result<()> {
    let file = File::create(path)
        .wrap_err_with(|| format!("Failed to create '{}'", path.display()))?;
    serde_yaml::to_writer(file, config_ips)
        .wrap_err_with(|| format!("Failed to write '{}'", path.display()))?;
    info!("Address assignment written to {:?}", path);
    Ok(())
}
