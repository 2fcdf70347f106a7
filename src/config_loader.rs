use crate::config::{MetaConfig, ScopeConfig};
use crate::ip::LearnedAddresses;
use crate::platform::StandardCatalog;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use indexmap::IndexMap;
use log::{debug, info};
use serde::Deserialize;
use serde_yaml::Mapping;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Location of the project catalog inside a scope folder
pub const PROJECT_CATALOG: &str = "standard/standard.yml";

/// Location of the provisioner's VM output inside a scope folder
pub const LEARNED_ADDRESSES: &str = "terraform/vm_output.json";

/// Load and parse the meta-config of a platform
pub fn load_meta_config(path: &Path) -> Result<MetaConfig> {
    info!("Loading meta-config from: {:?}", path);

    let file = File::open(path)
        .wrap_err_with(|| format!("Failed to open meta-config '{}'", path.display()))?;
    let meta: MetaConfig = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse meta-config '{}'", path.display()))?;

    if meta.infra.is_empty() {
        info!("Meta-config declares an empty infra tree; only the root scope will be written");
    }
    Ok(meta)
}

/// Load the configuration of one scope, as written by `distribute` or edited by hand
pub fn load_scope_config(path: &Path) -> Result<ScopeConfig> {
    debug!("Loading scope config from: {:?}", path);

    let file = File::open(path)
        .wrap_err_with(|| format!("Failed to open scope config '{}'", path.display()))?;
    serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse scope config '{}'", path.display()))
}

/// Load the standard catalog.
///
/// An explicit overlay must exist. Without one, the project catalog of the
/// scope is used when present, and the built-in catalog alone otherwise.
pub fn load_catalog(scope: &Path, explicit: Option<&Path>) -> Result<StandardCatalog> {
    let overlay_path: Option<PathBuf> = match explicit {
        Some(path) if !path.is_file() => {
            return Err(eyre!("Standard catalog '{}' not found", path.display()));
        }
        Some(path) => Some(path.to_path_buf()),
        None => Some(scope.join(PROJECT_CATALOG)).filter(|p| p.is_file()),
    };

    let overlay = match &overlay_path {
        Some(path) => {
            info!("Extending the built-in VM catalog with {:?}", path);
            let file = File::open(path)
                .wrap_err_with(|| format!("Failed to open catalog '{}'", path.display()))?;
            let values: Mapping = serde_yaml::from_reader(file)
                .wrap_err_with(|| format!("Failed to parse catalog '{}'", path.display()))?;
            Some(values)
        }
        None => None,
    };

    Ok(StandardCatalog::load(overlay.as_ref())?)
}

#[derive(Debug, Deserialize)]
struct VmOutput {
    private_ip: Option<String>,
}

/// Load the addresses learned by the previous provisioning run.
///
/// A missing file means nothing has been provisioned yet.
pub fn load_learned_addresses(path: &Path) -> Result<LearnedAddresses> {
    if !path.exists() {
        info!("No learned addresses at {:?}", path);
        return Ok(LearnedAddresses::new());
    }

    let file = File::open(path)
        .wrap_err_with(|| format!("Failed to open learned addresses '{}'", path.display()))?;
    let outputs: IndexMap<String, VmOutput> = serde_json::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse learned addresses '{}'", path.display()))?;

    let learned: LearnedAddresses = outputs
        .into_iter()
        .filter_map(|(name, output)| output.private_ip.map(|ip| (name, ip)))
        .collect();
    info!("Loaded {} learned addresses from {:?}", learned.len(), path);
    Ok(learned)
}
