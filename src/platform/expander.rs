//! Recursive expansion of a platform tree into per-scope folders.
//!
//! Scopes are visited depth-first in declaration order. The pool offset is
//! threaded through the traversal: each scope consumes one pool entry per VM
//! it declares and hands the advanced offset to the next scope visited.

use super::artifact::write_artifact;
use super::catalog::StandardCatalog;
use super::descriptor::{build_artifact, ScopeContext};
use super::node::{PlatformNode, ENVIRONMENT_TIERS, NODE_LOCAL_KEYS};
use crate::config::{ConfigError, MetaConfig, ScopeParameters};
use crate::ip::AddressPool;
use crate::utils::merge::{deep_merge, without_keys};
use log::{debug, info};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of a full distribution run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionSummary {
    pub scopes: usize,
    pub vms: usize,
    /// Pool offset after the last scope; equals the number of VMs assigned
    pub final_offset: usize,
    pub pool_size: usize,
    /// Artifacts written by this run, in traversal order
    pub artifacts: Vec<PathBuf>,
}

pub struct Expander<'a> {
    pub pool: &'a AddressPool,
    pub catalog: &'a StandardCatalog,
    written: Vec<PathBuf>,
}

impl<'a> Expander<'a> {
    pub fn new(pool: &'a AddressPool, catalog: &'a StandardCatalog) -> Self {
        Expander {
            pool,
            catalog,
            written: Vec::new(),
        }
    }

    /// Artifacts written so far
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    pub fn into_written(self) -> Vec<PathBuf> {
        self.written
    }

    /// Expand `node` into `folder` and recurse into its children.
    ///
    /// Returns the pool offset after this subtree.
    pub fn expand(
        &mut self,
        node: &PlatformNode,
        folder: &Path,
        inherited: &Mapping,
        offset: usize,
    ) -> Result<usize, ConfigError> {
        let scope = node.scope();
        fs::create_dir_all(folder).map_err(|source| ConfigError::Io {
            path: folder.to_path_buf(),
            source,
        })?;

        let effective = deep_merge(inherited, &node.fields);
        let params = ScopeParameters::from_mapping(&scope, &effective)?;
        let ctx = ScopeContext {
            scope: &scope,
            vm_class: node.vm_class(),
            params: &params,
            pool: self.pool,
            catalog: self.catalog,
        };

        let artifact = build_artifact(&ctx, &node.vms, offset)?;
        let path = write_artifact(folder, &artifact)?;
        debug!(
            "Scope {} ({}): {} VMs from offset {}, written to {:?}",
            scope,
            ctx.vm_class,
            node.vms.len(),
            offset,
            path
        );
        self.written.push(path);

        let mut offset = offset + node.vms.len();
        if node.children.is_empty() {
            return Ok(offset);
        }

        let passed_down = deep_merge(inherited, &without_keys(&node.fields, NODE_LOCAL_KEYS));
        for (key, child) in &node.children {
            info!("Creating subscope {}", child.scope());
            let mut child_base = passed_down.clone();
            if ENVIRONMENT_TIERS.contains(&key.as_str()) {
                child_base.insert(
                    Value::String("environment".to_string()),
                    Value::String(key.clone()),
                );
            }
            offset = self.expand(child, &folder.join(key), &child_base, offset)?;
        }

        Ok(offset)
    }
}

/// Expand the `infra` tree of a meta-config below `root`.
///
/// The pool is built once; common values of the meta-config are the
/// inherited base of the root scope.
pub fn distribute(
    meta: &MetaConfig,
    root: &Path,
    catalog: &StandardCatalog,
) -> Result<DistributionSummary, ConfigError> {
    let pool = AddressPool::from_meta_config(meta)?;
    let tree = PlatformNode::parse_root(&meta.infra)?;
    let vms = tree.total_vms();
    info!(
        "Distributing {} VMs over {} scopes (pool of {} addresses)",
        vms,
        tree.total_scopes(),
        pool.len()
    );
    debug!("Address pool: {:?}", pool.addresses());
    if vms > pool.len() {
        return Err(ConfigError::PoolTooSmall {
            vms,
            size: pool.len(),
        });
    }

    let mut expander = Expander::new(&pool, catalog);
    let final_offset = expander.expand(&tree, root, &meta.common, 0)?;

    Ok(DistributionSummary {
        scopes: tree.total_scopes(),
        vms,
        final_offset,
        pool_size: pool.len(),
        artifacts: expander.into_written(),
    })
}
