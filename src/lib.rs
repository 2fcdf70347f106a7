//! # Cloudtiger - Platform expansion and VM address allocation
//!
//! This library turns a single hierarchical platform description into one
//! folder and one configuration file per scope, and assigns every declared
//! virtual machine a network address.
//!
//! ## Overview
//!
//! A platform is described once, in a `meta_config.yml`, as a tree of scopes
//! (environments, regions, projects...). Each scope inherits the values of its
//! ancestors, may override any of them, and declares the VMs it needs by type.
//! Expansion materializes the tree as nested folders, each holding a fully
//! resolved `config.yml` ready for provisioning.
//!
//! ## Key Features
//!
//! - **Inheritance**: one deep-merge rule for every value flowing down the tree
//! - **Positional addressing**: VMs draw from a single address pool in
//!   depth-first declaration order, so no two VMs of a tree share an address
//! - **Standard catalog**: VM sizing by provider family, type and environment class
//! - **IP reconciliation**: learned addresses are kept, free addresses of
//!   managed subnets are found by an occupancy probe (`fping` by default)
//! - **Aggregation**: any section of every scope can be consolidated into one document
//!
//! ## Architecture
//!
//! - `config`: meta-config and scope config structures, error taxonomy
//! - `config_loader`: file loading for meta-configs, catalogs and learned addresses
//! - `platform`: typed scope tree, VM catalog, descriptor builder and expander
//! - `ip`: address pool, occupancy probe and reconciliation
//! - `aggregate`: section consolidation across a materialized tree
//! - `utils`: value merging, IP helpers, key checks, tree validation
//! - `orchestrator`: high-level entry points used by the CLI
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cloudtiger::orchestrator;
//! use std::path::Path;
//!
//! // Expand platform/acme/meta_config.yml into per-scope folders
//! let summary = orchestrator::run_distribute(Path::new("platform/acme"), None)?;
//! println!("{} scopes written", summary.scopes);
//! # Ok::<(), color_eyre::eyre::Error>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```yaml
//! addresses_pool_start: "10.0.0.2"
//! addresses_pool_end: "10.0.0.254"
//! client_name: acme
//! vm_prefix: ct
//! provider: vsphere
//! network:
//!   main:
//!     subnets:
//!       front: {cidr_block: 10.0.0.0/24, availability_zone: dc1}
//!
//! infra:
//!   prod:
//!     eu:
//!       vms:
//!         - type: base
//!         - type: kubernetes_worker
//!           indice: 1
//! ```
//!
//! ## Error Handling
//!
//! Library passes return typed errors (`ConfigError`, `ProbeError`,
//! `PreconditionError`); the orchestration layer wraps them with
//! `color_eyre` context naming the files involved.

pub mod aggregate;
pub mod config;
pub mod config_loader;
pub mod ip;
pub mod orchestrator;
pub mod platform;
pub mod utils;

pub use config::ConfigError;
