//! Shared utilities: value merging, IP helpers, key checks, tree validation.

pub mod ip_utils;
pub mod keys;
pub mod merge;
pub mod validation;

pub use keys::{check_private_key, PreconditionError};
pub use merge::{deep_merge, without_keys};
pub use validation::{duplicate_vm_names, validate_unique_addresses};
