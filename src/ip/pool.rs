//! Address pool shared by every scope of a platform tree.
//!
//! Allocation out of the pool is purely positional: the VM at list position
//! `i` of a scope visited at offset `o` receives `pool[o + i]`. The pool is
//! therefore built once per run and never reordered.

use crate::config::{ConfigError, MetaConfig};
use crate::utils::ip_utils::{expand_ipv4_range, is_valid_ip};
use serde_yaml::Value;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPool {
    addresses: Vec<String>,
}

impl AddressPool {
    /// Build the pool from an explicit list or an inclusive range.
    ///
    /// An explicit list is used verbatim and takes precedence over a range.
    pub fn build(
        explicit: Option<&[String]>,
        range_start: Option<&str>,
        range_end: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let addresses = match (explicit, range_start, range_end) {
            (Some(list), _, _) => {
                if let Some(bad) = list.iter().find(|ip| !is_valid_ip(ip)) {
                    return Err(ConfigError::AddressPool(format!(
                        "'{}' is not an IP address",
                        bad
                    )));
                }
                list.to_vec()
            }
            (None, Some(start), Some(end)) => {
                expand_ipv4_range(start, end).map_err(ConfigError::AddressPool)?
            }
            _ => {
                return Err(ConfigError::AddressPool(
                    "provide addresses_pool or both addresses_pool_start and addresses_pool_end"
                        .to_string(),
                ))
            }
        };

        let mut seen = HashSet::new();
        if let Some(dup) = addresses.iter().find(|ip| !seen.insert(ip.as_str())) {
            return Err(ConfigError::AddressPool(format!(
                "address {} appears more than once",
                dup
            )));
        }

        Ok(AddressPool { addresses })
    }

    /// Build the pool declared by a meta-config
    pub fn from_meta_config(meta: &MetaConfig) -> Result<Self, ConfigError> {
        let explicit = match &meta.addresses_pool {
            None => None,
            Some(Value::Sequence(items)) => Some(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s.clone()),
                        other => Err(ConfigError::AddressPool(format!(
                            "pool entries must be strings, found {:?}",
                            other
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Some(_) => {
                return Err(ConfigError::AddressPool(
                    "addresses_pool must be a list".to_string(),
                ))
            }
        };

        Self::build(
            explicit.as_deref(),
            meta.addresses_pool_start.as_deref(),
            meta.addresses_pool_end.as_deref(),
        )
    }

    pub fn get(&self, position: usize) -> Option<&str> {
        self.addresses.get(position).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }
}
