//! Subnet occupancy probing.
//!
//! The probe itself is an external command (`fping -g <cidr>` by default).
//! This module runs it behind the [`OccupancyProbe`] trait, parses its output
//! and turns the unreachable addresses into an ordered free-address list.

use crate::utils::ip_utils::{in_ipv4_range, parse_cidr};
use log::{debug, info};
use regex::Regex;
use std::io;
use std::process::Command;
use std::sync::LazyLock;

/// Match: "<IPv4> [is] <alive|unreachable>"
static SCAN_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,3}(?:\.\d{1,3}){3})\s+(?:.*\s)?(alive|unreachable)\s*$")
        .expect("Invalid scan line regex")
});

/// Errors raised while running the occupancy probe
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid CIDR block for subnet {network}/{subnet}: {reason}")]
    InvalidCidr {
        network: String,
        subnet: String,
        reason: String,
    },
    #[error("subnet {network}/{subnet} is managed but declares no cidr_block")]
    MissingCidr { network: String, subnet: String },
    #[error("failed to run probe command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Reachability classification reported by the probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Alive,
    Unreachable,
}

/// Something that can scan a CIDR block and report raw per-address lines
pub trait OccupancyProbe {
    /// Scan `cidr` and return the raw output lines, in scan order.
    ///
    /// Blocks until the scan completes.
    fn scan(&self, cidr: &str) -> Result<Vec<String>, ProbeError>;
}

/// Probe backed by an `fping`-compatible command.
///
/// `command` is split on whitespace: the first word is the program, the rest
/// are passed before `-g <cidr>` (e.g. `sudo fping`). No shell is involved.
#[derive(Debug, Clone)]
pub struct FpingProbe {
    pub command: String,
}

impl FpingProbe {
    pub fn new(command: &str) -> Self {
        FpingProbe {
            command: command.to_string(),
        }
    }
}

impl Default for FpingProbe {
    fn default() -> Self {
        FpingProbe {
            command: "fping".to_string(),
        }
    }
}

impl OccupancyProbe for FpingProbe {
    fn scan(&self, cidr: &str) -> Result<Vec<String>, ProbeError> {
        info!("Executing command {} -g {}", self.command, cidr);
        // fping exits non-zero whenever a host is unreachable, so only the
        // output matters here.
        let spawn_error = |source| ProbeError::Spawn {
            command: self.command.clone(),
            source,
        };
        let mut words = self.command.split_whitespace();
        let program = words.next().ok_or_else(|| {
            spawn_error(io::Error::new(io::ErrorKind::InvalidInput, "empty probe command"))
        })?;
        let output = Command::new(program)
            .args(words)
            .args(["-g", cidr])
            .output()
            .map_err(spawn_error)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().map(str::to_string).collect())
    }
}

/// Parse one probe output line into an address and its classification
pub fn parse_scan_line(line: &str) -> Option<(String, Reachability)> {
    let caps = SCAN_LINE.captures(line)?;
    let address = caps.get(1)?.as_str().to_string();
    let reachability = match caps.get(2)?.as_str() {
        "alive" => Reachability::Alive,
        _ => Reachability::Unreachable,
    };
    Some((address, reachability))
}

/// Free addresses of one subnet, handed out in ascending scan order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreeAddresses {
    // Reversed: the next address to hand out is at the tail.
    stack: Vec<String>,
}

impl FreeAddresses {
    /// Next free address, or `None` once the subnet is exhausted
    pub fn next_free(&mut self) -> Option<String> {
        self.stack.pop()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Remaining addresses in the order they will be handed out
    pub fn remaining(&self) -> Vec<&str> {
        self.stack.iter().rev().map(String::as_str).collect()
    }
}

/// Optional administratively forbidden range of a subnet
#[derive(Debug, Clone, Copy, Default)]
pub struct ForbiddenRange<'a> {
    pub start: Option<&'a str>,
    pub stop: Option<&'a str>,
}

impl ForbiddenRange<'_> {
    fn contains(&self, ip: &str) -> bool {
        match (self.start, self.stop) {
            (Some(start), Some(stop)) => in_ipv4_range(ip, start, stop),
            _ => false,
        }
    }
}

/// Turn raw probe lines into the free-address list of a subnet.
///
/// Only `unreachable` lines are candidates. The last candidate of the scan is
/// discarded as the broadcast address, the list is reversed, and its tail
/// (the first candidate of the scan) is dropped as the gateway. Addresses in
/// the forbidden range are removed last.
pub fn free_candidates(lines: &[String], forbidden: ForbiddenRange<'_>) -> FreeAddresses {
    let mut unreachable: Vec<String> = lines
        .iter()
        .filter_map(|line| parse_scan_line(line))
        .filter(|(_, reach)| *reach == Reachability::Unreachable)
        .map(|(addr, _)| addr)
        .collect();

    // broadcast
    unreachable.pop();
    unreachable.reverse();
    // gateway
    unreachable.pop();

    let stack: Vec<String> = unreachable
        .into_iter()
        .filter(|ip| !forbidden.contains(ip))
        .collect();
    debug!("Free candidates after filtering: {:?}", stack);
    FreeAddresses { stack }
}

/// Scan one subnet and return its free addresses
pub fn probe_subnet(
    probe: &dyn OccupancyProbe,
    network: &str,
    subnet: &str,
    cidr: &str,
    forbidden: ForbiddenRange<'_>,
) -> Result<FreeAddresses, ProbeError> {
    parse_cidr(cidr).map_err(|reason| ProbeError::InvalidCidr {
        network: network.to_string(),
        subnet: subnet.to_string(),
        reason,
    })?;
    let lines = probe.scan(cidr)?;
    let free = free_candidates(&lines, forbidden);
    info!(
        "Subnet {}/{} ({}): {} free addresses",
        network,
        subnet,
        cidr,
        free.len()
    );
    Ok(free)
}
