//! IP utility functions for validation and range handling

use ipnet::{Ipv4AddrRange, Ipv4Net};
use std::net::{IpAddr, Ipv4Addr};

/// Check if a string is a valid IP address (IPv4 or IPv6)
pub fn is_valid_ip(ip: &str) -> bool {
    ip.parse::<IpAddr>().is_ok()
}

/// Parse an IPv4 address, naming the offending value on failure
pub fn parse_ipv4(ip: &str) -> Result<Ipv4Addr, String> {
    ip.trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| format!("invalid IPv4 address '{}'", ip))
}

/// Expand an inclusive IPv4 range into its addresses, ascending
pub fn expand_ipv4_range(start: &str, end: &str) -> Result<Vec<String>, String> {
    let start_addr = parse_ipv4(start)?;
    let end_addr = parse_ipv4(end)?;

    if start_addr > end_addr {
        return Err(format!("range start {} is after range end {}", start_addr, end_addr));
    }

    Ok(Ipv4AddrRange::new(start_addr, end_addr)
        .map(|addr| addr.to_string())
        .collect())
}

/// Check whether `ip` falls in the inclusive range `[start, stop]`.
///
/// Unparsable values are never in range.
pub fn in_ipv4_range(ip: &str, start: &str, stop: &str) -> bool {
    match (parse_ipv4(ip), parse_ipv4(start), parse_ipv4(stop)) {
        (Ok(ip), Ok(start), Ok(stop)) => start <= ip && ip <= stop,
        _ => false,
    }
}

/// Parse a CIDR block such as `10.0.0.0/24`
pub fn parse_cidr(cidr: &str) -> Result<Ipv4Net, String> {
    cidr.trim()
        .parse::<Ipv4Net>()
        .map_err(|_| format!("invalid CIDR block '{}'", cidr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_range_inclusive() {
        let range = expand_ipv4_range("10.0.0.2", "10.0.0.5").unwrap();
        assert_eq!(range, vec!["10.0.0.2", "10.0.0.3", "10.0.0.4", "10.0.0.5"]);
    }

    #[test]
    fn test_expand_range_crosses_octet() {
        let range = expand_ipv4_range("10.0.0.254", "10.0.1.1").unwrap();
        assert_eq!(range, vec!["10.0.0.254", "10.0.0.255", "10.0.1.0", "10.0.1.1"]);
    }

    #[test]
    fn test_expand_single_address() {
        assert_eq!(expand_ipv4_range("10.0.0.9", "10.0.0.9").unwrap(), vec!["10.0.0.9"]);
    }

    #[test]
    fn test_expand_rejects_reversed_or_invalid() {
        assert!(expand_ipv4_range("10.0.0.9", "10.0.0.1").is_err());
        assert!(expand_ipv4_range("10.0.0", "10.0.0.1").is_err());
    }

    #[test]
    fn test_in_range() {
        assert!(in_ipv4_range("10.0.0.5", "10.0.0.1", "10.0.0.10"));
        assert!(in_ipv4_range("10.0.0.10", "10.0.0.1", "10.0.0.10"));
        assert!(!in_ipv4_range("10.0.0.11", "10.0.0.1", "10.0.0.10"));
        assert!(!in_ipv4_range("garbage", "10.0.0.1", "10.0.0.10"));
    }

    #[test]
    fn test_parse_cidr() {
        assert_eq!(parse_cidr("10.0.0.0/24").unwrap().prefix_len(), 24);
        assert!(parse_cidr("10.0.0.0/33").is_err());
        assert!(is_valid_ip("::1"));
    }
}
