//! Value merging utilities.
//!
//! Every place where a child scope inherits from its parent goes through
//! [`deep_merge`], so inheritance has exactly one semantics across the crate.

use serde_yaml::{Mapping, Value};

/// Merge `overrides` over `defaults`, returning a new mapping.
///
/// - mapping over mapping: merged recursively
/// - anything else (scalars, sequences, mismatched kinds): the override replaces the default
/// - keys absent from `overrides` are inherited unchanged
///
/// Sequences are never concatenated.
pub fn deep_merge(defaults: &Mapping, overrides: &Mapping) -> Mapping {
    let mut merged = defaults.clone();

    for (key, value) in overrides {
        let combined = match (merged.get(key), value) {
            (Some(Value::Mapping(base)), Value::Mapping(over)) => {
                Value::Mapping(deep_merge(base, over))
            }
            _ => value.clone(),
        };
        merged.insert(key.clone(), combined);
    }

    merged
}

/// Remove the given keys from a mapping, returning the rest
pub fn without_keys(values: &Mapping, keys: &[&str]) -> Mapping {
    values
        .iter()
        .filter(|(key, _)| !key.as_str().is_some_and(|k| keys.contains(&k)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Mapping {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn test_override_wins_on_leaf() {
        let merged = deep_merge(&yaml("a: 1\nb: 2\n"), &yaml("b: 3\n"));
        assert_eq!(merged, yaml("a: 1\nb: 3\n"));
    }

    #[test]
    fn test_nested_mappings_merge() {
        let base = yaml(
            r#"
network:
  main:
    subnets:
      front: {cidr_block: 10.0.0.0/24}
root_volume_size: {aws: 20}
"#,
        );
        let over = yaml(
            r#"
network:
  main:
    subnets:
      front: {availability_zone: az1}
root_volume_size: {vsphere: 40}
"#,
        );
        let merged = deep_merge(&base, &over);
        let expected = yaml(
            r#"
network:
  main:
    subnets:
      front: {cidr_block: 10.0.0.0/24, availability_zone: az1}
root_volume_size: {aws: 20, vsphere: 40}
"#,
        );
        assert_eq!(merged, expected);
    }

    #[test]
    fn test_sequences_are_replaced_not_concatenated() {
        let merged = deep_merge(&yaml("tags: [a, b]\n"), &yaml("tags: [c]\n"));
        assert_eq!(merged, yaml("tags: [c]\n"));
    }

    #[test]
    fn test_kind_mismatch_takes_override() {
        let merged = deep_merge(&yaml("policies: {fw: open}\n"), &yaml("policies: none\n"));
        assert_eq!(merged, yaml("policies: none\n"));
    }

    #[test]
    fn test_defaults_are_not_mutated() {
        let base = yaml("client_name: acme\n");
        let _ = deep_merge(&base, &yaml("client_name: other\n"));
        assert_eq!(base, yaml("client_name: acme\n"));
    }

    #[test]
    fn test_without_keys() {
        let values = yaml("vms: []\nclient_name: acme\nkubernetes: {}\n");
        assert_eq!(without_keys(&values, &["vms", "kubernetes"]), yaml("client_name: acme\n"));
    }
}
