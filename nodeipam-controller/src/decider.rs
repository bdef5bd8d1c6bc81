use ipnetwork::IpNetwork;
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use nodeipam_k8s_utils::node_pod_cidrs;
use tracing::warn;

use crate::{Error, Result};

/// Parses a list of CIDR strings, failing on the first malformed entry.
pub fn parse_cidrs<S: AsRef<str>>(cidrs: &[S]) -> Result<Vec<IpNetwork>> {
    cidrs
        .iter()
        .map(|c| c.as_ref().parse::<IpNetwork>().map_err(Error::from))
        .collect()
}

/// Network identity of two CIDRs, ignoring host bits and textual form.
pub fn same_network(a: &IpNetwork, b: &IpNetwork) -> bool {
    a.network() == b.network() && a.prefix() == b.prefix()
}

#[derive(Default)]
struct ByFamily {
    v4: Option<IpNetwork>,
    v6: Option<IpNetwork>,
}

impl ByFamily {
    fn slot(&mut self, cidr: &IpNetwork) -> &mut Option<IpNetwork> {
        match cidr {
            IpNetwork::V4(_) => &mut self.v4,
            IpNetwork::V6(_) => &mut self.v6,
        }
    }
}

/// Splits the desired set into at most one CIDR per family. Anything other
/// than a single CIDR or a v4/v6 pair is rejected.
fn desired_by_family(desired: &[IpNetwork]) -> Result<ByFamily> {
    let mut families = ByFamily::default();
    match desired {
        [single] => *families.slot(single) = Some(*single),
        [a, b] if a.is_ipv4() != b.is_ipv4() => {
            *families.slot(a) = Some(*a);
            *families.slot(b) = Some(*b);
        }
        [_, _] => {
            return Err(Error::InvalidCidrSet(format!(
                "{desired:?} is not a dual-stack pair"
            )));
        }
        _ => {
            return Err(Error::InvalidCidrSet(format!(
                "expected one cidr or a dual-stack pair, got {}",
                desired.len()
            )));
        }
    }
    Ok(families)
}

/// Reports whether the node's assigned pod CIDRs differ from `desired` in any
/// IP family present in `desired`.
///
/// A node CIDR that does not parse counts as a mismatch rather than an error,
/// so that the write replaces it.
pub fn need_pod_cidrs_update(node: &Node, desired: &[IpNetwork]) -> Result<bool> {
    let desired = desired_by_family(desired)?;

    let mut assigned = ByFamily::default();
    for cidr in node_pod_cidrs(node) {
        match cidr.parse::<IpNetwork>() {
            Ok(parsed) => {
                let slot = assigned.slot(&parsed);
                if slot.is_none() {
                    *slot = Some(parsed);
                }
            }
            Err(e) => {
                warn!(
                    "node {} has an unparsable pod cidr {}: {}",
                    node.name_any(),
                    cidr,
                    e
                );
                return Ok(true);
            }
        }
    }

    let differs = |want: Option<IpNetwork>, have: Option<IpNetwork>| match (want, have) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(want), Some(have)) => !same_network(&want, &have),
    };
    Ok(differs(desired.v4, assigned.v4) || differs(desired.v6, assigned.v6))
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::NodeSpec;

    use super::*;

    fn node_with(pod_cidr: &str, pod_cidrs: &[&str]) -> Node {
        Node {
            spec: Some(NodeSpec {
                pod_cidr: (!pod_cidr.is_empty()).then(|| pod_cidr.to_string()),
                pod_cidrs: (!pod_cidrs.is_empty())
                    .then(|| pod_cidrs.iter().map(|c| c.to_string()).collect()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn check(desired: &[&str], pod_cidr: &str, pod_cidrs: &[&str]) -> Result<bool> {
        let desired = parse_cidrs(desired).expect("valid desired cidrs");
        need_pod_cidrs_update(&node_with(pod_cidr, pod_cidrs), &desired)
    }

    #[test]
    fn test_malformed_node_cidr_needs_update() {
        let got = check(&["10.10.10.0/24"], "10.10..0/24", &["10.10..0/24"]);
        assert!(got.expect("no error"));
    }

    #[test]
    fn test_two_cidrs_same_family_is_error() {
        let got = check(
            &["10.10.10.0/24", "10.10.11.0/24"],
            "10.10.10.0/24",
            &["10.10.10.0/24", "2001:db8::/64"],
        );
        assert!(matches!(got, Err(Error::InvalidCidrSet(_))));
    }

    #[test]
    fn test_empty_or_oversized_desired_is_error() {
        assert!(check(&[], "10.10.10.0/24", &[]).is_err());
        assert!(
            check(
                &["10.10.10.0/24", "2001:db8::/64", "10.10.11.0/24"],
                "",
                &[]
            )
            .is_err()
        );
    }

    #[test]
    fn test_matching_v4() {
        let got = check(&["10.10.10.0/24"], "10.10.10.0/24", &["10.10.10.0/24"]);
        assert!(!got.expect("no error"));
    }

    #[test]
    fn test_unassigned_node_needs_update() {
        assert!(check(&["10.10.10.0/24"], "", &[]).expect("no error"));
        assert!(check(&["10.10.10.0/24", "2001:db8::/64"], "", &[]).expect("no error"));
    }

    #[test]
    fn test_non_matching_v4() {
        let got = check(&["10.10.10.0/24"], "10.10.11.0/24", &["10.10.11.0/24"]);
        assert!(got.expect("no error"));
    }

    #[test]
    fn test_matching_dual_stack() {
        let got = check(
            &["10.10.10.0/24", "2001:db8::/64"],
            "10.10.10.0/24",
            &["10.10.10.0/24", "2001:db8::/64"],
        );
        assert!(!got.expect("no error"));
    }

    #[test]
    fn test_equal_networks_with_different_text() {
        let got = check(
            &["10.10.10.0/24", "2001:db8::/64"],
            "10.10.10.0/24",
            &["10.10.10.0/24", "2001:db8:0::/64"],
        );
        assert!(!got.expect("no error"));
    }

    #[test]
    fn test_non_matching_v6() {
        let got = check(
            &["10.10.10.0/24", "2001:db8::/64"],
            "10.10.10.0/24",
            &["10.10.10.0/24", "2001:dba::/64"],
        );
        assert!(got.expect("no error"));
    }

    #[test]
    fn test_non_matching_v4_with_matching_v6() {
        let got = check(
            &["10.10.10.0/24", "2001:db8::/64"],
            "10.10.1.0/24",
            &["10.10.1.0/24", "2001:db8::/64"],
        );
        assert!(got.expect("no error"));
    }

    #[test]
    fn test_missing_v6() {
        let got = check(
            &["10.10.10.0/24", "2001:db8::/64"],
            "10.10.10.0/24",
            &["10.10.10.0/24"],
        );
        assert!(got.expect("no error"));
    }

    #[test]
    fn test_desired_order_does_not_matter() {
        let got = check(
            &["2001:db8::/64", "10.10.10.0/24"],
            "10.10.10.0/24",
            &["10.10.10.0/24", "2001:db8::/64"],
        );
        assert!(!got.expect("no error"));
    }

    #[test]
    fn test_same_network_ignores_host_bits() {
        let a: IpNetwork = "10.10.10.7/24".parse().unwrap();
        let b: IpNetwork = "10.10.10.0/24".parse().unwrap();
        let c: IpNetwork = "10.10.10.0/25".parse().unwrap();
        assert!(same_network(&a, &b));
        assert!(!same_network(&b, &c));
    }
}
