use std::future::Future;

use ahash::HashMap;
use k8s_openapi::api::core::v1::Node;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A network interface attached to a node's instance, as reported by the
/// cloud provider on every allocation pass.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredInterface {
    #[serde(default)]
    pub name: String,
    pub network: String,
    pub subnetwork: String,
    #[serde(rename = "networkIP")]
    pub network_ip: String,
    #[serde(default)]
    pub alias_ip_ranges: Vec<AliasIpRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6_cidr_range: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AliasIpRange {
    pub ip_cidr_range: String,
    pub subnetwork_range_name: String,
}

impl DiscoveredInterface {
    /// Alias ranges keyed by secondary range name. A repeated name keeps the
    /// last range.
    pub fn alias_ranges_by_name(&self) -> HashMap<&str, &AliasIpRange> {
        self.alias_ip_ranges
            .iter()
            .map(|r| (r.subnetwork_range_name.as_str(), r))
            .collect()
    }
}

pub trait InterfaceDiscovery: Send + Sync + 'static {
    fn network_interfaces(
        &self,
        node: &Node,
    ) -> impl Future<Output = Result<Vec<DiscoveredInterface>>> + Send;
}

pub trait Ipv6Accommodation: Send + Sync + 'static {
    /// Returns the default network CIDRs extended with whatever IPv6 range the
    /// provider grants `interface`.
    fn accommodate_ipv6(
        &self,
        cidrs: Vec<String>,
        interface: &DiscoveredInterface,
        provider_id: &str,
    ) -> Vec<String>;
}
