use std::collections::BTreeMap;
use std::path::PathBuf;

use ipnetwork::IpNetwork;
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use serde::Deserialize;
use tracing::debug;

use crate::cloud::{DiscoveredInterface, InterfaceDiscovery, Ipv6Accommodation};
use crate::{Error, Result};

#[derive(Deserialize, Debug, Default)]
struct Inventory {
    #[serde(default)]
    nodes: BTreeMap<String, Vec<DiscoveredInterface>>,
}

/// Interface discovery backed by a YAML file mapping node names to their
/// network interfaces:
///
/// ```yaml
/// nodes:
///   node-a:
///     - name: nic0
///       network: projects/p/global/networks/default
///       subnetwork: projects/p/regions/r/subnetworks/default
///       networkIP: 10.128.0.2
///       aliasIpRanges:
///         - ipCidrRange: 10.4.0.0/24
///           subnetworkRangeName: pods
///       ipv6CidrRange: 2600:1900:4000::/112
/// ```
///
/// The file is read on every call, so edits apply to the next pass.
#[derive(Clone, Debug)]
pub struct InventoryCloud {
    path: PathBuf,
}

impl InventoryCloud {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Inventory> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_yaml::from_str(&raw)?)
    }
}

impl InterfaceDiscovery for InventoryCloud {
    async fn network_interfaces(&self, node: &Node) -> Result<Vec<DiscoveredInterface>> {
        let name = node.name_any();
        let mut inventory = self.load().await?;
        inventory.nodes.remove(&name).ok_or_else(|| {
            Error::Cloud(format!(
                "instance {} not found in {}",
                name,
                self.path.display()
            ))
        })
    }
}

impl Ipv6Accommodation for InventoryCloud {
    fn accommodate_ipv6(
        &self,
        mut cidrs: Vec<String>,
        interface: &DiscoveredInterface,
        provider_id: &str,
    ) -> Vec<String> {
        let has_v6 = cidrs
            .iter()
            .any(|c| matches!(c.parse::<IpNetwork>(), Ok(IpNetwork::V6(_))));
        if has_v6 {
            return cidrs;
        }
        if let Some(range) = interface.ipv6_cidr_range.as_ref() {
            debug!("granting ipv6 range {} to {}", range, provider_id);
            cidrs.push(range.clone());
        }
        cidrs
    }
}
