use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use k8s_openapi::api::core::v1::{Node, NodeCondition, NodeSpec, NodeStatus};
use kube::ResourceExt;
use kube::api::ObjectMeta;
use nodeipam_crds::v1::NETWORK_TYPE_L3;
use nodeipam_crds::v1::network::{Network, NetworkParametersReference, NetworkSpec};
use nodeipam_crds::v1::params::{NetworkParameters, NetworkParametersSpec, SecondaryRanges};
use nodeipam_k8s_utils::NODE_NETWORK_UNAVAILABLE;

use crate::cloud::{AliasIpRange, DiscoveredInterface, InterfaceDiscovery, Ipv6Accommodation};
use crate::store::{NetworkStore, NodeStore};
use crate::{Error, Result};

pub(crate) const DEFAULT_PARAMS: &str = "DefaultGKENetworkParams";
pub(crate) const DEFAULT_VPC: &str = "projects/testProject/global/networks/default";
pub(crate) const DEFAULT_SUBNET: &str = "projects/testProject/regions/us-central1/subnetworks/default";

pub(crate) const RED_NETWORK: &str = "Red-Network";
pub(crate) const RED_PARAMS: &str = "RedGKENetworkParams";
pub(crate) const RED_VPC: &str = "projects/testProject/global/networks/red";
pub(crate) const RED_SUBNET: &str = "projects/testProject/regions/us-central1/subnetworks/red";

pub(crate) const BLUE_NETWORK: &str = "Blue-Network";
pub(crate) const BLUE_PARAMS: &str = "BlueGKENetworkParams";
pub(crate) const BLUE_VPC: &str = "projects/testProject/global/networks/blue";
pub(crate) const BLUE_SUBNET: &str = "projects/testProject/regions/us-central1/subnetworks/blue";

pub(crate) fn make_network(name: &str, params_name: &str) -> Network {
    Network::new(
        name,
        NetworkSpec {
            network_type: NETWORK_TYPE_L3.into(),
            parameters_ref: Some(NetworkParametersReference {
                group: "networking.gke.io".into(),
                kind: "GKENetworkParams".into(),
                name: params_name.into(),
            }),
        },
    )
}

pub(crate) fn make_params(name: &str, vpc: &str, subnet: &str, ranges: &[&str]) -> NetworkParameters {
    NetworkParameters::new(
        name,
        NetworkParametersSpec {
            vpc: vpc.into(),
            vpc_subnet: subnet.into(),
            pod_ipv4_ranges: Some(SecondaryRanges {
                range_names: ranges.iter().map(|r| r.to_string()).collect(),
            }),
        },
    )
}

pub(crate) fn make_node(name: &str, provider_id: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.into()),
            ..Default::default()
        },
        spec: Some(NodeSpec {
            provider_id: Some(provider_id.into()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn make_interface(
    network: &str,
    subnetwork: &str,
    network_ip: &str,
    ranges: &[(&str, &str)],
) -> DiscoveredInterface {
    DiscoveredInterface {
        name: String::new(),
        network: network.into(),
        subnetwork: subnetwork.into(),
        network_ip: network_ip.into(),
        alias_ip_ranges: ranges
            .iter()
            .map(|(cidr, range)| AliasIpRange {
                ip_cidr_range: cidr.to_string(),
                subnetwork_range_name: range.to_string(),
            })
            .collect(),
        ipv6_cidr_range: None,
    }
}

/// In-memory cluster recording every write it receives.
#[derive(Default)]
pub(crate) struct FakeCluster {
    pub networks: Vec<Network>,
    pub parameters: Vec<NetworkParameters>,
    pub nodes: Mutex<BTreeMap<String, Node>>,
    pub updated: Mutex<Vec<Node>>,
    pub cidr_patches: Mutex<Vec<(String, Vec<String>)>>,
    pub marked_available: Mutex<Vec<String>>,
    pub fail_list: bool,
    pub fail_updates: bool,
    pub update_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
}

impl FakeCluster {
    pub fn with_nodes(mut self, nodes: Vec<Node>) -> Self {
        self.nodes = Mutex::new(nodes.into_iter().map(|n| (n.name_any(), n)).collect());
        self
    }

    pub fn updated_nodes(&self) -> Vec<Node> {
        self.updated.lock().unwrap().clone()
    }

    pub fn stored_node(&self, name: &str) -> Option<Node> {
        self.nodes.lock().unwrap().get(name).cloned()
    }
}

impl NetworkStore for FakeCluster {
    async fn list_networks(&self) -> Result<Vec<Network>> {
        if self.fail_list {
            return Err(Error::Other("list networks failed".into()));
        }
        Ok(self.networks.clone())
    }

    async fn get_network_parameters(&self, name: &str) -> Result<NetworkParameters> {
        self.parameters
            .iter()
            .find(|p| p.name_any() == name)
            .cloned()
            .ok_or_else(|| Error::ResourceNotFound(name.into()))
    }
}

impl NodeStore for FakeCluster {
    async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.stored_node(name))
    }

    async fn update_node(&self, node: &Node) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates {
            return Err(Error::Other("update failed".into()));
        }
        self.updated.lock().unwrap().push(node.clone());
        // Only annotations and capacity are written, like the kube store.
        let mut nodes = self.nodes.lock().unwrap();
        let stored = nodes
            .entry(node.name_any())
            .or_insert_with(|| node.clone());
        stored.metadata.annotations = node.metadata.annotations.clone();
        stored.status.get_or_insert_with(NodeStatus::default).capacity =
            node.status.as_ref().and_then(|s| s.capacity.clone());
        Ok(())
    }

    async fn patch_pod_cidrs(&self, name: &str, cidrs: &[String]) -> Result<()> {
        self.cidr_patches
            .lock()
            .unwrap()
            .push((name.into(), cidrs.to_vec()));
        if let Some(node) = self.nodes.lock().unwrap().get_mut(name) {
            let spec = node.spec.get_or_insert_with(Default::default);
            spec.pod_cidr = cidrs.first().cloned();
            spec.pod_cidrs = Some(cidrs.to_vec());
        }
        Ok(())
    }

    async fn mark_network_available(&self, name: &str) -> Result<()> {
        self.marked_available.lock().unwrap().push(name.into());
        if let Some(node) = self.nodes.lock().unwrap().get_mut(name) {
            let status = node.status.get_or_insert_with(NodeStatus::default);
            status.conditions = Some(vec![NodeCondition {
                type_: NODE_NETWORK_UNAVAILABLE.into(),
                status: "False".into(),
                ..Default::default()
            }]);
        }
        Ok(())
    }
}

/// Cloud returning fixed interfaces per node name.
#[derive(Default)]
pub(crate) struct FakeCloud {
    pub interfaces: BTreeMap<String, Vec<DiscoveredInterface>>,
    pub ipv6_range: Option<String>,
    pub accommodate_calls: AtomicUsize,
}

impl FakeCloud {
    pub fn with_interfaces(node: &str, interfaces: Vec<DiscoveredInterface>) -> Self {
        let mut cloud = Self::default();
        cloud.interfaces.insert(node.into(), interfaces);
        cloud
    }
}

impl InterfaceDiscovery for FakeCloud {
    async fn network_interfaces(&self, node: &Node) -> Result<Vec<DiscoveredInterface>> {
        self.interfaces
            .get(&node.name_any())
            .cloned()
            .ok_or_else(|| Error::Cloud(format!("unknown instance {}", node.name_any())))
    }
}

impl Ipv6Accommodation for FakeCloud {
    fn accommodate_ipv6(
        &self,
        mut cidrs: Vec<String>,
        _interface: &DiscoveredInterface,
        _provider_id: &str,
    ) -> Vec<String> {
        self.accommodate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(range) = &self.ipv6_range
            && !cidrs.contains(range)
        {
            cidrs.push(range.clone());
        }
        cidrs
    }
}
