use ahash::HashMap;
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use nodeipam_crds::v1::annotation::{
    MultiNetworkAnnotation, NodeNetwork, NorthInterface, NorthInterfacesAnnotation,
};
use nodeipam_crds::v1::network::Network;
use nodeipam_crds::v1::params::NetworkParameters;
use nodeipam_k8s_utils::node_provider_id;
use tracing::{debug, info};

use crate::cloud::{DiscoveredInterface, Ipv6Accommodation};
use crate::resource::resource_name;
use crate::store::NetworkStore;
use crate::{Error, Result};

/// Outcome of matching a node's interfaces against the cluster's networks.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MultiNetworkAllocation {
    /// Pod CIDRs of the default network, IPv6 included when granted.
    pub default_cidrs: Vec<String>,
    pub north_interfaces: NorthInterfacesAnnotation,
    pub additional_networks: MultiNetworkAnnotation,
}

/// Derives the pod CIDRs of every network the node is attached to.
///
/// Interfaces are visited in the order the cloud reports them and, for each
/// interface, live networks in name order, so the result only depends on the
/// current cluster and cloud state. Each (interface, network) pair yields at
/// most one CIDR: the first of the network's secondary ranges present among
/// the interface's alias ranges. Failing to list networks or to fetch the
/// parameters of a network aborts the whole call.
pub async fn perform_multi_network_cidr_allocation<N, C>(
    networks: &N,
    cloud: &C,
    node: &Node,
    interfaces: &[DiscoveredInterface],
) -> Result<MultiNetworkAllocation>
where
    N: NetworkStore,
    C: Ipv6Accommodation,
{
    let mut live: Vec<Network> = networks
        .list_networks()
        .await
        .map_err(|e| Error::NetworkList(e.to_string()))?
        .into_iter()
        .filter(Network::is_live)
        .collect();
    live.sort_by_key(|n| n.name_any());

    let provider_id = node_provider_id(node).unwrap_or_default();
    let mut parameters: HashMap<String, NetworkParameters> = HashMap::default();
    let mut allocation = MultiNetworkAllocation::default();

    for inf in interfaces {
        let alias_ranges = inf.alias_ranges_by_name();
        for network in &live {
            let network_name = network.name_any();
            let Some(params_name) = network.parameters_name() else {
                debug!("network {} has no parameters reference, skipping", network_name);
                continue;
            };
            debug!("allotting pod cidrs for network {}", network_name);

            if !parameters.contains_key(params_name) {
                let params = networks
                    .get_network_parameters(params_name)
                    .await
                    .map_err(|e| Error::NetworkParameters {
                        name: params_name.to_owned(),
                        reason: e.to_string(),
                    })?;
                parameters.insert(params_name.to_owned(), params);
            }
            let Some(params) = parameters.get(params_name) else {
                continue;
            };

            if resource_name(&inf.network) != resource_name(&params.spec.vpc)
                || resource_name(&inf.subnetwork) != resource_name(&params.spec.vpc_subnet)
            {
                continue;
            }
            info!(
                interface = %inf.name,
                network = %network_name,
                "interface matched, looking for a secondary range"
            );

            let range_names = params.pod_ipv4_range_names();
            if range_names.is_empty() && !network.is_default() {
                allocation.north_interfaces.push(NorthInterface {
                    network: network_name,
                    ip_address: inf.network_ip.clone(),
                });
                continue;
            }

            let Some(range) = range_names
                .iter()
                .find_map(|name| alias_ranges.get(name.as_str()))
            else {
                continue;
            };
            debug!(
                "found secondary range {} for network {}",
                range.subnetwork_range_name, network_name
            );

            if network.is_default() {
                allocation.default_cidrs.push(range.ip_cidr_range.clone());
                allocation.default_cidrs = cloud.accommodate_ipv6(
                    std::mem::take(&mut allocation.default_cidrs),
                    inf,
                    provider_id,
                );
            } else {
                allocation.north_interfaces.push(NorthInterface {
                    network: network_name.clone(),
                    ip_address: inf.network_ip.clone(),
                });
                allocation
                    .additional_networks
                    .push(NodeNetwork::host_local(
                        network_name,
                        vec![range.ip_cidr_range.clone()],
                    ));
            }
        }
    }
    Ok(allocation)
}
