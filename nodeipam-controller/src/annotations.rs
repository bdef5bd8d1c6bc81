use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Node, NodeStatus};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use nodeipam_crds::v1::annotation::{
    MULTI_NETWORK_ANNOTATION_KEY, NETWORK_RESOURCE_KEY_PREFIX, NORTH_INTERFACES_ANNOTATION_KEY,
    NodeNetwork, NorthInterface, marshal_annotation, marshal_north_interfaces_annotation,
    network_resource_key,
};

use crate::Result;
use crate::store::NodeStore;

/// Allocatable IP count advertised for every additional network a node joins.
pub const NETWORK_IP_CAPACITY: i64 = 128;

/// Returns a copy of `node` carrying the given multi-network annotations and
/// one capacity entry per additional network. Capacity entries for networks
/// the node no longer belongs to are removed; other capacity is untouched.
pub fn desired_node(
    node: &Node,
    north_interfaces: &[NorthInterface],
    additional_networks: &[NodeNetwork],
) -> Result<Node> {
    let mut node = node.clone();

    let annotations = node.metadata.annotations.get_or_insert_with(BTreeMap::new);
    annotations.insert(
        NORTH_INTERFACES_ANNOTATION_KEY.to_owned(),
        marshal_north_interfaces_annotation(north_interfaces)?,
    );
    annotations.insert(
        MULTI_NETWORK_ANNOTATION_KEY.to_owned(),
        marshal_annotation(additional_networks)?,
    );

    let capacity = node
        .status
        .get_or_insert_with(NodeStatus::default)
        .capacity
        .get_or_insert_with(BTreeMap::new);
    capacity.retain(|key, _| !key.starts_with(NETWORK_RESOURCE_KEY_PREFIX));
    for network in additional_networks {
        capacity.insert(
            network_resource_key(&network.name),
            Quantity(NETWORK_IP_CAPACITY.to_string()),
        );
    }
    Ok(node)
}

/// True when writing the annotations would not change the node.
pub fn annotations_current(
    node: &Node,
    north_interfaces: &[NorthInterface],
    additional_networks: &[NodeNetwork],
) -> Result<bool> {
    let desired = desired_node(node, north_interfaces, additional_networks)?;
    Ok(desired.metadata.annotations == node.metadata.annotations
        && desired.status.as_ref().and_then(|s| s.capacity.as_ref())
            == node.status.as_ref().and_then(|s| s.capacity.as_ref()))
}

/// Writes the north interfaces and additional networks onto the node and
/// advertises IP capacity for each additional network, in a single update.
/// Errors from the store are returned as is.
pub async fn update_multi_network_annotations<S: NodeStore>(
    store: &S,
    node: &Node,
    north_interfaces: &[NorthInterface],
    additional_networks: &[NodeNetwork],
) -> Result<()> {
    let node = desired_node(node, north_interfaces, additional_networks)?;
    store.update_node(&node).await
}
