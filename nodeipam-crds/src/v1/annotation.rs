use serde::{Deserialize, Serialize};

use crate::Result;

/// Node annotation holding the serialized [`NorthInterfacesAnnotation`].
pub const NORTH_INTERFACES_ANNOTATION_KEY: &str = "networking.gke.io/north-interfaces";

/// Node annotation holding the serialized [`MultiNetworkAnnotation`].
pub const MULTI_NETWORK_ANNOTATION_KEY: &str = "networking.gke.io/networks";

/// Prefix of the per-network resource names published in node capacity.
pub const NETWORK_RESOURCE_KEY_PREFIX: &str = "networking.gke.io.networks/";

pub const NETWORK_RESOURCE_KEY_SUFFIX: &str = ".IP";

pub const SCOPE_HOST_LOCAL: &str = "host-local";

/// The node's reachable address on a secondary network.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NorthInterface {
    pub network: String,
    pub ip_address: String,
}

/// Pod address pool of a secondary network on a node.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct NodeNetwork {
    pub name: String,
    pub cidrs: Vec<String>,
    pub scope: String,
}

impl NodeNetwork {
    pub fn host_local(name: impl Into<String>, cidrs: Vec<String>) -> Self {
        Self {
            name: name.into(),
            cidrs,
            scope: SCOPE_HOST_LOCAL.into(),
        }
    }
}

pub type NorthInterfacesAnnotation = Vec<NorthInterface>;

pub type MultiNetworkAnnotation = Vec<NodeNetwork>;

pub fn network_resource_key(network: &str) -> String {
    format!("{NETWORK_RESOURCE_KEY_PREFIX}{network}{NETWORK_RESOURCE_KEY_SUFFIX}")
}

pub fn marshal_north_interfaces_annotation(annotation: &[NorthInterface]) -> Result<String> {
    Ok(serde_json::to_string(annotation)?)
}

pub fn parse_north_interfaces_annotation(value: &str) -> Result<NorthInterfacesAnnotation> {
    Ok(serde_json::from_str(value)?)
}

pub fn marshal_annotation(annotation: &[NodeNetwork]) -> Result<String> {
    Ok(serde_json::to_string(annotation)?)
}

pub fn parse_annotation(value: &str) -> Result<MultiNetworkAnnotation> {
    Ok(serde_json::from_str(value)?)
}
