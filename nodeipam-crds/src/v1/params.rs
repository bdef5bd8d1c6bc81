use kube::CustomResource;
use kube::KubeSchema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Cloud side description of a network: the VPC and subnetwork serving it
/// and the subnetwork secondary ranges reserved for pod addresses.
#[derive(
    CustomResource, KubeSchema, Serialize, Deserialize, Default, PartialEq, Eq, Clone, Debug,
)]
#[kube(
    group = "networking.gke.io",
    version = "v1",
    kind = "GKENetworkParams",
    root = "NetworkParameters",
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkParametersSpec {
    pub vpc: String,

    pub vpc_subnet: String,

    #[serde(
        default,
        rename = "podIPv4Ranges",
        skip_serializing_if = "Option::is_none"
    )]
    pub pod_ipv4_ranges: Option<SecondaryRanges>,
}

#[derive(Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryRanges {
    #[serde(default)]
    pub range_names: Vec<String>,
}

impl NetworkParameters {
    /// Secondary range names reserved for pod IPv4 addresses, in declared order.
    pub fn pod_ipv4_range_names(&self) -> &[String] {
        self.spec
            .pod_ipv4_ranges
            .as_ref()
            .map(|r| r.range_names.as_slice())
            .unwrap_or_default()
    }
}
