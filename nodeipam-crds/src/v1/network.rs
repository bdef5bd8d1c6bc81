use kube::{CustomResource, KubeSchema, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::v1::DEFAULT_NETWORK_NAME;

#[derive(
    CustomResource, KubeSchema, Serialize, Deserialize, Default, PartialEq, Eq, Clone, Debug,
)]
#[kube(
    group = "networking.gke.io",
    version = "v1",
    kind = "Network",
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// Network type, only "L3" networks carry pod ranges
    #[serde(rename = "type")]
    pub network_type: String,

    /// Reference to the provider specific parameters of this network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters_ref: Option<NetworkParametersReference>,
}

#[derive(Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NetworkParametersReference {
    pub group: String,
    pub kind: String,
    pub name: String,
}

impl Network {
    /// Networks marked for deletion take no part in allocation.
    pub fn is_live(&self) -> bool {
        self.meta().deletion_timestamp.is_none()
    }

    pub fn is_default(&self) -> bool {
        self.name_any() == DEFAULT_NETWORK_NAME
    }

    pub fn parameters_name(&self) -> Option<&str> {
        self.spec.parameters_ref.as_ref().map(|r| r.name.as_str())
    }
}
