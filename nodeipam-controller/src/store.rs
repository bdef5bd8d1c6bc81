use std::future::Future;

use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Api, Client, ResourceExt};
use nodeipam_crds::v1::annotation::{
    MULTI_NETWORK_ANNOTATION_KEY, NETWORK_RESOURCE_KEY_PREFIX, NORTH_INTERFACES_ANNOTATION_KEY,
};
use nodeipam_crds::v1::network::Network;
use nodeipam_crds::v1::params::NetworkParameters;
use nodeipam_k8s_utils::NODE_NETWORK_UNAVAILABLE;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::{Error, Result};

const FIELD_MANAGER: &str = "nodeipam-controller";

fn patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(FIELD_MANAGER.into()),
        ..Default::default()
    }
}

fn network_capacity(node: &Node) -> impl Iterator<Item = (&String, &Quantity)> {
    node.status
        .iter()
        .flat_map(|s| s.capacity.iter())
        .flatten()
        .filter(|(key, _)| key.starts_with(NETWORK_RESOURCE_KEY_PREFIX))
}

/// Merge patch writing the multi-network annotations and network capacity of
/// `desired`. Only keys owned by this controller are sent. Network capacity
/// on `cached` that `desired` no longer carries is removed.
fn multi_network_patch(desired: &Node, cached: Option<&Node>) -> Value {
    let annotations: Map<String, Value> = desired
        .annotations()
        .iter()
        .filter(|(key, _)| {
            key.as_str() == NORTH_INTERFACES_ANNOTATION_KEY
                || key.as_str() == MULTI_NETWORK_ANNOTATION_KEY
        })
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();

    let mut capacity = Map::new();
    for (key, _) in cached.into_iter().flat_map(network_capacity) {
        capacity.insert(key.clone(), Value::Null);
    }
    for (key, quantity) in network_capacity(desired) {
        capacity.insert(key.clone(), Value::String(quantity.0.clone()));
    }
    json!({
        "metadata": { "annotations": annotations },
        "status": { "capacity": capacity },
    })
}

/// Read access to the cluster's network definitions.
pub trait NetworkStore: Send + Sync + 'static {
    fn list_networks(&self) -> impl Future<Output = Result<Vec<Network>>> + Send;

    fn get_network_parameters(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<NetworkParameters>> + Send;
}

/// Read/write access to node objects. A node that no longer exists is
/// reported as `None`.
pub trait NodeStore: Send + Sync + 'static {
    fn get_node(&self, name: &str) -> impl Future<Output = Result<Option<Node>>> + Send;

    fn update_node(&self, node: &Node) -> impl Future<Output = Result<()>> + Send;

    fn patch_pod_cidrs(&self, name: &str, cidrs: &[String])
    -> impl Future<Output = Result<()>> + Send;

    fn mark_network_available(&self, name: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Cluster access backed by reflector stores for reads and the API server
/// for node writes.
#[derive(Clone)]
pub struct KubeClusterStore {
    node_api: Api<Node>,
    nodes: Store<Node>,
    networks: Store<Network>,
    parameters: Store<NetworkParameters>,
}

impl KubeClusterStore {
    pub fn new(
        client: Client,
        nodes: Store<Node>,
        networks: Store<Network>,
        parameters: Store<NetworkParameters>,
    ) -> Self {
        Self {
            node_api: Api::all(client),
            nodes,
            networks,
            parameters,
        }
    }
}

impl NetworkStore for KubeClusterStore {
    async fn list_networks(&self) -> Result<Vec<Network>> {
        Ok(self
            .networks
            .state()
            .iter()
            .map(|n| n.as_ref().clone())
            .collect())
    }

    async fn get_network_parameters(&self, name: &str) -> Result<NetworkParameters> {
        self.parameters
            .get(&ObjectRef::new(name))
            .map(|p| p.as_ref().clone())
            .ok_or_else(|| Error::ResourceNotFound(format!("GKENetworkParams {name}")))
    }
}

impl NodeStore for KubeClusterStore {
    async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        Ok(self
            .nodes
            .get(&ObjectRef::new(name))
            .map(|n| n.as_ref().clone()))
    }

    async fn update_node(&self, node: &Node) -> Result<()> {
        let name = node.name_any();
        let cached = self.nodes.get(&ObjectRef::new(&name));
        let patch = multi_network_patch(node, cached.as_deref());
        // Node status updates keep metadata, so one status patch carries both.
        self.node_api
            .patch_status(&name, &patch_params(), &Patch::Merge(&patch))
            .await?;
        debug!("updated annotations and capacity on Node {}", name);
        Ok(())
    }

    async fn patch_pod_cidrs(&self, name: &str, cidrs: &[String]) -> Result<()> {
        let Some(first) = cidrs.first() else {
            return Err(Error::InvalidCidrSet("no cidrs to patch".into()));
        };
        let patch = json!({ "spec": { "podCIDR": first, "podCIDRs": cidrs } });
        self.node_api
            .patch(name, &patch_params(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn mark_network_available(&self, name: &str) -> Result<()> {
        let now = Time(Utc::now());
        let patch = json!({
            "status": {
                "conditions": [{
                    "type": NODE_NETWORK_UNAVAILABLE,
                    "status": "False",
                    "reason": "RouteCreated",
                    "message": "NodeController create implicit route",
                    "lastTransitionTime": now,
                    "lastHeartbeatTime": now,
                }]
            }
        });
        self.node_api
            .patch_status(name, &patch_params(), &Patch::Strategic(&patch))
            .await?;
        Ok(())
    }
}
