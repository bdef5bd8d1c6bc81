use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::serde::de::DeserializeOwned;
use kube::runtime::reflector::{ReflectHandle, Store};
use kube::runtime::{WatchStreamExt, reflector, watcher};
use kube::{Api, Resource};
use thiserror::Error;
use tracing::{error, trace};

/// Buffer of the shared reflector; subscribers lagging further behind than
/// this stall the watch.
const SUBSCRIBER_BUFFER: usize = 1024;

pub const NODE_NETWORK_UNAVAILABLE: &str = "NetworkUnavailable";

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to create store: {0}")]
    StoreCreation(String),

    #[error("kube error: {0}")]
    KubeError(#[from] kube::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Starts a shared reflector for `api` and waits for the initial list to land
/// in the store, optionally bounded by `timeout`.
pub async fn create_store_and_subscriber<K>(
    api: Api<K>,
    config: watcher::Config,
    timeout: Option<Duration>,
) -> Result<(Store<K>, ReflectHandle<K>)>
where
    K: Resource + Send + Clone + Debug + DeserializeOwned + Sync + 'static,
    <K as Resource>::DynamicType: Default + Eq + Send + DeserializeOwned + Hash + Clone,
{
    let (store, writer) = reflector::store_shared(SUBSCRIBER_BUFFER);
    let subscriber: ReflectHandle<K> = writer
        .subscribe()
        .ok_or_else(|| Error::StoreCreation("failed to create subscriber".into()))?;

    let kind = K::kind(&Default::default()).into_owned();
    let stream = watcher(api, config)
        .default_backoff()
        .reflect_shared(writer)
        .for_each(move |res| {
            let kind = kind.clone();
            async move {
                match res {
                    Ok(ev) => trace!("received {} event: {:?}", kind, ev),
                    Err(e) => {
                        error!(%e, "unexpected error with {} stream", kind)
                    }
                }
            }
        });

    tokio::spawn(stream);
    let wait = store.wait_until_ready();
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| Error::StoreCreation("timed out waiting for store".into()))?
            .map_err(|e| Error::StoreCreation(e.to_string()))?,
        None => wait
            .await
            .map_err(|e| Error::StoreCreation(e.to_string()))?,
    }
    Ok((store, subscriber))
}

pub fn node_provider_id(node: &Node) -> Option<&str> {
    node.spec
        .as_ref()
        .and_then(|s| s.provider_id.as_deref())
        .filter(|id| !id.is_empty())
}

/// Pod CIDRs assigned to the node, preferring `podCIDRs` over the legacy
/// single `podCIDR` field.
pub fn node_pod_cidrs(node: &Node) -> Vec<String> {
    let Some(spec) = node.spec.as_ref() else {
        return Vec::new();
    };
    if let Some(cidrs) = spec.pod_cidrs.as_ref()
        && !cidrs.is_empty()
    {
        return cidrs.clone();
    }
    spec.pod_cidr
        .iter()
        .filter(|c| !c.is_empty())
        .cloned()
        .collect()
}

/// True when the node reports `NetworkUnavailable=False`.
pub fn node_network_available(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == NODE_NETWORK_UNAVAILABLE && c.status == "False")
        })
}
