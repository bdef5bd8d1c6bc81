use std::pin::pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Node;
use kube::runtime::reflector::Store;
use kube::runtime::watcher::Config;
use kube::{Api, Client, ResourceExt};
use nodeipam_crds::v1::network::Network;
use nodeipam_crds::v1::params::NetworkParameters;
use nodeipam_k8s_utils::create_store_and_subscriber;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::Result;
use crate::cloud::{InterfaceDiscovery, Ipv6Accommodation};
use crate::context::Context;
use crate::metrics::AllocatorMetrics;
use crate::scheduler::{CidrAllocator, SchedulerConfig};
use crate::store::{KubeClusterStore, NetworkStore, NodeStore};

/// Starts the node ipam controller and runs it until `cancel` fires.
///
/// `ready` is cancelled once the node, network and parameters stores hold
/// their initial state.
pub async fn start_node_ipam_controller<C>(
    client: Client,
    cloud: C,
    config: SchedulerConfig,
    store_timeout: Option<Duration>,
    ready: CancellationToken,
    cancel: CancellationToken,
) -> Result<()>
where
    C: InterfaceDiscovery + Ipv6Accommodation,
{
    info!("waiting for node, network and parameters stores");
    let ((nodes, node_subscriber), (networks, network_subscriber), (parameters, _)) =
        futures::try_join!(
            create_store_and_subscriber(
                Api::<Node>::all(client.clone()),
                Config::default(),
                store_timeout
            ),
            create_store_and_subscriber(
                Api::<Network>::all(client.clone()),
                Config::default(),
                store_timeout
            ),
            create_store_and_subscriber(
                Api::<NetworkParameters>::all(client.clone()),
                Config::default(),
                store_timeout
            ),
        )?;
    info!("stores synced");

    let cluster = KubeClusterStore::new(client, nodes.clone(), networks, parameters);
    let ctx = Context::new(cluster, cloud, AllocatorMetrics::default().register());
    let allocator = CidrAllocator::new(ctx, config);
    ready.cancel();

    tokio::join!(
        watch_nodes(node_subscriber, allocator.clone(), cancel.clone()),
        watch_networks(network_subscriber, nodes, allocator.clone(), cancel.clone()),
        allocator.run(cancel),
    );
    info!("node ipam controller stopped");
    Ok(())
}

/// Queues every node that is added or changed.
async fn watch_nodes<S, K, C>(events: S, allocator: CidrAllocator<K, C>, cancel: CancellationToken)
where
    S: Stream,
    S::Item: AsRef<Node>,
    K: NetworkStore + NodeStore,
    C: InterfaceDiscovery + Ipv6Accommodation,
{
    let mut events = pin!(events);
    loop {
        let node = tokio::select! {
            _ = cancel.cancelled() => return,
            node = events.next() => node,
        };
        let Some(node) = node else {
            return;
        };
        if let Err(e) = allocator.allocate_or_occupy_cidr(node.as_ref()).await {
            error!(%e, "failed to queue node {}", node.as_ref().name_any());
        }
    }
}

/// Queues all known nodes whenever a network changes, since any network can
/// change every node's derived state.
async fn watch_networks<S, K, C>(
    events: S,
    nodes: Store<Node>,
    allocator: CidrAllocator<K, C>,
    cancel: CancellationToken,
) where
    S: Stream,
    S::Item: AsRef<Network>,
    K: NetworkStore + NodeStore,
    C: InterfaceDiscovery + Ipv6Accommodation,
{
    let mut events = pin!(events);
    loop {
        let network = tokio::select! {
            _ = cancel.cancelled() => return,
            network = events.next() => network,
        };
        let Some(network) = network else {
            return;
        };
        debug!(
            "network {} changed, requeueing all nodes",
            network.as_ref().name_any()
        );
        for node in nodes.state() {
            if let Err(e) = allocator.allocate_or_occupy_cidr(&node).await {
                error!(%e, "failed to queue node {}", node.name_any());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use nodeipam_crds::v1::DEFAULT_NETWORK_NAME;

    use super::*;
    use crate::testutil::*;

    fn allocator() -> CidrAllocator<FakeCluster, FakeCloud> {
        CidrAllocator::new(
            Context::new(
                FakeCluster::default(),
                FakeCloud::default(),
                AllocatorMetrics::default(),
            ),
            SchedulerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_node_events_are_queued() {
        let allocator = allocator();
        let events = futures::stream::iter(vec![
            Arc::new(make_node("node0", "gce://p/z/node0")),
            Arc::new(make_node("node1", "gce://p/z/node1")),
            Arc::new(make_node("node0", "gce://p/z/node0")),
        ]);

        watch_nodes(events, allocator.clone(), CancellationToken::new()).await;
        assert!(allocator.is_processing("node0"));
        assert!(allocator.is_processing("node1"));
    }

    #[tokio::test]
    async fn test_network_events_requeue_all_nodes() {
        use kube::runtime::{reflector::store, watcher};

        let (nodes, mut writer) = store();
        for name in ["node0", "node1"] {
            writer.apply_watcher_event(&watcher::Event::Apply(make_node(name, "gce://p/z/n")));
        }
        let allocator = allocator();
        let events = futures::stream::iter(vec![Arc::new(make_network(
            DEFAULT_NETWORK_NAME,
            DEFAULT_PARAMS,
        ))]);

        watch_networks(events, nodes, allocator.clone(), CancellationToken::new()).await;
        assert!(allocator.is_processing("node0"));
        assert!(allocator.is_processing("node1"));
    }

    #[tokio::test]
    async fn test_watch_stops_on_cancel() {
        let allocator = allocator();
        let cancel = CancellationToken::new();
        cancel.cancel();
        watch_nodes(futures::stream::pending::<Arc<Node>>(), allocator, cancel).await;
    }
}
