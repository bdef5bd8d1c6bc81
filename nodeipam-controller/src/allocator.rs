use kube::ResourceExt;
use nodeipam_k8s_utils::{node_network_available, node_pod_cidrs, node_provider_id};
use tracing::{debug, error, info};

use crate::annotations::{annotations_current, update_multi_network_annotations};
use crate::cloud::{InterfaceDiscovery, Ipv6Accommodation};
use crate::context::Context;
use crate::decider::{need_pod_cidrs_update, parse_cidrs};
use crate::matcher::perform_multi_network_cidr_allocation;
use crate::store::{NetworkStore, NodeStore};
use crate::{Error, Result};

/// Runs one allocation pass for `node_name` against the current cluster and
/// cloud state. Every step is recomputed from scratch, so a pass can be
/// retried freely.
#[tracing::instrument(skip(ctx), level = "debug")]
pub async fn update_cidr_allocation<K, C>(ctx: &Context<K, C>, node_name: &str) -> Result<()>
where
    K: NetworkStore + NodeStore,
    C: InterfaceDiscovery + Ipv6Accommodation,
{
    let Some(node) = ctx.cluster.get_node(node_name).await? else {
        info!("node {} no longer exists, skipping cidr allocation", node_name);
        return Ok(());
    };
    if node_provider_id(&node).is_none() {
        return Err(Error::MissingProviderId(node_name.to_owned()));
    }

    let interfaces = ctx.cloud.network_interfaces(&node).await?;
    let allocation =
        perform_multi_network_cidr_allocation(&ctx.cluster, &ctx.cloud, &node, &interfaces)
            .await?;
    if allocation.default_cidrs.is_empty() {
        return Err(Error::NoDefaultCidrs(node_name.to_owned()));
    }

    let cidrs = parse_cidrs(&allocation.default_cidrs)?;
    if need_pod_cidrs_update(&node, &cidrs)? {
        let existing = node_pod_cidrs(&node);
        if !existing.is_empty() {
            error!(
                "pod cidrs of node {} are being reassigned from {:?} to {:?}",
                node_name, existing, allocation.default_cidrs
            );
        }
        ctx.cluster
            .patch_pod_cidrs(node_name, &allocation.default_cidrs)
            .await?;
        info!(
            "set pod cidrs of node {} to {:?}",
            node_name, allocation.default_cidrs
        );
    } else {
        debug!("node {} already has pod cidrs {:?}", node_name, allocation.default_cidrs);
    }

    if !node_network_available(&node) {
        ctx.cluster.mark_network_available(node_name).await?;
    }

    if annotations_current(
        &node,
        &allocation.north_interfaces,
        &allocation.additional_networks,
    )? {
        debug!("multi-network annotations of node {} are up to date", node.name_any());
        return Ok(());
    }
    update_multi_network_annotations(
        &ctx.cluster,
        &node,
        &allocation.north_interfaces,
        &allocation.additional_networks,
    )
    .await?;
    info!(
        networks = allocation.additional_networks.len(),
        "updated multi-network annotations of node {}", node_name
    );
    Ok(())
}
