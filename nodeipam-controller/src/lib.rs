mod allocator;
mod annotations;
mod cloud;
mod context;
mod decider;
mod error;
mod inventory;
mod matcher;
pub mod metrics;
mod resource;
mod runtime;
mod scheduler;
mod store;
#[cfg(test)]
mod testutil;

pub use allocator::update_cidr_allocation;
pub use annotations::{NETWORK_IP_CAPACITY, annotations_current, update_multi_network_annotations};
pub use cloud::{AliasIpRange, DiscoveredInterface, InterfaceDiscovery, Ipv6Accommodation};
pub use context::Context;
pub use decider::{need_pod_cidrs_update, parse_cidrs, same_network};
pub use error::Error;
pub use inventory::InventoryCloud;
pub use matcher::{MultiNetworkAllocation, perform_multi_network_cidr_allocation};
pub use nodeipam_crds::v1;
pub use resource::resource_name;
pub use runtime::start_node_ipam_controller;
pub use scheduler::{CidrAllocator, SchedulerConfig, retry_backoff};
pub use store::{KubeClusterStore, NetworkStore, NodeStore};

pub type Result<T, E = Error> = std::result::Result<T, E>;
