pub mod annotation;
pub mod network;
pub mod params;

pub const GROUP: &str = "networking.gke.io";

/// Name of the distinguished network backing the node's primary pod CIDRs.
pub const DEFAULT_NETWORK_NAME: &str = "default";

pub const NETWORK_TYPE_L3: &str = "L3";
