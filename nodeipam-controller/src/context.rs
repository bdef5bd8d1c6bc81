use crate::metrics::AllocatorMetrics;

/// Shared state handed to every allocation pass.
pub struct Context<K, C> {
    /// Cluster reads and node writes
    pub cluster: K,
    /// Interface discovery and IPv6 accommodation
    pub cloud: C,
    pub metrics: AllocatorMetrics,
}

impl<K, C> Context<K, C> {
    pub fn new(cluster: K, cloud: C, metrics: AllocatorMetrics) -> Self {
        Self {
            cluster,
            cloud,
            metrics,
        }
    }
}
