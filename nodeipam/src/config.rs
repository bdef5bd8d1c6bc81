use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use nodeipam_controller::SchedulerConfig;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Subcommand, Debug)]
pub enum Commands {
    Controller(ControllerArgs),
    /// Print the CustomResourceDefinitions as yaml
    Crdgen,
}

#[derive(Parser, Debug, Clone)]
pub struct ControllerArgs {
    /// Metrics listener for the controller
    #[arg(long, default_value = "0.0.0.0:9090")]
    pub metrics_address: SocketAddr,

    /// Inventory of node network interfaces
    #[arg(
        long,
        env = "NODEIPAM_INVENTORY",
        default_value = "/etc/nodeipam/inventory.yaml"
    )]
    pub inventory: PathBuf,

    /// Number of concurrent allocation workers
    #[arg(long, default_value_t = 1)]
    pub workers: usize,

    /// Retries of a failing node before it is dropped until its next update
    #[arg(long, default_value_t = 10)]
    pub max_retries: u32,

    /// Capacity of the pending node queue
    #[arg(long, default_value_t = 5000)]
    pub queue_size: usize,

    /// Seconds to wait for the initial sync of each store, 0 waits forever
    #[arg(long, default_value_t = 0)]
    pub store_timeout_secs: u64,
}

impl ControllerArgs {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            workers: self.workers,
            max_retries: self.max_retries,
            queue_size: self.queue_size,
        }
    }

    pub fn store_timeout(&self) -> Option<Duration> {
        (self.store_timeout_secs > 0).then(|| Duration::from_secs(self.store_timeout_secs))
    }
}
