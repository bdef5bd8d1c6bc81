use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ahash::HashMap;
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use rand::Rng;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::allocator::update_cidr_allocation;
use crate::cloud::{InterfaceDiscovery, Ipv6Accommodation};
use crate::context::Context;
use crate::store::{NetworkStore, NodeStore};
use crate::{Error, Result};

const BASE_RETRY_DELAY: Duration = Duration::from_millis(250);
const MAX_RETRY_DELAY: Duration = Duration::from_millis(5000);

/// Delay before the `count`th retry: `min(250ms * 2^count, 5s)`.
pub fn retry_backoff(count: u32) -> Duration {
    let factor = 1u32.checked_shl(count).unwrap_or(u32::MAX);
    BASE_RETRY_DELAY.saturating_mul(factor).min(MAX_RETRY_DELAY)
}

/// Spreads `delay` uniformly over `[delay/2, 3*delay/2)`.
fn jittered(delay: Duration) -> Duration {
    let nanos = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX);
    if nanos == 0 {
        return delay;
    }
    let jitter = rand::rng().random_range(0..nanos);
    Duration::from_nanos((nanos / 2).saturating_add(jitter))
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Number of concurrent allocation workers
    pub workers: usize,
    /// Failed passes retried per node before it is dropped
    pub max_retries: u32,
    /// Capacity of the pending node queue
    pub queue_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            max_retries: 10,
            queue_size: 5000,
        }
    }
}

#[derive(Debug, Default)]
struct NodeProcessingRecord {
    retries: u32,
}

/// Nodes with an allocation queued, running or waiting to be retried.
#[derive(Default)]
struct ProcessingTable {
    records: Mutex<HashMap<String, NodeProcessingRecord>>,
}

impl ProcessingTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, NodeProcessingRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns false if the node is already being processed.
    fn insert_if_absent(&self, name: &str) -> bool {
        let mut records = self.lock();
        if records.contains_key(name) {
            return false;
        }
        records.insert(name.to_owned(), NodeProcessingRecord::default());
        true
    }

    fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    fn remove(&self, name: &str) {
        self.lock().remove(name);
    }

    /// Counts a failed pass. Returns the retry number to schedule, or `None`
    /// once `max_retries` is exceeded, in which case the record is removed.
    fn record_failure(&self, name: &str, max_retries: u32) -> Option<u32> {
        let mut records = self.lock();
        let Some(record) = records.get_mut(name) else {
            warn!("node {} failed but has no processing record", name);
            return None;
        };
        record.retries += 1;
        if record.retries > max_retries {
            records.remove(name);
            return None;
        }
        Some(record.retries)
    }
}

/// Queues nodes for cidr allocation and retries failed passes with backoff.
/// At most one pass per node is queued or running at any time.
pub struct CidrAllocator<K, C> {
    ctx: Arc<Context<K, C>>,
    config: SchedulerConfig,
    processing: Arc<ProcessingTable>,
    tx: Sender<String>,
    rx: Arc<tokio::sync::Mutex<Receiver<String>>>,
}

impl<K, C> Clone for CidrAllocator<K, C> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            config: self.config.clone(),
            processing: self.processing.clone(),
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<K, C> CidrAllocator<K, C>
where
    K: NetworkStore + NodeStore,
    C: InterfaceDiscovery + Ipv6Accommodation,
{
    pub fn new(ctx: Context<K, C>, config: SchedulerConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_size.max(1));
        Self {
            ctx: Arc::new(ctx),
            config,
            processing: Arc::new(ProcessingTable::default()),
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }

    /// Queues `node` for allocation unless a pass for it is already pending.
    /// Waits for queue space when the queue is full.
    pub async fn allocate_or_occupy_cidr(&self, node: &Node) -> Result<()> {
        let name = node.name_any();
        if !self.processing.insert_if_absent(&name) {
            debug!("node {} is already in process of cidr assignment", name);
            return Ok(());
        }
        debug!("putting node {} into the work queue", name);
        if self.tx.send(name.clone()).await.is_err() {
            self.processing.remove(&name);
            return Err(Error::ChannelError);
        }
        Ok(())
    }

    pub fn is_processing(&self, name: &str) -> bool {
        self.processing.contains(name)
    }

    /// Runs the workers until `cancel` fires. Pending retries are abandoned on
    /// cancellation.
    pub async fn run(self, cancel: CancellationToken) {
        info!("starting {} cidr allocation workers", self.config.workers);
        let workers = (0..self.config.workers.max(1)).map(|_| {
            let allocator = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { allocator.worker(cancel).await })
        });
        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                error!(%e, "cidr allocation worker panicked");
            }
        }
        info!("cidr allocation workers stopped");
    }

    async fn worker(&self, cancel: CancellationToken) {
        loop {
            let next = {
                let mut rx = self.rx.lock().await;
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    next = rx.recv() => next,
                }
            };
            let Some(name) = next else {
                return;
            };
            self.process(&name, &cancel).await;
        }
    }

    async fn process(&self, name: &str, cancel: &CancellationToken) {
        let result = {
            let _measure = self.ctx.metrics.count_and_measure();
            update_cidr_allocation(self.ctx.as_ref(), name).await
        };
        let e = match result {
            Ok(()) => {
                self.processing.remove(name);
                return;
            }
            Err(e) => e,
        };
        self.ctx.metrics.count_failure(&e);

        let Some(count) = self
            .processing
            .record_failure(name, self.config.max_retries)
        else {
            error!(%e, "failed to allocate cidrs for node {}, giving up", name);
            self.ctx.metrics.dropped.inc();
            return;
        };
        let delay = jittered(retry_backoff(count));
        warn!(
            %e,
            retry = count,
            "failed to allocate cidrs for node {}, retrying in {:?}", name, delay
        );
        self.ctx.metrics.retries.inc();

        let tx = self.tx.clone();
        let cancel = cancel.clone();
        let name = name.to_owned();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if tx.send(name).await.is_err() {
                        warn!("work queue closed before retry could be queued");
                    }
                }
            }
        });
    }
}
