//! Background batching of deferred counter updates.
//!
//! Decisions enqueue the request's descriptors onto a bounded queue; a fixed
//! pool of workers drains the queue into per-worker buffers and flushes them
//! to the counter store in pipelined batches. The queue is the sole
//! backpressure signal: when it is full the update is dropped and counted,
//! never awaited.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use crate::config::BatcherSettings;
use crate::grpc::proto::envoy::extensions::common::ratelimit::v3::RateLimitDescriptor;
use crate::metrics;

use super::store::CounterStore;

/// A pending counter update derived from one decided request.
#[derive(Debug, Clone)]
pub struct DeferredUpdate {
    /// The request's descriptor set
    pub descriptors: Vec<RateLimitDescriptor>,
}

impl DeferredUpdate {
    /// Capture a request's descriptors for deferred counting.
    pub fn new(descriptors: &[RateLimitDescriptor]) -> Self {
        Self {
            descriptors: descriptors.to_vec(),
        }
    }
}

/// Handle to the batching worker pool.
pub struct UpdateBatcher {
    queue: mpsc::Sender<DeferredUpdate>,
}

impl UpdateBatcher {
    /// Spawn the worker pool against a counter store.
    ///
    /// Workers share the ingress queue and run until the process exits (or
    /// the queue closes, which only happens when the batcher is dropped).
    pub fn spawn<S: CounterStore + 'static>(store: Arc<S>, settings: &BatcherSettings) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..settings.workers {
            tokio::spawn(run_worker(
                worker_id,
                Arc::clone(&rx),
                Arc::clone(&store),
                settings.buffer_capacity,
                settings.flush_interval(),
            ));
        }

        Self { queue: tx }
    }

    /// Enqueue an update without blocking. A full queue drops the update and
    /// increments the drop counter; counters under-count slightly instead of
    /// the hot path growing latency.
    pub fn enqueue(&self, update: DeferredUpdate) {
        if self.queue.try_send(update).is_err() {
            debug!("update queue full, dropping deferred update");
            metrics::record_update_dropped();
        }
    }
}

async fn run_worker<S: CounterStore>(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<DeferredUpdate>>>,
    store: Arc<S>,
    buffer_capacity: usize,
    flush_interval: std::time::Duration,
) {
    let mut buffer: Vec<DeferredUpdate> = Vec::with_capacity(buffer_capacity);
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(worker_id, "update batcher worker started");

    loop {
        tokio::select! {
            update = async {
                let mut rx = queue.lock().await;
                rx.recv().await
            } => {
                match update {
                    Some(update) => {
                        buffer.push(update);
                        if buffer.len() >= buffer_capacity {
                            flush(worker_id, store.as_ref(), &mut buffer).await;
                        }
                    }
                    None => {
                        flush(worker_id, store.as_ref(), &mut buffer).await;
                        debug!(worker_id, "update queue closed, stopping worker");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    flush(worker_id, store.as_ref(), &mut buffer).await;
                }
            }
        }
    }
}

/// Write the buffered updates to the store in one pipeline. Failures are
/// logged and counted but never retried; the buffer always clears.
async fn flush<S: CounterStore>(worker_id: usize, store: &S, buffer: &mut Vec<DeferredUpdate>) {
    if buffer.is_empty() {
        return;
    }

    let batch_size = buffer.len();
    let keys = increment_keys(buffer);
    buffer.clear();

    if keys.is_empty() {
        return;
    }

    debug!(worker_id, batch_size, key_count = keys.len(), "flushing update batch");

    if let Err(e) = store.pipeline_incr(&keys).await {
        error!(
            worker_id,
            batch_size,
            error = %e,
            "failed to flush update batch"
        );
    }
}

/// Translate buffered updates into counter keys.
///
/// Each update contributes `ip:<v>` and `company:<v>` for its `ip` and
/// `company_id` descriptor entries, plus a joint `combined:<ip>:<company>`
/// key when both are present. The joint keys feed external analytics and are
/// never consulted by the decision engine.
fn increment_keys(updates: &[DeferredUpdate]) -> Vec<String> {
    let mut keys = Vec::new();
    for update in updates {
        let mut ip = None;
        let mut company = None;
        for descriptor in &update.descriptors {
            for entry in &descriptor.entries {
                match entry.key.as_str() {
                    "ip" => ip = Some(entry.value.as_str()),
                    "company_id" => company = Some(entry.value.as_str()),
                    _ => {}
                }
            }
        }

        if let Some(ip) = ip {
            keys.push(format!("ip:{}", ip));
        }
        if let Some(company) = company {
            keys.push(format!("company:{}", company));
        }
        if let (Some(ip), Some(company)) = (ip, company) {
            keys.push(format!("combined:{}:{}", ip, company));
        }
    }
    keys
}
