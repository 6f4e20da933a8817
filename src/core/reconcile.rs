// src/core/reconcile.rs

//! The watch → dedup queue → worker harness driving every reconciler.
//!
//! A feeder task lists the collection once, then forwards watch events as
//! work-item keys. Keys already pending are not enqueued twice; the key is
//! released just before reconciling, so events arriving mid-reconcile queue
//! a fresh pass. Retriable failures re-enqueue with exponential backoff up
//! to a bounded attempt count, after which the item is dropped with an
//! error log.

use crate::api::store::{Collection, Store};
use crate::api::types::Resource;
use crate::core::errors::BmcLinkError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Work items dropped after this many failed attempts.
pub const MAX_RECONCILE_ATTEMPTS: u32 = 10;

/// Base delay of the retry backoff.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
/// Ceiling of the retry backoff.
const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

const QUEUE_CAPACITY: usize = 256;

/// What a successful reconcile pass asks the harness to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Done,
    RequeueAfter(Duration),
}

/// An idempotent, key-driven reconciler.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// Controller name used in logs.
    fn name(&self) -> &'static str;

    async fn reconcile(&self, key: &str) -> Result<ReconcileOutcome, BmcLinkError>;
}

#[derive(Debug, Clone)]
pub struct WorkItem {
    key: String,
    attempt: u32,
}

/// Deduplicating work queue. Cloneable handle; the receiver half lives in
/// the worker.
#[derive(Clone)]
pub struct ReconcileQueue {
    tx: mpsc::Sender<WorkItem>,
    pending: Arc<Mutex<HashSet<String>>>,
}

impl ReconcileQueue {
    pub fn new() -> (Self, mpsc::Receiver<WorkItem>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        (
            ReconcileQueue {
                tx,
                pending: Arc::new(Mutex::new(HashSet::new())),
            },
            rx,
        )
    }

    /// Enqueues a fresh pass for `key`. A key already pending is skipped.
    pub async fn enqueue(&self, key: &str) {
        self.enqueue_attempt(key, 0).await;
    }

    async fn enqueue_attempt(&self, key: &str, attempt: u32) {
        if !self.pending.lock().insert(key.to_string()) {
            return;
        }
        if self
            .tx
            .send(WorkItem {
                key: key.to_string(),
                attempt,
            })
            .await
            .is_err()
        {
            self.pending.lock().remove(key);
        }
    }

    /// Re-enqueues `key` after `delay` without blocking the caller.
    fn enqueue_delayed(&self, key: String, attempt: u32, delay: Duration) {
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.enqueue_attempt(&key, attempt).await;
        });
    }

    fn release(&self, key: &str) {
        self.pending.lock().remove(key);
    }
}

fn retry_backoff(attempt: u32) -> Duration {
    let exp = RETRY_BASE_DELAY.saturating_mul(1u32 << attempt.min(10));
    exp.min(RETRY_MAX_DELAY)
}

/// Runs the worker loop for one reconciler until shutdown.
pub async fn run_worker<R: Reconciler>(
    reconciler: Arc<R>,
    queue: ReconcileQueue,
    mut rx: mpsc::Receiver<WorkItem>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!("{} worker started", reconciler.name());
    loop {
        tokio::select! {
            item = rx.recv() => {
                let Some(item) = item else { return };
                queue.release(&item.key);
                match reconciler.reconcile(&item.key).await {
                    Ok(ReconcileOutcome::Done) => {}
                    Ok(ReconcileOutcome::RequeueAfter(delay)) => {
                        debug!("{}: requeueing {:?} after {:?}", reconciler.name(), item.key, delay);
                        queue.enqueue_delayed(item.key, 0, delay);
                    }
                    Err(e) if e.is_retriable() && item.attempt + 1 < MAX_RECONCILE_ATTEMPTS => {
                        let delay = retry_backoff(item.attempt);
                        debug!(
                            "{}: retriable failure on {:?} (attempt {}): {}; retrying in {:?}",
                            reconciler.name(), item.key, item.attempt + 1, e, delay
                        );
                        queue.enqueue_delayed(item.key, item.attempt + 1, delay);
                    }
                    Err(e) => {
                        error!(
                            "{}: dropping {:?} after {} attempt(s): {}",
                            reconciler.name(), item.key, item.attempt + 1, e
                        );
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("{} worker shutting down.", reconciler.name());
                return;
            }
        }
    }
}

/// Feeds a worker queue from a collection: one initial pass over the
/// existing records, then every watch event. Lagged watch receivers
/// re-list the collection so no key is permanently missed.
pub async fn run_watch_feeder<T: Resource>(
    store: Arc<Store>,
    select: fn(&Store) -> &Collection<T>,
    queue: ReconcileQueue,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let collection = select(&store);
    let mut watch_rx = collection.watch();
    for obj in collection.list() {
        queue.enqueue(&obj.meta().key()).await;
    }
    loop {
        tokio::select! {
            event = watch_rx.recv() => match event {
                Ok(event) => queue.enqueue(&event.object().meta().key()).await,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("{} watch lagged by {} events, re-listing", T::KIND, missed);
                    for obj in collection.list() {
                        queue.enqueue(&obj.meta().key()).await;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
            _ = shutdown_rx.recv() => return,
        }
    }
}
