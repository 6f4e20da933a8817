#[path = "support/mod.rs"]
mod support;

use bmclink::core::errors::BmcLinkError;
use bmclink::core::reconcile::{
    ReconcileOutcome, ReconcileQueue, Reconciler, run_watch_feeder, run_worker,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use support::{AGENT, host_endpoint, test_store};
use tokio::sync::broadcast;

/// Records the keys it sees and replays scripted results.
struct ScriptedReconciler {
    seen: Mutex<Vec<String>>,
    results: Mutex<Vec<Result<ReconcileOutcome, BmcLinkError>>>,
}

impl ScriptedReconciler {
    fn new(results: Vec<Result<ReconcileOutcome, BmcLinkError>>) -> Arc<Self> {
        Arc::new(ScriptedReconciler {
            seen: Mutex::new(Vec::new()),
            results: Mutex::new(results),
        })
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Reconciler for ScriptedReconciler {
    fn name(&self) -> &'static str {
        "ScriptedReconciler"
    }

    async fn reconcile(&self, key: &str) -> Result<ReconcileOutcome, BmcLinkError> {
        self.seen.lock().push(key.to_string());
        let mut results = self.results.lock();
        if results.is_empty() {
            Ok(ReconcileOutcome::Done)
        } else {
            results.remove(0)
        }
    }
}

async fn wait_until<F: Fn() -> bool>(check: F, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn test_worker_processes_enqueued_keys() {
    let reconciler = ScriptedReconciler::new(vec![]);
    let (queue, rx) = ReconcileQueue::new();
    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(run_worker(
        Arc::clone(&reconciler),
        queue.clone(),
        rx,
        shutdown_tx.subscribe(),
    ));

    queue.enqueue("a").await;
    queue.enqueue("b").await;
    let r = Arc::clone(&reconciler);
    wait_until(|| r.seen().len() == 2, "both keys to be reconciled").await;
    assert_eq!(reconciler.seen(), vec!["a".to_string(), "b".to_string()]);

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_retriable_error_is_retried() {
    let reconciler = ScriptedReconciler::new(vec![
        Err(BmcLinkError::Conflict {
            kind: "HostStatus",
            name: "a".to_string(),
        }),
        Ok(ReconcileOutcome::Done),
    ]);
    let (queue, rx) = ReconcileQueue::new();
    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(run_worker(
        Arc::clone(&reconciler),
        queue.clone(),
        rx,
        shutdown_tx.subscribe(),
    ));

    queue.enqueue("a").await;
    let r = Arc::clone(&reconciler);
    wait_until(|| r.seen().len() == 2, "the retry to run").await;
    assert_eq!(reconciler.seen(), vec!["a".to_string(), "a".to_string()]);

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_non_retriable_error_is_dropped() {
    let reconciler = ScriptedReconciler::new(vec![
        Err(BmcLinkError::Validation("broken".to_string())),
        Ok(ReconcileOutcome::Done),
    ]);
    let (queue, rx) = ReconcileQueue::new();
    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(run_worker(
        Arc::clone(&reconciler),
        queue.clone(),
        rx,
        shutdown_tx.subscribe(),
    ));

    queue.enqueue("a").await;
    let r = Arc::clone(&reconciler);
    wait_until(|| r.seen().len() == 1, "the first pass").await;
    // No retry follows a validation failure.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(reconciler.seen().len(), 1);

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_requeue_after_runs_again() {
    let reconciler = ScriptedReconciler::new(vec![
        Ok(ReconcileOutcome::RequeueAfter(Duration::from_millis(20))),
        Ok(ReconcileOutcome::Done),
    ]);
    let (queue, rx) = ReconcileQueue::new();
    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(run_worker(
        Arc::clone(&reconciler),
        queue.clone(),
        rx,
        shutdown_tx.subscribe(),
    ));

    queue.enqueue("a").await;
    let r = Arc::clone(&reconciler);
    wait_until(|| r.seen().len() == 2, "the requeued pass").await;

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_feeder_lists_then_watches() {
    let store = test_store();
    store
        .host_endpoints
        .create(host_endpoint("ep-pre", AGENT, "10.0.0.5"))
        .unwrap();

    let reconciler = ScriptedReconciler::new(vec![]);
    let (queue, rx) = ReconcileQueue::new();
    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(run_worker(
        Arc::clone(&reconciler),
        queue.clone(),
        rx,
        shutdown_tx.subscribe(),
    ));
    tokio::spawn(run_watch_feeder(
        Arc::clone(&store),
        |s| &s.host_endpoints,
        queue.clone(),
        shutdown_tx.subscribe(),
    ));

    // The pre-existing record arrives via the initial list.
    let r = Arc::clone(&reconciler);
    wait_until(|| r.seen().contains(&"ep-pre".to_string()), "initial list").await;

    // A later create arrives via the watch.
    store
        .host_endpoints
        .create(host_endpoint("ep-live", AGENT, "10.0.0.6"))
        .unwrap();
    let r = Arc::clone(&reconciler);
    wait_until(|| r.seen().contains(&"ep-live".to_string()), "watch event").await;

    let _ = shutdown_tx.send(());
}
