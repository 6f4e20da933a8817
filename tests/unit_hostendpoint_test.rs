#[path = "support/mod.rs"]
mod support;

use bmclink::api::types::{
    HostType, LABEL_CLIENT_MODE, LABEL_IP_ADDR, MODE_ENDPOINT, format_host_status_name,
};
use bmclink::core::hostendpoint::HostEndpointReconciler;
use bmclink::core::reconcile::{ReconcileOutcome, Reconciler};
use std::sync::Arc;
use support::{AGENT, endpoint_defaults, host_endpoint, test_store};

fn reconciler(store: &Arc<bmclink::api::store::Store>) -> HostEndpointReconciler {
    HostEndpointReconciler::new(Arc::clone(store), AGENT, endpoint_defaults())
}

#[tokio::test]
async fn test_endpoint_creates_host_status() {
    let store = test_store();
    let r = reconciler(&store);
    store
        .host_endpoints
        .create(host_endpoint("ep-1", AGENT, "10.0.0.5"))
        .unwrap();

    let outcome = r.reconcile("ep-1").await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Done);

    let name = format_host_status_name(AGENT, "10.0.0.5");
    assert_eq!(name, "agent-a-10-0-0-5");
    let hs = store.host_statuses.get(&name).unwrap();

    assert_eq!(hs.status.basic.host_type, HostType::Endpoint);
    assert_eq!(hs.status.basic.ip_addr, "10.0.0.5");
    assert_eq!(hs.status.basic.port, 443);
    assert!(hs.status.basic.https);
    assert!(!hs.status.healthy);
    assert!(hs.status.info.is_empty());
    assert_eq!(hs.status.cluster_agent, AGENT);

    assert_eq!(hs.metadata.labels.get(LABEL_IP_ADDR), Some(&"10.0.0.5".to_string()));
    assert_eq!(
        hs.metadata.labels.get(LABEL_CLIENT_MODE),
        Some(&MODE_ENDPOINT.to_string())
    );

    let owner = hs.metadata.controller_owner().expect("controller owner reference");
    assert_eq!(owner.kind, "HostEndpoint");
    assert_eq!(owner.name, "ep-1");
    assert!(owner.block_owner_deletion);
}

#[tokio::test]
async fn test_foreign_endpoint_is_noop() {
    let store = test_store();
    let r = reconciler(&store);
    store
        .host_endpoints
        .create(host_endpoint("ep-other", "agent-b", "10.0.0.7"))
        .unwrap();

    r.reconcile("ep-other").await.unwrap();
    assert!(store.host_statuses.is_empty());
}

#[tokio::test]
async fn test_unchanged_spec_writes_nothing() {
    let store = test_store();
    let r = reconciler(&store);
    store
        .host_endpoints
        .create(host_endpoint("ep-1", AGENT, "10.0.0.5"))
        .unwrap();
    r.reconcile("ep-1").await.unwrap();

    let before = store.host_statuses.get("agent-a-10-0-0-5").unwrap();
    r.reconcile("ep-1").await.unwrap();
    let after = store.host_statuses.get("agent-a-10-0-0-5").unwrap();
    assert_eq!(before.metadata.resource_version, after.metadata.resource_version);
}

#[tokio::test]
async fn test_spec_change_updates_basic_fields() {
    let store = test_store();
    let r = reconciler(&store);
    let created = store
        .host_endpoints
        .create(host_endpoint("ep-1", AGENT, "10.0.0.5"))
        .unwrap();
    r.reconcile("ep-1").await.unwrap();
    let before = store.host_statuses.get("agent-a-10-0-0-5").unwrap();

    let mut changed = created;
    changed.spec.port = Some(8443);
    changed.spec.https = Some(false);
    store.host_endpoints.update(changed).unwrap();
    r.reconcile("ep-1").await.unwrap();

    let after = store.host_statuses.get("agent-a-10-0-0-5").unwrap();
    assert_eq!(after.status.basic.port, 8443);
    assert!(!after.status.basic.https);
    assert_ne!(before.metadata.resource_version, after.metadata.resource_version);
    assert_ne!(before.status.last_update_time, after.status.last_update_time);
}

#[tokio::test]
async fn test_recreate_has_no_stale_state() {
    let store = test_store();
    let r = reconciler(&store);
    store
        .host_endpoints
        .create(host_endpoint("ep-1", AGENT, "10.0.0.5"))
        .unwrap();
    r.reconcile("ep-1").await.unwrap();

    // Simulate the poller having filled inventory.
    let mut probed = store.host_statuses.get("agent-a-10-0-0-5").unwrap();
    probed.status.healthy = true;
    probed
        .status
        .info
        .insert("Manufacturer".to_string(), "Contoso".to_string());
    store.host_statuses.update_status(probed).unwrap();

    // Delete the endpoint (cascades), then recreate it with the same IP.
    store.delete_host_endpoint("ep-1").unwrap();
    assert!(store.host_statuses.try_get("agent-a-10-0-0-5").is_none());
    r.reconcile("ep-1").await.unwrap();

    store
        .host_endpoints
        .create(host_endpoint("ep-1", AGENT, "10.0.0.5"))
        .unwrap();
    r.reconcile("ep-1").await.unwrap();

    let fresh = store.host_statuses.get("agent-a-10-0-0-5").unwrap();
    assert_eq!(fresh.status.basic.ip_addr, "10.0.0.5");
    assert!(!fresh.status.healthy);
    assert!(fresh.status.info.is_empty());
}
