#[path = "support/mod.rs"]
mod support;

use bmclink::api::types::{HostStatusStatus, HostType, LogRecord, LogSummary};
use bmclink::core::cache::HostCache;
use bmclink::core::events::{EventBus, EventKind};
use bmclink::core::hoststatus::status_equal;
use bmclink::core::reconcile::Reconciler;
use bmclink::core::redfish::BmcLogEntry;
use std::sync::Arc;
use support::{
    AGENT, basic_endpoint_info, cache_entry, healthy_info, host_status_controller,
    mock_redfish_cache, seed_host_status, test_store,
};

#[tokio::test]
async fn test_reconcile_populates_cache_and_runs_first_probe() {
    let store = test_store();
    let cache = Arc::new(HostCache::new());
    let (redfish, mock) = mock_redfish_cache();
    mock.set_healthy(true);
    mock.set_info(healthy_info());
    let controller =
        host_status_controller(Arc::clone(&store), Arc::clone(&cache), redfish, EventBus::new());

    seed_host_status(&store, "agent-a-10-0-0-5", AGENT, basic_endpoint_info("10.0.0.5"));
    controller.reconcile("agent-a-10-0-0-5").await.unwrap();

    // The cache entry exists and marks the host as non-dhcp.
    let entry = cache.get("agent-a-10-0-0-5").expect("cache entry");
    assert_eq!(entry.info.ip_addr, "10.0.0.5");
    assert!(!entry.dhcp_host);

    // The empty info map triggered the first probe.
    assert_eq!(mock.probe_count(), 1);
    let hs = store.host_statuses.get("agent-a-10-0-0-5").unwrap();
    assert!(hs.status.healthy);
    assert_eq!(hs.status.info.get("BmcFirmwareVersion"), Some(&"1.60".to_string()));
    assert_eq!(hs.status.info.get("Manufacturer"), Some(&"Contoso".to_string()));
    assert_eq!(hs.status.info.get("MemoryTotalGiB"), Some(&"256".to_string()));
}

#[tokio::test]
async fn test_reconcile_skips_foreign_and_incomplete_records() {
    let store = test_store();
    let cache = Arc::new(HostCache::new());
    let (redfish, mock) = mock_redfish_cache();
    let controller =
        host_status_controller(Arc::clone(&store), Arc::clone(&cache), redfish, EventBus::new());

    // Owned by another agent.
    seed_host_status(&store, "agent-b-10-0-0-6", "agent-b", basic_endpoint_info("10.0.0.6"));
    controller.reconcile("agent-b-10-0-0-6").await.unwrap();
    assert!(cache.get("agent-b-10-0-0-6").is_none());

    // Metadata-only record (status not yet written).
    store
        .host_statuses
        .create(bmclink::api::types::HostStatus {
            metadata: bmclink::api::types::ObjectMeta::named("agent-a-pending"),
            status: HostStatusStatus::default(),
        })
        .unwrap();
    controller.reconcile("agent-a-pending").await.unwrap();
    assert!(cache.get("agent-a-pending").is_none());
    assert_eq!(mock.probe_count(), 0);
}

#[tokio::test]
async fn test_deleted_record_is_removed_from_cache() {
    let store = test_store();
    let cache = Arc::new(HostCache::new());
    let (redfish, _mock) = mock_redfish_cache();
    let controller =
        host_status_controller(Arc::clone(&store), Arc::clone(&cache), redfish, EventBus::new());

    cache.add(
        "agent-a-10-0-0-5",
        cache_entry(basic_endpoint_info("10.0.0.5"), false),
    );
    controller.reconcile("agent-a-10-0-0-5").await.unwrap();
    assert!(cache.get("agent-a-10-0-0-5").is_none());
}

#[tokio::test]
async fn test_identical_probe_output_writes_nothing() {
    let store = test_store();
    let cache = Arc::new(HostCache::new());
    let (redfish, mock) = mock_redfish_cache();
    mock.set_healthy(true);
    mock.set_info(healthy_info());
    let controller =
        host_status_controller(Arc::clone(&store), Arc::clone(&cache), redfish, EventBus::new());

    seed_host_status(&store, "agent-a-10-0-0-5", AGENT, basic_endpoint_info("10.0.0.5"));
    let entry = cache_entry(basic_endpoint_info("10.0.0.5"), false);

    let first = controller.probe("agent-a-10-0-0-5", &entry).await.unwrap();
    assert!(first);
    let after_first = store.host_statuses.get("agent-a-10-0-0-5").unwrap();

    // Unchanged BMC output: content equality suppresses the write.
    for _ in 0..3 {
        let updated = controller.probe("agent-a-10-0-0-5", &entry).await.unwrap();
        assert!(!updated);
    }
    let after_all = store.host_statuses.get("agent-a-10-0-0-5").unwrap();
    assert_eq!(
        after_first.metadata.resource_version,
        after_all.metadata.resource_version
    );
    assert_eq!(after_first.status.last_update_time, after_all.status.last_update_time);
}

#[tokio::test]
async fn test_unreachable_bmc_marks_unhealthy_and_clears_info() {
    let store = test_store();
    let cache = Arc::new(HostCache::new());
    let (redfish, mock) = mock_redfish_cache();
    mock.set_healthy(true);
    mock.set_info(healthy_info());
    let controller =
        host_status_controller(Arc::clone(&store), Arc::clone(&cache), redfish, EventBus::new());

    seed_host_status(&store, "agent-a-10-0-0-5", AGENT, basic_endpoint_info("10.0.0.5"));
    let entry = cache_entry(basic_endpoint_info("10.0.0.5"), false);
    controller.probe("agent-a-10-0-0-5", &entry).await.unwrap();
    assert!(store.host_statuses.get("agent-a-10-0-0-5").unwrap().status.healthy);

    mock.set_healthy(false);
    let updated = controller.probe("agent-a-10-0-0-5", &entry).await.unwrap();
    assert!(updated);
    let hs = store.host_statuses.get("agent-a-10-0-0-5").unwrap();
    assert!(!hs.status.healthy);
    assert!(hs.status.info.is_empty());
}

#[tokio::test]
async fn test_log_derivation_emits_events_and_updates_summary() {
    let store = test_store();
    let cache = Arc::new(HostCache::new());
    let (redfish, mock) = mock_redfish_cache();
    mock.set_healthy(true);
    mock.set_info(healthy_info());
    let events = EventBus::new();
    let mut event_rx = events.subscribe();
    let controller =
        host_status_controller(Arc::clone(&store), Arc::clone(&cache), redfish, events);

    mock.set_log(vec![
        BmcLogEntry {
            created: "2024-12-18T10:05:00Z".to_string(),
            severity: "Critical".to_string(),
            oem_sensor_type: "Temperature".to_string(),
            message: "CPU over temperature".to_string(),
        },
        BmcLogEntry {
            created: "2024-12-18T10:00:00Z".to_string(),
            severity: "OK".to_string(),
            oem_sensor_type: "Power".to_string(),
            message: "Power restored".to_string(),
        },
    ]);

    seed_host_status(&store, "agent-a-10-0-0-5", AGENT, basic_endpoint_info("10.0.0.5"));
    let entry = cache_entry(basic_endpoint_info("10.0.0.5"), false);
    controller.probe("agent-a-10-0-0-5", &entry).await.unwrap();

    let hs = store.host_statuses.get("agent-a-10-0-0-5").unwrap();
    assert_eq!(
        hs.status.log,
        LogSummary {
            total_log_count: 2,
            warning_log_count: 1,
            latest_log: Some(LogRecord {
                time: "2024-12-18T10:05:00Z".to_string(),
                message: "[2024-12-18T10:05:00Z][Critical]: Temperature CPU over temperature"
                    .to_string(),
            }),
        }
    );

    // One event per new entry, typed by severity.
    let first = event_rx.try_recv().unwrap();
    assert_eq!(first.kind, EventKind::Warning);
    assert_eq!(first.reason, "BMCLogEntry");
    assert!(first.message.contains("CPU over temperature"));
    let second = event_rx.try_recv().unwrap();
    assert_eq!(second.kind, EventKind::Normal);
}

#[test]
fn test_status_equal_ignores_last_update_time() {
    let mut a = HostStatusStatus {
        healthy: true,
        cluster_agent: AGENT.to_string(),
        last_update_time: "2024-01-01T00:00:00Z".to_string(),
        basic: basic_endpoint_info("10.0.0.5"),
        info: healthy_info(),
        log: LogSummary::default(),
    };
    let mut b = a.clone();
    b.last_update_time = "2030-01-01T00:00:00Z".to_string();
    assert!(status_equal(&a, &b));

    a.basic.host_type = HostType::Dhcp;
    assert!(!status_equal(&a, &b));
}
