// tests/support/mod.rs

//! Shared fixtures for the bmclink test suite.

#![allow(dead_code)]

use bmclink::api::store::Store;
use bmclink::api::types::{
    BasicInfo, EndpointConfig, HostEndpoint, HostEndpointSpec, HostStatus, HostStatusStatus,
    HostType, ObjectMeta, Secret,
};
use bmclink::core::cache::{HostCache, HostConnectEntry};
use bmclink::core::events::EventBus;
use bmclink::core::hoststatus::{DefaultCreds, HostStatusController};
use bmclink::core::redfish::{MockRedfish, RedfishClientCache};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const AGENT: &str = "agent-a";

pub fn test_store() -> Arc<Store> {
    Store::shared()
}

/// A Redfish client cache whose factory hands out one shared mock for every
/// host, so tests can count probes and script outcomes.
pub fn mock_redfish_cache() -> (Arc<RedfishClientCache>, Arc<MockRedfish>) {
    let mock = Arc::new(MockRedfish::default());
    let shared = Arc::clone(&mock);
    let cache = RedfishClientCache::with_factory(Box::new(move |_entry| {
        Ok(Arc::clone(&shared) as Arc<dyn bmclink::core::redfish::RedfishApi>)
    }));
    (Arc::new(cache), mock)
}

pub fn default_creds(username: &str, password: &str) -> DefaultCreds {
    Arc::new(RwLock::new((username.to_string(), password.to_string())))
}

/// A HostStatusController with no default secret configured.
pub fn host_status_controller(
    store: Arc<Store>,
    cache: Arc<HostCache>,
    redfish: Arc<RedfishClientCache>,
    events: EventBus,
) -> Arc<HostStatusController> {
    Arc::new(HostStatusController::new(
        store,
        cache,
        redfish,
        events,
        AGENT,
        "",
        "",
        default_creds("", ""),
    ))
}

pub fn endpoint_defaults() -> EndpointConfig {
    EndpointConfig {
        port: 443,
        secret_name: String::new(),
        secret_namespace: String::new(),
        https: true,
    }
}

pub fn host_endpoint(name: &str, agent: &str, ip: &str) -> HostEndpoint {
    HostEndpoint {
        metadata: ObjectMeta::named(name),
        spec: HostEndpointSpec {
            cluster_agent: agent.to_string(),
            ip_addr: ip.to_string(),
            secret_name: String::new(),
            secret_namespace: String::new(),
            https: Some(true),
            port: Some(443),
        },
    }
}

pub fn basic_endpoint_info(ip: &str) -> BasicInfo {
    BasicInfo {
        host_type: HostType::Endpoint,
        ip_addr: ip.to_string(),
        secret_name: String::new(),
        secret_namespace: String::new(),
        https: true,
        port: 443,
        mac: String::new(),
        active_dhcp_client: false,
    }
}

pub fn cache_entry(info: BasicInfo, dhcp_host: bool) -> HostConnectEntry {
    HostConnectEntry {
        info,
        username: "admin".to_string(),
        password: "secret".to_string(),
        dhcp_host,
    }
}

/// Creates a `HostStatus` the way producers do: metadata first, then the
/// status subresource. Returns the stored record.
pub fn seed_host_status(store: &Store, name: &str, agent: &str, basic: BasicInfo) -> HostStatus {
    let created = store
        .host_statuses
        .create(HostStatus {
            metadata: ObjectMeta::named(name),
            status: HostStatusStatus::default(),
        })
        .expect("create host status");
    let mut with_status = created;
    with_status.status = HostStatusStatus {
        healthy: false,
        cluster_agent: agent.to_string(),
        last_update_time: "2024-01-01T00:00:00Z".to_string(),
        basic,
        info: Default::default(),
        log: Default::default(),
    };
    store
        .host_statuses
        .update_status(with_status)
        .expect("write host status")
}

pub fn secret(namespace: &str, name: &str, username: &str, password: &str) -> Secret {
    let mut data = BTreeMap::new();
    data.insert("username".to_string(), username.to_string());
    data.insert("password".to_string(), password.to_string());
    Secret {
        metadata: ObjectMeta {
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data,
    }
}

/// Inventory a healthy mock BMC reports.
pub fn healthy_info() -> BTreeMap<String, String> {
    let mut info = BTreeMap::new();
    info.insert("BmcFirmwareVersion".to_string(), "1.60".to_string());
    info.insert("Manufacturer".to_string(), "Contoso".to_string());
    info.insert("MemoryTotalGiB".to_string(), "256".to_string());
    info.insert("PowerState".to_string(), "On".to_string());
    info
}
