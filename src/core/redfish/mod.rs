// src/core/redfish/mod.rs

//! The Redfish surface the agent consumes: a trait covering the calls the
//! control plane needs, an HTTP implementation, a scriptable mock backend,
//! and a process-wide client cache keyed by host IP.

pub mod http;
pub mod mock;
pub mod model;

use crate::core::cache::HostConnectEntry;
use crate::core::errors::BmcLinkError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use strum_macros::{Display, EnumString};

pub use http::HttpRedfish;
pub use mock::{MockCall, MockRedfish};

/// Redfish reset types accepted by `ComputerSystem.Reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum ResetType {
    On,
    ForceOn,
    ForceOff,
    GracefulShutdown,
    GracefulRestart,
    ForceRestart,
}

/// One entry of a BMC log service, newest first (index 0).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BmcLogEntry {
    pub created: String,
    pub severity: String,
    pub oem_sensor_type: String,
    pub message: String,
}

/// Severity value treated as non-warning besides the empty string.
pub const SEVERITY_OK: &str = "OK";

/// The calls the control plane makes against one BMC.
#[async_trait]
pub trait RedfishApi: Send + Sync {
    /// True when the service root answers.
    async fn health(&self) -> bool;

    /// Flat inventory map (firmware, manufacturer, CPU/memory/device info).
    async fn get_info(&self) -> Result<BTreeMap<String, String>, BmcLinkError>;

    /// All enabled log-service entries of the first system, newest first.
    async fn get_log(&self) -> Result<Vec<BmcLogEntry>, BmcLinkError>;

    /// Resets the first system.
    async fn reset(&self, reset_type: ResetType) -> Result<(), BmcLinkError>;

    /// Arms a one-shot boot override targeting PXE.
    async fn set_boot_pxe_once(&self) -> Result<(), BmcLinkError>;
}

type RedfishFactory =
    dyn Fn(&HostConnectEntry) -> Result<Arc<dyn RedfishApi>, BmcLinkError> + Send + Sync;

/// Credential and endpoint fields a cached client was built from. A
/// mismatch drops the cached client and builds a fresh one, which is the
/// logout for the stateless HTTP client.
#[derive(Debug, Clone, PartialEq)]
struct ClientFingerprint {
    username: String,
    password: String,
    https: bool,
    port: u16,
}

impl ClientFingerprint {
    fn of(entry: &HostConnectEntry) -> Self {
        ClientFingerprint {
            username: entry.username.clone(),
            password: entry.password.clone(),
            https: entry.info.https,
            port: entry.info.port,
        }
    }
}

struct CachedClient {
    fingerprint: ClientFingerprint,
    client: Arc<dyn RedfishApi>,
}

/// Process-wide client cache keyed by host IP.
pub struct RedfishClientCache {
    factory: Box<RedfishFactory>,
    clients: DashMap<String, CachedClient>,
}

impl RedfishClientCache {
    /// Cache producing real HTTP clients.
    pub fn new_http() -> Self {
        Self::with_factory(Box::new(|entry| {
            Ok(Arc::new(HttpRedfish::from_entry(entry)?) as Arc<dyn RedfishApi>)
        }))
    }

    /// Cache with an injected backend factory (tests use [`MockRedfish`]).
    pub fn with_factory(factory: Box<RedfishFactory>) -> Self {
        RedfishClientCache {
            factory,
            clients: DashMap::new(),
        }
    }

    /// Returns the cached client for the entry's IP, rebuilding it when the
    /// credentials or endpoint parameters changed.
    pub fn client_for(
        &self,
        entry: &HostConnectEntry,
    ) -> Result<Arc<dyn RedfishApi>, BmcLinkError> {
        let fingerprint = ClientFingerprint::of(entry);
        if let Some(cached) = self.clients.get(&entry.info.ip_addr) {
            if cached.fingerprint == fingerprint {
                return Ok(Arc::clone(&cached.client));
            }
        }
        let client = (self.factory)(entry)?;
        self.clients.insert(
            entry.info.ip_addr.clone(),
            CachedClient {
                fingerprint,
                client: Arc::clone(&client),
            },
        );
        Ok(client)
    }

    /// Drops the cached client for `ip`, forcing a rebuild on next use.
    pub fn invalidate(&self, ip: &str) {
        self.clients.remove(ip);
    }
}
