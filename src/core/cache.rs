// src/core/cache.rs

//! The host cache: an in-memory mapping from `HostStatus` name to the
//! connection parameters and credentials the poller and the power executor
//! need. Entries are owned by the agent process, lost on restart, and
//! rebuilt from the declarative store by the HostStatus reconciler.

use crate::api::types::BasicInfo;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Connection parameters for one cached host. Copied out on every read;
/// callers never observe shared mutable state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HostConnectEntry {
    pub info: BasicInfo,
    pub username: String,
    pub password: String,
    /// True when the entry was produced from a dhcp-mode `HostStatus`.
    pub dhcp_host: bool,
}

/// Concurrent host cache. Writers take the exclusive lock, readers the
/// shared lock. A failed lookup is not an error; it is the caller's signal
/// to re-reconcile.
#[derive(Debug, Default)]
pub struct HostCache {
    data: RwLock<HashMap<String, HostConnectEntry>>,
}

impl HostCache {
    pub fn new() -> Self {
        HostCache {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Adds or replaces the entry for `name`.
    pub fn add(&self, name: &str, entry: HostConnectEntry) {
        self.data.write().insert(name.to_string(), entry);
    }

    pub fn delete(&self, name: &str) {
        self.data.write().remove(name);
    }

    pub fn get(&self, name: &str) -> Option<HostConnectEntry> {
        self.data.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// A copy of the full map.
    pub fn snapshot(&self) -> HashMap<String, HostConnectEntry> {
        self.data.read().clone()
    }

    /// Entries produced from dhcp-mode records.
    pub fn snapshot_dhcp(&self) -> HashMap<String, HostConnectEntry> {
        self.data
            .read()
            .iter()
            .filter(|(_, e)| e.dhcp_host)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Entries produced from statically declared endpoints.
    pub fn snapshot_static(&self) -> HashMap<String, HostConnectEntry> {
        self.data
            .read()
            .iter()
            .filter(|(_, e)| !e.dhcp_host)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Rewrites the credentials of every entry whose basic info references
    /// the given secret. Returns the affected host names.
    pub fn update_secret_creds(
        &self,
        secret_name: &str,
        secret_namespace: &str,
        username: &str,
        password: &str,
    ) -> Vec<String> {
        let mut affected = Vec::new();
        let mut data = self.data.write();
        for (name, entry) in data.iter_mut() {
            if entry.info.secret_name == secret_name
                && entry.info.secret_namespace == secret_namespace
            {
                entry.username = username.to_string();
                entry.password = password.to_string();
                affected.push(name.clone());
            }
        }
        affected.sort();
        affected
    }
}
