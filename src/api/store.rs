// src/api/store.rs

//! In-memory watch+CRUD store with Kubernetes-style semantics: per-kind
//! collections, a status subresource written independently of the spec,
//! optimistic concurrency on resource versions, owner-reference cascade on
//! delete, and a broadcast watch stream per kind.
//!
//! The wire protocol of a real declarative store is out of scope; this
//! module is the surface the rest of the crate consumes, and the harness
//! every test runs against.

use crate::api::types::{
    AccessGrant, ClusterAgent, HostEndpoint, HostOperation, HostStatus, ObjectMeta, Resource,
    Secret, ServiceIdentity, StorageClaim, Workload,
};
use crate::core::errors::BmcLinkError;
use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// Capacity of each per-kind watch channel. Reconciler feeders drain
/// promptly; a lagged receiver re-lists instead of failing.
const WATCH_CHANNEL_CAPACITY: usize = 256;

/// A single change observed on a collection.
#[derive(Debug, Clone)]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
}

impl<T> WatchEvent<T> {
    pub fn object(&self) -> &T {
        match self {
            WatchEvent::Added(o) | WatchEvent::Modified(o) | WatchEvent::Deleted(o) => o,
        }
    }
}

/// Storage for one record kind. All accessors return value copies; callers
/// never observe shared mutable state.
pub struct Collection<T: Resource> {
    items: RwLock<BTreeMap<String, T>>,
    version: AtomicU64,
    watch_tx: broadcast::Sender<WatchEvent<T>>,
}

impl<T: Resource> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Resource> Collection<T> {
    pub fn new() -> Self {
        let (watch_tx, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Collection {
            items: RwLock::new(BTreeMap::new()),
            version: AtomicU64::new(0),
            watch_tx,
        }
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Subscribes to changes. Events published before the call are not
    /// replayed; pair with [`Collection::list`] for the initial state.
    pub fn watch(&self) -> broadcast::Receiver<WatchEvent<T>> {
        self.watch_tx.subscribe()
    }

    fn publish(&self, event: WatchEvent<T>) {
        // A send error only means there is no live subscriber.
        let _ = self.watch_tx.send(event);
    }

    /// Inserts a new record. The store assigns uid, resource version, and
    /// creation timestamp.
    pub fn create(&self, mut obj: T) -> Result<T, BmcLinkError> {
        let key = obj.meta().key();
        let mut items = self.items.write();
        if items.contains_key(&key) {
            return Err(BmcLinkError::AlreadyExists {
                kind: T::KIND,
                name: key,
            });
        }
        let meta = obj.meta_mut();
        meta.uid = uuid::Uuid::new_v4().to_string();
        meta.resource_version = self.next_version();
        meta.creation_timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        items.insert(key, obj.clone());
        drop(items);
        self.publish(WatchEvent::Added(obj.clone()));
        Ok(obj)
    }

    pub fn get(&self, key: &str) -> Result<T, BmcLinkError> {
        self.items
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| BmcLinkError::not_found(T::KIND, key))
    }

    pub fn try_get(&self, key: &str) -> Option<T> {
        self.items.read().get(key).cloned()
    }

    pub fn list(&self) -> Vec<T> {
        self.items.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Replaces the record's spec and mutable metadata (labels), keeping
    /// the stored status subresource and identity fields. Fails with
    /// `Conflict` when the caller's copy is stale.
    pub fn update(&self, obj: T) -> Result<T, BmcLinkError> {
        let key = obj.meta().key();
        let mut items = self.items.write();
        let stored = items
            .get(&key)
            .ok_or_else(|| BmcLinkError::not_found(T::KIND, key.clone()))?
            .clone();
        if stored.meta().resource_version != obj.meta().resource_version {
            return Err(BmcLinkError::Conflict {
                kind: T::KIND,
                name: key,
            });
        }
        let mut next = obj;
        next.apply_status(&stored);
        {
            let meta = next.meta_mut();
            meta.uid = stored.meta().uid.clone();
            meta.creation_timestamp = stored.meta().creation_timestamp.clone();
            meta.resource_version = self.next_version();
        }
        items.insert(key, next.clone());
        drop(items);
        self.publish(WatchEvent::Modified(next.clone()));
        Ok(next)
    }

    /// Writes only the status subresource, leaving spec and metadata as
    /// stored. Fails with `Conflict` when the caller's copy is stale.
    pub fn update_status(&self, obj: T) -> Result<T, BmcLinkError> {
        let key = obj.meta().key();
        let mut items = self.items.write();
        let mut stored = items
            .get(&key)
            .ok_or_else(|| BmcLinkError::not_found(T::KIND, key.clone()))?
            .clone();
        if stored.meta().resource_version != obj.meta().resource_version {
            return Err(BmcLinkError::Conflict {
                kind: T::KIND,
                name: key,
            });
        }
        stored.apply_status(&obj);
        stored.meta_mut().resource_version = self.next_version();
        items.insert(key, stored.clone());
        drop(items);
        self.publish(WatchEvent::Modified(stored.clone()));
        Ok(stored)
    }

    /// Removes a record. Missing records are not an error for callers that
    /// only need the end state; they get `NotFound` and may ignore it.
    pub fn delete(&self, key: &str) -> Result<T, BmcLinkError> {
        let removed = self
            .items
            .write()
            .remove(key)
            .ok_or_else(|| BmcLinkError::not_found(T::KIND, key))?;
        self.publish(WatchEvent::Deleted(removed.clone()));
        Ok(removed)
    }

    /// Deletes every record whose controller owner reference points at
    /// `owner_uid`, returning the removed records.
    fn delete_owned_by(&self, owner_uid: &str) -> Vec<T> {
        let keys: Vec<String> = self
            .items
            .read()
            .values()
            .filter(|o| {
                o.meta()
                    .controller_owner()
                    .is_some_and(|r| r.uid == owner_uid)
            })
            .map(|o| o.meta().key())
            .collect();
        keys.iter().filter_map(|k| self.delete(k).ok()).collect()
    }
}

/// The full record store: one collection per kind.
pub struct Store {
    pub cluster_agents: Collection<ClusterAgent>,
    pub host_endpoints: Collection<HostEndpoint>,
    pub host_statuses: Collection<HostStatus>,
    pub host_operations: Collection<HostOperation>,
    pub secrets: Collection<Secret>,
    pub workloads: Collection<Workload>,
    pub identities: Collection<ServiceIdentity>,
    pub grants: Collection<AccessGrant>,
    pub storage_claims: Collection<StorageClaim>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Store {
            cluster_agents: Collection::new(),
            host_endpoints: Collection::new(),
            host_statuses: Collection::new(),
            host_operations: Collection::new(),
            secrets: Collection::new(),
            workloads: Collection::new(),
            identities: Collection::new(),
            grants: Collection::new(),
            storage_claims: Collection::new(),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Deletes a `HostEndpoint` and cascades to the `HostStatus` records it
    /// owns.
    pub fn delete_host_endpoint(&self, name: &str) -> Result<(), BmcLinkError> {
        let removed = self.host_endpoints.delete(name)?;
        self.host_statuses.delete_owned_by(&removed.meta().uid);
        Ok(())
    }

    /// Deletes a `ClusterAgent` and cascades to all its rendered dependents.
    pub fn delete_cluster_agent(&self, name: &str) -> Result<(), BmcLinkError> {
        let removed = self.cluster_agents.delete(name)?;
        let uid = removed.meta().uid.clone();
        self.workloads.delete_owned_by(&uid);
        self.identities.delete_owned_by(&uid);
        self.grants.delete_owned_by(&uid);
        self.storage_claims.delete_owned_by(&uid);
        Ok(())
    }
}

/// Store key for a namespaced record.
pub fn namespaced_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Builds the metadata of a namespaced record.
pub fn namespaced_meta(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: name.to_string(),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}
