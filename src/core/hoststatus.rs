// src/core/hoststatus.rs

//! The host-state engine: reconciles `HostStatus` records into the host
//! cache, probes BMCs over Redfish, derives observability events from the
//! BMC log, and publishes status deltas back to the store only when a
//! field actually changed.

use crate::api::store::{Store, namespaced_key};
use crate::api::types::{
    HostStatusStatus, HostType, LogRecord, LogSummary, SECRET_KEY_PASSWORD, SECRET_KEY_USERNAME,
};
use crate::core::cache::{HostCache, HostConnectEntry};
use crate::core::errors::BmcLinkError;
use crate::core::events::{AgentEvent, EventBus, EventKind};
use crate::core::reconcile::{ReconcileOutcome, Reconciler};
use crate::core::redfish::{BmcLogEntry, RedfishClientCache, SEVERITY_OK};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Shared, updatable copy of the agent's default BMC credentials.
pub type DefaultCreds = Arc<RwLock<(String, String)>>;

/// Reconciler and prober for the `HostStatus` records this agent owns.
pub struct HostStatusController {
    store: Arc<Store>,
    cache: Arc<HostCache>,
    redfish: Arc<RedfishClientCache>,
    events: EventBus,
    agent_name: String,
    default_secret_name: String,
    default_secret_namespace: String,
    default_creds: DefaultCreds,
    /// Serialises probe updates to the store; the expensive wait inside is
    /// the bounded network round-trip to the BMC.
    probe_lock: tokio::sync::Mutex<()>,
}

impl HostStatusController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        cache: Arc<HostCache>,
        redfish: Arc<RedfishClientCache>,
        events: EventBus,
        agent_name: &str,
        default_secret_name: &str,
        default_secret_namespace: &str,
        default_creds: DefaultCreds,
    ) -> Self {
        HostStatusController {
            store,
            cache,
            redfish,
            events,
            agent_name: agent_name.to_string(),
            default_secret_name: default_secret_name.to_string(),
            default_secret_namespace: default_secret_namespace.to_string(),
            default_creds,
            probe_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Username and password for a secret reference. The agent's configured
    /// default secret resolves from memory; anything else is fetched.
    fn secret_data(&self, name: &str, namespace: &str) -> Result<(String, String), BmcLinkError> {
        if name == self.default_secret_name && namespace == self.default_secret_namespace {
            debug!("using agent default credentials for {namespace}/{name}");
            return Ok(self.default_creds.read().clone());
        }
        let secret = self.store.secrets.get(&namespaced_key(namespace, name))?;
        Ok((
            secret.key_or_empty(SECRET_KEY_USERNAME),
            secret.key_or_empty(SECRET_KEY_PASSWORD),
        ))
    }

    /// Probes one host and conditionally writes its status. Returns whether
    /// a write happened. Redfish failures are absorbed into `healthy=false`;
    /// only store failures surface as errors.
    pub async fn probe(&self, name: &str, entry: &HostConnectEntry) -> Result<bool, BmcLinkError> {
        let _guard = self.probe_lock.lock().await;

        let client = match self.redfish.client_for(entry) {
            Ok(client) => Some(client),
            Err(e) => {
                error!("failed to create redfish client for HostStatus {name}: {e}");
                None
            }
        };

        let protocol = if entry.info.https { "https" } else { "http" };
        debug!(
            "probing {}://{}:{} for HostStatus {}",
            protocol, entry.info.ip_addr, entry.info.port, name
        );

        let Some(existing) = self.store.host_statuses.try_get(name) else {
            // The record disappeared between enqueue and probe.
            return Ok(false);
        };
        let mut updated = existing.clone();

        let mut healthy = false;
        if let Some(client) = &client {
            healthy = client.health().await;
            if healthy {
                match client.get_info().await {
                    Ok(info) => updated.status.info = info,
                    Err(e) => {
                        error!("failed to get info of HostStatus {name}: {e}");
                        healthy = false;
                    }
                }
            }
        }
        if !healthy {
            debug!("HostStatus {name} is not healthy, clearing info");
            updated.status.info.clear();
            // The cached client may hold an invalid connection; the next
            // probe rebuilds it.
            self.redfish.invalidate(&entry.info.ip_addr);
        }
        updated.status.healthy = healthy;
        if updated.status.healthy != existing.status.healthy {
            info!(
                "HostStatus {} health changed from {} to {}",
                name, existing.status.healthy, healthy
            );
        }

        if healthy {
            if let Some(client) = &client {
                match client.get_log().await {
                    Ok(entries) => {
                        let last_seen = updated
                            .status
                            .log
                            .latest_log
                            .as_ref()
                            .map(|l| l.time.clone())
                            .unwrap_or_default();
                        if let Some(summary) = self.derive_log_events(name, &entries, &last_seen) {
                            updated.status.log = summary;
                        }
                    }
                    Err(e) => error!("failed to get logs of HostStatus {name}: {e}"),
                }
            }
        }

        if status_equal(&updated.status, &existing.status) {
            debug!("no need to update status of HostStatus {name}");
            return Ok(false);
        }
        updated.status.last_update_time = now_rfc3339();
        self.store.host_statuses.update_status(updated)?;
        info!("updated HostStatus {name} status");
        Ok(true)
    }

    /// Walks the BMC log entries, emits one event per new entry, and
    /// returns the refreshed summary when the newest entry is new.
    fn derive_log_events(
        &self,
        name: &str,
        entries: &[BmcLogEntry],
        last_seen_time: &str,
    ) -> Option<LogSummary> {
        if entries.is_empty() {
            return None;
        }

        let mut warning_count = 0;
        let mut new_count = 0;
        let mut new_latest: Option<LogRecord> = None;

        for (index, entry) in entries.iter().enumerate() {
            let message = format!(
                "[{}][{}]: {} {}",
                entry.created, entry.severity, entry.oem_sensor_type, entry.message
            );
            let kind = if entry.severity != SEVERITY_OK && !entry.severity.is_empty() {
                warning_count += 1;
                EventKind::Warning
            } else {
                EventKind::Normal
            };

            if entry.created != last_seen_time {
                new_count += 1;
                info!("found new log for HostStatus {name}: {message}");
                if index == 0 {
                    new_latest = Some(LogRecord {
                        time: entry.created.clone(),
                        message: message.clone(),
                    });
                }
                self.events.publish(AgentEvent {
                    kind,
                    object_kind: "HostStatus",
                    object_name: name.to_string(),
                    reason: "BMCLogEntry".to_string(),
                    message,
                });
            }
        }

        let latest = new_latest?;
        info!("found {new_count} new logs for HostStatus {name}");
        Some(LogSummary {
            total_log_count: entries.len() as i32,
            warning_log_count: warning_count,
            latest_log: Some(latest),
        })
    }

    /// Probes a single cached host by name; used for the first probe and
    /// for secret-rotation fan-out.
    pub async fn probe_host(&self, name: &str) -> Result<bool, BmcLinkError> {
        let Some(entry) = self.cache.get(name) else {
            error!("no cache data found for HostStatus {name}");
            return Err(BmcLinkError::Internal(format!(
                "no cache data found for HostStatus {name}"
            )));
        };
        self.probe(name, &entry).await
    }

    /// Probes every cached host once; failures are logged and do not stop
    /// the pass.
    pub async fn probe_all(&self) {
        let mut hosts: Vec<(String, HostConnectEntry)> =
            self.cache.snapshot().into_iter().collect();
        hosts.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, entry) in hosts {
            debug!("updating status of HostStatus {name} during periodic update");
            if let Err(e) = self.probe(&name, &entry).await {
                error!("failed to update HostStatus {name} during periodic update: {e}");
            }
        }
    }
}

#[async_trait]
impl Reconciler for HostStatusController {
    fn name(&self) -> &'static str {
        "HostStatusReconciler"
    }

    async fn reconcile(&self, key: &str) -> Result<ReconcileOutcome, BmcLinkError> {
        let Some(host_status) = self.store.host_statuses.try_get(key) else {
            debug!("HostStatus {key} not found, deleting from cache");
            self.cache.delete(key);
            return Ok(ReconcileOutcome::Done);
        };

        if host_status.status.cluster_agent.is_empty() {
            debug!("HostStatus {key} has no cluster agent yet, skipping");
            return Ok(ReconcileOutcome::Done);
        }
        if host_status.status.cluster_agent != self.agent_name {
            debug!(
                "HostStatus {} belongs to agent {}, skipping",
                key, host_status.status.cluster_agent
            );
            return Ok(ReconcileOutcome::Done);
        }
        if host_status.status.basic.ip_addr.is_empty() {
            // Created metadata-only; the producer's status write follows.
            debug!("ignoring HostStatus {key} just created");
            return Ok(ReconcileOutcome::Done);
        }

        let (username, password) = self.secret_data(
            &host_status.status.basic.secret_name,
            &host_status.status.basic.secret_namespace,
        )?;

        let entry = HostConnectEntry {
            info: host_status.status.basic.clone(),
            username,
            password,
            dhcp_host: host_status.status.basic.host_type == HostType::Dhcp,
        };
        self.cache.add(key, entry.clone());

        if host_status.status.info.is_empty() {
            if let Err(e) = self.probe(key, &entry).await {
                error!("failed to run first probe of HostStatus {key}: {e}");
                return Ok(ReconcileOutcome::RequeueAfter(std::time::Duration::from_secs(2)));
            }
        } else {
            debug!("HostStatus {key} already has inventory, skipping first probe");
        }

        Ok(ReconcileOutcome::Done)
    }
}

/// Content equality for a status: every field except `last_update_time`,
/// which is only advanced when something else changed.
pub fn status_equal(a: &HostStatusStatus, b: &HostStatusStatus) -> bool {
    a.healthy == b.healthy
        && a.cluster_agent == b.cluster_agent
        && a.basic == b.basic
        && a.log == b.log
        && a.info == b.info
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
