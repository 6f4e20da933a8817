// src/core/dhcp/adapter.rs

//! Consumes the DHCP add/delete channels and materializes dhcp-mode
//! `HostStatus` records. Retriable store failures re-enqueue the event
//! after a short delay, up to a bounded attempt count.

use super::DhcpClientInfo;
use crate::api::store::Store;
use crate::api::types::{
    BasicInfo, DhcpServerConfig, EndpointConfig, HostStatus, HostStatusStatus, HostType,
    LABEL_CLIENT_ACTIVE, LABEL_CLIENT_MODE, LABEL_IP_ADDR, MODE_DHCP, ObjectMeta,
    format_host_status_name,
};
use crate::core::errors::BmcLinkError;
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Delay before a failed event is retried.
const EVENT_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Events are dropped after this many failed attempts.
const MAX_EVENT_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Add,
    Delete,
}

#[derive(Debug, Clone)]
struct RetryItem {
    kind: EventKind,
    client: DhcpClientInfo,
    attempt: u32,
}

/// Bridges lease events to the declarative store for one agent.
pub struct DhcpEventAdapter {
    store: Arc<Store>,
    agent_name: String,
    endpoint_defaults: EndpointConfig,
    dhcp_config: DhcpServerConfig,
}

impl DhcpEventAdapter {
    pub fn new(
        store: Arc<Store>,
        agent_name: &str,
        endpoint_defaults: EndpointConfig,
        dhcp_config: DhcpServerConfig,
    ) -> Self {
        DhcpEventAdapter {
            store,
            agent_name: agent_name.to_string(),
            endpoint_defaults,
            dhcp_config,
        }
    }

    /// Drains the event channels until shutdown. The channels are
    /// rendezvous-sized; the supervisor blocks while an event is handled
    /// here, so nothing in this loop may call back into the manager.
    pub async fn run(
        self,
        mut add_rx: mpsc::Receiver<DhcpClientInfo>,
        mut delete_rx: mpsc::Receiver<DhcpClientInfo>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let (retry_tx, mut retry_rx) = mpsc::channel::<RetryItem>(64);
        info!("DHCP event adapter started");
        loop {
            tokio::select! {
                event = add_rx.recv() => match event {
                    Some(client) => self.dispatch(EventKind::Add, client, 0, &retry_tx).await,
                    None => return,
                },
                event = delete_rx.recv() => match event {
                    Some(client) => self.dispatch(EventKind::Delete, client, 0, &retry_tx).await,
                    None => return,
                },
                Some(item) = retry_rx.recv() => {
                    self.dispatch(item.kind, item.client, item.attempt, &retry_tx).await;
                }
                _ = shutdown_rx.recv() => {
                    info!("DHCP event adapter shutting down.");
                    return;
                }
            }
        }
    }

    async fn dispatch(
        &self,
        kind: EventKind,
        client: DhcpClientInfo,
        attempt: u32,
        retry_tx: &mpsc::Sender<RetryItem>,
    ) {
        let result = match kind {
            EventKind::Add => self.handle_add(&client),
            EventKind::Delete => self.handle_delete(&client),
        };
        let Err(e) = result else { return };
        if e.is_retriable() && attempt + 1 < MAX_EVENT_ATTEMPTS {
            debug!(
                "retrying DHCP {:?} event for IP {} after {:?} due to: {}",
                kind, client.ip, EVENT_RETRY_DELAY, e
            );
            let retry_tx = retry_tx.clone();
            let item = RetryItem {
                kind,
                client,
                attempt: attempt + 1,
            };
            tokio::spawn(async move {
                tokio::time::sleep(EVENT_RETRY_DELAY).await;
                let _ = retry_tx.send(item).await;
            });
        } else {
            error!(
                "dropping DHCP {:?} event for IP {} after {} attempt(s): {}",
                kind,
                client.ip,
                attempt + 1,
                e
            );
        }
    }

    fn handle_add(&self, client: &DhcpClientInfo) -> Result<(), BmcLinkError> {
        if !self.dhcp_config.enable_dhcp_discovery {
            warn!(
                "DHCP discovery is disabled, ignoring add event - IP: {}, MAC: {}",
                client.ip, client.mac
            );
            return Ok(());
        }
        let name = format_host_status_name(&self.agent_name, &client.ip);

        if let Some(existing) = self.store.host_statuses.try_get(&name) {
            if existing.status.basic.mac == client.mac {
                debug!(
                    "HostStatus {} exists with same MAC {}, no update needed",
                    name, client.mac
                );
                return Ok(());
            }
            info!(
                "updating HostStatus {}: MAC changed from {} to {}",
                name, existing.status.basic.mac, client.mac
            );
            let mut updated = existing.clone();
            updated.status.basic.mac = client.mac.clone();
            updated.status.last_update_time = now_rfc3339();
            self.store.host_statuses.update_status(updated)?;
            return Ok(());
        }

        // Create metadata first, then write the status subresource; the
        // store does not accept a status on create.
        let mut meta = ObjectMeta::named(name.as_str());
        meta.labels.insert(LABEL_IP_ADDR.into(), client.ip.clone());
        meta.labels.insert(LABEL_CLIENT_MODE.into(), MODE_DHCP.into());
        meta.labels.insert(LABEL_CLIENT_ACTIVE.into(), "true".into());
        let created = self.store.host_statuses.create(HostStatus {
            metadata: meta,
            status: HostStatusStatus::default(),
        })?;

        let mut with_status = created;
        with_status.status = HostStatusStatus {
            healthy: false,
            cluster_agent: self.agent_name.clone(),
            last_update_time: now_rfc3339(),
            basic: BasicInfo {
                host_type: HostType::Dhcp,
                ip_addr: client.ip.clone(),
                secret_name: self.endpoint_defaults.secret_name.clone(),
                secret_namespace: self.endpoint_defaults.secret_namespace.clone(),
                https: self.endpoint_defaults.https,
                port: self.endpoint_defaults.port,
                mac: client.mac.clone(),
                active_dhcp_client: true,
            },
            info: Default::default(),
            log: Default::default(),
        };
        self.store.host_statuses.update_status(with_status)?;
        info!("created HostStatus {} for DHCP client {}", name, client.mac);
        Ok(())
    }

    fn handle_delete(&self, client: &DhcpClientInfo) -> Result<(), BmcLinkError> {
        if !self.dhcp_config.enable_dhcp_discovery {
            warn!(
                "DHCP discovery is disabled, ignoring delete event - IP: {}, MAC: {}",
                client.ip, client.mac
            );
            return Ok(());
        }
        let name = format_host_status_name(&self.agent_name, &client.ip);

        if self.dhcp_config.enable_bind_dhcp_ip {
            // The address stays pinned for this host; mark the lease
            // inactive instead of deleting the record.
            let Some(existing) = self.store.host_statuses.try_get(&name) else {
                debug!("HostStatus {} not found, nothing to deactivate", name);
                return Ok(());
            };
            let mut updated = existing.clone();
            updated
                .metadata
                .labels
                .insert(LABEL_CLIENT_ACTIVE.into(), "false".into());
            let updated = self.store.host_statuses.update(updated)?;
            let mut with_status = updated;
            with_status.status.basic.active_dhcp_client = false;
            with_status.status.last_update_time = now_rfc3339();
            self.store.host_statuses.update_status(with_status)?;
            info!("marked HostStatus {} as inactive DHCP client", name);
            return Ok(());
        }

        match self.store.host_statuses.delete(&name) {
            Ok(_) => {
                info!("deleted HostStatus {}", name);
                Ok(())
            }
            Err(BmcLinkError::NotFound { .. }) => {
                debug!("HostStatus {} not found, already deleted", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
