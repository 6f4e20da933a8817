// src/core/hostoperation.rs

//! Executes imperative `HostOperation` power commands against cached hosts
//! over Redfish. Operations are one-shot: the status transitions from
//! pending to exactly one terminal value and never leaves it.

use crate::api::store::Store;
use crate::api::types::{ACTION_PXE_REBOOT, HostOperation, OperationPhase};
use crate::core::cache::HostCache;
use crate::core::errors::BmcLinkError;
use crate::core::reconcile::{ReconcileOutcome, Reconciler};
use crate::core::redfish::{RedfishClientCache, ResetType};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Delay before retrying an operation whose host has not reached the cache
/// yet.
const CACHE_MISS_RETRY_DELAY: Duration = Duration::from_secs(2);

pub struct HostOperationExecutor {
    store: Arc<Store>,
    cache: Arc<HostCache>,
    redfish: Arc<RedfishClientCache>,
    agent_name: String,
}

impl HostOperationExecutor {
    pub fn new(
        store: Arc<Store>,
        cache: Arc<HostCache>,
        redfish: Arc<RedfishClientCache>,
        agent_name: &str,
    ) -> Self {
        HostOperationExecutor {
            store,
            cache,
            redfish,
            agent_name: agent_name.to_string(),
        }
    }

    /// Maps the requested action onto Redfish calls.
    async fn execute_action(
        &self,
        action: &str,
        entry: &crate::core::cache::HostConnectEntry,
    ) -> Result<(), BmcLinkError> {
        let client = self.redfish.client_for(entry)?;
        if action == ACTION_PXE_REBOOT {
            info!("pxe reboot for host {}", entry.info.ip_addr);
            client.set_boot_pxe_once().await?;
            return client.reset(ResetType::ForceRestart).await;
        }
        match ResetType::from_str(action) {
            Ok(reset_type) => {
                info!("{} for host {}", action, entry.info.ip_addr);
                client.reset(reset_type).await
            }
            Err(_) => Err(BmcLinkError::InvalidAction(action.to_string())),
        }
    }

    /// Writes the terminal status. Failures here are logged, not retried:
    /// the power action is not idempotent.
    fn write_terminal(&self, mut op: HostOperation, result: Result<(), BmcLinkError>) {
        let name = op.metadata.name.clone();
        match result {
            Ok(()) => {
                info!("succeeded to operate {}", op.spec.host_status_name);
                op.status.status = Some(OperationPhase::Success);
                op.status.message = String::new();
            }
            Err(e) => {
                error!("failed to operate {}: {}", op.spec.host_status_name, e);
                op.status.status = Some(OperationPhase::Failed);
                op.status.message = e.to_string();
            }
        }
        op.status.last_update_time = now_rfc3339();
        if let Err(e) = self.store.host_operations.update_status(op) {
            error!("action has been done, but failed to update HostOperation {name} status: {e}");
        }
    }
}

#[async_trait]
impl Reconciler for HostOperationExecutor {
    fn name(&self) -> &'static str {
        "HostOperationExecutor"
    }

    async fn reconcile(&self, key: &str) -> Result<ReconcileOutcome, BmcLinkError> {
        let Some(op) = self.store.host_operations.try_get(key) else {
            return Ok(ReconcileOutcome::Done);
        };

        // The target HostStatus decides which agent executes; missing
        // records resolve once the producer has caught up.
        let host_status = self.store.host_statuses.get(&op.spec.host_status_name)?;
        if host_status.status.cluster_agent != self.agent_name {
            info!(
                "skipping HostOperation {} as it belongs to agent {}",
                key, host_status.status.cluster_agent
            );
            return Ok(ReconcileOutcome::Done);
        }

        if op.status.status.is_some_and(|s| s.is_terminal()) {
            debug!("HostOperation {key} has been processed");
            return Ok(ReconcileOutcome::Done);
        }

        info!("processing HostOperation {}: {:?}", key, op.spec);

        // Stamp the pending status once, with the observed agent and IP.
        let op = if op.status.status.is_none() {
            let mut pending = op.clone();
            pending.status.status = Some(OperationPhase::Pending);
            pending.status.cluster_agent = self.agent_name.clone();
            pending.status.ip_addr = host_status.status.basic.ip_addr.clone();
            pending.status.last_update_time = now_rfc3339();
            self.store.host_operations.update_status(pending)?
        } else {
            op
        };

        let Some(entry) = self.cache.get(&op.spec.host_status_name) else {
            warn!(
                "failed to get connect config {} from cache, retry later",
                op.spec.host_status_name
            );
            return Ok(ReconcileOutcome::RequeueAfter(CACHE_MISS_RETRY_DELAY));
        };
        debug!(
            "got connect config {} from cache for {}",
            op.spec.host_status_name, entry.info.ip_addr
        );

        let result = self.execute_action(&op.spec.action, &entry).await;
        self.write_terminal(op, result);
        Ok(ReconcileOutcome::Done)
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
