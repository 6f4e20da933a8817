// src/core/hostendpoint.rs

//! Reconciles declarative `HostEndpoint` records into endpoint-mode
//! `HostStatus` records owned by them.

use crate::api::store::Store;
use crate::api::types::{
    BasicInfo, EndpointConfig, HostEndpoint, HostStatus, HostStatusStatus, HostType,
    LABEL_CLIENT_MODE, LABEL_IP_ADDR, MODE_ENDPOINT, ObjectMeta, OwnerReference, Resource,
    format_host_status_name,
};
use crate::core::errors::BmcLinkError;
use crate::core::reconcile::{ReconcileOutcome, Reconciler};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{debug, info};

pub struct HostEndpointReconciler {
    store: Arc<Store>,
    agent_name: String,
    endpoint_defaults: EndpointConfig,
}

impl HostEndpointReconciler {
    pub fn new(store: Arc<Store>, agent_name: &str, endpoint_defaults: EndpointConfig) -> Self {
        HostEndpointReconciler {
            store,
            agent_name: agent_name.to_string(),
            endpoint_defaults,
        }
    }

    /// The basic fields a `HostStatus` derived from this endpoint must
    /// carry. Unset optional fields fall back to the agent's endpoint
    /// defaults.
    fn desired_basic(&self, endpoint: &HostEndpoint) -> BasicInfo {
        let spec = &endpoint.spec;
        let (secret_name, secret_namespace) = if spec.secret_name.is_empty() {
            (
                self.endpoint_defaults.secret_name.clone(),
                self.endpoint_defaults.secret_namespace.clone(),
            )
        } else {
            (spec.secret_name.clone(), spec.secret_namespace.clone())
        };
        BasicInfo {
            host_type: HostType::Endpoint,
            ip_addr: spec.ip_addr.clone(),
            secret_name,
            secret_namespace,
            https: spec.https.unwrap_or(self.endpoint_defaults.https),
            port: spec.port.unwrap_or(self.endpoint_defaults.port),
            mac: String::new(),
            active_dhcp_client: false,
        }
    }
}

#[async_trait]
impl Reconciler for HostEndpointReconciler {
    fn name(&self) -> &'static str {
        "HostEndpointReconciler"
    }

    async fn reconcile(&self, key: &str) -> Result<ReconcileOutcome, BmcLinkError> {
        let Some(endpoint) = self.store.host_endpoints.try_get(key) else {
            // Deletion cascades to the owned HostStatus through the store.
            debug!("HostEndpoint {key} deleted, owned HostStatus is garbage collected");
            return Ok(ReconcileOutcome::Done);
        };

        if endpoint.spec.cluster_agent != self.agent_name {
            debug!(
                "skipping HostEndpoint {}: belongs to cluster agent {:?}",
                key, endpoint.spec.cluster_agent
            );
            return Ok(ReconcileOutcome::Done);
        }

        let name = format_host_status_name(&self.agent_name, &endpoint.spec.ip_addr);
        let desired = self.desired_basic(&endpoint);

        if let Some(existing) = self.store.host_statuses.try_get(&name) {
            if existing.status.basic == desired {
                debug!("HostStatus {name} exists with same basic fields, no update needed");
                return Ok(ReconcileOutcome::Done);
            }
            info!("updating HostStatus {name} due to endpoint spec change");
            let mut updated = existing.clone();
            updated.status.basic = desired;
            updated.status.last_update_time = now_rfc3339();
            // A conflict here is retriable; the harness re-enqueues.
            self.store.host_statuses.update_status(updated)?;
            return Ok(ReconcileOutcome::Done);
        }

        // Two-step create: metadata with labels and the controller owner
        // reference first, then the status subresource.
        let mut meta = ObjectMeta::named(name.as_str());
        meta.labels
            .insert(LABEL_IP_ADDR.into(), endpoint.spec.ip_addr.clone());
        meta.labels
            .insert(LABEL_CLIENT_MODE.into(), MODE_ENDPOINT.into());
        meta.owner_references.push(OwnerReference {
            kind: HostEndpoint::KIND.to_string(),
            name: endpoint.metadata.name.clone(),
            uid: endpoint.metadata.uid.clone(),
            controller: true,
            block_owner_deletion: true,
        });
        let created = self.store.host_statuses.create(HostStatus {
            metadata: meta,
            status: HostStatusStatus::default(),
        })?;

        let mut with_status = created;
        with_status.status = HostStatusStatus {
            healthy: false,
            cluster_agent: endpoint.spec.cluster_agent.clone(),
            last_update_time: now_rfc3339(),
            basic: desired,
            info: Default::default(),
            log: Default::default(),
        };
        self.store.host_statuses.update_status(with_status)?;
        info!("created HostStatus {name} for endpoint {key}");
        Ok(ReconcileOutcome::Done)
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
