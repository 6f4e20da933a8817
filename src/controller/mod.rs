// src/controller/mod.rs

//! The controller role: reconciles `ClusterAgent` records into per-cluster
//! agent workloads with their identity and access grant, and reflects
//! workload readiness back into status.

pub mod template;

use crate::api::store::Store;
use crate::core::errors::BmcLinkError;
use crate::core::reconcile::{ReconcileOutcome, Reconciler};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Cadence of the drift-correction requeue.
const DRIFT_REQUEUE_INTERVAL: Duration = Duration::from_secs(60);

pub struct ClusterAgentReconciler {
    store: Arc<Store>,
    /// Image used when the agent template leaves it unset.
    default_agent_image: String,
}

impl ClusterAgentReconciler {
    pub fn new(store: Arc<Store>, default_agent_image: &str) -> Self {
        ClusterAgentReconciler {
            store,
            default_agent_image: default_agent_image.to_string(),
        }
    }

    fn cleanup_dependents(&self, agent_name: &str) {
        for name in template::dependent_names(agent_name) {
            let _ = self.store.workloads.delete(&name);
            let _ = self.store.identities.delete(&name);
            let _ = self.store.grants.delete(&name);
            let _ = self.store.storage_claims.delete(&name);
        }
    }
}

#[async_trait]
impl Reconciler for ClusterAgentReconciler {
    fn name(&self) -> &'static str {
        "ClusterAgentReconciler"
    }

    async fn reconcile(&self, key: &str) -> Result<ReconcileOutcome, BmcLinkError> {
        let Some(agent) = self.store.cluster_agents.try_get(key) else {
            debug!("ClusterAgent {key} deleted, removing materialized resources");
            self.cleanup_dependents(key);
            return Ok(ReconcileOutcome::Done);
        };

        let rendered = template::render_all(&agent, &self.default_agent_image);

        // Upsert each dependent: create when missing, update when the
        // rendered spec drifted from the stored one.
        if let Some(workload) = rendered.workload.clone() {
            match self.store.workloads.try_get(&workload.metadata.name) {
                None => {
                    info!("creating workload {} for ClusterAgent {}", workload.metadata.name, key);
                    self.store.workloads.create(workload)?;
                }
                Some(existing) if existing.spec != workload.spec => {
                    info!("updating workload {} for ClusterAgent {}", workload.metadata.name, key);
                    let mut next = workload;
                    next.metadata.resource_version = existing.metadata.resource_version;
                    self.store.workloads.update(next)?;
                }
                Some(_) => {}
            }
        }
        if self
            .store
            .identities
            .try_get(&rendered.identity.metadata.name)
            .is_none()
        {
            self.store.identities.create(rendered.identity.clone())?;
        }
        match self.store.grants.try_get(&rendered.grant.metadata.name) {
            None => {
                self.store.grants.create(rendered.grant.clone())?;
            }
            Some(existing) if existing.rules != rendered.grant.rules => {
                let mut next = rendered.grant.clone();
                next.metadata.resource_version = existing.metadata.resource_version;
                self.store.grants.update(next)?;
            }
            Some(_) => {}
        }
        if let Some(claim) = rendered.storage_claim.clone() {
            if self.store.storage_claims.try_get(&claim.metadata.name).is_none() {
                self.store.storage_claims.create(claim)?;
            }
        }

        // Readiness: every requested replica of the workload is ready and
        // the workload reports itself available.
        let ready = rendered
            .workload
            .as_ref()
            .and_then(|w| self.store.workloads.try_get(&w.metadata.name))
            .map(|w| {
                w.status.available
                    && w.status.ready_replicas == w.spec.replicas
                    && w.spec.replicas > 0
            })
            .unwrap_or(false);
        if agent.status.ready != ready {
            info!("ClusterAgent {key} readiness changed to {ready}");
            let mut updated = agent.clone();
            updated.status.ready = ready;
            self.store.cluster_agents.update_status(updated)?;
        }

        Ok(ReconcileOutcome::RequeueAfter(DRIFT_REQUEUE_INTERVAL))
    }
}
