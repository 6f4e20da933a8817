// src/controller/template.rs

//! Templates for the per-cluster dependents the controller materializes:
//! the agent workload, its service identity, its access grant, and the
//! storage claim backing the DHCP lease file.

use crate::api::types::{
    AccessGrant, ClusterAgent, GrantRule, ObjectMeta, OwnerReference, Resource, ServiceIdentity,
    StorageClaim, StorageClaimSpec, Workload, WorkloadSpec,
};

/// Health port every rendered agent workload exposes.
pub const AGENT_HEALTH_PORT: u16 = 8000;

/// Default replica count when the template leaves it unset.
const DEFAULT_REPLICAS: i32 = 1;

/// Size of the lease-file storage claim.
const LEASE_CLAIM_SIZE_GIB: u32 = 1;
/// Where the lease-file storage claim is mounted in the agent workload.
const LEASE_CLAIM_MOUNT_PATH: &str = "/var/lib/bmclink/dhcp";

pub fn workload_name(agent_name: &str) -> String {
    format!("{agent_name}-agent")
}

pub fn identity_name(agent_name: &str) -> String {
    format!("{agent_name}-agent-sa")
}

pub fn grant_name(agent_name: &str) -> String {
    format!("{agent_name}-agent-role")
}

pub fn storage_claim_name(agent_name: &str) -> String {
    format!("{agent_name}-dhcp-lease")
}

/// Every name a ClusterAgent's dependents can carry; used for cleanup when
/// the owner is already gone.
pub fn dependent_names(agent_name: &str) -> Vec<String> {
    vec![
        workload_name(agent_name),
        identity_name(agent_name),
        grant_name(agent_name),
        storage_claim_name(agent_name),
    ]
}

fn owned_meta(name: String, owner: &ClusterAgent) -> ObjectMeta {
    let mut meta = ObjectMeta::named(name);
    meta.owner_references.push(OwnerReference {
        kind: ClusterAgent::KIND.to_string(),
        name: owner.metadata.name.clone(),
        uid: owner.metadata.uid.clone(),
        controller: true,
        block_owner_deletion: true,
    });
    meta
}

/// All dependents rendered for one ClusterAgent.
#[derive(Debug, Clone)]
pub struct RenderedDependents {
    pub workload: Option<Workload>,
    pub identity: ServiceIdentity,
    pub grant: AccessGrant,
    pub storage_claim: Option<StorageClaim>,
}

pub fn render_workload(agent: &ClusterAgent, default_image: &str) -> Workload {
    let tpl = &agent.spec.agent_template;
    let image = if tpl.image.is_empty() {
        default_image.to_string()
    } else {
        tpl.image.clone()
    };
    Workload {
        metadata: owned_meta(workload_name(&agent.metadata.name), agent),
        spec: WorkloadSpec {
            image,
            replicas: tpl.replicas.unwrap_or(DEFAULT_REPLICAS),
            underlay_interface: tpl.underlay_interface.clone(),
            host_network: tpl.host_network,
            node_name: tpl.node_name.clone(),
            service_identity: identity_name(&agent.metadata.name),
            health_port: AGENT_HEALTH_PORT,
        },
        status: Default::default(),
    }
}

pub fn render_identity(agent: &ClusterAgent) -> ServiceIdentity {
    ServiceIdentity {
        metadata: owned_meta(identity_name(&agent.metadata.name), agent),
    }
}

pub fn render_grant(agent: &ClusterAgent) -> AccessGrant {
    AccessGrant {
        metadata: owned_meta(grant_name(&agent.metadata.name), agent),
        rules: vec![
            GrantRule {
                kinds: vec![
                    "ClusterAgent".into(),
                    "HostEndpoint".into(),
                    "HostStatus".into(),
                    "HostOperation".into(),
                ],
                verbs: vec![
                    "get".into(),
                    "list".into(),
                    "watch".into(),
                    "create".into(),
                    "update".into(),
                    "delete".into(),
                ],
            },
            GrantRule {
                kinds: vec!["Secret".into()],
                verbs: vec!["get".into(), "list".into(), "watch".into()],
            },
        ],
    }
}

pub fn render_storage_claim(agent: &ClusterAgent) -> StorageClaim {
    StorageClaim {
        metadata: owned_meta(storage_claim_name(&agent.metadata.name), agent),
        spec: StorageClaimSpec {
            size_gib: LEASE_CLAIM_SIZE_GIB,
            mount_path: LEASE_CLAIM_MOUNT_PATH.to_string(),
        },
    }
}

/// Renders every dependent of one ClusterAgent. The storage claim is only
/// rendered when the DHCP server feature is enabled (it backs the lease
/// file across restarts).
pub fn render_all(agent: &ClusterAgent, default_image: &str) -> RenderedDependents {
    let dhcp_enabled = agent
        .spec
        .feature
        .as_ref()
        .map(|f| f.enable_dhcp_server)
        .unwrap_or(false);
    RenderedDependents {
        workload: Some(render_workload(agent, default_image)),
        identity: render_identity(agent),
        grant: render_grant(agent),
        storage_claim: dhcp_enabled.then(|| render_storage_claim(agent)),
    }
}
