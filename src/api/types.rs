// src/api/types.rs

//! Typed declarative records consumed and published by the control plane:
//! `ClusterAgent`, `HostEndpoint`, `HostStatus`, `HostOperation`, `Secret`,
//! and the dependents the controller renders per cluster.

use crate::core::errors::BmcLinkError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// API group prefix used for all record labels.
pub const GROUP: &str = "bmclink.io";

pub const LABEL_IP_ADDR: &str = "bmclink.io/ipAddr";
pub const LABEL_CLIENT_MODE: &str = "bmclink.io/mode";
pub const LABEL_CLIENT_ACTIVE: &str = "bmclink.io/dhcp-ip-active";

pub const MODE_DHCP: &str = "dhcp";
pub const MODE_ENDPOINT: &str = "endpoint";

pub const SECRET_KEY_USERNAME: &str = "username";
pub const SECRET_KEY_PASSWORD: &str = "password";

/// Builds the deterministic `HostStatus` name for an owning agent and an
/// IPv4 address: dots are replaced with dashes so the result stays a valid
/// DNS-1123 label (`agent-a` + `10.0.0.5` -> `agent-a-10-0-0-5`).
pub fn format_host_status_name(agent: &str, ip: &str) -> String {
    format!("{}-{}", agent, ip.replace('.', "-"))
}

/// DNS-1123 label check: lowercase alphanumerics and `-`, alphanumeric at
/// both ends, at most 63 characters.
pub fn is_dns1123_label(s: &str) -> bool {
    if s.is_empty() || s.len() > 63 {
        return false;
    }
    let bytes = s.as_bytes();
    let ok_inner = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-';
    let ok_edge = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    ok_edge(bytes[0]) && ok_edge(bytes[bytes.len() - 1]) && bytes.iter().all(|&b| ok_inner(b))
}

/// Reference from a dependent record to the record that owns it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    pub uid: String,
    #[serde(default)]
    pub controller: bool,
    #[serde(default)]
    pub block_owner_deletion: bool,
}

/// Common record metadata. `uid`, `resource_version`, and
/// `creation_timestamp` are assigned by the store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    #[serde(default)]
    pub creation_timestamp: String,
}

impl ObjectMeta {
    pub fn named(name: impl Into<String>) -> Self {
        ObjectMeta {
            name: name.into(),
            ..Default::default()
        }
    }

    /// The store key for this record: `namespace/name` for namespaced
    /// records, bare `name` otherwise.
    pub fn key(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}/{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn controller_owner(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|r| r.controller)
    }
}

/// A typed record stored in a [`crate::api::Collection`].
pub trait Resource: Clone + Send + Sync + 'static {
    const KIND: &'static str;

    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// Copies the status subresource of `other` into `self`. Records without
    /// a status keep the default no-op.
    fn apply_status(&mut self, _other: &Self) {}
}

// ---------------------------------------------------------------------------
// ClusterAgent
// ---------------------------------------------------------------------------

/// Declarative intent for one per-segment agent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ClusterAgent {
    pub metadata: ObjectMeta,
    pub spec: ClusterAgentSpec,
    #[serde(default)]
    pub status: ClusterAgentStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ClusterAgentSpec {
    /// Template for the agent workload rendered by the controller.
    pub agent_template: AgentTemplate,
    /// Connection defaults applied to hosts that do not carry their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<EndpointConfig>,
    /// Feature toggles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<FeatureConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AgentTemplate {
    #[serde(default)]
    pub underlay_interface: String,
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub host_network: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EndpointConfig {
    pub port: u16,
    #[serde(default)]
    pub secret_name: String,
    #[serde(default)]
    pub secret_namespace: String,
    pub https: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            port: 443,
            secret_name: String::new(),
            secret_namespace: String::new(),
            https: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FeatureConfig {
    #[serde(default)]
    pub enable_dhcp_server: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp_server_config: Option<DhcpServerConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct DhcpServerConfig {
    /// When false, lease events are ignored and no dhcp-mode `HostStatus`
    /// records are produced.
    #[serde(default)]
    pub enable_dhcp_discovery: bool,
    pub dhcp_server_interface: String,
    /// Subnet served, CIDR notation.
    pub subnet: String,
    /// Allocation range, `start-end`.
    pub ip_range: String,
    pub gateway: String,
    /// Optional address (CIDR) to assign to the listening interface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_ip: Option<String>,
    /// Pin the addresses of dhcp-discovered hosts in the rendered config.
    #[serde(default)]
    pub enable_bind_dhcp_ip: bool,
    /// Reserve the addresses of statically declared hosts.
    #[serde(default)]
    pub enable_bind_static_ip: bool,
}

static SUBNET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{1,3}\.){3}[0-9]{1,3}/([0-9]|[1-2][0-9]|3[0-2])$").expect("static pattern")
});
static IP_RANGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{1,3}\.){3}[0-9]{1,3}-([0-9]{1,3}\.){3}[0-9]{1,3}$")
        .expect("static pattern")
});
static IP_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{1,3}\.){3}[0-9]{1,3}$").expect("static pattern"));

impl DhcpServerConfig {
    /// Field-shape validation matching the admission rules of the record:
    /// CIDR subnet and self IP, `start-end` range, dotted-quad gateway.
    pub fn validate(&self) -> Result<(), BmcLinkError> {
        if !SUBNET_PATTERN.is_match(&self.subnet) {
            return Err(BmcLinkError::Validation(format!(
                "invalid subnet {:?}, expected CIDR notation",
                self.subnet
            )));
        }
        if !IP_RANGE_PATTERN.is_match(&self.ip_range) {
            return Err(BmcLinkError::Validation(format!(
                "invalid IP range {:?}, expected start-end",
                self.ip_range
            )));
        }
        if !IP_PATTERN.is_match(&self.gateway) {
            return Err(BmcLinkError::Validation(format!(
                "invalid gateway {:?}",
                self.gateway
            )));
        }
        if let Some(self_ip) = &self.self_ip {
            if !SUBNET_PATTERN.is_match(self_ip) {
                return Err(BmcLinkError::Validation(format!(
                    "invalid self IP {self_ip:?}, expected CIDR notation"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ClusterAgentStatus {
    #[serde(default)]
    pub ready: bool,
}

impl Resource for ClusterAgent {
    const KIND: &'static str = "ClusterAgent";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
    fn apply_status(&mut self, other: &Self) {
        self.status = other.status.clone();
    }
}

// ---------------------------------------------------------------------------
// HostEndpoint
// ---------------------------------------------------------------------------

/// Declarative BMC record with a static IP.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct HostEndpoint {
    pub metadata: ObjectMeta,
    pub spec: HostEndpointSpec,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct HostEndpointSpec {
    /// Owning agent; endpoints for other agents are ignored.
    #[serde(default)]
    pub cluster_agent: String,
    pub ip_addr: String,
    #[serde(default)]
    pub secret_name: String,
    #[serde(default)]
    pub secret_namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Resource for HostEndpoint {
    const KIND: &'static str = "HostEndpoint";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

// ---------------------------------------------------------------------------
// HostStatus
// ---------------------------------------------------------------------------

/// How a `HostStatus` came to exist. Never changes once set.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HostType {
    #[default]
    Dhcp,
    Endpoint,
}

impl HostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostType::Dhcp => MODE_DHCP,
            HostType::Endpoint => MODE_ENDPOINT,
        }
    }
}

/// Connection parameters for one BMC.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct BasicInfo {
    #[serde(rename = "type")]
    pub host_type: HostType,
    pub ip_addr: String,
    #[serde(default)]
    pub secret_name: String,
    #[serde(default)]
    pub secret_namespace: String,
    pub https: bool,
    pub port: u16,
    #[serde(default)]
    pub mac: String,
    /// Set while the host holds an active DHCP lease; only meaningful for
    /// dhcp-mode records.
    #[serde(default)]
    pub active_dhcp_client: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct LogRecord {
    pub time: String,
    pub message: String,
}

/// Summary of the BMC event log as of the last probe.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct LogSummary {
    #[serde(default)]
    pub total_log_count: i32,
    #[serde(default)]
    pub warning_log_count: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_log: Option<LogRecord>,
}

/// Observed state of one BMC. The record has no spec: everything lives in
/// the status subresource and is written by exactly one producer plus the
/// poller.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct HostStatus {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: HostStatusStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct HostStatusStatus {
    #[serde(default)]
    pub healthy: bool,
    #[serde(default)]
    pub cluster_agent: String,
    #[serde(default)]
    pub last_update_time: String,
    #[serde(default)]
    pub basic: BasicInfo,
    #[serde(default)]
    pub info: BTreeMap<String, String>,
    #[serde(default)]
    pub log: LogSummary,
}

impl Resource for HostStatus {
    const KIND: &'static str = "HostStatus";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
    fn apply_status(&mut self, other: &Self) {
        self.status = other.status.clone();
    }
}

// ---------------------------------------------------------------------------
// HostOperation
// ---------------------------------------------------------------------------

pub const ACTION_PXE_REBOOT: &str = "PxeReboot";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationPhase {
    Pending,
    Success,
    Failed,
}

impl OperationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationPhase::Success | OperationPhase::Failed)
    }
}

/// One-shot imperative power command. The spec is immutable; status is
/// written once as pending and once with the terminal outcome.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct HostOperation {
    pub metadata: ObjectMeta,
    pub spec: HostOperationSpec,
    #[serde(default)]
    pub status: HostOperationStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct HostOperationSpec {
    /// A Redfish reset type, or `PxeReboot` for a one-shot PXE boot
    /// override followed by a forced restart. Kept as a free string so an
    /// unknown action can fail terminally rather than at decode time.
    pub action: String,
    pub host_status_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct HostOperationStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OperationPhase>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub last_update_time: String,
    #[serde(default)]
    pub cluster_agent: String,
    #[serde(default)]
    pub ip_addr: String,
}

impl Resource for HostOperation {
    const KIND: &'static str = "HostOperation";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
    fn apply_status(&mut self, other: &Self) {
        self.status = other.status.clone();
    }
}

// ---------------------------------------------------------------------------
// Secret
// ---------------------------------------------------------------------------

/// Namespaced credential record; `username`/`password` keys for BMC
/// credentials, `tls.crt`/`tls.key`/`ca.crt` for endpoint TLS material.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Secret {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Secret {
    pub fn key_or_empty(&self, key: &str) -> String {
        self.data.get(key).cloned().unwrap_or_default()
    }
}

impl Resource for Secret {
    const KIND: &'static str = "Secret";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

// ---------------------------------------------------------------------------
// Controller-rendered dependents
// ---------------------------------------------------------------------------

/// The agent workload materialized by the controller for one ClusterAgent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Workload {
    pub metadata: ObjectMeta,
    pub spec: WorkloadSpec,
    #[serde(default)]
    pub status: WorkloadStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct WorkloadSpec {
    pub image: String,
    pub replicas: i32,
    #[serde(default)]
    pub underlay_interface: String,
    #[serde(default)]
    pub host_network: bool,
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub service_identity: String,
    pub health_port: u16,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct WorkloadStatus {
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub ready_replicas: i32,
    #[serde(default)]
    pub available: bool,
}

impl Resource for Workload {
    const KIND: &'static str = "Workload";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
    fn apply_status(&mut self, other: &Self) {
        self.status = other.status.clone();
    }
}

/// The identity the agent workload runs as.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ServiceIdentity {
    pub metadata: ObjectMeta,
}

impl Resource for ServiceIdentity {
    const KIND: &'static str = "ServiceIdentity";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// Access rules granted to the agent identity.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AccessGrant {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub rules: Vec<GrantRule>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GrantRule {
    pub kinds: Vec<String>,
    pub verbs: Vec<String>,
}

impl Resource for AccessGrant {
    const KIND: &'static str = "AccessGrant";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// Persistent storage claim backing the agent's DHCP lease file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct StorageClaim {
    pub metadata: ObjectMeta,
    pub spec: StorageClaimSpec,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct StorageClaimSpec {
    pub size_gib: u32,
    pub mount_path: String,
}

impl Resource for StorageClaim {
    const KIND: &'static str = "StorageClaim";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
