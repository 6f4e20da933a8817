// src/config.rs

//! Process configuration: hand-parsed flags, environment variables, and
//! the agent/controller config structs resolved against the declarative
//! store at startup. Startup validation failures are fatal.

use crate::api::store::{Store, namespaced_key};
use crate::api::types::{
    ClusterAgentSpec, DhcpServerConfig, EndpointConfig, FeatureConfig, SECRET_KEY_PASSWORD,
    SECRET_KEY_USERNAME,
};
use crate::core::errors::BmcLinkError;
use std::env;
use std::path::PathBuf;
use tracing::debug;

pub const ENV_POD_NAMESPACE: &str = "POD_NAMESPACE";
pub const ENV_CLUSTERAGENT_NAME: &str = "CLUSTERAGENT_NAME";
pub const ENV_UPDATE_INTERVAL: &str = "HOST_STATUS_UPDATE_INTERVAL";
pub const ENV_AGENT_IMAGE: &str = "AGENT_IMAGE";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

/// Base directory of the per-agent DHCP files; overridable for tests.
pub const ENV_DHCP_BASE_DIR: &str = "BMCLINK_DHCP_DIR";
const DEFAULT_DHCP_BASE_DIR: &str = "/var/lib/bmclink/dhcp";

/// Base directory of the per-agent TLS material; overridable for tests.
pub const ENV_TLS_BASE_DIR: &str = "BMCLINK_TLS_DIR";
const DEFAULT_TLS_BASE_DIR: &str = "/var/lib/bmclink/tls";

const DEFAULT_HEALTH_PORT: u16 = 8000;

/// Command-line flags, parsed by hand. Unknown flags are rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessFlags {
    pub controller: bool,
    pub health_port: u16,
    pub health_probe_bind_address: Option<String>,
    pub metrics_bind_address: Option<String>,
    pub webhook_port: Option<u16>,
    pub leader_elect: bool,
}

impl Default for ProcessFlags {
    fn default() -> Self {
        ProcessFlags {
            controller: false,
            health_port: DEFAULT_HEALTH_PORT,
            health_probe_bind_address: None,
            metrics_bind_address: None,
            webhook_port: None,
            leader_elect: false,
        }
    }
}

impl ProcessFlags {
    /// Parses the flags after the program name.
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut flags = ProcessFlags::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--controller" => flags.controller = true,
                "--leader-elect" => flags.leader_elect = true,
                "--health-port" => {
                    let value = iter.next().ok_or("--health-port flag requires a value")?;
                    flags.health_port = value
                        .parse()
                        .map_err(|_| format!("invalid port number: {value}"))?;
                }
                "--webhook-port" => {
                    let value = iter.next().ok_or("--webhook-port flag requires a value")?;
                    flags.webhook_port = Some(
                        value
                            .parse()
                            .map_err(|_| format!("invalid port number: {value}"))?,
                    );
                }
                "--health-probe-bind-address" => {
                    let value = iter
                        .next()
                        .ok_or("--health-probe-bind-address flag requires a value")?;
                    flags.health_probe_bind_address = Some(value.clone());
                }
                "--metrics-bind-address" => {
                    let value = iter
                        .next()
                        .ok_or("--metrics-bind-address flag requires a value")?;
                    flags.metrics_bind_address = Some(value.clone());
                }
                other => return Err(format!("unknown flag: {other}")),
            }
        }
        Ok(flags)
    }

    /// The address the health endpoint binds to.
    pub fn health_bind_address(&self) -> String {
        self.health_probe_bind_address
            .clone()
            .unwrap_or_else(|| format!("0.0.0.0:{}", self.health_port))
    }
}

/// The agent's resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub cluster_agent_name: String,
    pub pod_namespace: String,
    pub agent_spec: ClusterAgentSpec,
    /// Credentials of the agent's default secret, resolved at startup and
    /// refreshed by the secret reconciler.
    pub username: String,
    pub password: String,
    /// Poll cadence in seconds.
    pub host_status_update_interval: u64,
    pub dhcp_base_dir: PathBuf,
    pub tls_base_dir: PathBuf,
}

impl AgentConfig {
    /// Loads the configuration from the environment and the agent's
    /// `ClusterAgent` record.
    pub fn load(store: &Store) -> Result<Self, BmcLinkError> {
        let cluster_agent_name = env::var(ENV_CLUSTERAGENT_NAME).map_err(|_| {
            BmcLinkError::Validation(format!(
                "{ENV_CLUSTERAGENT_NAME} environment variable not set"
            ))
        })?;
        let interval_raw = env::var(ENV_UPDATE_INTERVAL).map_err(|_| {
            BmcLinkError::Validation(format!(
                "{ENV_UPDATE_INTERVAL} environment variable not set"
            ))
        })?;
        let host_status_update_interval: u64 = interval_raw.parse().map_err(|_| {
            BmcLinkError::Validation(format!(
                "{ENV_UPDATE_INTERVAL} must be an integer number of seconds, got {interval_raw:?}"
            ))
        })?;
        let pod_namespace = env::var(ENV_POD_NAMESPACE).unwrap_or_default();
        let dhcp_base_dir = env::var(ENV_DHCP_BASE_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DHCP_BASE_DIR));
        let tls_base_dir = env::var(ENV_TLS_BASE_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_TLS_BASE_DIR));

        let agent = store.cluster_agents.get(&cluster_agent_name)?;

        let mut config = AgentConfig {
            cluster_agent_name,
            pod_namespace,
            agent_spec: agent.spec,
            username: String::new(),
            password: String::new(),
            host_status_update_interval,
            dhcp_base_dir,
            tls_base_dir,
        };
        config.validate_endpoint(store)?;
        config.validate_feature()?;
        debug!("agent configuration loaded for {}", config.cluster_agent_name);
        Ok(config)
    }

    /// The resolved endpoint defaults for this agent.
    pub fn endpoint(&self) -> EndpointConfig {
        self.agent_spec.endpoint.clone().unwrap_or_default()
    }

    pub fn feature(&self) -> FeatureConfig {
        self.agent_spec.feature.clone().unwrap_or_default()
    }

    pub fn dhcp_config(&self) -> Option<DhcpServerConfig> {
        self.feature().dhcp_server_config
    }

    /// `(name, namespace)` of the agent's default credential secret; both
    /// empty when none is configured.
    pub fn default_secret_ref(&self) -> (String, String) {
        let endpoint = self.endpoint();
        (endpoint.secret_name, endpoint.secret_namespace)
    }

    /// Validates the endpoint defaults and resolves the default credential
    /// secret into memory.
    fn validate_endpoint(&mut self, store: &Store) -> Result<(), BmcLinkError> {
        let endpoint = self.endpoint();
        if endpoint.port == 0 {
            return Err(BmcLinkError::Validation(format!(
                "invalid endpoint port number: {}",
                endpoint.port
            )));
        }
        if !endpoint.secret_name.is_empty() && !endpoint.secret_namespace.is_empty() {
            let secret = store
                .secrets
                .get(&namespaced_key(&endpoint.secret_namespace, &endpoint.secret_name))
                .map_err(|e| {
                    BmcLinkError::Validation(format!("failed to get credentials secret: {e}"))
                })?;
            let username = secret.data.get(SECRET_KEY_USERNAME).ok_or_else(|| {
                BmcLinkError::Validation("username not found in secret".to_string())
            })?;
            let password = secret.data.get(SECRET_KEY_PASSWORD).ok_or_else(|| {
                BmcLinkError::Validation("password not found in secret".to_string())
            })?;
            self.username = username.clone();
            self.password = password.clone();
            debug!(
                "loaded credentials from secret {}/{}",
                endpoint.secret_namespace, endpoint.secret_name
            );
        }
        Ok(())
    }

    /// Validates the feature configuration; the DHCP server needs a full
    /// subnet description and an existing listening interface.
    fn validate_feature(&self) -> Result<(), BmcLinkError> {
        let feature = self.feature();
        if !feature.enable_dhcp_server {
            return Ok(());
        }
        let Some(dhcp) = feature.dhcp_server_config else {
            return Err(BmcLinkError::Validation(
                "dhcp server config must be specified when dhcp server is enabled".to_string(),
            ));
        };
        dhcp.validate()?;
        if dhcp.dhcp_server_interface.is_empty() {
            return Err(BmcLinkError::Validation(
                "dhcp server interface must be specified when dhcp server is enabled".to_string(),
            ));
        }
        if !std::path::Path::new(&format!("/sys/class/net/{}", dhcp.dhcp_server_interface))
            .exists()
        {
            return Err(BmcLinkError::Validation(format!(
                "dhcp server interface {} not found",
                dhcp.dhcp_server_interface
            )));
        }
        crate::core::dhcp::conf::network_and_mask(&dhcp.subnet)?;
        crate::core::dhcp::conf::total_ips(&dhcp.ip_range)?;
        if let Some(self_ip) = &dhcp.self_ip {
            let bare = self_ip.split('/').next().unwrap_or(self_ip);
            if !crate::core::dhcp::conf::subnet_contains(&dhcp.subnet, bare)? {
                return Err(BmcLinkError::Validation(format!(
                    "self IP {} is outside subnet {}",
                    self_ip, dhcp.subnet
                )));
            }
        }
        Ok(())
    }
}

/// The controller's resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub pod_namespace: String,
    pub agent_image: String,
}

impl ControllerConfig {
    pub fn load() -> Result<Self, BmcLinkError> {
        let pod_namespace = env::var(ENV_POD_NAMESPACE).map_err(|_| {
            BmcLinkError::Validation(format!("{ENV_POD_NAMESPACE} environment variable not set"))
        })?;
        let agent_image = env::var(ENV_AGENT_IMAGE).map_err(|_| {
            BmcLinkError::Validation(format!("{ENV_AGENT_IMAGE} environment variable not set"))
        })?;
        Ok(ControllerConfig {
            pod_namespace,
            agent_image,
        })
    }
}
