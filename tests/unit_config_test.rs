#[path = "support/mod.rs"]
mod support;

use bmclink::api::types::{ClusterAgent, EndpointConfig, ObjectMeta};
use bmclink::config::{AgentConfig, ProcessFlags};
use support::{secret, test_store};

#[test]
fn test_flags_defaults() {
    let flags = ProcessFlags::parse(&[]).unwrap();
    assert!(!flags.controller);
    assert_eq!(flags.health_port, 8000);
    assert_eq!(flags.health_bind_address(), "0.0.0.0:8000");
    assert!(!flags.leader_elect);
}

#[test]
fn test_flags_full_set() {
    let args: Vec<String> = [
        "--controller",
        "--health-port",
        "9000",
        "--health-probe-bind-address",
        "127.0.0.1:9001",
        "--metrics-bind-address",
        "127.0.0.1:9002",
        "--webhook-port",
        "9443",
        "--leader-elect",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let flags = ProcessFlags::parse(&args).unwrap();
    assert!(flags.controller);
    assert_eq!(flags.health_port, 9000);
    assert_eq!(flags.health_bind_address(), "127.0.0.1:9001");
    assert_eq!(flags.metrics_bind_address.as_deref(), Some("127.0.0.1:9002"));
    assert_eq!(flags.webhook_port, Some(9443));
    assert!(flags.leader_elect);
}

#[test]
fn test_flags_reject_unknown_and_missing_values() {
    assert!(ProcessFlags::parse(&["--bogus".to_string()]).is_err());
    assert!(ProcessFlags::parse(&["--health-port".to_string()]).is_err());
    assert!(
        ProcessFlags::parse(&["--health-port".to_string(), "zero".to_string()]).is_err()
    );
}

/// All environment-driven scenarios live in one test: the variables are
/// process-global and the test harness runs functions in parallel.
#[test]
fn test_agent_config_load() {
    let store = test_store();

    // Missing CLUSTERAGENT_NAME is fatal.
    unsafe {
        std::env::remove_var("CLUSTERAGENT_NAME");
        std::env::set_var("HOST_STATUS_UPDATE_INTERVAL", "60");
    }
    assert!(AgentConfig::load(&store).is_err());

    // Missing interval is fatal.
    unsafe {
        std::env::set_var("CLUSTERAGENT_NAME", "agent-a");
        std::env::remove_var("HOST_STATUS_UPDATE_INTERVAL");
    }
    assert!(AgentConfig::load(&store).is_err());

    // A non-integer interval is fatal.
    unsafe {
        std::env::set_var("HOST_STATUS_UPDATE_INTERVAL", "soon");
    }
    assert!(AgentConfig::load(&store).is_err());

    // The agent's ClusterAgent record must exist.
    unsafe {
        std::env::set_var("HOST_STATUS_UPDATE_INTERVAL", "60");
    }
    assert!(AgentConfig::load(&store).is_err());

    // A complete environment with a default credential secret resolves it.
    store
        .secrets
        .create(secret("bmc-system", "default-cred", "root", "calvin"))
        .unwrap();
    store
        .cluster_agents
        .create(ClusterAgent {
            metadata: ObjectMeta::named("agent-a"),
            spec: bmclink::api::types::ClusterAgentSpec {
                endpoint: Some(EndpointConfig {
                    port: 443,
                    secret_name: "default-cred".to_string(),
                    secret_namespace: "bmc-system".to_string(),
                    https: true,
                }),
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();

    let config = AgentConfig::load(&store).unwrap();
    assert_eq!(config.cluster_agent_name, "agent-a");
    assert_eq!(config.host_status_update_interval, 60);
    assert_eq!(config.username, "root");
    assert_eq!(config.password, "calvin");
    assert_eq!(
        config.default_secret_ref(),
        ("default-cred".to_string(), "bmc-system".to_string())
    );

    // A referenced secret that does not exist is fatal.
    let store2 = test_store();
    store2
        .cluster_agents
        .create(ClusterAgent {
            metadata: ObjectMeta::named("agent-a"),
            spec: bmclink::api::types::ClusterAgentSpec {
                endpoint: Some(EndpointConfig {
                    port: 443,
                    secret_name: "absent".to_string(),
                    secret_namespace: "bmc-system".to_string(),
                    https: true,
                }),
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();
    assert!(AgentConfig::load(&store2).is_err());
}

#[test]
fn test_dhcp_config_shape_validation() {
    use bmclink::api::types::DhcpServerConfig;
    let valid = DhcpServerConfig {
        enable_dhcp_discovery: true,
        dhcp_server_interface: "eth1".to_string(),
        subnet: "192.168.0.0/24".to_string(),
        ip_range: "192.168.0.100-192.168.0.200".to_string(),
        gateway: "192.168.0.1".to_string(),
        self_ip: Some("192.168.0.2/24".to_string()),
        enable_bind_dhcp_ip: false,
        enable_bind_static_ip: false,
    };
    assert!(valid.validate().is_ok());

    let mut bad_subnet = valid.clone();
    bad_subnet.subnet = "192.168.0.0".to_string();
    assert!(bad_subnet.validate().is_err());

    let mut bad_range = valid.clone();
    bad_range.ip_range = "192.168.0.100".to_string();
    assert!(bad_range.validate().is_err());

    let mut bad_gateway = valid.clone();
    bad_gateway.gateway = "gw".to_string();
    assert!(bad_gateway.validate().is_err());

    let mut bad_self_ip = valid.clone();
    bad_self_ip.self_ip = Some("192.168.0.2".to_string());
    assert!(bad_self_ip.validate().is_err());
}
