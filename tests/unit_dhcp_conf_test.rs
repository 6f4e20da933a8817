use bmclink::core::dhcp::conf::{
    VIRTUAL_MAC, network_and_mask, render_conf, subnet_contains, total_ips,
};
use std::collections::BTreeMap;

#[test]
fn test_network_and_mask() {
    let (network, mask) = network_and_mask("192.168.0.0/24").unwrap();
    assert_eq!(network.to_string(), "192.168.0.0");
    assert_eq!(mask.to_string(), "255.255.255.0");

    // A host address normalizes to its network.
    let (network, mask) = network_and_mask("10.1.2.3/16").unwrap();
    assert_eq!(network.to_string(), "10.1.0.0");
    assert_eq!(mask.to_string(), "255.255.0.0");
}

#[test]
fn test_network_and_mask_rejects_garbage() {
    assert!(network_and_mask("not-a-cidr").is_err());
    assert!(network_and_mask("192.168.0.0/33").is_err());
    assert!(network_and_mask("192.168.0.0").is_err());
}

#[test]
fn test_total_ips() {
    assert_eq!(total_ips("192.168.0.100-192.168.0.200").unwrap(), 101);
    // A single-address range counts one.
    assert_eq!(total_ips("192.168.0.100-192.168.0.100").unwrap(), 1);
    assert!(total_ips("192.168.0.200-192.168.0.100").is_err());
    assert!(total_ips("192.168.0.100").is_err());
}

#[test]
fn test_subnet_contains() {
    assert!(subnet_contains("192.168.0.0/24", "192.168.0.50").unwrap());
    assert!(!subnet_contains("192.168.0.0/24", "192.168.1.50").unwrap());
}

#[test]
fn test_render_is_deterministic() {
    let bindings = BTreeMap::new();
    let a = render_conf("192.168.0.0/24", "192.168.0.100-192.168.0.200", "192.168.0.1", &bindings)
        .unwrap();
    let b = render_conf("192.168.0.0/24", "192.168.0.100-192.168.0.200", "192.168.0.1", &bindings)
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_render_subnet_block() {
    let rendered = render_conf(
        "192.168.0.0/24",
        "192.168.0.100-192.168.0.200",
        "192.168.0.1",
        &BTreeMap::new(),
    )
    .unwrap();
    assert!(rendered.contains("subnet 192.168.0.0 netmask 255.255.255.0 {"));
    assert!(rendered.contains("range 192.168.0.100 192.168.0.200;"));
    assert!(rendered.contains("option routers 192.168.0.1;"));
    assert!(rendered.contains("option subnet-mask 255.255.255.0;"));
}

#[test]
fn test_render_host_blocks_skip_virtual_mac() {
    let mut bindings = BTreeMap::new();
    bindings.insert("192.168.0.50".to_string(), "aa:bb:cc:dd:ee:ff".to_string());
    bindings.insert("192.168.0.60".to_string(), VIRTUAL_MAC.to_string());
    let rendered = render_conf(
        "192.168.0.0/24",
        "192.168.0.100-192.168.0.200",
        "192.168.0.1",
        &bindings,
    )
    .unwrap();

    assert!(rendered.contains("host h-192-168-0-50 {"));
    assert!(rendered.contains("hardware ethernet aa:bb:cc:dd:ee:ff;"));
    assert!(rendered.contains("fixed-address 192.168.0.50;"));
    // Sentinel bindings only participate in the restart decision.
    assert!(!rendered.contains("192.168.0.60"));
}

#[test]
fn test_render_rejects_invalid_gateway() {
    assert!(
        render_conf(
            "192.168.0.0/24",
            "192.168.0.100-192.168.0.200",
            "gateway",
            &BTreeMap::new()
        )
        .is_err()
    );
}
