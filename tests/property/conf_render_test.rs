// tests/property/conf_render_test.rs

use bmclink::core::dhcp::conf::{render_conf, subnet_contains, total_ips};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn octets() -> impl Strategy<Value = (u8, u8)> {
    any::<(u8, u8)>()
}

proptest! {
    /// Rendering the same inputs twice is byte-identical.
    #[test]
    fn render_is_deterministic(third in 0u8..255, bindings in prop::collection::btree_map(
        (0u8..255).prop_map(|n| format!("10.0.0.{n}")),
        "[0-9a-f]{2}(:[0-9a-f]{2}){5}",
        0..8,
    )) {
        let subnet = format!("10.0.{third}.0/24");
        let range = format!("10.0.{third}.10-10.0.{third}.20");
        let bindings: BTreeMap<String, String> = bindings;
        let a = render_conf(&subnet, &range, "10.0.0.1", &bindings).unwrap();
        let b = render_conf(&subnet, &range, "10.0.0.1", &bindings).unwrap();
        prop_assert_eq!(a, b);
    }

    /// An inclusive range over one /16 always counts end - start + 1.
    #[test]
    fn total_ips_matches_arithmetic((lo, hi) in octets()) {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let range = format!("10.1.{lo}.0-10.1.{hi}.0");
        let expected = (u64::from(hi) - u64::from(lo)) * 256 + 1;
        prop_assert_eq!(total_ips(&range).unwrap(), expected);
    }

    /// Every address of a /24 is inside it; addresses of a different /24
    /// are not.
    #[test]
    fn subnet_membership(host in any::<u8>(), third in 0u8..254) {
        let subnet = format!("192.168.{third}.0/24");
        let inside = format!("192.168.{third}.{host}");
        let outside = format!("192.168.{}.{host}", third + 1);
        prop_assert!(subnet_contains(&subnet, &inside).unwrap());
        prop_assert!(!subnet_contains(&subnet, &outside).unwrap());
    }
}
