// tests/property/name_transform_test.rs

use bmclink::api::types::{format_host_status_name, is_dns1123_label};
use proptest::prelude::*;

/// A plausible agent name: short DNS-label shaped.
fn agent_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,14}[a-z0-9]"
}

fn ipv4() -> impl Strategy<Value = (u8, u8, u8, u8)> {
    (any::<u8>(), any::<u8>(), any::<u8>(), any::<u8>())
}

proptest! {
    /// The name is a pure function of (agent, ip): dots become dashes, the
    /// agent name is the prefix.
    #[test]
    fn name_is_pure_function_of_agent_and_ip(agent in agent_name(), ip in ipv4()) {
        let ip = format!("{}.{}.{}.{}", ip.0, ip.1, ip.2, ip.3);
        let name = format_host_status_name(&agent, &ip);
        prop_assert_eq!(&name, &format_host_status_name(&agent, &ip));
        let prefix = format!("{}-", agent);
        prop_assert!(name.starts_with(&prefix));
        prop_assert_eq!(&name[agent.len() + 1..], ip.replace('.', "-"));
    }

    /// The transform keeps the result a valid DNS-1123 label for any agent
    /// name that is itself a short label.
    #[test]
    fn name_stays_a_dns_label(agent in agent_name(), ip in ipv4()) {
        let ip = format!("{}.{}.{}.{}", ip.0, ip.1, ip.2, ip.3);
        let name = format_host_status_name(&agent, &ip);
        prop_assert!(is_dns1123_label(&name), "not a label: {}", name);
    }

    /// Within one agent, two distinct IPs never collide.
    #[test]
    fn names_are_injective_per_agent(agent in agent_name(), a in ipv4(), b in ipv4()) {
        let ip_a = format!("{}.{}.{}.{}", a.0, a.1, a.2, a.3);
        let ip_b = format!("{}.{}.{}.{}", b.0, b.1, b.2, b.3);
        prop_assume!(ip_a != ip_b);
        prop_assert_ne!(
            format_host_status_name(&agent, &ip_a),
            format_host_status_name(&agent, &ip_b)
        );
    }
}
