// tests/property/lease_diff_test.rs

use bmclink::core::dhcp::DhcpClientInfo;
use bmclink::core::dhcp::lease::diff_snapshots;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

/// Small pools keep collisions (shared IPs between snapshots) frequent.
fn snapshot() -> impl Strategy<Value = HashMap<String, DhcpClientInfo>> {
    prop::collection::hash_map(
        (0u8..16).prop_map(|n| format!("192.168.0.{n}")),
        (0u8..4).prop_map(|n| format!("aa:bb:cc:dd:ee:{n:02x}")),
        0..12,
    )
    .prop_map(|m| {
        m.into_iter()
            .map(|(ip, mac)| {
                (
                    ip.clone(),
                    DhcpClientInfo {
                        ip,
                        mac,
                        active: true,
                        ..Default::default()
                    },
                )
            })
            .collect()
    })
}

proptest! {
    /// For any two snapshots S1, S2 the emitted event set is exactly:
    /// adds for IPs only in S2, adds for shared IPs whose MAC changed,
    /// deletes for IPs only in S1.
    #[test]
    fn diff_emits_exactly_the_specified_events(old in snapshot(), new in snapshot()) {
        let (adds, deletes) = diff_snapshots(&old, &new);

        let added: HashSet<&str> = adds.iter().map(|c| c.ip.as_str()).collect();
        let deleted: HashSet<&str> = deletes.iter().map(|c| c.ip.as_str()).collect();

        for (ip, client) in &new {
            match old.get(ip) {
                None => prop_assert!(added.contains(ip.as_str()), "missing add for new {ip}"),
                Some(prev) if prev.mac != client.mac => {
                    prop_assert!(added.contains(ip.as_str()), "missing add for changed {ip}")
                }
                Some(_) => prop_assert!(!added.contains(ip.as_str()), "spurious add for {ip}"),
            }
            prop_assert!(!deleted.contains(ip.as_str()), "delete for live {ip}");
        }
        for ip in old.keys() {
            if !new.contains_key(ip) {
                prop_assert!(deleted.contains(ip.as_str()), "missing delete for {ip}");
            }
        }

        // Every emitted add carries the new snapshot's view of the client.
        for add in &adds {
            prop_assert_eq!(&new[&add.ip], add);
        }
        // Every emitted delete carries the old snapshot's view.
        for del in &deletes {
            prop_assert_eq!(&old[&del.ip], del);
        }

        // No duplicates.
        prop_assert_eq!(added.len(), adds.len());
        prop_assert_eq!(deleted.len(), deletes.len());
    }

    /// Diffing a snapshot against itself is silent.
    #[test]
    fn identical_snapshots_are_silent(snap in snapshot()) {
        let (adds, deletes) = diff_snapshots(&snap, &snap);
        prop_assert!(adds.is_empty());
        prop_assert!(deletes.is_empty());
    }
}
