// src/core/dhcp/lease.rs

//! Parser for the ISC `dhcpd.leases` grammar (sequential `lease <ip> { .. }`
//! blocks) and the snapshot diff that turns two lease-file states into
//! add/delete events.

use super::DhcpClientInfo;
use std::collections::HashMap;

/// Parses the full content of a lease file. Unknown lines inside a block
/// are skipped; a block terminates at `}`.
pub fn parse_leases(content: &str) -> Vec<DhcpClientInfo> {
    let mut clients = Vec::new();
    let mut current: Option<DhcpClientInfo> = None;

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("lease ") {
            // A `lease` line without a closing `}` before the next one
            // still yields the partial block.
            if let Some(client) = current.take() {
                clients.push(client);
            }
            let ip = rest
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .trim_end_matches('{')
                .to_string();
            current = Some(DhcpClientInfo {
                ip,
                ..Default::default()
            });
            continue;
        }

        if line == "}" {
            if let Some(client) = current.take() {
                clients.push(client);
            }
            continue;
        }

        let Some(client) = current.as_mut() else {
            continue;
        };

        if let Some(rest) = line.strip_prefix("hardware ethernet") {
            client.mac = rest.trim().trim_end_matches(';').to_string();
        } else if let Some(rest) = line.strip_prefix("binding state") {
            client.active = rest.trim().trim_end_matches(';') == "active";
        } else if line.starts_with("starts") {
            client.start_time = lease_timestamp(line);
        } else if line.starts_with("ends") {
            client.end_time = lease_timestamp(line);
        }
    }

    if let Some(client) = current.take() {
        clients.push(client);
    }
    clients
}

/// Extracts `YYYY/MM/DD HH:MM:SS` from a `starts <day> <date> <time>;` line.
fn lease_timestamp(line: &str) -> String {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() >= 4 {
        format!("{} {}", parts[2], parts[3].trim_end_matches(';'))
    } else {
        String::new()
    }
}

/// Keys a lease list by IP. A later block for the same IP wins, matching
/// dhcpd's append-only file format.
pub fn by_ip(clients: Vec<DhcpClientInfo>) -> HashMap<String, DhcpClientInfo> {
    clients.into_iter().map(|c| (c.ip.clone(), c)).collect()
}

/// Diffs two lease snapshots. Returns `(adds, deletes)`:
/// a previously unseen IP and a known IP with a changed MAC both produce an
/// add event (the consumer treats the latter as an update); an IP present
/// before and absent now produces a delete event.
pub fn diff_snapshots(
    old: &HashMap<String, DhcpClientInfo>,
    new: &HashMap<String, DhcpClientInfo>,
) -> (Vec<DhcpClientInfo>, Vec<DhcpClientInfo>) {
    let mut adds = Vec::new();
    let mut deletes = Vec::new();

    for (ip, client) in new {
        match old.get(ip) {
            None => adds.push(client.clone()),
            Some(prev) if prev.mac != client.mac => adds.push(client.clone()),
            Some(_) => {}
        }
    }
    for (ip, client) in old {
        if !new.contains_key(ip) {
            deletes.push(client.clone());
        }
    }

    adds.sort_by(|a, b| a.ip.cmp(&b.ip));
    deletes.sort_by(|a, b| a.ip.cmp(&b.ip));
    (adds, deletes)
}
