// src/core/dhcp/conf.rs

//! dhcpd configuration rendering and IPv4 range arithmetic. Rendering the
//! same inputs produces a byte-identical file; the supervisor relies on
//! that to decide whether a restart is needed.

use crate::core::errors::BmcLinkError;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// MAC sentinel contributed by statically declared hosts to the binding
/// set; never rendered as a `host` block.
pub const VIRTUAL_MAC: &str = "02:00:00:00:00:00";

fn parse_ipv4(s: &str) -> Result<Ipv4Addr, BmcLinkError> {
    Ipv4Addr::from_str(s.trim())
        .map_err(|_| BmcLinkError::Validation(format!("invalid IPv4 address: {s:?}")))
}

pub fn ip_to_u32(ip: Ipv4Addr) -> u32 {
    u32::from(ip)
}

/// Splits `a.b.c.d/len` into the network address and the dotted-decimal
/// mask.
pub fn network_and_mask(cidr: &str) -> Result<(Ipv4Addr, Ipv4Addr), BmcLinkError> {
    let (addr_part, len_part) = cidr
        .split_once('/')
        .ok_or_else(|| BmcLinkError::Validation(format!("invalid CIDR: {cidr:?}")))?;
    let addr = parse_ipv4(addr_part)?;
    let prefix_len: u32 = len_part
        .parse()
        .map_err(|_| BmcLinkError::Validation(format!("invalid CIDR prefix: {cidr:?}")))?;
    if prefix_len > 32 {
        return Err(BmcLinkError::Validation(format!("invalid CIDR prefix: {cidr:?}")));
    }
    let mask_bits = if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - prefix_len)
    };
    let network = Ipv4Addr::from(ip_to_u32(addr) & mask_bits);
    Ok((network, Ipv4Addr::from(mask_bits)))
}

/// True when `ip` lies inside the `cidr` subnet.
pub fn subnet_contains(cidr: &str, ip: &str) -> Result<bool, BmcLinkError> {
    let (network, mask) = network_and_mask(cidr)?;
    let ip = parse_ipv4(ip)?;
    Ok(ip_to_u32(ip) & ip_to_u32(mask) == ip_to_u32(network))
}

/// Splits a `start-end` range into its bounds, validating order.
pub fn parse_range(range: &str) -> Result<(Ipv4Addr, Ipv4Addr), BmcLinkError> {
    let (start, end) = range
        .split_once('-')
        .ok_or_else(|| BmcLinkError::Validation(format!("invalid IP range format: {range:?}")))?;
    let start = parse_ipv4(start)?;
    let end = parse_ipv4(end)?;
    if ip_to_u32(end) < ip_to_u32(start) {
        return Err(BmcLinkError::Validation(format!(
            "IP range end precedes start: {range:?}"
        )));
    }
    Ok((start, end))
}

/// Number of addresses in an inclusive `start-end` range. A single-address
/// range (`start == end`) counts 1.
pub fn total_ips(range: &str) -> Result<u64, BmcLinkError> {
    let (start, end) = parse_range(range)?;
    Ok(u64::from(ip_to_u32(end)) - u64::from(ip_to_u32(start)) + 1)
}

/// Renders the dhcpd configuration: one subnet declaration plus a `host`
/// block per real-MAC binding. `bindings` maps IP to MAC; entries carrying
/// [`VIRTUAL_MAC`] reserve the address in the restart-decision set only.
pub fn render_conf(
    subnet: &str,
    ip_range: &str,
    gateway: &str,
    bindings: &BTreeMap<String, String>,
) -> Result<String, BmcLinkError> {
    let (network, netmask) = network_and_mask(subnet)?;
    let (range_start, range_end) = parse_range(ip_range)?;
    parse_ipv4(gateway)?;

    let mut conf = String::new();
    conf.push_str(&format!("subnet {network} netmask {netmask} {{\n"));
    conf.push_str(&format!("  range {range_start} {range_end};\n"));
    conf.push_str(&format!("  option routers {gateway};\n"));
    conf.push_str(&format!("  option subnet-mask {netmask};\n"));
    conf.push_str("}\n");

    for (ip, mac) in bindings {
        if mac == VIRTUAL_MAC {
            continue;
        }
        conf.push_str(&format!("host h-{} {{\n", ip.replace('.', "-")));
        conf.push_str(&format!("  hardware ethernet {mac};\n"));
        conf.push_str(&format!("  fixed-address {ip};\n"));
        conf.push_str("}\n");
    }

    Ok(conf)
}
