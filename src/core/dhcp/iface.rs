// src/core/dhcp/iface.rs

//! Listening-interface management. Existence and link state come from
//! `/sys/class/net`; address changes shell out to `ip`, keeping the whole
//! subsystem subprocess-driven like the daemon itself.

use super::conf::subnet_contains;
use crate::core::errors::BmcLinkError;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, error};

/// Fails when the interface does not exist or its link is down.
pub async fn validate_interface(name: &str) -> Result<(), BmcLinkError> {
    let sys_path = format!("/sys/class/net/{name}");
    if !Path::new(&sys_path).exists() {
        return Err(BmcLinkError::Dhcp(format!(
            "dhcp server interface {name} not found"
        )));
    }
    let operstate = tokio::fs::read_to_string(format!("{sys_path}/operstate"))
        .await
        .unwrap_or_default();
    let operstate = operstate.trim();
    // `unknown` covers interfaces without carrier detection (loopback,
    // some virtual links).
    if operstate != "up" && operstate != "unknown" {
        return Err(BmcLinkError::Dhcp(format!(
            "dhcp server interface {name} is {operstate}, expected up"
        )));
    }
    Ok(())
}

async fn run_ip(args: &[&str]) -> Result<String, BmcLinkError> {
    debug!("running: ip {}", args.join(" "));
    let output = Command::new("ip").args(args).output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("ip {} failed: {}", args.join(" "), stderr.trim());
        return Err(BmcLinkError::Dhcp(format!(
            "ip {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// IPv4 addresses currently assigned to the interface, without prefix
/// lengths.
pub async fn interface_addresses(name: &str) -> Result<Vec<String>, BmcLinkError> {
    let output = run_ip(&["-4", "-o", "addr", "show", "dev", name]).await?;
    let mut addrs = Vec::new();
    for line in output.lines() {
        let mut fields = line.split_whitespace();
        while let Some(field) = fields.next() {
            if field == "inet" {
                if let Some(addr) = fields.next() {
                    let ip = addr.split('/').next().unwrap_or(addr);
                    addrs.push(ip.to_string());
                }
                break;
            }
        }
    }
    Ok(addrs)
}

/// True when the interface already carries an address inside `subnet`.
pub async fn has_address_in_subnet(name: &str, subnet: &str) -> Result<bool, BmcLinkError> {
    for addr in interface_addresses(name).await? {
        if subnet_contains(subnet, &addr)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Assigns `self_ip` (CIDR notation) to the interface, stripping any prior
/// IPv4 addresses first. The address must lie inside `subnet`.
pub async fn assign_self_ip(name: &str, self_ip: &str, subnet: &str) -> Result<(), BmcLinkError> {
    let bare_ip = self_ip.split('/').next().unwrap_or(self_ip);
    if !subnet_contains(subnet, bare_ip)? {
        return Err(BmcLinkError::Dhcp(format!(
            "self IP {self_ip} is outside subnet {subnet}"
        )));
    }
    run_ip(&["-4", "addr", "flush", "dev", name]).await?;
    run_ip(&["addr", "add", self_ip, "dev", name]).await?;
    run_ip(&["link", "set", name, "up"]).await?;
    Ok(())
}
