// src/core/dhcp/mod.rs

//! Managed DHCP subsystem: configuration rendering, lease-file parsing,
//! interface management, the supervised `dhcpd` subprocess, and the adapter
//! that turns lease events into dhcp-mode `HostStatus` records.

pub mod adapter;
pub mod conf;
pub mod iface;
pub mod lease;
pub mod server;

pub use adapter::DhcpEventAdapter;
pub use server::{DhcpPaths, DhcpServerManager};

/// One DHCP client lease as observed in the lease file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DhcpClientInfo {
    pub ip: String,
    pub mac: String,
    /// True when the lease is in `binding state active`.
    pub active: bool,
    /// Lease start, `YYYY/MM/DD HH:MM:SS`.
    pub start_time: String,
    /// Lease end, same format.
    pub end_time: String,
}

/// IP allocation statistics derived from the configured range and the
/// current lease count.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IpUsageStats {
    pub total_ips: u64,
    pub used_ips: u64,
    pub available_ips: u64,
    pub usage_percentage: f64,
}
