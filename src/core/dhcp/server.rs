// src/core/dhcp/server.rs

//! Supervised `dhcpd` subprocess: renders its configuration, owns its
//! lifecycle, tails the lease file into add/delete events, and restarts the
//! daemon on crash, liveness failure, or binding-set drift.

use super::conf::{self, VIRTUAL_MAC};
use super::iface;
use super::lease;
use super::{DhcpClientInfo, IpUsageStats};
use crate::api::types::DhcpServerConfig;
use crate::core::cache::HostCache;
use crate::core::errors::BmcLinkError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// The DHCP daemon binary, expected on PATH.
pub const DHCP_BINARY: &str = "dhcpd";

/// Supervision cadence.
const SUPERVISE_INTERVAL: Duration = Duration::from_secs(10);
/// How long a SIGTERM'd daemon may take before SIGKILL.
const STOP_GRACE: Duration = Duration::from_secs(10);
/// Daemon log lines dumped to the main log before a restart.
const LOG_TAIL_LINES: usize = 50;

/// Per-agent file layout for the daemon.
#[derive(Debug, Clone)]
pub struct DhcpPaths {
    pub conf: PathBuf,
    pub lease: PathBuf,
    pub pid: PathBuf,
    pub log: PathBuf,
}

impl DhcpPaths {
    /// The fixed layout under `base` for one agent:
    /// `<base>/<agent>/dhcpd.{conf,leases,pid,log}`.
    pub fn for_agent(base: &Path, agent: &str) -> Self {
        let dir = base.join(agent);
        DhcpPaths {
            conf: dir.join("dhcpd.conf"),
            lease: dir.join("dhcpd.leases"),
            pid: dir.join("dhcpd.pid"),
            log: dir.join("dhcpd.log"),
        }
    }
}

/// Owner and supervisor of the DHCP daemon. Only this type may start or
/// kill the subprocess.
pub struct DhcpServerManager {
    config: DhcpServerConfig,
    paths: DhcpPaths,
    cache: Arc<HostCache>,
    add_tx: mpsc::Sender<DhcpClientInfo>,
    delete_tx: mpsc::Sender<DhcpClientInfo>,
    child: tokio::sync::Mutex<Option<Child>>,
    previous_clients: Mutex<HashMap<String, DhcpClientInfo>>,
    /// Binding set last rendered into the configuration file.
    last_bound: Mutex<BTreeMap<String, String>>,
    total_ips: u64,
    stats: Mutex<IpUsageStats>,
}

impl DhcpServerManager {
    /// Builds the manager and its event channels. The channels carry one
    /// event at a time; the supervisor blocks while the adapter processes,
    /// so the adapter must never call back into the manager.
    pub fn new(
        config: DhcpServerConfig,
        paths: DhcpPaths,
        cache: Arc<HostCache>,
    ) -> Result<
        (
            Arc<Self>,
            mpsc::Receiver<DhcpClientInfo>,
            mpsc::Receiver<DhcpClientInfo>,
        ),
        BmcLinkError,
    > {
        let total_ips = conf::total_ips(&config.ip_range)?;
        conf::network_and_mask(&config.subnet)?;
        let (add_tx, add_rx) = mpsc::channel(1);
        let (delete_tx, delete_rx) = mpsc::channel(1);
        let manager = Arc::new(DhcpServerManager {
            config,
            paths,
            cache,
            add_tx,
            delete_tx,
            child: tokio::sync::Mutex::new(None),
            previous_clients: Mutex::new(HashMap::new()),
            last_bound: Mutex::new(BTreeMap::new()),
            total_ips,
            stats: Mutex::new(IpUsageStats {
                total_ips,
                used_ips: 0,
                available_ips: total_ips,
                usage_percentage: 0.0,
            }),
        });
        Ok((manager, add_rx, delete_rx))
    }

    /// Validates the listening interface, renders the configuration, and
    /// starts the daemon. Startup failures are fatal for the agent.
    pub async fn start(&self) -> Result<(), BmcLinkError> {
        let iface_name = &self.config.dhcp_server_interface;
        debug!(
            "starting DHCP server: interface={}, subnet={}, range={}",
            iface_name, self.config.subnet, self.config.ip_range
        );

        iface::validate_interface(iface_name).await?;
        match &self.config.self_ip {
            Some(self_ip) => {
                debug!("configuring interface {} with address {}", iface_name, self_ip);
                iface::assign_self_ip(iface_name, self_ip, &self.config.subnet).await?;
            }
            None => {
                if !iface::has_address_in_subnet(iface_name, &self.config.subnet).await? {
                    return Err(BmcLinkError::Dhcp(format!(
                        "interface {} has no address in subnet {}",
                        iface_name, self.config.subnet
                    )));
                }
            }
        }

        self.render_config().await?;
        self.ensure_lease_file().await?;
        self.spawn_daemon().await?;
        info!("DHCP server started on interface {}", iface_name);
        Ok(())
    }

    /// The binding set derived from the host cache. Dhcp-bound hosts
    /// contribute their real MAC; statically declared hosts contribute a
    /// virtual-MAC sentinel. The two feature flags are additive.
    fn desired_bindings(&self) -> BTreeMap<String, String> {
        let mut bindings = BTreeMap::new();
        if self.config.enable_bind_dhcp_ip {
            for entry in self.cache.snapshot_dhcp().into_values() {
                if !entry.info.mac.is_empty() {
                    bindings.insert(entry.info.ip_addr.clone(), entry.info.mac.clone());
                }
            }
        }
        if self.config.enable_bind_static_ip {
            for entry in self.cache.snapshot_static().into_values() {
                bindings.insert(entry.info.ip_addr.clone(), VIRTUAL_MAC.to_string());
            }
        }
        bindings
    }

    /// Renders the configuration file and records the binding set it was
    /// rendered from.
    async fn render_config(&self) -> Result<(), BmcLinkError> {
        let bindings = self.desired_bindings();
        let rendered = conf::render_conf(
            &self.config.subnet,
            &self.config.ip_range,
            &self.config.gateway,
            &bindings,
        )?;
        if let Some(dir) = self.paths.conf.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&self.paths.conf, rendered.as_bytes()).await?;
        *self.last_bound.lock() = bindings;
        Ok(())
    }

    /// Keeps an existing lease file (the daemon is authoritative for lease
    /// state across restarts); creates an empty one otherwise.
    async fn ensure_lease_file(&self) -> Result<(), BmcLinkError> {
        if tokio::fs::metadata(&self.paths.lease).await.is_ok() {
            info!("found existing DHCP lease file, will use it: {:?}", self.paths.lease);
            return Ok(());
        }
        info!("no existing DHCP lease file found, creating an empty one");
        if let Some(dir) = self.paths.lease.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&self.paths.lease, b"").await?;
        Ok(())
    }

    async fn spawn_daemon(&self) -> Result<(), BmcLinkError> {
        if let Some(dir) = self.paths.log.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.paths.log)?;
        let stderr_file = log_file.try_clone()?;

        let mut cmd = Command::new(DHCP_BINARY);
        cmd.arg("-f")
            .arg("-cf")
            .arg(&self.paths.conf)
            .arg("-lf")
            .arg(&self.paths.lease)
            .arg("-pf")
            .arg(&self.paths.pid)
            .arg("-tf")
            .arg(&self.paths.log)
            .arg("-d")
            .arg(&self.config.dhcp_server_interface)
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(stderr_file));

        let child = cmd.spawn()?;
        debug!("spawned {} with pid {:?}", DHCP_BINARY, child.id());
        *self.child.lock().await = Some(child);
        Ok(())
    }

    /// Stops the daemon: SIGTERM, a bounded grace period, then SIGKILL.
    pub async fn stop(&self) {
        let mut guard = self.child.lock().await;
        let Some(mut child) = guard.take() else {
            return;
        };
        if let Some(pid) = child.id() {
            // SAFETY: plain signal send to a pid this process spawned.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
            match tokio::time::timeout(STOP_GRACE, child.wait()).await {
                Ok(Ok(status)) => debug!("DHCP server exited with {status}"),
                Ok(Err(e)) => warn!("failed to reap DHCP server: {e}"),
                Err(_) => {
                    warn!("DHCP server ignored SIGTERM for {STOP_GRACE:?}, sending SIGKILL");
                    let _ = child.kill().await;
                }
            }
        } else {
            let _ = child.kill().await;
        }
        info!("DHCP server stopped");
    }

    /// Current allocation statistics.
    pub fn stats(&self) -> IpUsageStats {
        *self.stats.lock()
    }

    /// The last observed client set.
    pub fn clients(&self) -> Vec<DhcpClientInfo> {
        let mut clients: Vec<DhcpClientInfo> =
            self.previous_clients.lock().values().cloned().collect();
        clients.sort_by(|a, b| a.ip.cmp(&b.ip));
        clients
    }

    /// Supervision loop; returns after stopping the daemon on shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(SUPERVISE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            "DHCP supervisor started with interval {:?}",
            SUPERVISE_INTERVAL
        );
        loop {
            tokio::select! {
                _ = interval.tick() => self.supervise_tick().await,
                _ = shutdown_rx.recv() => {
                    info!("DHCP supervisor shutting down.");
                    self.stop().await;
                    return;
                }
            }
        }
    }

    /// One supervision pass: liveness, lease diff, binding drift, restart.
    async fn supervise_tick(&self) {
        let mut needs_restart = false;
        let mut reaped = false;
        {
            let mut guard = self.child.lock().await;
            match guard.as_mut() {
                None => needs_restart = true,
                Some(child) => match child.try_wait() {
                    Ok(Some(status)) => {
                        warn!("DHCP server exited with {status}");
                        reaped = true;
                        needs_restart = true;
                    }
                    Ok(None) => {
                        if let Some(pid) = child.id() {
                            // SAFETY: zero-signal liveness probe.
                            let alive =
                                unsafe { libc::kill(pid as libc::pid_t, 0) } == 0;
                            if !alive {
                                warn!("DHCP server process check failed for pid {pid}");
                                needs_restart = true;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("failed to poll DHCP server process: {e}");
                        needs_restart = true;
                    }
                },
            }
            if reaped {
                *guard = None;
            }
        }

        if !needs_restart {
            if let Err(e) = self.scan_leases().await {
                debug!("failed to scan lease file: {e}");
            }
            if self.bindings_changed() {
                info!("IP bindings changed, DHCP server restart required");
                needs_restart = true;
            }
        }

        if needs_restart {
            self.dump_log_tail().await;
            self.stop().await;
            if let Err(e) = self.render_config().await {
                error!("failed to re-render DHCP configuration: {e}");
                return;
            }
            if let Err(e) = self.ensure_lease_file().await {
                error!("failed to prepare DHCP lease file: {e}");
                return;
            }
            match self.spawn_daemon().await {
                Ok(()) => info!("DHCP server restarted"),
                Err(e) => error!("failed to restart DHCP server: {e}"),
            }
        }
    }

    /// Parses the lease file, emits add/delete events for the diff against
    /// the previous snapshot, and refreshes the usage statistics.
    async fn scan_leases(&self) -> Result<(), BmcLinkError> {
        let content = match tokio::fs::read_to_string(&self.paths.lease).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let new_clients = lease::by_ip(lease::parse_leases(&content));

        let (adds, deletes) = {
            let previous = self.previous_clients.lock();
            lease::diff_snapshots(&previous, &new_clients)
        };

        for client in adds {
            info!(
                "new or changed DHCP client detected - IP: {}, MAC: {}",
                client.ip, client.mac
            );
            if self.add_tx.send(client).await.is_err() {
                return Err(BmcLinkError::Dhcp("DHCP add channel closed".into()));
            }
        }
        for client in deletes {
            info!(
                "deleted DHCP client detected - IP: {}, MAC: {}",
                client.ip, client.mac
            );
            if self.delete_tx.send(client).await.is_err() {
                return Err(BmcLinkError::Dhcp("DHCP delete channel closed".into()));
            }
        }

        let used = new_clients.len() as u64;
        *self.previous_clients.lock() = new_clients;
        let mut stats = self.stats.lock();
        stats.used_ips = used;
        stats.available_ips = self.total_ips.saturating_sub(used);
        stats.usage_percentage = if self.total_ips > 0 {
            used as f64 / self.total_ips as f64 * 100.0
        } else {
            0.0
        };
        Ok(())
    }

    fn bindings_changed(&self) -> bool {
        self.desired_bindings() != *self.last_bound.lock()
    }

    /// Dumps the tail of the daemon log into the main log ahead of a
    /// restart, for diagnosis.
    async fn dump_log_tail(&self) {
        let Ok(content) = tokio::fs::read_to_string(&self.paths.log).await else {
            return;
        };
        let lines: Vec<&str> = content.lines().collect();
        let start = lines.len().saturating_sub(LOG_TAIL_LINES);
        for line in &lines[start..] {
            info!("dhcpd: {line}");
        }
    }
}
