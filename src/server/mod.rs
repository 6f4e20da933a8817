// src/server/mod.rs

//! Process bootstrap for the two roles: wires the store, spawns every
//! background task, and coordinates graceful shutdown.

mod context;
mod health;

pub use context::AgentContext;
pub use health::run_health_server;

use crate::api::store::{Collection, Store};
use crate::api::types::Resource;
use crate::config::{AgentConfig, ControllerConfig, ProcessFlags};
use crate::controller::ClusterAgentReconciler;
use crate::core::dhcp::{DhcpEventAdapter, DhcpPaths, DhcpServerManager};
use crate::core::events::EventLogger;
use crate::core::hostendpoint::HostEndpointReconciler;
use crate::core::hostoperation::HostOperationExecutor;
use crate::core::hoststatus::HostStatusController;
use crate::core::poller::HostStatusPoller;
use crate::core::reconcile::{ReconcileQueue, Reconciler, run_watch_feeder, run_worker};
use crate::core::secret::SecretReconciler;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::info;

/// Spawns the feeder + worker pair of one reconciler.
fn spawn_controller<T: Resource, R: Reconciler>(
    tasks: &mut JoinSet<()>,
    store: Arc<Store>,
    select: fn(&Store) -> &Collection<T>,
    reconciler: Arc<R>,
    shutdown_tx: &broadcast::Sender<()>,
) {
    let (queue, rx) = ReconcileQueue::new();
    let feeder_queue = queue.clone();
    let feeder_shutdown = shutdown_tx.subscribe();
    tasks.spawn(async move {
        run_watch_feeder(store, select, feeder_queue, feeder_shutdown).await;
    });
    let worker_shutdown = shutdown_tx.subscribe();
    tasks.spawn(async move {
        run_worker(reconciler, queue, rx, worker_shutdown).await;
    });
}

/// Runs the agent role until the process receives a termination signal.
/// The `ClusterAgent` record named by `CLUSTERAGENT_NAME` must already
/// exist in the store.
pub async fn run_agent(store: Arc<Store>, flags: &ProcessFlags) -> Result<()> {
    let config = AgentConfig::load(&store)?;
    let ctx = AgentContext::new(config, store);
    let mut tasks = JoinSet::new();
    spawn_agent_tasks(&ctx, flags, &mut tasks).await?;

    wait_for_signal().await;
    info!("shutdown signal received, stopping agent");
    let _ = ctx.shutdown_tx.send(());
    while tasks.join_next().await.is_some() {}
    info!("agent stopped");
    Ok(())
}

/// Writes the agent's TLS material (`tls.crt`, `tls.key`, `ca.crt` keys of
/// the default endpoint secret) to the fixed per-agent path when the
/// endpoint defaults use HTTPS. Secrets without TLS keys are skipped.
pub fn persist_tls_material(
    config: &AgentConfig,
    store: &Store,
) -> Result<(), crate::core::errors::BmcLinkError> {
    const TLS_KEYS: [&str; 3] = ["tls.crt", "tls.key", "ca.crt"];

    let endpoint = config.endpoint();
    if !endpoint.https || endpoint.secret_name.is_empty() {
        return Ok(());
    }
    let key = crate::api::store::namespaced_key(&endpoint.secret_namespace, &endpoint.secret_name);
    let Some(secret) = store.secrets.try_get(&key) else {
        return Ok(());
    };
    if !TLS_KEYS.iter().any(|k| secret.data.contains_key(*k)) {
        return Ok(());
    }

    let dir = config.tls_base_dir.join(&config.cluster_agent_name);
    std::fs::create_dir_all(&dir)?;
    for tls_key in TLS_KEYS {
        if let Some(value) = secret.data.get(tls_key) {
            std::fs::write(dir.join(tls_key), value.as_bytes())?;
        }
    }
    info!("persisted TLS material to {:?}", dir);
    Ok(())
}

/// Spawns every agent task into `tasks`. Also used by tests to run a full
/// agent against an injected context.
pub async fn spawn_agent_tasks(
    ctx: &AgentContext,
    flags: &ProcessFlags,
    tasks: &mut JoinSet<()>,
) -> Result<()> {
    let agent_name = ctx.config.cluster_agent_name.clone();
    let endpoint = ctx.config.endpoint();
    let (default_secret_name, default_secret_namespace) = ctx.config.default_secret_ref();
    info!("starting agent for cluster agent {agent_name}");

    persist_tls_material(&ctx.config, &ctx.store)?;

    // Event logger.
    let logger = EventLogger::new(&ctx.events);
    let logger_shutdown = ctx.shutdown_tx.subscribe();
    tasks.spawn(async move {
        logger.run(logger_shutdown).await;
    });

    // Health endpoint.
    let bind_address = flags.health_bind_address();
    let health_shutdown = ctx.shutdown_tx.subscribe();
    tasks.spawn(async move {
        run_health_server(bind_address, health_shutdown).await;
    });

    // HostStatus reconciler, shared with the poller and the secret
    // reconciler for probe fan-out.
    let host_status_controller = Arc::new(HostStatusController::new(
        Arc::clone(&ctx.store),
        Arc::clone(&ctx.cache),
        Arc::clone(&ctx.redfish),
        ctx.events.clone(),
        &agent_name,
        &default_secret_name,
        &default_secret_namespace,
        Arc::clone(&ctx.default_creds),
    ));
    spawn_controller(
        tasks,
        Arc::clone(&ctx.store),
        |s| &s.host_statuses,
        Arc::clone(&host_status_controller),
        &ctx.shutdown_tx,
    );

    // HostEndpoint reconciler.
    spawn_controller(
        tasks,
        Arc::clone(&ctx.store),
        |s| &s.host_endpoints,
        Arc::new(HostEndpointReconciler::new(
            Arc::clone(&ctx.store),
            &agent_name,
            endpoint.clone(),
        )),
        &ctx.shutdown_tx,
    );

    // Secret reconciler.
    spawn_controller(
        tasks,
        Arc::clone(&ctx.store),
        |s| &s.secrets,
        Arc::new(SecretReconciler::new(
            Arc::clone(&ctx.store),
            Arc::clone(&ctx.cache),
            Arc::clone(&host_status_controller),
            &default_secret_name,
            &default_secret_namespace,
            Arc::clone(&ctx.default_creds),
        )),
        &ctx.shutdown_tx,
    );

    // HostOperation executor.
    spawn_controller(
        tasks,
        Arc::clone(&ctx.store),
        |s| &s.host_operations,
        Arc::new(HostOperationExecutor::new(
            Arc::clone(&ctx.store),
            Arc::clone(&ctx.cache),
            Arc::clone(&ctx.redfish),
            &agent_name,
        )),
        &ctx.shutdown_tx,
    );

    // Periodic poller.
    let poller = HostStatusPoller::new(
        Arc::clone(&host_status_controller),
        Duration::from_secs(ctx.config.host_status_update_interval),
    );
    let poller_shutdown = ctx.shutdown_tx.subscribe();
    tasks.spawn(async move {
        poller.run(poller_shutdown).await;
    });

    // DHCP server and adapter, when the feature is enabled.
    let feature = ctx.config.feature();
    if feature.enable_dhcp_server {
        let dhcp_config = ctx
            .config
            .dhcp_config()
            .expect("validated at startup: dhcp config present when dhcp server is enabled");
        let paths = DhcpPaths::for_agent(&ctx.config.dhcp_base_dir, &agent_name);
        let (manager, add_rx, delete_rx) =
            DhcpServerManager::new(dhcp_config.clone(), paths, Arc::clone(&ctx.cache))?;
        manager.start().await?;

        let manager_shutdown = ctx.shutdown_tx.subscribe();
        tasks.spawn(async move {
            manager.run(manager_shutdown).await;
        });

        let adapter = DhcpEventAdapter::new(
            Arc::clone(&ctx.store),
            &agent_name,
            endpoint,
            dhcp_config,
        );
        let adapter_shutdown = ctx.shutdown_tx.subscribe();
        tasks.spawn(async move {
            adapter.run(add_rx, delete_rx, adapter_shutdown).await;
        });
    } else {
        info!("DHCP server feature is disabled for this agent");
    }

    Ok(())
}

/// Runs the controller role until the process receives a termination
/// signal.
pub async fn run_controller(store: Arc<Store>, flags: &ProcessFlags) -> Result<()> {
    let config = ControllerConfig::load()?;
    info!(
        "starting controller in namespace {} with agent image {}",
        config.pod_namespace, config.agent_image
    );
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut tasks = JoinSet::new();

    let bind_address = flags.health_bind_address();
    let health_shutdown = shutdown_tx.subscribe();
    tasks.spawn(async move {
        run_health_server(bind_address, health_shutdown).await;
    });

    spawn_controller(
        &mut tasks,
        Arc::clone(&store),
        |s| &s.cluster_agents,
        Arc::new(ClusterAgentReconciler::new(
            Arc::clone(&store),
            &config.agent_image,
        )),
        &shutdown_tx,
    );

    wait_for_signal().await;
    info!("shutdown signal received, stopping controller");
    let _ = shutdown_tx.send(());
    while tasks.join_next().await.is_some() {}
    info!("controller stopped");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = ctrl_c => {}
        _ = sigterm.recv() => {}
    }
}
