// src/main.rs

//! The main entry point for the bmclink control plane.

use anyhow::Result;
use bmclink::api::store::Store;
use bmclink::api::types::{ClusterAgent, ObjectMeta};
use bmclink::config::{ENV_CLUSTERAGENT_NAME, ENV_LOG_LEVEL, ProcessFlags};
use bmclink::server;
use std::env;
use tracing::error;
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    // Define version information.
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    // Collect command-line arguments to decide the execution mode.
    let args: Vec<String> = env::args().collect();

    // Handle the --version flag.
    if args.contains(&"--version".to_string()) {
        println!("bmclink version {VERSION}");
        return Ok(());
    }

    let flags = match ProcessFlags::parse(&args[1..]) {
        Ok(flags) => flags,
        Err(e) => {
            eprintln!("{e}");
            eprintln!(
                "Usage: bmclink [--controller] [--health-port N] \
                 [--health-probe-bind-address ADDR] [--metrics-bind-address ADDR] \
                 [--webhook-port N] [--leader-elect]"
            );
            std::process::exit(1);
        }
    };

    // Logging: level from RUST_LOG or LOG_LEVEL, compact single-line
    // format with ANSI colors.
    let log_level = env::var("RUST_LOG")
        .or_else(|_| env::var(ENV_LOG_LEVEL))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .compact()
        .with_ansi(true)
        .init();

    // The record store this process serves. Embedding deployments hand the
    // agent a store that already carries the cluster's records; the
    // stand-alone binary starts from its own.
    let store = Store::shared();

    if flags.controller {
        if let Err(e) = server::run_controller(store, &flags).await {
            error!("Controller runtime error: {}", e);
            return Err(e);
        }
    } else {
        // A stand-alone agent seeds a default ClusterAgent record for its
        // own name; a controller-rendered deployment creates it beforehand.
        if let Ok(agent_name) = env::var(ENV_CLUSTERAGENT_NAME) {
            if store.cluster_agents.try_get(&agent_name).is_none() {
                let _ = store.cluster_agents.create(ClusterAgent {
                    metadata: ObjectMeta::named(agent_name.as_str()),
                    ..Default::default()
                });
            }
        }
        if let Err(e) = server::run_agent(store, &flags).await {
            error!("Agent runtime error: {}", e);
            return Err(e);
        }
    }

    Ok(())
}
