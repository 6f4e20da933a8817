// src/core/poller.rs

//! Periodic poller: at a fixed cadence, refreshes health, inventory, and
//! log summary of every cached host.

use crate::core::hoststatus::HostStatusController;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Background task that walks the host cache on an interval.
pub struct HostStatusPoller {
    controller: Arc<HostStatusController>,
    interval: Duration,
}

impl HostStatusPoller {
    pub fn new(controller: Arc<HostStatusController>, interval: Duration) -> Self {
        HostStatusPoller {
            controller,
            interval,
        }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "begin to update all HostStatus at interval of {:?}",
            self.interval
        );
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately; the first
        // inventory pass already ran through the reconciler.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    debug!("updating all HostStatus at interval");
                    self.controller.probe_all().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("HostStatus poller shutting down.");
                    return;
                }
            }
        }
    }
}
