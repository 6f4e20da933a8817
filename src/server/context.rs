// src/server/context.rs

//! The shared context every agent task hangs off: configuration, the store
//! handle, the host cache, the Redfish client cache, the event bus, and the
//! shutdown broadcast.

use crate::api::store::Store;
use crate::config::AgentConfig;
use crate::core::cache::HostCache;
use crate::core::events::EventBus;
use crate::core::hoststatus::DefaultCreds;
use crate::core::redfish::RedfishClientCache;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct AgentContext {
    pub config: AgentConfig,
    pub store: Arc<Store>,
    pub cache: Arc<HostCache>,
    pub redfish: Arc<RedfishClientCache>,
    pub events: EventBus,
    pub default_creds: DefaultCreds,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AgentContext {
    /// Assembles the context with the production Redfish backend.
    pub fn new(config: AgentConfig, store: Arc<Store>) -> Self {
        Self::with_redfish(config, store, Arc::new(RedfishClientCache::new_http()))
    }

    /// Assembles the context with an injected Redfish backend; tests wire a
    /// mock factory through here.
    pub fn with_redfish(
        config: AgentConfig,
        store: Arc<Store>,
        redfish: Arc<RedfishClientCache>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let default_creds: DefaultCreds = Arc::new(RwLock::new((
            config.username.clone(),
            config.password.clone(),
        )));
        AgentContext {
            config,
            store,
            cache: Arc::new(HostCache::new()),
            redfish,
            events: EventBus::new(),
            default_creds,
            shutdown_tx,
        }
    }
}
