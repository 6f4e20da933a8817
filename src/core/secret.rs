// src/core/secret.rs

//! Reconciles credential secrets: refreshes the in-memory agent default,
//! rewrites cached credentials, and probes every affected host once with
//! the new credential.

use crate::api::store::Store;
use crate::api::types::{SECRET_KEY_PASSWORD, SECRET_KEY_USERNAME};
use crate::core::cache::HostCache;
use crate::core::errors::BmcLinkError;
use crate::core::hoststatus::{DefaultCreds, HostStatusController};
use crate::core::reconcile::{ReconcileOutcome, Reconciler};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct SecretReconciler {
    store: Arc<Store>,
    cache: Arc<HostCache>,
    controller: Arc<HostStatusController>,
    default_secret_name: String,
    default_secret_namespace: String,
    default_creds: DefaultCreds,
}

impl SecretReconciler {
    pub fn new(
        store: Arc<Store>,
        cache: Arc<HostCache>,
        controller: Arc<HostStatusController>,
        default_secret_name: &str,
        default_secret_namespace: &str,
        default_creds: DefaultCreds,
    ) -> Self {
        SecretReconciler {
            store,
            cache,
            controller,
            default_secret_name: default_secret_name.to_string(),
            default_secret_namespace: default_secret_namespace.to_string(),
            default_creds,
        }
    }
}

#[async_trait]
impl Reconciler for SecretReconciler {
    fn name(&self) -> &'static str {
        "SecretReconciler"
    }

    async fn reconcile(&self, key: &str) -> Result<ReconcileOutcome, BmcLinkError> {
        let Some(secret) = self.store.secrets.try_get(key) else {
            debug!("Secret {key} not found, ignoring");
            return Ok(ReconcileOutcome::Done);
        };

        let username = secret.key_or_empty(SECRET_KEY_USERNAME);
        let password = secret.key_or_empty(SECRET_KEY_PASSWORD);
        let name = secret.metadata.name.clone();
        let namespace = secret.metadata.namespace.clone().unwrap_or_default();
        debug!("retrieved new secret data for {namespace}/{name}");

        if name == self.default_secret_name && namespace == self.default_secret_namespace {
            info!("agent default credential secret {namespace}/{name} changed");
            *self.default_creds.write() = (username.clone(), password.clone());
        }

        let affected = self
            .cache
            .update_secret_creds(&name, &namespace, &username, &password);
        if !affected.is_empty() {
            info!(
                "secret {}/{} rotation affects {} host(s)",
                namespace,
                name,
                affected.len()
            );
        }
        for host in affected {
            if let Err(e) = self.controller.probe_host(&host).await {
                error!("failed to probe {host} after secret rotation: {e}");
            }
        }

        Ok(ReconcileOutcome::Done)
    }
}
