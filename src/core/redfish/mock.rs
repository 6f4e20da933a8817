// src/core/redfish/mock.rs

//! Scriptable in-memory Redfish backend. Tests wire it through
//! [`super::RedfishClientCache::with_factory`] to drive probes and power
//! operations without a BMC on the wire.

use super::{BmcLogEntry, RedfishApi, ResetType};
use crate::core::errors::BmcLinkError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// One recorded call against the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Reset(ResetType),
    SetBootPxeOnce,
}

#[derive(Default)]
pub struct MockRedfish {
    healthy: AtomicBool,
    info: Mutex<BTreeMap<String, String>>,
    log: Mutex<Vec<BmcLogEntry>>,
    calls: Mutex<Vec<MockCall>>,
    probes: AtomicUsize,
    fail_reset: Mutex<Option<String>>,
}

impl MockRedfish {
    pub fn healthy_with_info(info: BTreeMap<String, String>) -> Arc<Self> {
        let mock = Arc::new(MockRedfish::default());
        mock.set_healthy(true);
        mock.set_info(info);
        mock
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(MockRedfish::default())
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_info(&self, info: BTreeMap<String, String>) {
        *self.info.lock() = info;
    }

    pub fn set_log(&self, entries: Vec<BmcLogEntry>) {
        *self.log.lock() = entries;
    }

    /// Makes every subsequent reset fail with the given message.
    pub fn fail_resets_with(&self, message: &str) {
        *self.fail_reset.lock() = Some(message.to_string());
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// How many health checks have run against this backend.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RedfishApi for MockRedfish {
    async fn health(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.healthy.load(Ordering::SeqCst)
    }

    async fn get_info(&self) -> Result<BTreeMap<String, String>, BmcLinkError> {
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(BmcLinkError::Redfish("mock BMC unreachable".into()));
        }
        Ok(self.info.lock().clone())
    }

    async fn get_log(&self) -> Result<Vec<BmcLogEntry>, BmcLinkError> {
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(BmcLinkError::Redfish("mock BMC unreachable".into()));
        }
        Ok(self.log.lock().clone())
    }

    async fn reset(&self, reset_type: ResetType) -> Result<(), BmcLinkError> {
        if let Some(message) = self.fail_reset.lock().clone() {
            return Err(BmcLinkError::Redfish(message));
        }
        self.calls.lock().push(MockCall::Reset(reset_type));
        Ok(())
    }

    async fn set_boot_pxe_once(&self) -> Result<(), BmcLinkError> {
        self.calls.lock().push(MockCall::SetBootPxeOnce);
        Ok(())
    }
}
