// src/core/redfish/http.rs

//! HTTP implementation of [`RedfishApi`] over `reqwest`. BMCs almost
//! universally present self-signed certificates, so TLS verification is
//! disabled by policy; authentication is HTTP basic per request.

use super::model::{
    Chassis, ComputerSystem, LogEntry, LogService, Manager, ResourceCollection, ServiceRoot,
};
use super::{BmcLogEntry, RedfishApi, ResetType};
use crate::core::cache::HostConnectEntry;
use crate::core::errors::BmcLinkError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Per-call deadline; a BMC that does not answer within this window counts
/// as unreachable for the current probe.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const SERVICE_ROOT_PATH: &str = "/redfish/v1";

pub struct HttpRedfish {
    base: Url,
    client: reqwest::Client,
    username: String,
    password: String,
}

impl HttpRedfish {
    /// Builds a client from a cache entry: `http(s)://<ip>:<port>` with the
    /// entry's credentials.
    pub fn from_entry(entry: &HostConnectEntry) -> Result<Self, BmcLinkError> {
        let protocol = if entry.info.https { "https" } else { "http" };
        let base = Url::parse(&format!(
            "{}://{}:{}",
            protocol, entry.info.ip_addr, entry.info.port
        ))?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(HttpRedfish {
            base,
            client,
            username: entry.username.clone(),
            password: entry.password.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder, BmcLinkError> {
        let url = self.base.join(path)?;
        let mut req = self.client.request(method, url);
        if !self.username.is_empty() || !self.password.is_empty() {
            req = req.basic_auth(&self.username, Some(&self.password));
        }
        Ok(req)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BmcLinkError> {
        let resp = self.request(reqwest::Method::GET, path)?.send().await?;
        let resp = resp.error_for_status()?;
        Ok(resp.json::<T>().await?)
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<(), BmcLinkError> {
        let resp = self
            .request(reqwest::Method::POST, path)?
            .json(&body)
            .send()
            .await?;
        resp.error_for_status()?;
        Ok(())
    }

    async fn patch_json(&self, path: &str, body: serde_json::Value) -> Result<(), BmcLinkError> {
        let resp = self
            .request(reqwest::Method::PATCH, path)?
            .json(&body)
            .send()
            .await?;
        resp.error_for_status()?;
        Ok(())
    }

    async fn collection_members<T: DeserializeOwned>(
        &self,
        collection_path: &str,
    ) -> Result<Vec<(String, T)>, BmcLinkError> {
        let collection: ResourceCollection = self.get_json(collection_path).await?;
        let mut members = Vec::with_capacity(collection.members.len());
        for member in collection.members {
            let item: T = self.get_json(&member.id).await?;
            members.push((member.id, item));
        }
        Ok(members)
    }

    /// The first computer system of the service, with its path. Bare-metal
    /// BMCs expose exactly one.
    async fn first_system(&self) -> Result<(String, ComputerSystem), BmcLinkError> {
        let root: ServiceRoot = self.get_json(SERVICE_ROOT_PATH).await?;
        let systems_path = root
            .systems
            .ok_or_else(|| BmcLinkError::Redfish("service root has no Systems".into()))?
            .id;
        let systems: Vec<(String, ComputerSystem)> = self.collection_members(&systems_path).await?;
        systems
            .into_iter()
            .next()
            .ok_or_else(|| BmcLinkError::Redfish("failed to get system".into()))
    }

    async fn member_count(&self, path: &Option<super::model::ODataRef>) -> Option<usize> {
        let path = path.as_ref()?;
        match self.get_json::<ResourceCollection>(&path.id).await {
            Ok(c) => Some(c.members.len()),
            Err(e) => {
                debug!("optional inventory collection {} unavailable: {}", path.id, e);
                None
            }
        }
    }
}

fn set_data(result: &mut BTreeMap<String, String>, key: &str, value: String) {
    result.insert(key.to_string(), value);
}

#[async_trait]
impl RedfishApi for HttpRedfish {
    async fn health(&self) -> bool {
        self.get_json::<ServiceRoot>(SERVICE_ROOT_PATH).await.is_ok()
    }

    async fn get_info(&self) -> Result<BTreeMap<String, String>, BmcLinkError> {
        let mut result = BTreeMap::new();

        let root: ServiceRoot = self.get_json(SERVICE_ROOT_PATH).await?;
        set_data(&mut result, "RedfishVersion", root.redfish_version.clone());
        set_data(&mut result, "Vendor", root.vendor.clone());

        let (_, system) = self.first_system().await?;
        set_data(&mut result, "BiosVersion", system.bios_version.clone());
        set_data(&mut result, "HostName", system.host_name.clone());
        set_data(&mut result, "Manufacturer", system.manufacturer.clone());
        set_data(&mut result, "PowerState", system.power_state.clone());
        let memory_gib = system
            .memory_summary
            .as_ref()
            .and_then(|m| m.total_system_memory_gib)
            .map(|g| format!("{g}"))
            .unwrap_or_default();
        set_data(&mut result, "MemoryTotalGiB", memory_gib);
        let (physical, logical) = system
            .processor_summary
            .as_ref()
            .map(|p| (p.count, p.logical_processor_count))
            .unwrap_or((None, None));
        set_data(
            &mut result,
            "CpuPhysicalCore",
            physical.map(|c| c.to_string()).unwrap_or_default(),
        );
        set_data(
            &mut result,
            "CpuLogicalCore",
            logical.map(|c| c.to_string()).unwrap_or_default(),
        );
        set_data(
            &mut result,
            "SystemStatus",
            system.status.as_ref().map(|s| s.health.clone()).unwrap_or_default(),
        );

        // Optional inventory collections; older firmware omits them.
        if let Some(count) = self.member_count(&system.memory).await {
            set_data(&mut result, "MemoryModuleCount", count.to_string());
        }
        if let Some(count) = self.member_count(&system.processors).await {
            set_data(&mut result, "ProcessorCount", count.to_string());
        }
        if let Some(count) = self.member_count(&system.simple_storage).await {
            set_data(&mut result, "SimpleStorageCount", count.to_string());
        }
        if let Some(chassis_path) = root.chassis.as_ref() {
            let chassis: Vec<(String, Chassis)> =
                self.collection_members(&chassis_path.id).await.unwrap_or_default();
            let mut pcie_total = 0usize;
            let mut seen = false;
            for (_, c) in &chassis {
                if let Some(count) = self.member_count(&c.pcie_devices).await {
                    pcie_total += count;
                    seen = true;
                }
            }
            if seen {
                set_data(&mut result, "PcieDeviceCount", pcie_total.to_string());
            }
        }

        let managers_path = root
            .managers
            .ok_or_else(|| BmcLinkError::Redfish("service root has no Managers".into()))?
            .id;
        let managers: Vec<(String, Manager)> = self.collection_members(&managers_path).await?;
        let (_, bmc) = managers
            .into_iter()
            .next()
            .ok_or_else(|| BmcLinkError::Redfish("failed to get bmc".into()))?;
        set_data(&mut result, "BmcFirmwareVersion", bmc.firmware_version.clone());
        set_data(
            &mut result,
            "BmcStatus",
            bmc.status.as_ref().map(|s| s.health.clone()).unwrap_or_default(),
        );

        Ok(result)
    }

    async fn get_log(&self) -> Result<Vec<BmcLogEntry>, BmcLinkError> {
        let (system_path, _) = self.first_system().await?;
        let system: ComputerSystem = self.get_json(&system_path).await?;
        let Some(log_services) = system.log_services else {
            return Ok(Vec::new());
        };

        let services: Vec<(String, LogService)> =
            self.collection_members(&log_services.id).await?;
        let mut result = Vec::new();
        for (_, service) in services {
            let enabled = service
                .status
                .as_ref()
                .map(|s| s.state == "Enabled")
                .unwrap_or(false);
            if !enabled {
                debug!("log service {} is disabled", service.name);
                continue;
            }
            let Some(entries_path) = service.entries else {
                continue;
            };
            let entries: Vec<(String, LogEntry)> =
                self.collection_members(&entries_path.id).await?;
            result.extend(entries.into_iter().map(|(_, e)| BmcLogEntry {
                created: e.created,
                severity: e.severity,
                oem_sensor_type: e.oem_sensor_type,
                message: e.message,
            }));
        }
        Ok(result)
    }

    async fn reset(&self, reset_type: ResetType) -> Result<(), BmcLinkError> {
        let (system_path, _) = self.first_system().await?;
        let action_path = format!("{system_path}/Actions/ComputerSystem.Reset");
        self.post_json(
            &action_path,
            serde_json::json!({ "ResetType": reset_type.to_string() }),
        )
        .await
    }

    async fn set_boot_pxe_once(&self) -> Result<(), BmcLinkError> {
        let (system_path, _) = self.first_system().await?;
        self.patch_json(
            &system_path,
            serde_json::json!({
                "Boot": {
                    "BootSourceOverrideTarget": "Pxe",
                    "BootSourceOverrideEnabled": "Once"
                }
            }),
        )
        .await
    }
}
