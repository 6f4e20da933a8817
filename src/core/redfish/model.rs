// src/core/redfish/model.rs

//! Serde models for the subset of the Redfish JSON the agent reads.
//! Every field is optional on the wire; absent values render as empty
//! strings in the inventory map.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ODataRef {
    #[serde(rename = "@odata.id", default)]
    pub id: String,
}

/// A Redfish resource collection (`Members` of `@odata.id` links).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ResourceCollection {
    #[serde(rename = "Members", default)]
    pub members: Vec<ODataRef>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServiceRoot {
    #[serde(rename = "RedfishVersion", default)]
    pub redfish_version: String,
    #[serde(rename = "Vendor", default)]
    pub vendor: String,
    #[serde(rename = "Systems")]
    pub systems: Option<ODataRef>,
    #[serde(rename = "Managers")]
    pub managers: Option<ODataRef>,
    #[serde(rename = "Chassis")]
    pub chassis: Option<ODataRef>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Status {
    #[serde(rename = "Health", default)]
    pub health: String,
    #[serde(rename = "State", default)]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MemorySummary {
    #[serde(rename = "TotalSystemMemoryGiB")]
    pub total_system_memory_gib: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProcessorSummary {
    #[serde(rename = "Count")]
    pub count: Option<i64>,
    #[serde(rename = "LogicalProcessorCount")]
    pub logical_processor_count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ComputerSystem {
    #[serde(rename = "BiosVersion", default)]
    pub bios_version: String,
    #[serde(rename = "HostName", default)]
    pub host_name: String,
    #[serde(rename = "Manufacturer", default)]
    pub manufacturer: String,
    #[serde(rename = "PowerState", default)]
    pub power_state: String,
    #[serde(rename = "MemorySummary")]
    pub memory_summary: Option<MemorySummary>,
    #[serde(rename = "ProcessorSummary")]
    pub processor_summary: Option<ProcessorSummary>,
    #[serde(rename = "Status")]
    pub status: Option<Status>,
    #[serde(rename = "Memory")]
    pub memory: Option<ODataRef>,
    #[serde(rename = "Processors")]
    pub processors: Option<ODataRef>,
    #[serde(rename = "SimpleStorage")]
    pub simple_storage: Option<ODataRef>,
    #[serde(rename = "LogServices")]
    pub log_services: Option<ODataRef>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Manager {
    #[serde(rename = "FirmwareVersion", default)]
    pub firmware_version: String,
    #[serde(rename = "Status")]
    pub status: Option<Status>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Chassis {
    #[serde(rename = "PCIeDevices")]
    pub pcie_devices: Option<ODataRef>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LogService {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Status")]
    pub status: Option<Status>,
    #[serde(rename = "Entries")]
    pub entries: Option<ODataRef>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LogEntry {
    #[serde(rename = "Created", default)]
    pub created: String,
    #[serde(rename = "Severity", default)]
    pub severity: String,
    #[serde(rename = "Message", default)]
    pub message: String,
    #[serde(rename = "OemSensorType", default)]
    pub oem_sensor_type: String,
}
