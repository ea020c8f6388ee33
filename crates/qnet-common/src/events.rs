//! Event payloads posted into an evaluator instance.
//!
//! These are the in-process notification contracts of the collaborators the
//! decision core sits beside: telephony state, Wi-Fi availability, data
//! connection lifecycle, IMS registration and provisioning updates.

use serde::{Deserialize, Serialize};

use crate::types::{AccessNetwork, Coverage, TransportType};

/// Snapshot of cellular serving state, pushed on every telephony change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelephonyInfo {
    pub cellular_available: bool,
    /// Serving RAN; `Unknown` while out of service.
    pub access_network: AccessNetwork,
    pub coverage: Coverage,
    /// Whether the serving cell advertises voice-over-packet-switched
    /// support (relevant to EUTRAN/NGRAN voice qualification).
    pub vops_supported: bool,
}

impl Default for TelephonyInfo {
    fn default() -> Self {
        TelephonyInfo {
            cellular_available: false,
            access_network: AccessNetwork::Unknown,
            coverage: Coverage::Home,
            vops_supported: true,
        }
    }
}

/// Wi-Fi availability as seen by the IWLAN network layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IwlanStatus {
    pub available: bool,
    /// Set when availability flipped because the device moved to a different
    /// access point; releases AP-scoped restrictions.
    pub ap_changed: bool,
}

/// Data connection lifecycle, per (slot, capability).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataConnectionEvent {
    Started,
    Connected,
    Disconnected,
    Failed,
    HandoverStarted,
    HandoverSuccess,
    HandoverFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataConnectionChangedInfo {
    pub event: DataConnectionEvent,
    /// Transport the event happened on (the target side for handover
    /// events).
    pub transport: TransportType,
    /// APN the connection was set up with, when known.
    pub apn: Option<String>,
}

/// IMS registration state relevant to Wi-Fi-calling gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImsRegistrationEvent {
    Unregistered,
    AccessNetworkChangeFailed,
    Registered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImsRegistrationInfo {
    pub event: ImsRegistrationEvent,
    pub transport: TransportType,
}

/// Carrier-provisioned threshold overrides. `None` leaves the configured
/// value untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningInfo {
    /// LTE RSRP good threshold (dBm).
    pub lte_threshold_1: Option<i32>,
    /// LTE RSRP bad threshold (dBm).
    pub lte_threshold_2: Option<i32>,
    /// LTE RSRP worst threshold (dBm).
    pub lte_threshold_3: Option<i32>,
    /// Wi-Fi RSSI good threshold (dBm).
    pub wifi_threshold_a: Option<i32>,
    /// Wi-Fi RSSI bad threshold (dBm).
    pub wifi_threshold_b: Option<i32>,
    /// ePDG connection wait time over LTE, seconds.
    pub lte_epdg_timer_sec: Option<i32>,
    /// ePDG connection wait time over Wi-Fi, seconds.
    pub wifi_epdg_timer_sec: Option<i32>,
}

impl ProvisioningInfo {
    pub fn is_empty(&self) -> bool {
        *self == ProvisioningInfo::default()
    }
}
