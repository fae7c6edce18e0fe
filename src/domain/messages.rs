//! Typed payloads for the handled OCPP actions
//!
//! The gateway speaks a trimmed message subset; fields outside it are
//! ignored on decode. BootNotification accepts both the 1.6 flat shape and
//! the 2.0 nested `chargingStation` object, since both station generations
//! connect to the same endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connector status values (subset of the OCPP enums; the registry treats
/// the status as a free-form string).
pub mod status {
    pub const AVAILABLE: &str = "Available";
    pub const OCCUPIED: &str = "Occupied";
    pub const CHARGING: &str = "Charging";
    pub const FAULTED: &str = "Faulted";
    pub const UNAVAILABLE: &str = "Unavailable";
}

/// Registration status returned in BootNotification responses.
pub const REGISTRATION_ACCEPTED: &str = "Accepted";

// ── BootNotification ───────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationRequest {
    // OCPP 1.6 flat shape
    #[serde(default)]
    pub charge_point_vendor: Option<String>,
    #[serde(default)]
    pub charge_point_model: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    // OCPP 2.0 nested shape
    #[serde(default)]
    pub charging_station: Option<ChargingStationInfo>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingStationInfo {
    #[serde(default)]
    pub vendor_name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
}

impl BootNotificationRequest {
    pub fn vendor(&self) -> String {
        self.charge_point_vendor
            .clone()
            .or_else(|| {
                self.charging_station
                    .as_ref()
                    .and_then(|cs| cs.vendor_name.clone())
            })
            .unwrap_or_default()
    }

    /// Model name; the 2.0 serial number is folded in when present.
    pub fn model(&self) -> String {
        if let Some(model) = &self.charge_point_model {
            return model.clone();
        }
        let Some(cs) = &self.charging_station else {
            return String::new();
        };
        let model = cs.model.clone().unwrap_or_default();
        match cs.serial_number.as_deref() {
            Some(serial) if !serial.is_empty() => format!("{} (S/N {})", model, serial),
            _ => model,
        }
    }

    pub fn firmware(&self) -> String {
        self.firmware_version
            .clone()
            .or_else(|| {
                self.charging_station
                    .as_ref()
                    .and_then(|cs| cs.firmware_version.clone())
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationResponse {
    pub current_time: DateTime<Utc>,
    pub interval: u32,
    pub status: String,
}

// ── Heartbeat ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub current_time: DateTime<Utc>,
}

// ── StatusNotification ─────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusNotificationRequest {
    #[serde(default)]
    pub evse_id: Option<i64>,
    #[serde(default)]
    pub connector_id: Option<i64>,
    #[serde(default)]
    pub connector_status: Option<String>,
    #[serde(default)]
    pub evse_status: Option<String>,
    #[serde(default)]
    pub connector_type: Option<String>,
    #[serde(default)]
    pub reason_code: Option<String>,
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub vendor_description: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

// ── StartTransaction / StopTransaction ─────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTransactionRequest {
    #[serde(default)]
    pub connector_id: i64,
    #[serde(default)]
    pub id_tag: String,
    #[serde(default)]
    pub meter_start: i64,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTransactionResponse {
    pub transaction_id: String,
    pub id_tag_info: IdTagInfo,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdTagInfo {
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTransactionRequest {
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub meter_stop: i64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

// ── MeterValues ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterValuesRequest {
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub connector_id: i64,
    #[serde(default)]
    pub meter_value: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}
