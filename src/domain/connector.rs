//! Connector status model
//!
//! A station exposes one or more EVSEs, each with one or more connectors.
//! The registry keys the latest observed status by
//! `(station, evseId, connectorId)`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// One StatusNotification, validated and normalized.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub evse_id: u32,
    pub connector_id: u32,
    pub connector_status: String,
    pub evse_status: Option<String>,
    pub connector_type: Option<String>,
    pub reason_code: Option<String>,
    pub vendor_id: Option<String>,
    pub vendor_description: Option<String>,
    /// Device-reported instant; defaults to the server reception instant.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Latest known state of one connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evse_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Detached copy of one station's connector map at a point in time.
/// Later registry updates never mutate a snapshot already handed out.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationSnapshot {
    pub station_id: String,
    /// Station-level status, set by boot and transaction transitions.
    pub status: String,
    pub updated_at: DateTime<Utc>,
    pub evses: BTreeMap<u32, BTreeMap<u32, ConnectorStatus>>,
}

impl StationSnapshot {
    pub fn connector(&self, evse_id: u32, connector_id: u32) -> Option<&ConnectorStatus> {
        self.evses.get(&evse_id).and_then(|c| c.get(&connector_id))
    }
}

/// Emitted by the registry for every accepted update.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub station_id: String,
    pub update: StatusUpdate,
    /// Zero-valued on the first observation of the key.
    pub previous: ConnectorStatus,
    pub current: ConnectorStatus,
    pub recorded_at: DateTime<Utc>,
    pub snapshot: StationSnapshot,
}
