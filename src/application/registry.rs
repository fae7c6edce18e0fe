//! In-memory connector status registry
//!
//! Tracks the latest status per `(station, evseId, connectorId)` and emits a
//! change event for every accepted update. Snapshots handed to callers are
//! deep copies; later updates never reach into them.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::connector::{ConnectorStatus, StationSnapshot, StatusEvent, StatusUpdate};

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("station id is required")]
    MissingStationId,
    #[error("evse id must be positive")]
    InvalidEvseId,
    #[error("connector id must be positive")]
    InvalidConnectorId,
    #[error("connector status is required")]
    MissingStatus,
}

struct StationState {
    status: String,
    updated_at: DateTime<Utc>,
    evses: BTreeMap<u32, BTreeMap<u32, ConnectorStatus>>,
}

impl StationState {
    fn snapshot(&self, station_id: &str) -> StationSnapshot {
        StationSnapshot {
            station_id: station_id.to_string(),
            status: self.status.clone(),
            updated_at: self.updated_at,
            evses: self.evses.clone(),
        }
    }
}

/// Registry of connector statuses for the whole fleet. Entries are never
/// deleted; a station that disappears keeps its last known state.
pub struct StatusRegistry {
    stations: DashMap<String, StationState>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self {
            stations: DashMap::new(),
        }
    }

    /// Record a status update and return the change event. Events for one
    /// key are produced in `recorded_at` order because the station entry is
    /// exclusively locked for the duration of the update.
    pub fn update(
        &self,
        station_id: &str,
        mut update: StatusUpdate,
        recorded_at: DateTime<Utc>,
    ) -> Result<StatusEvent, RegistryError> {
        if station_id.is_empty() {
            return Err(RegistryError::MissingStationId);
        }
        if update.evse_id == 0 {
            return Err(RegistryError::InvalidEvseId);
        }
        if update.connector_id == 0 {
            return Err(RegistryError::InvalidConnectorId);
        }
        if update.connector_status.trim().is_empty() {
            return Err(RegistryError::MissingStatus);
        }
        if update.timestamp.is_none() {
            update.timestamp = Some(recorded_at);
        }

        let mut state = self
            .stations
            .entry(station_id.to_string())
            .or_insert_with(|| StationState {
                status: String::new(),
                updated_at: recorded_at,
                evses: BTreeMap::new(),
            });

        let connectors = state.evses.entry(update.evse_id).or_default();
        let previous = connectors.get(&update.connector_id).cloned().unwrap_or_default();

        let current = ConnectorStatus {
            status: update.connector_status.clone(),
            evse_status: update.evse_status.clone(),
            connector_type: update.connector_type.clone(),
            reason_code: update.reason_code.clone(),
            vendor_id: update.vendor_id.clone(),
            vendor_description: update.vendor_description.clone(),
            status_timestamp: update.timestamp,
            updated_at: Some(recorded_at),
        };
        connectors.insert(update.connector_id, current.clone());
        state.updated_at = recorded_at;

        let snapshot = state.snapshot(station_id);
        drop(state);

        Ok(StatusEvent {
            station_id: station_id.to_string(),
            update,
            previous,
            current,
            recorded_at,
            snapshot,
        })
    }

    /// Record the station-level status (boot and transaction transitions).
    pub fn set_station_status(&self, station_id: &str, status: &str, recorded_at: DateTime<Utc>) {
        if station_id.is_empty() || status.is_empty() {
            return;
        }
        let mut state = self
            .stations
            .entry(station_id.to_string())
            .or_insert_with(|| StationState {
                status: String::new(),
                updated_at: recorded_at,
                evses: BTreeMap::new(),
            });
        state.status = status.to_string();
        state.updated_at = recorded_at;
    }

    /// Detached copy of the station's state, or `None` for an unknown
    /// station.
    pub fn snapshot(&self, station_id: &str) -> Option<StationSnapshot> {
        self.stations
            .get(station_id)
            .map(|state| state.snapshot(station_id))
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }
}

impl Default for StatusRegistry {
    fn default() -> Self {
        Self::new()
    }
}
