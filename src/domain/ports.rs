//! Persistence ports
//!
//! Relational storage is an external collaborator; the gateway only knows
//! these interfaces. Failures behind them must never take down an OCPP
//! exchange, so callers treat every method as best-effort.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Station metadata captured from a BootNotification.
#[derive(Debug, Clone)]
pub struct StationBootInfo {
    pub station_id: String,
    pub vendor: String,
    pub model: String,
    pub firmware_version: String,
    pub reason: String,
    pub booted_at: DateTime<Utc>,
}

/// Connector status row mirrored from the in-memory registry.
#[derive(Debug, Clone)]
pub struct ConnectorStatusRecord {
    pub station_id: String,
    pub evse_id: u32,
    pub connector_id: u32,
    pub connector_status: String,
    pub evse_status: Option<String>,
    pub connector_type: Option<String>,
    pub reason_code: Option<String>,
    pub vendor_id: Option<String>,
    pub vendor_description: Option<String>,
    pub status_timestamp: Option<DateTime<Utc>>,
    pub recorded_at: DateTime<Utc>,
}

/// Station persistence operations used by the handlers.
#[async_trait]
pub trait StationRepository: Send + Sync {
    async fn upsert_boot(&self, info: StationBootInfo) -> Result<(), PersistenceError>;
    async fn update_last_seen(
        &self,
        station_id: &str,
        seen_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError>;
    async fn upsert_connector_status(
        &self,
        record: ConnectorStatusRecord,
    ) -> Result<(), PersistenceError>;
}

/// Raw OCPP message audit log.
#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn save(
        &self,
        station_id: &str,
        direction: Direction,
        action: &str,
        raw: &str,
    ) -> Result<(), PersistenceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("persistence error: {0}")]
pub struct PersistenceError(pub String);
