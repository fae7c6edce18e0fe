//! In-memory persistence adapters
//!
//! Relational storage lives in a sibling service; the gateway ships these
//! adapters so it runs standalone and the handlers stay testable. A real
//! deployment substitutes implementations backed by that service's store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::domain::ports::{
    ConnectorStatusRecord, Direction, MessageLog, PersistenceError, StationBootInfo,
    StationRepository,
};

pub struct InMemoryStationRepository {
    boots: DashMap<String, StationBootInfo>,
    last_seen: DashMap<String, DateTime<Utc>>,
    connector_rows: DashMap<(String, u32, u32), ConnectorStatusRecord>,
    fail_all: bool,
}

impl InMemoryStationRepository {
    pub fn new() -> Self {
        Self {
            boots: DashMap::new(),
            last_seen: DashMap::new(),
            connector_rows: DashMap::new(),
            fail_all: false,
        }
    }

    /// Adapter that refuses every write, for exercising the best-effort
    /// persistence paths.
    #[cfg(test)]
    pub fn failing() -> Self {
        Self {
            boots: DashMap::new(),
            last_seen: DashMap::new(),
            connector_rows: DashMap::new(),
            fail_all: true,
        }
    }

    pub fn boot_info(&self, station_id: &str) -> Option<StationBootInfo> {
        self.boots.get(station_id).map(|b| b.clone())
    }

    pub fn last_seen(&self, station_id: &str) -> Option<DateTime<Utc>> {
        self.last_seen.get(station_id).map(|t| *t)
    }

    pub fn connector_record(
        &self,
        station_id: &str,
        evse_id: u32,
        connector_id: u32,
    ) -> Option<ConnectorStatusRecord> {
        self.connector_rows
            .get(&(station_id.to_string(), evse_id, connector_id))
            .map(|r| r.clone())
    }

    fn check(&self) -> Result<(), PersistenceError> {
        if self.fail_all {
            return Err(PersistenceError("storage unavailable".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryStationRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StationRepository for InMemoryStationRepository {
    async fn upsert_boot(&self, info: StationBootInfo) -> Result<(), PersistenceError> {
        self.check()?;
        self.last_seen.insert(info.station_id.clone(), info.booted_at);
        self.boots.insert(info.station_id.clone(), info);
        Ok(())
    }

    async fn update_last_seen(
        &self,
        station_id: &str,
        seen_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        self.check()?;
        self.last_seen.insert(station_id.to_string(), seen_at);
        Ok(())
    }

    async fn upsert_connector_status(
        &self,
        record: ConnectorStatusRecord,
    ) -> Result<(), PersistenceError> {
        self.check()?;
        let key = (record.station_id.clone(), record.evse_id, record.connector_id);
        self.connector_rows.insert(key, record);
        Ok(())
    }
}

/// Message log adapter that writes the audit trail to the tracing pipeline.
pub struct TracingMessageLog;

#[async_trait]
impl MessageLog for TracingMessageLog {
    async fn save(
        &self,
        station_id: &str,
        direction: Direction,
        action: &str,
        raw: &str,
    ) -> Result<(), PersistenceError> {
        debug!(
            station_id,
            direction = direction.as_str(),
            action,
            raw,
            "ocpp message"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn boot_upsert_replaces_previous_row() {
        let repo = InMemoryStationRepository::new();
        let now = Utc::now();
        for model in ["A", "B"] {
            repo.upsert_boot(StationBootInfo {
                station_id: "st-1".into(),
                vendor: "V".into(),
                model: model.into(),
                firmware_version: String::new(),
                reason: String::new(),
                booted_at: now,
            })
            .await
            .unwrap();
        }
        assert_eq!(repo.boot_info("st-1").unwrap().model, "B");
        assert_eq!(repo.last_seen("st-1"), Some(now));
    }

    #[tokio::test]
    async fn connector_rows_are_keyed_per_connector() {
        let repo = InMemoryStationRepository::new();
        let now = Utc::now();
        for connector_id in [1, 2] {
            repo.upsert_connector_status(ConnectorStatusRecord {
                station_id: "st-1".into(),
                evse_id: 1,
                connector_id,
                connector_status: format!("status-{}", connector_id),
                evse_status: None,
                connector_type: None,
                reason_code: None,
                vendor_id: None,
                vendor_description: None,
                status_timestamp: None,
                recorded_at: now,
            })
            .await
            .unwrap();
        }
        assert_eq!(
            repo.connector_record("st-1", 1, 2).unwrap().connector_status,
            "status-2"
        );
    }

    #[tokio::test]
    async fn failing_repository_errors_every_write() {
        let repo = InMemoryStationRepository::failing();
        assert!(repo.update_last_seen("st-1", Utc::now()).await.is_err());
    }
}
