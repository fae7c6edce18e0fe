//! StatusNotification handler

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::application::events::{Event, SharedEventBus};
use crate::application::registry::StatusRegistry;
use crate::application::router::{ActionHandler, CallContext, HandlerError};
use crate::domain::connector::StatusUpdate;
use crate::domain::messages::StatusNotificationRequest;
use crate::domain::ports::{ConnectorStatusRecord, StationRepository};

pub struct StatusNotificationHandler {
    repository: Arc<dyn StationRepository>,
    registry: Arc<StatusRegistry>,
    events: SharedEventBus,
}

impl StatusNotificationHandler {
    pub fn new(
        repository: Arc<dyn StationRepository>,
        registry: Arc<StatusRegistry>,
        events: SharedEventBus,
    ) -> Self {
        Self {
            repository,
            registry,
            events,
        }
    }
}

fn positive_id(value: Option<i64>, field: &str) -> Result<u32, HandlerError> {
    let value = value.ok_or_else(|| HandlerError::Validation(format!("{} is required", field)))?;
    if value <= 0 {
        return Err(HandlerError::Validation(format!(
            "{} must be positive",
            field
        )));
    }
    u32::try_from(value)
        .map_err(|_| HandlerError::Validation(format!("{} is out of range", field)))
}

impl TryFrom<StatusNotificationRequest> for StatusUpdate {
    type Error = HandlerError;

    fn try_from(req: StatusNotificationRequest) -> Result<Self, Self::Error> {
        let evse_id = positive_id(req.evse_id, "evseId")?;
        let connector_id = positive_id(req.connector_id, "connectorId")?;
        let connector_status = req
            .connector_status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HandlerError::Validation("connectorStatus is required".into()))?
            .to_string();

        Ok(StatusUpdate {
            evse_id,
            connector_id,
            connector_status,
            evse_status: req.evse_status,
            connector_type: req.connector_type,
            reason_code: req.reason_code,
            vendor_id: req.vendor_id,
            vendor_description: req.vendor_description,
            timestamp: req.timestamp,
        })
    }
}

#[async_trait]
impl ActionHandler for StatusNotificationHandler {
    async fn handle(
        &self,
        ctx: &CallContext,
        payload: Value,
    ) -> Result<Option<Value>, HandlerError> {
        let req: StatusNotificationRequest = serde_json::from_value(payload)
            .map_err(|e| HandlerError::Validation(format!("invalid StatusNotification: {}", e)))?;
        let update = StatusUpdate::try_from(req)?;

        let now = Utc::now();
        let event = self
            .registry
            .update(&ctx.station_id, update, now)
            .map_err(|e| HandlerError::Validation(e.to_string()))?;

        info!(
            station_id = ctx.station_id.as_str(),
            evse_id = event.update.evse_id,
            connector_id = event.update.connector_id,
            status = event.current.status.as_str(),
            previous = event.previous.status.as_str(),
            "StatusNotification"
        );

        // mirror the row best-effort; the in-memory registry stays canonical
        let record = ConnectorStatusRecord {
            station_id: ctx.station_id.clone(),
            evse_id: event.update.evse_id,
            connector_id: event.update.connector_id,
            connector_status: event.current.status.clone(),
            evse_status: event.current.evse_status.clone(),
            connector_type: event.current.connector_type.clone(),
            reason_code: event.current.reason_code.clone(),
            vendor_id: event.current.vendor_id.clone(),
            vendor_description: event.current.vendor_description.clone(),
            status_timestamp: event.current.status_timestamp,
            recorded_at: now,
        };
        if let Err(e) = self.repository.upsert_connector_status(record).await {
            warn!(station_id = ctx.station_id.as_str(), error = %e, "connector status persist failed");
        }
        if let Err(e) = self.repository.update_last_seen(&ctx.station_id, now).await {
            warn!(station_id = ctx.station_id.as_str(), error = %e, "last-seen update failed");
        }

        self.events.publish(Event::ConnectorStatusChanged(event));
        Ok(Some(json!({})))
    }
}
