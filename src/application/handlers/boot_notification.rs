//! BootNotification handler

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::application::registry::StatusRegistry;
use crate::application::router::{ActionHandler, CallContext, HandlerError};
use crate::domain::messages::{self, BootNotificationRequest, BootNotificationResponse};
use crate::domain::ports::{StationBootInfo, StationRepository};

pub struct BootNotificationHandler {
    repository: Arc<dyn StationRepository>,
    registry: Arc<StatusRegistry>,
    heartbeat_interval: u32,
}

impl BootNotificationHandler {
    pub fn new(
        repository: Arc<dyn StationRepository>,
        registry: Arc<StatusRegistry>,
        heartbeat_interval: u32,
    ) -> Self {
        Self {
            repository,
            registry,
            heartbeat_interval,
        }
    }
}

#[async_trait]
impl ActionHandler for BootNotificationHandler {
    async fn handle(
        &self,
        ctx: &CallContext,
        payload: Value,
    ) -> Result<Option<Value>, HandlerError> {
        let req: BootNotificationRequest = serde_json::from_value(payload)
            .map_err(|e| HandlerError::Validation(format!("invalid BootNotification: {}", e)))?;

        let now = Utc::now();
        let vendor = req.vendor();
        let model = req.model();
        info!(
            station_id = ctx.station_id.as_str(),
            vendor = vendor.as_str(),
            model = model.as_str(),
            reason = req.reason.as_deref().unwrap_or(""),
            "BootNotification"
        );

        // persistence is best-effort; the station keeps operating either way
        let boot = StationBootInfo {
            station_id: ctx.station_id.clone(),
            vendor,
            model,
            firmware_version: req.firmware(),
            reason: req.reason.clone().unwrap_or_default(),
            booted_at: now,
        };
        if let Err(e) = self.repository.upsert_boot(boot).await {
            warn!(station_id = ctx.station_id.as_str(), error = %e, "station upsert failed");
        }

        self.registry
            .set_station_status(&ctx.station_id, messages::status::AVAILABLE, now);

        let response = BootNotificationResponse {
            current_time: now,
            interval: self.heartbeat_interval,
            status: messages::REGISTRATION_ACCEPTED.to_string(),
        };
        serde_json::to_value(&response)
            .map(Some)
            .map_err(|e| HandlerError::Internal(e.to_string()))
    }
}
