//! Heartbeat handler

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::application::router::{ActionHandler, CallContext, HandlerError};
use crate::domain::messages::HeartbeatResponse;
use crate::domain::ports::StationRepository;

pub struct HeartbeatHandler {
    repository: Arc<dyn StationRepository>,
}

impl HeartbeatHandler {
    pub fn new(repository: Arc<dyn StationRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl ActionHandler for HeartbeatHandler {
    async fn handle(
        &self,
        ctx: &CallContext,
        _payload: Value,
    ) -> Result<Option<Value>, HandlerError> {
        let now = Utc::now();
        debug!(station_id = ctx.station_id.as_str(), "Heartbeat");

        if let Err(e) = self.repository.update_last_seen(&ctx.station_id, now).await {
            warn!(station_id = ctx.station_id.as_str(), error = %e, "last-seen update failed");
        }

        serde_json::to_value(&HeartbeatResponse { current_time: now })
            .map(Some)
            .map_err(|e| HandlerError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::InMemoryStationRepository;
    use chrono::DateTime;
    use serde_json::json;

    #[tokio::test]
    async fn responds_with_current_time_and_updates_last_seen() {
        let repo = Arc::new(InMemoryStationRepository::new());
        let handler = HeartbeatHandler::new(repo.clone());
        let ctx = CallContext {
            station_id: "st-1".into(),
        };

        let before = Utc::now();
        let response = handler.handle(&ctx, json!({})).await.unwrap().unwrap();
        let after = Utc::now();

        let reported: DateTime<Utc> = response["currentTime"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(reported >= before && reported <= after);

        let seen = repo.last_seen("st-1").unwrap();
        assert!(seen >= before && seen <= after);
    }

    #[tokio::test]
    async fn last_seen_failure_still_acks() {
        let repo = Arc::new(InMemoryStationRepository::failing());
        let handler = HeartbeatHandler::new(repo);
        let ctx = CallContext {
            station_id: "st-1".into(),
        };
        let response = handler.handle(&ctx, json!({})).await.unwrap().unwrap();
        assert!(response["currentTime"].is_string());
    }
}
