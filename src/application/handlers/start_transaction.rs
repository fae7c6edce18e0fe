//! StartTransaction handler

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::application::events::{Event, SharedEventBus};
use crate::application::ports::{SessionStartRequest, SessionsApi};
use crate::application::registry::StatusRegistry;
use crate::application::router::{ActionHandler, CallContext, HandlerError};
use crate::application::transactions::{TransactionContext, TransactionStore};
use crate::domain::connector::StatusUpdate;
use crate::domain::messages::{
    self, IdTagInfo, StartTransactionRequest, StartTransactionResponse,
};

pub struct StartTransactionHandler {
    sessions: Arc<dyn SessionsApi>,
    registry: Arc<StatusRegistry>,
    transactions: Arc<TransactionStore>,
    events: SharedEventBus,
}

impl StartTransactionHandler {
    pub fn new(
        sessions: Arc<dyn SessionsApi>,
        registry: Arc<StatusRegistry>,
        transactions: Arc<TransactionStore>,
        events: SharedEventBus,
    ) -> Self {
        Self {
            sessions,
            registry,
            transactions,
            events,
        }
    }
}

#[async_trait]
impl ActionHandler for StartTransactionHandler {
    async fn handle(
        &self,
        ctx: &CallContext,
        payload: Value,
    ) -> Result<Option<Value>, HandlerError> {
        let req: StartTransactionRequest = serde_json::from_value(payload)
            .map_err(|e| HandlerError::Validation(format!("invalid StartTransaction: {}", e)))?;

        let transaction_id = match req.transaction_id.filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => format!(
                "{}-{}",
                ctx.station_id,
                Utc::now().timestamp_nanos_opt().unwrap_or_default()
            ),
        };

        // the session id gates billing later; 0 means the sessions service
        // could not be reached and the transaction proceeds best-effort
        let start = match self
            .sessions
            .session_start(SessionStartRequest {
                station_id: ctx.station_id.clone(),
                connector_id: req.connector_id,
                transaction_id: transaction_id.clone(),
                meter_start: req.meter_start,
            })
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(station_id = ctx.station_id.as_str(), error = %e, "session-start notification failed");
                Default::default()
            }
        };

        if req.connector_id > 0 {
            if let Ok(connector_id) = u32::try_from(req.connector_id) {
                match self.registry.update(
                    &ctx.station_id,
                    StatusUpdate {
                        evse_id: 1,
                        connector_id,
                        connector_status: messages::status::CHARGING.to_string(),
                        ..Default::default()
                    },
                    Utc::now(),
                ) {
                    Ok(event) => self.events.publish(Event::ConnectorStatusChanged(event)),
                    Err(e) => {
                        warn!(station_id = ctx.station_id.as_str(), error = %e, "connector status update failed")
                    }
                }
            }
        }

        self.transactions.set(
            &transaction_id,
            TransactionContext {
                session_id: start.session_id,
                user_id: start.user_id,
                meter_start: req.meter_start,
                connector_id: req.connector_id,
            },
        );

        info!(
            station_id = ctx.station_id.as_str(),
            transaction_id = transaction_id.as_str(),
            session_id = start.session_id,
            connector_id = req.connector_id,
            meter_start = req.meter_start,
            "StartTransaction"
        );

        let response = StartTransactionResponse {
            transaction_id,
            id_tag_info: IdTagInfo {
                status: "Accepted".to_string(),
            },
        };
        serde_json::to_value(&response)
            .map(Some)
            .map_err(|e| HandlerError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::EventBus;
    use crate::application::ports::tests_support::MockSessions;
    use serde_json::json;

    fn handler(
        sessions: Arc<MockSessions>,
        registry: Arc<StatusRegistry>,
        transactions: Arc<TransactionStore>,
    ) -> StartTransactionHandler {
        StartTransactionHandler::new(sessions, registry, transactions, EventBus::shared(8))
    }

    fn ctx() -> CallContext {
        CallContext {
            station_id: "st-1".into(),
        }
    }

    #[tokio::test]
    async fn assigns_transaction_id_when_absent() {
        let sessions = MockSessions::with_response(7, 3);
        let transactions = Arc::new(TransactionStore::new());
        let handler = handler(sessions.clone(), Arc::new(StatusRegistry::new()), transactions.clone());

        let response = handler
            .handle(&ctx(), json!({"connectorId": 1, "idTag": "TAG", "meterStart": 100}))
            .await
            .unwrap()
            .unwrap();

        let tx_id = response["transactionId"].as_str().unwrap();
        assert!(tx_id.starts_with("st-1-"));
        assert_eq!(response["idTagInfo"]["status"], "Accepted");

        let ctx = transactions.get(tx_id).unwrap();
        assert_eq!(ctx.session_id, 7);
        assert_eq!(ctx.user_id, 3);
        assert_eq!(ctx.meter_start, 100);
        assert_eq!(ctx.connector_id, 1);
    }

    #[tokio::test]
    async fn keeps_station_supplied_transaction_id() {
        let sessions = MockSessions::with_response(1, 0);
        let transactions = Arc::new(TransactionStore::new());
        let handler = handler(sessions, Arc::new(StatusRegistry::new()), transactions.clone());

        let response = handler
            .handle(
                &ctx(),
                json!({"connectorId": 2, "idTag": "TAG", "meterStart": 0, "transactionId": "tx-abc"}),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(response["transactionId"], "tx-abc");
        assert!(transactions.get("tx-abc").is_some());
    }

    #[tokio::test]
    async fn sessions_failure_is_best_effort() {
        let sessions = MockSessions::failing();
        let transactions = Arc::new(TransactionStore::new());
        let handler = handler(sessions, Arc::new(StatusRegistry::new()), transactions.clone());

        let response = handler
            .handle(&ctx(), json!({"connectorId": 1, "idTag": "TAG", "meterStart": 50}))
            .await
            .unwrap()
            .unwrap();

        let tx_id = response["transactionId"].as_str().unwrap();
        assert_eq!(transactions.get(tx_id).unwrap().session_id, 0);
    }

    #[tokio::test]
    async fn marks_connector_charging() {
        let registry = Arc::new(StatusRegistry::new());
        let handler = handler(
            MockSessions::with_response(1, 0),
            registry.clone(),
            Arc::new(TransactionStore::new()),
        );

        handler
            .handle(&ctx(), json!({"connectorId": 2, "idTag": "TAG", "meterStart": 0}))
            .await
            .unwrap();

        let snap = registry.snapshot("st-1").unwrap();
        assert_eq!(snap.connector(1, 2).unwrap().status, "Charging");
    }
}
