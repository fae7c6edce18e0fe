//! MeterValues handler

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::application::ports::{MeterValueRequest, TelemetryApi};
use crate::application::router::{ActionHandler, CallContext, HandlerError};
use crate::application::transactions::TransactionStore;
use crate::domain::messages::MeterValuesRequest;

pub struct MeterValuesHandler {
    telemetry: Arc<dyn TelemetryApi>,
    transactions: Arc<TransactionStore>,
}

impl MeterValuesHandler {
    pub fn new(telemetry: Arc<dyn TelemetryApi>, transactions: Arc<TransactionStore>) -> Self {
        Self {
            telemetry,
            transactions,
        }
    }
}

#[async_trait]
impl ActionHandler for MeterValuesHandler {
    async fn handle(
        &self,
        ctx: &CallContext,
        payload: Value,
    ) -> Result<Option<Value>, HandlerError> {
        let req: MeterValuesRequest = serde_json::from_value(payload)
            .map_err(|e| HandlerError::Validation(format!("invalid MeterValues: {}", e)))?;

        let Some(tx_ctx) = self.transactions.get(&req.transaction_id) else {
            warn!(
                station_id = ctx.station_id.as_str(),
                transaction_id = req.transaction_id.as_str(),
                "meter values without transaction context"
            );
            return Ok(Some(json!({})));
        };

        let connector_id = if req.connector_id > 0 {
            req.connector_id
        } else {
            tx_ctx.connector_id
        };
        if let Err(e) = self
            .telemetry
            .meter_values(MeterValueRequest {
                session_id: tx_ctx.session_id,
                station_id: ctx.station_id.clone(),
                connector_id,
                meter_value: req.meter_value,
                unit: "kWh".to_string(),
                timestamp: req.timestamp.unwrap_or_else(Utc::now),
            })
            .await
        {
            warn!(station_id = ctx.station_id.as_str(), error = %e, "telemetry notification failed");
        } else {
            debug!(
                station_id = ctx.station_id.as_str(),
                session_id = tx_ctx.session_id,
                meter_value = req.meter_value,
                "meter values forwarded"
            );
        }

        Ok(Some(json!({})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::tests_support::MockTelemetry;
    use crate::application::transactions::TransactionContext;

    fn ctx() -> CallContext {
        CallContext {
            station_id: "st-1".into(),
        }
    }

    #[tokio::test]
    async fn forwards_to_telemetry_with_session_context() {
        let telemetry = MockTelemetry::new();
        let transactions = Arc::new(TransactionStore::new());
        transactions.set(
            "tx-1",
            TransactionContext {
                session_id: 11,
                user_id: 0,
                meter_start: 0,
                connector_id: 2,
            },
        );
        let handler = MeterValuesHandler::new(telemetry.clone(), transactions);

        let response = handler
            .handle(&ctx(), json!({"transactionId": "tx-1", "meterValue": 1.25}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response, json!({}));

        let sent = telemetry.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].session_id, 11);
        assert_eq!(sent[0].station_id, "st-1");
        assert_eq!(sent[0].connector_id, 2);
        assert_eq!(sent[0].meter_value, 1.25);
        assert_eq!(sent[0].unit, "kWh");
    }

    #[tokio::test]
    async fn forwards_even_when_sessions_service_was_unreachable_at_start() {
        // a failed session-start leaves session_id 0 in the context; meter
        // values still flow to telemetry for the rest of the transaction
        let telemetry = MockTelemetry::new();
        let transactions = Arc::new(TransactionStore::new());
        transactions.set(
            "tx-degraded",
            TransactionContext {
                session_id: 0,
                user_id: 0,
                meter_start: 0,
                connector_id: 1,
            },
        );
        let handler = MeterValuesHandler::new(telemetry.clone(), transactions);

        let response = handler
            .handle(&ctx(), json!({"transactionId": "tx-degraded", "meterValue": 0.5}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response, json!({}));

        let sent = telemetry.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].session_id, 0);
        assert_eq!(sent[0].meter_value, 0.5);
    }

    #[tokio::test]
    async fn unknown_transaction_acks_without_forwarding() {
        let telemetry = MockTelemetry::new();
        let handler = MeterValuesHandler::new(telemetry.clone(), Arc::new(TransactionStore::new()));

        let response = handler
            .handle(&ctx(), json!({"transactionId": "ghost", "meterValue": 2.0}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response, json!({}));
        assert!(telemetry.requests().is_empty());
    }

    #[tokio::test]
    async fn telemetry_failure_still_acks() {
        let telemetry = MockTelemetry::failing();
        let transactions = Arc::new(TransactionStore::new());
        transactions.set(
            "tx-1",
            TransactionContext {
                session_id: 1,
                user_id: 0,
                meter_start: 0,
                connector_id: 1,
            },
        );
        let handler = MeterValuesHandler::new(telemetry, transactions);

        let response = handler
            .handle(&ctx(), json!({"transactionId": "tx-1", "meterValue": 3.0}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response, json!({}));
    }
}
