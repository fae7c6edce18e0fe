//! StopTransaction handler

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::application::events::{Event, SharedEventBus};
use crate::application::ports::{
    BillingApi, SessionStopRequest, SessionStoppedRequest, SessionsApi,
};
use crate::application::registry::StatusRegistry;
use crate::application::router::{ActionHandler, CallContext, HandlerError};
use crate::application::transactions::TransactionStore;
use crate::domain::connector::StatusUpdate;
use crate::domain::messages::{self, StopTransactionRequest};

pub struct StopTransactionHandler {
    sessions: Arc<dyn SessionsApi>,
    billing: Arc<dyn BillingApi>,
    registry: Arc<StatusRegistry>,
    transactions: Arc<TransactionStore>,
    events: SharedEventBus,
}

impl StopTransactionHandler {
    pub fn new(
        sessions: Arc<dyn SessionsApi>,
        billing: Arc<dyn BillingApi>,
        registry: Arc<StatusRegistry>,
        transactions: Arc<TransactionStore>,
        events: SharedEventBus,
    ) -> Self {
        Self {
            sessions,
            billing,
            registry,
            transactions,
            events,
        }
    }
}

/// Energy delivered over the transaction, clamped at zero for meter resets.
fn energy_kwh(meter_start: i64, meter_stop: i64) -> f64 {
    if meter_stop > meter_start {
        (meter_stop - meter_start) as f64 / 1000.0
    } else {
        0.0
    }
}

#[async_trait]
impl ActionHandler for StopTransactionHandler {
    async fn handle(
        &self,
        ctx: &CallContext,
        payload: Value,
    ) -> Result<Option<Value>, HandlerError> {
        let req: StopTransactionRequest = serde_json::from_value(payload)
            .map_err(|e| HandlerError::Validation(format!("invalid StopTransaction: {}", e)))?;

        let tx_ctx = self.transactions.take(&req.transaction_id);
        let (energy, session_id, user_id, connector_id) = match &tx_ctx {
            Some(tx) => (
                energy_kwh(tx.meter_start, req.meter_stop),
                tx.session_id,
                tx.user_id,
                tx.connector_id,
            ),
            None => {
                warn!(
                    station_id = ctx.station_id.as_str(),
                    transaction_id = req.transaction_id.as_str(),
                    "StopTransaction without known context"
                );
                (0.0, 0, 0, 0)
            }
        };

        if let Err(e) = self
            .sessions
            .session_stop(SessionStopRequest {
                transaction_id: req.transaction_id.clone(),
                meter_stop: req.meter_stop,
                reason: req.reason.clone().unwrap_or_default(),
                energy_kwh: energy,
                end_time: Utc::now(),
            })
            .await
        {
            warn!(station_id = ctx.station_id.as_str(), error = %e, "session-stop notification failed");
        }

        if session_id > 0 {
            if let Err(e) = self
                .billing
                .session_stopped(SessionStoppedRequest {
                    session_id,
                    user_id,
                    energy_kwh: energy,
                })
                .await
            {
                warn!(station_id = ctx.station_id.as_str(), error = %e, "billing notification failed");
            }
        }

        let now = Utc::now();
        self.registry
            .set_station_status(&ctx.station_id, messages::status::AVAILABLE, now);
        if connector_id > 0 {
            if let Ok(connector_id) = u32::try_from(connector_id) {
                match self.registry.update(
                    &ctx.station_id,
                    StatusUpdate {
                        evse_id: 1,
                        connector_id,
                        connector_status: messages::status::AVAILABLE.to_string(),
                        ..Default::default()
                    },
                    now,
                ) {
                    Ok(event) => self.events.publish(Event::ConnectorStatusChanged(event)),
                    Err(e) => {
                        warn!(station_id = ctx.station_id.as_str(), error = %e, "connector status update failed")
                    }
                }
            }
        }

        info!(
            station_id = ctx.station_id.as_str(),
            transaction_id = req.transaction_id.as_str(),
            session_id,
            energy_kwh = energy,
            reason = req.reason.as_deref().unwrap_or(""),
            "StopTransaction"
        );

        Ok(Some(json!({})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::EventBus;
    use crate::application::ports::tests_support::{MockBilling, MockSessions};
    use crate::application::transactions::TransactionContext;

    fn ctx() -> CallContext {
        CallContext {
            station_id: "st-1".into(),
        }
    }

    fn setup(
        sessions: Arc<MockSessions>,
        billing: Arc<MockBilling>,
    ) -> (StopTransactionHandler, Arc<TransactionStore>, Arc<StatusRegistry>) {
        let transactions = Arc::new(TransactionStore::new());
        let registry = Arc::new(StatusRegistry::new());
        let handler = StopTransactionHandler::new(
            sessions,
            billing,
            registry.clone(),
            transactions.clone(),
            EventBus::shared(8),
        );
        (handler, transactions, registry)
    }

    #[test]
    fn energy_is_clamped_at_zero() {
        assert_eq!(energy_kwh(1_000, 3_500), 2.5);
        assert_eq!(energy_kwh(1_000, 1_000), 0.0);
        assert_eq!(energy_kwh(1_000, 400), 0.0);
    }

    #[tokio::test]
    async fn computes_energy_and_notifies_downstream() {
        let sessions = MockSessions::with_response(0, 0);
        let billing = MockBilling::new();
        let (handler, transactions, registry) = setup(sessions.clone(), billing.clone());

        transactions.set(
            "tx-1",
            TransactionContext {
                session_id: 9,
                user_id: 4,
                meter_start: 1_000,
                connector_id: 2,
            },
        );

        let response = handler
            .handle(&ctx(), json!({"transactionId": "tx-1", "meterStop": 4_200, "reason": "Local"}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response, json!({}));

        let stops = sessions.stop_requests();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].transaction_id, "tx-1");
        assert_eq!(stops[0].meter_stop, 4_200);
        assert_eq!(stops[0].reason, "Local");
        assert!((stops[0].energy_kwh - 3.2).abs() < 1e-9);

        // the user cached at start flows to billing
        let billed = billing.stopped_requests();
        assert_eq!(billed.len(), 1);
        assert_eq!(billed[0].session_id, 9);
        assert_eq!(billed[0].user_id, 4);
        assert!((billed[0].energy_kwh - 3.2).abs() < 1e-9);

        // context consumed, connector released
        assert!(transactions.get("tx-1").is_none());
        let snap = registry.snapshot("st-1").unwrap();
        assert_eq!(snap.status, "Available");
        assert_eq!(snap.connector(1, 2).unwrap().status, "Available");
    }

    #[tokio::test]
    async fn billing_is_skipped_without_session_id() {
        let sessions = MockSessions::with_response(0, 0);
        let billing = MockBilling::new();
        let (handler, transactions, _) = setup(sessions, billing.clone());

        transactions.set(
            "tx-2",
            TransactionContext {
                session_id: 0,
                user_id: 0,
                meter_start: 0,
                connector_id: 1,
            },
        );

        handler
            .handle(&ctx(), json!({"transactionId": "tx-2", "meterStop": 100}))
            .await
            .unwrap();
        assert!(billing.stopped_requests().is_empty());
    }

    #[tokio::test]
    async fn meter_rollback_yields_zero_energy() {
        let sessions = MockSessions::with_response(0, 0);
        let billing = MockBilling::new();
        let (handler, transactions, _) = setup(sessions.clone(), billing);

        transactions.set(
            "tx-3",
            TransactionContext {
                session_id: 1,
                user_id: 0,
                meter_start: 5_000,
                connector_id: 1,
            },
        );

        handler
            .handle(&ctx(), json!({"transactionId": "tx-3", "meterStop": 4_000}))
            .await
            .unwrap();
        assert_eq!(sessions.stop_requests()[0].energy_kwh, 0.0);
    }

    #[tokio::test]
    async fn unknown_transaction_still_acks() {
        let sessions = MockSessions::with_response(0, 0);
        let billing = MockBilling::new();
        let (handler, _, _) = setup(sessions.clone(), billing.clone());

        let response = handler
            .handle(&ctx(), json!({"transactionId": "ghost", "meterStop": 100}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response, json!({}));
        assert!(billing.stopped_requests().is_empty());
        // sessions still told, with zero energy
        assert_eq!(sessions.stop_requests().len(), 1);
    }

    #[tokio::test]
    async fn downstream_failures_never_fail_the_call() {
        let sessions = MockSessions::failing();
        let billing = MockBilling::failing();
        let (handler, transactions, _) = setup(sessions, billing);

        transactions.set(
            "tx-4",
            TransactionContext {
                session_id: 3,
                user_id: 1,
                meter_start: 0,
                connector_id: 1,
            },
        );

        let response = handler
            .handle(&ctx(), json!({"transactionId": "tx-4", "meterStop": 800}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response, json!({}));
    }
}
