//! OCPP action handlers
//!
//! One handler per supported action, registered on the [`ActionRouter`] by
//! [`build_router`]. Handlers run inline on the connection's read pump, so
//! every downstream call they make is bounded by the clients' 5 s timeout.

mod boot_notification;
mod heartbeat;
mod meter_values;
mod start_transaction;
mod status_notification;
mod stop_transaction;

use std::sync::Arc;

pub use boot_notification::BootNotificationHandler;
pub use heartbeat::HeartbeatHandler;
pub use meter_values::MeterValuesHandler;
pub use start_transaction::StartTransactionHandler;
pub use status_notification::StatusNotificationHandler;
pub use stop_transaction::StopTransactionHandler;

use crate::application::events::SharedEventBus;
use crate::application::ports::{BillingApi, SessionsApi, TelemetryApi};
use crate::application::registry::StatusRegistry;
use crate::application::router::ActionRouter;
use crate::application::transactions::TransactionStore;
use crate::domain::ports::StationRepository;

/// Everything the handler set needs.
pub struct HandlerDeps {
    pub repository: Arc<dyn StationRepository>,
    pub sessions: Arc<dyn SessionsApi>,
    pub billing: Arc<dyn BillingApi>,
    pub telemetry: Arc<dyn TelemetryApi>,
    pub registry: Arc<StatusRegistry>,
    pub transactions: Arc<TransactionStore>,
    pub events: SharedEventBus,
    /// Interval reported in BootNotification responses, seconds.
    pub heartbeat_interval: u32,
}

/// Wire up the full action set.
pub fn build_router(deps: &HandlerDeps) -> ActionRouter {
    let mut router = ActionRouter::new();
    router.register(
        "BootNotification",
        Arc::new(BootNotificationHandler::new(
            deps.repository.clone(),
            deps.registry.clone(),
            deps.heartbeat_interval,
        )),
    );
    router.register(
        "Heartbeat",
        Arc::new(HeartbeatHandler::new(deps.repository.clone())),
    );
    router.register(
        "StatusNotification",
        Arc::new(StatusNotificationHandler::new(
            deps.repository.clone(),
            deps.registry.clone(),
            deps.events.clone(),
        )),
    );
    router.register(
        "StartTransaction",
        Arc::new(StartTransactionHandler::new(
            deps.sessions.clone(),
            deps.registry.clone(),
            deps.transactions.clone(),
            deps.events.clone(),
        )),
    );
    router.register(
        "StopTransaction",
        Arc::new(StopTransactionHandler::new(
            deps.sessions.clone(),
            deps.billing.clone(),
            deps.registry.clone(),
            deps.transactions.clone(),
            deps.events.clone(),
        )),
    );
    router.register(
        "MeterValues",
        Arc::new(MeterValuesHandler::new(
            deps.telemetry.clone(),
            deps.transactions.clone(),
        )),
    );
    router
}
