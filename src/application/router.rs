//! Action routing and frame processing
//!
//! [`ActionRouter`] maps OCPP action names to handlers. [`MessageProcessor`]
//! is the per-message pipeline the read pump drives: decode the frame, log
//! the raw text, dispatch a CALL to its handler (or hand a
//! CALLRESULT/CALLERROR to the command manager), and encode the reply.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::commands::SharedCommandManager;
use crate::domain::ports::{Direction, MessageLog};
use crate::support::ocpp_frame::OcppFrame;

/// Per-call context handed to handlers.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub station_id: String,
}

/// Handler failures, each mapping to a CALLERROR code.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Payload fails the handler's preconditions → `FormationViolation`.
    #[error("{0}")]
    Validation(String),
    /// Anything else → `InternalError`.
    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "FormationViolation",
            Self::Internal(_) => "InternalError",
        }
    }
}

/// One OCPP action implementation. Returning `Ok(None)` emits no frame;
/// every registered handler answers a well-formed CALL, so in practice the
/// value is always `Some`.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &CallContext,
        payload: Value,
    ) -> Result<Option<Value>, HandlerError>;
}

/// Case-sensitive action → handler map.
#[derive(Default)]
pub struct ActionRouter {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRouter {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, action: &str, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(action.to_string(), handler);
    }

    pub fn actions(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    async fn route(
        &self,
        ctx: &CallContext,
        action: &str,
        payload: Value,
    ) -> Option<Result<Option<Value>, HandlerError>> {
        let handler = self.handlers.get(action)?;
        Some(handler.handle(ctx, payload).await)
    }
}

/// Ties decoding, raw-message audit, routing and command correlation
/// together. One processor serves every connection.
pub struct MessageProcessor {
    router: ActionRouter,
    commands: SharedCommandManager,
    message_log: Arc<dyn MessageLog>,
}

impl MessageProcessor {
    pub fn new(
        router: ActionRouter,
        commands: SharedCommandManager,
        message_log: Arc<dyn MessageLog>,
    ) -> Self {
        Self {
            router,
            commands,
            message_log,
        }
    }

    /// Process one inbound text message; the return value, if any, is the
    /// frame to write back.
    pub async fn process(&self, station_id: &str, raw: &str) -> Option<String> {
        let frame = match OcppFrame::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(station_id, error = %e, "malformed frame dropped");
                metrics::counter!("ocpp_malformed_frames_total").increment(1);
                return None;
            }
        };

        match frame {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => {
                self.log_message(station_id, Direction::Incoming, &action, raw)
                    .await;
                let response = self.dispatch_call(station_id, &unique_id, &action, payload).await;
                if let Some(reply) = &response {
                    self.log_message(station_id, Direction::Outgoing, &action, reply)
                        .await;
                }
                response
            }
            OcppFrame::CallResult { unique_id, payload } => {
                self.log_message(station_id, Direction::Incoming, "CallResult", raw)
                    .await;
                self.commands
                    .handle_call_result(station_id, &unique_id, payload);
                None
            }
            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => {
                self.log_message(station_id, Direction::Incoming, "CallError", raw)
                    .await;
                self.commands.handle_call_error(
                    station_id,
                    &unique_id,
                    &error_code,
                    &error_description,
                    error_details,
                );
                None
            }
        }
    }

    async fn dispatch_call(
        &self,
        station_id: &str,
        unique_id: &str,
        action: &str,
        payload: Value,
    ) -> Option<String> {
        metrics::counter!("ocpp_calls_total", "action" => action.to_string()).increment(1);
        let ctx = CallContext {
            station_id: station_id.to_string(),
        };

        let outcome = match self.router.route(&ctx, action, payload).await {
            None => {
                warn!(station_id, action, "unsupported action");
                return Some(
                    OcppFrame::call_error(unique_id, "NotImplemented", format!("unsupported action {}", action))
                        .encode(),
                );
            }
            Some(outcome) => outcome,
        };

        match outcome {
            Ok(Some(response)) => {
                debug!(station_id, action, "call handled");
                Some(OcppFrame::call_result(unique_id, response).encode())
            }
            Ok(None) => None,
            Err(e) => {
                warn!(station_id, action, error = %e, "handler failed");
                Some(OcppFrame::call_error(unique_id, e.error_code(), e.to_string()).encode())
            }
        }
    }

    async fn log_message(&self, station_id: &str, direction: Direction, action: &str, raw: &str) {
        if let Err(e) = self.message_log.save(station_id, direction, action, raw).await {
            debug!(station_id, error = %e, "message log write failed");
        }
    }
}
