//! Downstream service ports
//!
//! The handlers talk to the sessions, billing and telemetry services
//! through these interfaces. All calls are best-effort from the station's
//! point of view: a downstream failure is logged, never surfaced as a
//! CALLERROR.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("invalid response body: {0}")]
    InvalidBody(String),
}

// ── Sessions service ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SessionStartRequest {
    pub station_id: String,
    pub connector_id: i64,
    pub transaction_id: String,
    pub meter_start: i64,
}

/// `session-start` answer. `user_id` is optional so older sessions-service
/// deployments that only return the session id keep working.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionStartResponse {
    #[serde(default)]
    pub session_id: i64,
    #[serde(default)]
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStopRequest {
    pub transaction_id: String,
    pub meter_stop: i64,
    pub reason: String,
    pub energy_kwh: f64,
    pub end_time: DateTime<Utc>,
}

#[async_trait]
pub trait SessionsApi: Send + Sync {
    async fn session_start(
        &self,
        req: SessionStartRequest,
    ) -> Result<SessionStartResponse, ClientError>;
    async fn session_stop(&self, req: SessionStopRequest) -> Result<(), ClientError>;
}

// ── Billing service ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SessionStoppedRequest {
    pub session_id: i64,
    pub user_id: i64,
    pub energy_kwh: f64,
}

#[async_trait]
pub trait BillingApi: Send + Sync {
    async fn session_stopped(&self, req: SessionStoppedRequest) -> Result<(), ClientError>;
}

// ── Telemetry service ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct MeterValueRequest {
    pub session_id: i64,
    pub station_id: String,
    pub connector_id: i64,
    pub meter_value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait TelemetryApi: Send + Sync {
    async fn meter_values(&self, req: MeterValueRequest) -> Result<(), ClientError>;
}

#[cfg(test)]
pub mod tests_support {
    //! Recording mocks shared by the handler tests.

    use super::*;
    use std::sync::{Arc, Mutex};

    pub struct MockSessions {
        response: SessionStartResponse,
        fail: bool,
        start_requests: Mutex<Vec<SessionStartRequest>>,
        stop_requests: Mutex<Vec<SessionStopRequest>>,
    }

    impl MockSessions {
        pub fn with_response(session_id: i64, user_id: i64) -> Arc<Self> {
            Arc::new(Self {
                response: SessionStartResponse {
                    session_id,
                    user_id,
                },
                fail: false,
                start_requests: Mutex::new(Vec::new()),
                stop_requests: Mutex::new(Vec::new()),
            })
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                response: SessionStartResponse::default(),
                fail: true,
                start_requests: Mutex::new(Vec::new()),
                stop_requests: Mutex::new(Vec::new()),
            })
        }

        pub fn start_requests(&self) -> Vec<SessionStartRequest> {
            self.start_requests.lock().unwrap().clone()
        }

        pub fn stop_requests(&self) -> Vec<SessionStopRequest> {
            self.stop_requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionsApi for MockSessions {
        async fn session_start(
            &self,
            req: SessionStartRequest,
        ) -> Result<SessionStartResponse, ClientError> {
            if self.fail {
                return Err(ClientError::Request("connection refused".into()));
            }
            self.start_requests.lock().unwrap().push(req);
            Ok(self.response.clone())
        }

        async fn session_stop(&self, req: SessionStopRequest) -> Result<(), ClientError> {
            if self.fail {
                return Err(ClientError::Request("connection refused".into()));
            }
            self.stop_requests.lock().unwrap().push(req);
            Ok(())
        }
    }

    pub struct MockBilling {
        fail: bool,
        stopped_requests: Mutex<Vec<SessionStoppedRequest>>,
    }

    impl MockBilling {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                fail: false,
                stopped_requests: Mutex::new(Vec::new()),
            })
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                stopped_requests: Mutex::new(Vec::new()),
            })
        }

        pub fn stopped_requests(&self) -> Vec<SessionStoppedRequest> {
            self.stopped_requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BillingApi for MockBilling {
        async fn session_stopped(&self, req: SessionStoppedRequest) -> Result<(), ClientError> {
            if self.fail {
                return Err(ClientError::Status(502));
            }
            self.stopped_requests.lock().unwrap().push(req);
            Ok(())
        }
    }

    pub struct MockTelemetry {
        fail: bool,
        requests: Mutex<Vec<MeterValueRequest>>,
    }

    impl MockTelemetry {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                fail: false,
                requests: Mutex::new(Vec::new()),
            })
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                requests: Mutex::new(Vec::new()),
            })
        }

        pub fn requests(&self) -> Vec<MeterValueRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TelemetryApi for MockTelemetry {
        async fn meter_values(&self, req: MeterValueRequest) -> Result<(), ClientError> {
            if self.fail {
                return Err(ClientError::Request("timeout".into()));
            }
            self.requests.lock().unwrap().push(req);
            Ok(())
        }
    }
}
