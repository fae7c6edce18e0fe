//! Sessions service client

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::application::ports::{
    ClientError, SessionStartRequest, SessionStartResponse, SessionStopRequest, SessionsApi,
};

pub struct SessionsClient {
    base_url: String,
    client: reqwest::Client,
}

impl SessionsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: super::http_client(),
        }
    }
}

#[async_trait]
impl SessionsApi for SessionsClient {
    async fn session_start(
        &self,
        req: SessionStartRequest,
    ) -> Result<SessionStartResponse, ClientError> {
        if self.base_url.is_empty() {
            debug!("sessions client disabled, skipping start notification");
            return Ok(SessionStartResponse::default());
        }

        let url = format!("{}/internal/ocpp/session-start", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "sessions session-start returned non-success");
            return Err(ClientError::Status(status.as_u16()));
        }

        resp.json::<SessionStartResponse>()
            .await
            .map_err(|e| ClientError::InvalidBody(e.to_string()))
    }

    async fn session_stop(&self, req: SessionStopRequest) -> Result<(), ClientError> {
        if self.base_url.is_empty() {
            debug!("sessions client disabled, skipping stop notification");
            return Ok(());
        }

        let url = format!("{}/internal/ocpp/session-stop", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            warn!(status = resp.status().as_u16(), "sessions session-stop returned non-success");
        }
        Ok(())
    }
}
