//! Billing service client

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::application::ports::{BillingApi, ClientError, SessionStoppedRequest};

pub struct BillingClient {
    base_url: String,
    client: reqwest::Client,
}

impl BillingClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: super::http_client(),
        }
    }
}

#[async_trait]
impl BillingApi for BillingClient {
    async fn session_stopped(&self, req: SessionStoppedRequest) -> Result<(), ClientError> {
        if self.base_url.is_empty() {
            debug!("billing client disabled, skipping session-stopped notification");
            return Ok(());
        }

        let url = format!("{}/internal/ocpp/session-stopped", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            warn!(status = resp.status().as_u16(), "billing session-stopped returned non-success");
        }
        Ok(())
    }
}
