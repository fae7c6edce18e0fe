//! Telemetry service client

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::application::ports::{ClientError, MeterValueRequest, TelemetryApi};

pub struct TelemetryClient {
    base_url: String,
    client: reqwest::Client,
}

impl TelemetryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: super::http_client(),
        }
    }
}

#[async_trait]
impl TelemetryApi for TelemetryClient {
    async fn meter_values(&self, req: MeterValueRequest) -> Result<(), ClientError> {
        if self.base_url.is_empty() {
            debug!("telemetry client disabled, skipping meter value");
            return Ok(());
        }

        let url = format!("{}/internal/ocpp/meter-values", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            warn!(status = resp.status().as_u16(), "telemetry meter-values returned non-success");
        }
        Ok(())
    }
}
