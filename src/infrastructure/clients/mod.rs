//! HTTP clients for the downstream back-office services
//!
//! All three share the same posture: JSON POSTs with a 5 s timeout, an empty
//! base URL disables the client, and failures are surfaced to the caller who
//! decides whether they matter (they mostly do not; the OCPP exchange with
//! the station continues regardless).

mod billing;
mod sessions;
mod telemetry;

use std::time::Duration;

pub use billing::BillingClient;
pub use sessions::SessionsClient;
pub use telemetry::TelemetryClient;

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
