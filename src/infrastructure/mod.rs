//! External-facing adapters: downstream HTTP clients and persistence

pub mod clients;
pub mod persistence;

pub use clients::{BillingClient, SessionsClient, TelemetryClient};
pub use persistence::{InMemoryStationRepository, TracingMessageLog};
