//! # voltflow-csms
//!
//! OCPP 1.6/2.0 central system gateway. Terminates one WebSocket per
//! charging station, decodes the OCPP-J framing, dispatches device events
//! to the back-office services, and delivers operator commands with strict
//! per-station ordering and bounded retries.
//!
//! Layering:
//!
//! - **support**: cross-cutting pieces (frame codec, shutdown signal)
//! - **domain**: wire payloads, command/status models, persistence ports
//! - **application**: router, handlers, command manager, registries, events
//! - **infrastructure**: downstream HTTP clients, in-memory persistence
//! - **interfaces**: WebSocket listener and operator REST API
//! - **config**: TOML configuration with environment overrides

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod support;

pub use application::{
    build_router, CommandConfig, CommandManager, EventBus, HandlerDeps, MessageProcessor,
    SharedCommandManager, StatusRegistry, TransactionStore,
};
pub use config::{default_config_path, AppConfig};
pub use interfaces::http::{create_api_router, ApiState};
pub use interfaces::ws::OcppServer;
pub use support::ocpp_frame::OcppFrame;
