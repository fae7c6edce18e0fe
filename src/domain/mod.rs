//! Core domain types: wire payloads, command lifecycle, connector status,
//! and the ports external collaborators are reached through.

pub mod command;
pub mod connector;
pub mod messages;
pub mod ports;

pub use command::{CommandResult, CommandSnapshot, CommandStatus};
pub use connector::{ConnectorStatus, StationSnapshot, StatusEvent, StatusUpdate};
pub use ports::{ConnectorStatusRecord, MessageLog, StationBootInfo, StationRepository};
