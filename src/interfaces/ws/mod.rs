//! Station-facing WebSocket surface

pub mod connection;
pub mod negotiator;
pub mod server;

pub use connection::{ConnectionHandle, ConnectionTuning, FrameKind, OutboundQueue};
pub use negotiator::SubprotocolNegotiator;
pub use server::OcppServer;
