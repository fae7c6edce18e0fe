//! Delivery mechanisms: WebSocket (stations) and REST (operators)

pub mod http;
pub mod ws;
