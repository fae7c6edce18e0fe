//! OCPP WebSocket listener
//!
//! Accepts station connections at `ws://<host>:<port>/ocpp/{stationId}` (or
//! `/ocpp/ws?station_id=…`), negotiates the OCPP subprotocol during the
//! handshake and hands the upgraded socket to [`run_connection`].

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{error, info, warn};

use crate::application::commands::SharedCommandManager;
use crate::application::events::SharedEventBus;
use crate::application::router::MessageProcessor;
use crate::config::WebSocketSettings;
use crate::support::shutdown::ShutdownSignal;

use super::connection::{run_connection, ConnectionTuning};
use super::negotiator::SubprotocolNegotiator;

pub struct OcppServer {
    settings: WebSocketSettings,
    negotiator: Arc<SubprotocolNegotiator>,
    processor: Arc<MessageProcessor>,
    commands: SharedCommandManager,
    events: SharedEventBus,
    shutdown: ShutdownSignal,
}

impl OcppServer {
    pub fn new(
        settings: WebSocketSettings,
        processor: Arc<MessageProcessor>,
        commands: SharedCommandManager,
        events: SharedEventBus,
        shutdown: ShutdownSignal,
    ) -> Self {
        let negotiator = Arc::new(SubprotocolNegotiator::new(settings.subprotocols.clone()));
        Self {
            settings,
            negotiator,
            processor,
            commands,
            events,
            shutdown,
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> std::io::Result<()> {
        let addr = self.settings.address();
        let listener = TcpListener::bind(&addr).await?;
        info!(
            "OCPP central system listening on ws://{}/ocpp/{{station_id}}",
            addr
        );
        self.run_on(listener).await
    }

    /// Serve on an already-bound listener (lets tests pick port 0).
    pub async fn run_on(&self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr),
                        Err(e) => error!(error = %e, "accept failed"),
                    }
                }
                _ = self.shutdown.wait() => {
                    info!("websocket listener shutting down");
                    return Ok(());
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let negotiator = self.negotiator.clone();
        let processor = self.processor.clone();
        let commands = self.commands.clone();
        let events = self.events.clone();
        let shutdown = self.shutdown.clone();
        let tuning = ConnectionTuning {
            ping_interval: self.settings.ping_interval(),
            read_deadline: self.settings.read_deadline(),
            write_timeout: self.settings.write_timeout(),
            outbound_buffer: self.settings.outbound_buffer,
        };
        let max_frame_bytes = self.settings.max_frame_bytes;

        tokio::spawn(async move {
            if let Err(e) = handle_connection(
                stream,
                addr,
                negotiator,
                processor,
                commands,
                events,
                tuning,
                max_frame_bytes,
                shutdown,
            )
            .await
            {
                warn!(remote_addr = %addr, error = %e, "connection setup failed");
            }
        });
    }
}

/// Pull the station id out of the upgrade request.
/// Accepted forms: `/ocpp/{stationId}` and `/ocpp/ws?station_id={id}`.
fn extract_station_id(path: &str, query: Option<&str>) -> Option<String> {
    let rest = path.strip_prefix("/ocpp")?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }
    let rest = rest.trim_matches('/');
    if rest.is_empty() || rest == "ws" {
        return query?
            .split('&')
            .find_map(|pair| pair.strip_prefix("station_id="))
            .filter(|id| !id.is_empty())
            .map(str::to_string);
    }
    if rest.contains('/') {
        return None;
    }
    Some(rest.to_string())
}

#[allow(clippy::too_many_arguments)]
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    negotiator: Arc<SubprotocolNegotiator>,
    processor: Arc<MessageProcessor>,
    commands: SharedCommandManager,
    events: SharedEventBus,
    tuning: ConnectionTuning,
    max_frame_bytes: usize,
    shutdown: ShutdownSignal,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let mut station_id: Option<String> = None;
    let mut subprotocol: Option<String> = None;

    let ws_config = WebSocketConfig {
        max_message_size: Some(max_frame_bytes),
        max_frame_size: Some(max_frame_bytes),
        ..Default::default()
    };

    let callback = |req: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        let path = req.uri().path();
        let query = req.uri().query();

        match extract_station_id(path, query) {
            Some(id) => station_id = Some(id),
            None => {
                warn!(remote_addr = %addr, path, "upgrade rejected, station id missing");
                let mut reject = ErrorResponse::new(Some("station_id is required".to_string()));
                *reject.status_mut() = StatusCode::BAD_REQUEST;
                return Err(reject);
            }
        }

        let requested = req
            .headers()
            .get("Sec-WebSocket-Protocol")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        match negotiator.negotiate(requested) {
            Some(protocol) => {
                if let Ok(value) = protocol.parse() {
                    response.headers_mut().insert("Sec-WebSocket-Protocol", value);
                    subprotocol = Some(protocol.to_string());
                }
            }
            None if !requested.is_empty() => {
                warn!(remote_addr = %addr, requested, "no mutual ocpp subprotocol");
            }
            None => {}
        }

        Ok(response)
    };

    let ws_stream =
        tokio_tungstenite::accept_hdr_async_with_config(stream, callback, Some(ws_config)).await?;

    // the callback ran by the time accept returns
    let Some(station_id) = station_id else {
        return Ok(());
    };
    info!(
        station_id = station_id.as_str(),
        remote_addr = %addr,
        subprotocol = subprotocol.as_deref().unwrap_or("none"),
        "websocket established"
    );

    run_connection(
        ws_stream,
        station_id,
        addr.to_string(),
        processor,
        commands,
        events,
        tuning,
        shutdown,
    )
    .await;

    Ok(())
}
