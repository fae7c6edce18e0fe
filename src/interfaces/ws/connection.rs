//! Per-station connection: outbound queue, read pump, write pump
//!
//! The connection owns its socket exclusively. Inbound frames run through
//! the [`MessageProcessor`] inline on the read pump; outbound frames
//! (handler replies and command CALLs) funnel through a bounded queue that
//! the write pump drains. The queue is the command manager's sink: pushes
//! are non-blocking, so the manager can write while holding its session
//! lock, and real socket I/O stays on the write pump.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::application::commands::{CommandSink, SharedCommandManager, SinkError};
use crate::application::events::{Event, SharedEventBus};
use crate::application::router::MessageProcessor;
use crate::support::shutdown::ShutdownSignal;

/// What a queued frame is, deciding who gets dropped under back-pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// CALLRESULT/CALLERROR answering a station CALL. Never dropped.
    Response,
    /// Server-initiated CALL. Droppable; the command manager's timeout
    /// path resends it.
    Call,
}

struct QueueState {
    frames: VecDeque<(FrameKind, String)>,
    closed: bool,
}

/// Bounded outbound frame buffer. On overflow the oldest CALL frame is
/// dropped; correlated responses always fit (the queue stretches for them).
pub struct OutboundQueue {
    inner: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(QueueState {
                frames: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
        })
    }

    pub fn push(&self, kind: FrameKind, frame: String) -> Result<(), SinkError> {
        {
            let mut state = self.inner.lock().unwrap();
            if state.closed {
                return Err(SinkError("connection closed".into()));
            }
            if state.frames.len() >= self.capacity {
                if let Some(pos) = state.frames.iter().position(|(k, _)| *k == FrameKind::Call) {
                    state.frames.remove(pos);
                    warn!("outbound buffer full, dropped oldest call frame");
                } else if kind == FrameKind::Call {
                    warn!("outbound buffer full of responses, dropping call frame");
                    return Ok(());
                }
            }
            state.frames.push_back((kind, frame));
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Next frame to write; `None` once closed and drained.
    pub async fn recv(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.inner.lock().unwrap();
                if let Some((_, frame)) = state.frames.pop_front() {
                    return Some(frame);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap().frames.len()
    }
}

/// The command manager's view of the connection.
pub struct ConnectionHandle {
    queue: Arc<OutboundQueue>,
}

impl ConnectionHandle {
    pub fn new(queue: Arc<OutboundQueue>) -> Self {
        Self { queue }
    }
}

impl CommandSink for ConnectionHandle {
    fn send_text(&self, frame: &str) -> Result<(), SinkError> {
        self.queue.push(FrameKind::Call, frame.to_string())
    }

    fn close(&self) {
        self.queue.close();
    }
}

/// Connection timing knobs, sliced out of the websocket config section.
#[derive(Debug, Clone)]
pub struct ConnectionTuning {
    pub ping_interval: Duration,
    pub read_deadline: Duration,
    pub write_timeout: Duration,
    pub outbound_buffer: usize,
}

/// Drive one accepted WebSocket until it closes. Returns after cleanup.
pub async fn run_connection(
    ws_stream: WebSocketStream<TcpStream>,
    station_id: String,
    remote_addr: String,
    processor: Arc<MessageProcessor>,
    commands: SharedCommandManager,
    events: SharedEventBus,
    tuning: ConnectionTuning,
    shutdown: ShutdownSignal,
) {
    let (ws_sender, mut ws_receiver) = ws_stream.split();

    let queue = OutboundQueue::new(tuning.outbound_buffer);
    let sink: Arc<dyn CommandSink> = Arc::new(ConnectionHandle::new(queue.clone()));
    commands.attach(&station_id, sink.clone());

    events.publish(Event::StationConnected {
        station_id: station_id.clone(),
        remote_addr: Some(remote_addr.clone()),
        timestamp: Utc::now(),
    });
    metrics::gauge!("ocpp_connected_stations").increment(1.0);
    info!(station_id = station_id.as_str(), remote_addr = remote_addr.as_str(), "station connected");

    let write_task = tokio::spawn(write_pump(
        ws_sender,
        queue.clone(),
        tuning.ping_interval,
        tuning.write_timeout,
        station_id.clone(),
    ));

    // read pump, inline. The idle deadline is extended by PONG frames only:
    // a station that keeps sending application traffic but stops answering
    // our pings is treated as half-dead and disconnected.
    let mut read_deadline = tokio::time::Instant::now() + tuning.read_deadline;
    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                info!(station_id = station_id.as_str(), "closing connection for shutdown");
                break;
            }
            _ = tokio::time::sleep_until(read_deadline) => {
                warn!(station_id = station_id.as_str(), "read deadline exceeded, closing");
                break;
            }
            next = ws_receiver.next() => {
                let msg = match next {
                    None => break,
                    Some(Err(e)) => {
                        info!(station_id = station_id.as_str(), error = %e, "connection read closed");
                        break;
                    }
                    Some(Ok(msg)) => msg,
                };

                match msg {
                    Message::Text(text) => {
                        if let Some(reply) = processor.process(&station_id, &text).await {
                            if queue.push(FrameKind::Response, reply).is_err() {
                                break;
                            }
                        }
                    }
                    Message::Ping(_) => debug!(station_id = station_id.as_str(), "ping received"),
                    Message::Pong(_) => {
                        read_deadline = tokio::time::Instant::now() + tuning.read_deadline;
                        debug!(station_id = station_id.as_str(), "pong received, deadline reset");
                    }
                    Message::Close(frame) => {
                        debug!(station_id = station_id.as_str(), ?frame, "close frame received");
                        break;
                    }
                    Message::Binary(data) => {
                        warn!(
                            station_id = station_id.as_str(),
                            bytes = data.len(),
                            "binary message ignored"
                        );
                    }
                    Message::Frame(_) => {}
                }
            }
        }
    }

    // cleanup: sever the command manager first so queued commands survive
    commands.detach(&station_id, &sink);
    queue.close();
    let _ = write_task.await;

    metrics::gauge!("ocpp_connected_stations").decrement(1.0);
    events.publish(Event::StationDisconnected {
        station_id: station_id.clone(),
        timestamp: Utc::now(),
    });
    info!(station_id = station_id.as_str(), "station disconnected");
}

async fn write_pump(
    mut ws_sender: SplitSink<WebSocketStream<TcpStream>, Message>,
    queue: Arc<OutboundQueue>,
    ping_interval: Duration,
    write_timeout: Duration,
    station_id: String,
) {
    let mut ping = tokio::time::interval(ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping.tick().await; // the first tick completes immediately

    loop {
        tokio::select! {
            maybe = queue.recv() => match maybe {
                Some(frame) => {
                    debug!(station_id = station_id.as_str(), frame = frame.as_str(), "-> frame");
                    match tokio::time::timeout(write_timeout, ws_sender.send(Message::Text(frame))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            warn!(station_id = station_id.as_str(), error = %e, "write failed");
                            break;
                        }
                        Err(_) => {
                            warn!(station_id = station_id.as_str(), "write timed out");
                            break;
                        }
                    }
                }
                None => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = ping.tick() => {
                match tokio::time::timeout(write_timeout, ws_sender.send(Message::Ping(Vec::new()))).await {
                    Ok(Ok(())) => debug!(station_id = station_id.as_str(), "ping sent"),
                    _ => {
                        warn!(station_id = station_id.as_str(), "ping write failed");
                        break;
                    }
                }
            }
        }
    }

    // unblock any producer still holding the sink
    queue.close();
}
