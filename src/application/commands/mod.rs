//! Outbound command manager
//!
//! Delivers operator-issued CALLs to stations with per-station FIFO order,
//! strict one-in-flight correlation, bounded retry on timeout, and async
//! completion callbacks.
//!
//! ```text
//! operator API ──enqueue──► station queue ──flush──► socket
//!                                │                     │
//!                           pending map ◄──────── correlation id
//!                                │
//!                 CALLRESULT / CALLERROR / timer ──► terminal status + callback
//! ```
//!
//! Every queue/pending mutation for one station serializes under that
//! session's lock. Sink writes are non-blocking channel pushes, so holding
//! the lock across them is safe; real socket I/O happens in the write pump.

mod command;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::command::{CommandSnapshot, CommandStatus};
use crate::support::ocpp_frame::OcppFrame;

use command::Command;
pub use command::CommandCallback;

/// Transport the manager writes frames through. The production sink is a
/// connection's outbound queue handle; tests substitute a fake.
pub trait CommandSink: Send + Sync {
    fn send_text(&self, frame: &str) -> Result<(), SinkError>;
    fn close(&self);
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct SinkError(pub String);

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("station id is required")]
    MissingStationId,
    #[error("action is required")]
    MissingAction,
    #[error("payload must be a json object")]
    InvalidPayload,
}

/// Delivery tuning, see the `commands` config section.
#[derive(Debug, Clone)]
pub struct CommandConfig {
    /// Per-attempt CALLRESULT wait.
    pub timeout: Duration,
    /// Total send attempts before the command times out.
    pub max_attempts: u32,
    /// How long terminal commands stay queryable. Swept on enqueue, so the
    /// bound is deliberately inexact.
    pub retention: Duration,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_attempts: 3,
            retention: Duration::from_secs(900),
        }
    }
}

struct SessionInner {
    sink: Option<Arc<dyn CommandSink>>,
    queue: VecDeque<Arc<Command>>,
    pending: HashMap<String, Arc<Command>>,
}

/// Per-station delivery state. At most one command is ever pending.
struct StationSession {
    station_id: String,
    inner: Mutex<SessionInner>,
}

impl StationSession {
    fn new(station_id: &str) -> Self {
        Self {
            station_id: station_id.to_string(),
            inner: Mutex::new(SessionInner {
                sink: None,
                queue: VecDeque::new(),
                pending: HashMap::new(),
            }),
        }
    }

    fn take_pending(&self, message_id: &str) -> Option<Arc<Command>> {
        self.inner.lock().unwrap().pending.remove(message_id)
    }
}

pub struct CommandManager {
    sessions: DashMap<String, Arc<StationSession>>,
    commands: DashMap<String, Arc<Command>>,
    message_counter: AtomicU64,
    config: CommandConfig,
    /// Handle back to the owning `Arc`, for the spawned timeout tasks.
    self_ref: Weak<CommandManager>,
}

pub type SharedCommandManager = Arc<CommandManager>;

impl CommandManager {
    pub fn shared(config: CommandConfig) -> SharedCommandManager {
        Arc::new_cyclic(|weak| Self {
            sessions: DashMap::new(),
            commands: DashMap::new(),
            message_counter: AtomicU64::new(1),
            config,
            self_ref: weak.clone(),
        })
    }

    fn next_message_id(&self) -> String {
        let id = self.message_counter.fetch_add(1, Ordering::SeqCst);
        format!("CS-{}", id)
    }

    fn session(&self, station_id: &str) -> Option<Arc<StationSession>> {
        self.sessions.get(station_id).map(|s| s.clone())
    }

    fn get_or_create_session(&self, station_id: &str) -> Arc<StationSession> {
        self.sessions
            .entry(station_id.to_string())
            .or_insert_with(|| Arc::new(StationSession::new(station_id)))
            .clone()
    }

    /// Queue a CALL for delivery. Works whether or not the station is
    /// currently connected; disconnected stations keep the command queued
    /// until a socket attaches.
    pub fn enqueue(
        &self,
        station_id: &str,
        action: &str,
        payload: Value,
        callback: Option<CommandCallback>,
    ) -> Result<CommandSnapshot, CommandError> {
        let station_id = station_id.trim();
        let action = action.trim();
        if station_id.is_empty() {
            return Err(CommandError::MissingStationId);
        }
        if action.is_empty() {
            return Err(CommandError::MissingAction);
        }
        let payload = match payload {
            Value::Object(_) => payload,
            Value::Null => Value::Object(Default::default()),
            _ => return Err(CommandError::InvalidPayload),
        };

        self.prune_expired();

        let cmd = Arc::new(Command::new(
            station_id,
            action,
            payload,
            self.config.timeout,
            self.config.max_attempts,
            callback,
        ));
        self.commands.insert(cmd.id().to_string(), cmd.clone());

        let session = self.get_or_create_session(station_id);
        session.inner.lock().unwrap().queue.push_back(cmd.clone());

        info!(
            station_id,
            action,
            command_id = cmd.id(),
            "command queued"
        );
        metrics::counter!("ocpp_commands_enqueued_total", "action" => action.to_string())
            .increment(1);

        self.flush(&session);
        Ok(cmd.snapshot())
    }

    /// Adopt a new socket for the station. Any previous sink is closed and
    /// its in-flight commands return to the head of the queue with their
    /// correlation cleared; their attempts counter is untouched because no
    /// protocol-level timeout was observed.
    pub fn attach(&self, station_id: &str, sink: Arc<dyn CommandSink>) {
        let session = self.get_or_create_session(station_id);

        let old_sink = {
            let mut inner = session.inner.lock().unwrap();
            let old = inner.sink.take();
            self.reclaim_pending_locked(&mut inner, "connection replaced");
            inner.sink = Some(sink.clone());
            old
        };

        if let Some(old) = old_sink {
            if !Arc::ptr_eq(&old, &sink) {
                warn!(station_id, "replacing previously attached socket");
                old.close();
            }
        }

        debug!(station_id, "socket attached");
        self.flush(&session);
    }

    /// Sever a socket. Ignored when a newer socket has already attached, so
    /// a stale connection's cleanup cannot disturb its replacement.
    pub fn detach(&self, station_id: &str, sink: &Arc<dyn CommandSink>) {
        let Some(session) = self.session(station_id) else {
            return;
        };

        let mut inner = session.inner.lock().unwrap();
        let is_current = inner
            .sink
            .as_ref()
            .map(|s| Arc::ptr_eq(s, sink))
            .unwrap_or(false);
        if !is_current {
            return;
        }
        inner.sink = None;
        self.reclaim_pending_locked(&mut inner, "connection lost");
        drop(inner);

        debug!(station_id, "socket detached");
    }

    /// Move every pending command back to the head of the queue in its
    /// original send order. Caller holds the session lock.
    fn reclaim_pending_locked(&self, inner: &mut SessionInner, reason: &str) {
        if inner.pending.is_empty() {
            return;
        }
        let mut reclaimed: Vec<Arc<Command>> = inner.pending.drain().map(|(_, cmd)| cmd).collect();
        reclaimed.sort_by_key(|cmd| cmd.snapshot().updated_at);
        for cmd in reclaimed.into_iter().rev() {
            cmd.stop_timer();
            cmd.mark_retry(reason);
            inner.queue.push_front(cmd);
        }
    }

    /// Correlate a CALLRESULT to the station's pending command.
    /// Unmatched message ids are logged and dropped.
    pub fn handle_call_result(&self, station_id: &str, message_id: &str, payload: Value) {
        let Some(session) = self.session(station_id) else {
            warn!(station_id, message_id, "call result for unknown session");
            return;
        };
        let Some(cmd) = session.take_pending(message_id) else {
            warn!(station_id, message_id, "call result with no pending command");
            return;
        };
        cmd.stop_timer();

        let status_field = payload
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_string();
        let (final_status, error) = match status_field.to_ascii_lowercase().as_str() {
            // absent status counts as a plain acknowledgment
            "accepted" | "" => (CommandStatus::Accepted, None),
            "rejected" => (CommandStatus::Rejected, None),
            _ => (
                CommandStatus::Failed,
                Some(format!("unexpected status: {}", status_field)),
            ),
        };

        cmd.complete(final_status, Some(message_id), Some(payload.clone()), error);
        let snap = cmd.snapshot();
        info!(
            station_id,
            action = snap.action.as_str(),
            command_id = snap.id.as_str(),
            status = %final_status,
            attempts = snap.attempts,
            "command completed"
        );
        metrics::counter!("ocpp_commands_completed_total", "status" => final_status.to_string())
            .increment(1);

        self.deliver_callback(&cmd, Some(payload));
        self.flush(&session);
    }

    /// Correlate a CALLERROR; always terminal Failed.
    pub fn handle_call_error(
        &self,
        station_id: &str,
        message_id: &str,
        error_code: &str,
        description: &str,
        details: Value,
    ) {
        let Some(session) = self.session(station_id) else {
            warn!(station_id, message_id, "call error for unknown session");
            return;
        };
        let Some(cmd) = session.take_pending(message_id) else {
            warn!(station_id, message_id, "call error with no pending command");
            return;
        };
        cmd.stop_timer();

        let error = format!("{}: {}", error_code, description);
        cmd.complete(
            CommandStatus::Failed,
            Some(message_id),
            Some(details.clone()),
            Some(error.clone()),
        );
        warn!(
            station_id,
            command_id = cmd.id(),
            error = error.as_str(),
            "command failed"
        );
        metrics::counter!("ocpp_commands_completed_total", "status" => "failed").increment(1);

        self.deliver_callback(&cmd, Some(details));
        self.flush(&session);
    }

    /// Timer path: retry while attempts remain, otherwise terminal Timeout.
    fn handle_timeout(&self, station_id: &str, message_id: &str) {
        let Some(session) = self.session(station_id) else {
            return;
        };
        let Some(cmd) = session.take_pending(message_id) else {
            // the response won the race
            return;
        };
        cmd.stop_timer();

        let (attempts, max_attempts) = cmd.attempts_info();
        if attempts >= max_attempts {
            cmd.complete(
                CommandStatus::Timeout,
                Some(message_id),
                None,
                Some(format!("command timeout after {} attempts", attempts)),
            );
            warn!(
                station_id,
                command_id = cmd.id(),
                attempts,
                "command timed out"
            );
            metrics::counter!("ocpp_commands_completed_total", "status" => "timeout").increment(1);
            self.deliver_callback(&cmd, None);
            return;
        }

        cmd.mark_retry("timeout waiting for response");
        info!(
            station_id,
            command_id = cmd.id(),
            retry = attempts + 1,
            max_attempts,
            "command timeout, requeueing"
        );
        session.inner.lock().unwrap().queue.push_front(cmd);
        self.flush(&session);
    }

    pub fn snapshot(&self, command_id: &str) -> Option<CommandSnapshot> {
        self.commands.get(command_id).map(|cmd| cmd.snapshot())
    }

    /// Send queued commands while a sink is attached and nothing is in
    /// flight. The sink push is a non-blocking channel write, which lets the
    /// whole step run inside the session lock: a response can only be
    /// correlated after the pending entry and its timer exist.
    fn flush(&self, session: &Arc<StationSession>) {
        loop {
            let mut inner = session.inner.lock().unwrap();
            if !inner.pending.is_empty() || inner.queue.is_empty() {
                return;
            }
            let Some(sink) = inner.sink.clone() else {
                return;
            };
            let cmd = match inner.queue.pop_front() {
                Some(cmd) => cmd,
                None => return,
            };

            let message_id = self.next_message_id();
            let frame = OcppFrame::call(&message_id, cmd.action(), cmd.payload());

            match sink.send_text(&frame.encode()) {
                Ok(()) => {
                    cmd.mark_sent(&message_id);
                    inner.pending.insert(message_id.clone(), cmd.clone());

                    if let Some(manager) = self.self_ref.upgrade() {
                        let station_id = session.station_id.clone();
                        let mid = message_id.clone();
                        let timeout = cmd.timeout();
                        let handle = tokio::spawn(async move {
                            tokio::time::sleep(timeout).await;
                            manager.handle_timeout(&station_id, &mid);
                        });
                        cmd.set_timer(handle.abort_handle());
                    }
                    drop(inner);

                    let (attempts, _) = cmd.attempts_info();
                    debug!(
                        station_id = session.station_id.as_str(),
                        action = cmd.action(),
                        message_id = message_id.as_str(),
                        attempt = attempts,
                        "command sent"
                    );
                }
                Err(e) => {
                    cmd.stop_timer();
                    cmd.mark_retry(&format!("send failed: {}", e));
                    inner.queue.push_front(cmd);
                    inner.sink = None;
                    drop(inner);

                    warn!(
                        station_id = session.station_id.as_str(),
                        error = %e,
                        "send failed, detaching socket"
                    );
                    sink.close();
                    return;
                }
            }
        }
    }

    fn deliver_callback(&self, cmd: &Arc<Command>, payload: Option<Value>) {
        if let Some(callback) = cmd.take_callback() {
            let result = cmd.result(payload);
            tokio::spawn(async move {
                callback(result);
            });
        }
    }

    fn prune_expired(&self) {
        let now = Utc::now();
        let retention = match chrono::Duration::from_std(self.config.retention) {
            Ok(d) => d,
            Err(_) => return,
        };
        self.commands
            .retain(|_, cmd| !cmd.is_expired(now, retention));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    struct FakeSink {
        frames: StdMutex<Vec<String>>,
        fail_sends: StdMutex<bool>,
        closed: StdMutex<bool>,
    }

    impl FakeSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                frames: StdMutex::new(Vec::new()),
                fail_sends: StdMutex::new(false),
                closed: StdMutex::new(false),
            })
        }

        fn failing() -> Arc<Self> {
            let sink = Self::new();
            *sink.fail_sends.lock().unwrap() = true;
            sink
        }

        fn frames(&self) -> Vec<String> {
            self.frames.lock().unwrap().clone()
        }

        fn is_closed(&self) -> bool {
            *self.closed.lock().unwrap()
        }
    }

    impl CommandSink for FakeSink {
        fn send_text(&self, frame: &str) -> Result<(), SinkError> {
            if *self.fail_sends.lock().unwrap() {
                return Err(SinkError("boom".into()));
            }
            self.frames.lock().unwrap().push(frame.to_string());
            Ok(())
        }

        fn close(&self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    fn manager(timeout_ms: u64, max_attempts: u32) -> SharedCommandManager {
        CommandManager::shared(CommandConfig {
            timeout: Duration::from_millis(timeout_ms),
            max_attempts,
            retention: Duration::from_secs(900),
        })
    }

    fn message_id_of(frame: &str) -> String {
        let arr: Vec<Value> = serde_json::from_str(frame).unwrap();
        arr[1].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn enqueue_validates_inputs() {
        let mgr = manager(1_000, 3);
        assert!(matches!(
            mgr.enqueue("", "Reset", json!({}), None),
            Err(CommandError::MissingStationId)
        ));
        assert!(matches!(
            mgr.enqueue("st-1", "  ", json!({}), None),
            Err(CommandError::MissingAction)
        ));
        assert!(matches!(
            mgr.enqueue("st-1", "Reset", json!([1]), None),
            Err(CommandError::InvalidPayload)
        ));
    }

    #[tokio::test]
    async fn enqueue_without_socket_stays_queued() {
        let mgr = manager(1_000, 3);
        let snap = mgr
            .enqueue("st-1", "Reset", json!({"type": "Soft"}), None)
            .unwrap();
        assert_eq!(snap.status, CommandStatus::Queued);
        assert_eq!(snap.attempts, 0);
        assert_eq!(mgr.snapshot(&snap.id).unwrap().status, CommandStatus::Queued);
    }

    #[tokio::test]
    async fn attach_flushes_and_result_completes() {
        let mgr = manager(1_000, 3);
        let sink = FakeSink::new();
        let snap = mgr
            .enqueue("st-1", "RemoteStartTransaction", json!({"connectorId": 1}), None)
            .unwrap();

        mgr.attach("st-1", sink.clone());

        let frames = sink.frames();
        assert_eq!(frames.len(), 1);
        let mid = message_id_of(&frames[0]);

        let pending = mgr.snapshot(&snap.id).unwrap();
        assert_eq!(pending.status, CommandStatus::Pending);
        assert_eq!(pending.attempts, 1);
        assert_eq!(pending.last_message_id.as_deref(), Some(mid.as_str()));

        mgr.handle_call_result("st-1", &mid, json!({"status": "Accepted"}));
        let done = mgr.snapshot(&snap.id).unwrap();
        assert_eq!(done.status, CommandStatus::Accepted);
        assert_eq!(done.attempts, 1);
    }

    #[tokio::test]
    async fn call_result_without_status_counts_as_accepted() {
        let mgr = manager(1_000, 3);
        let sink = FakeSink::new();
        let snap = mgr.enqueue("st-1", "GetConfiguration", json!({}), None).unwrap();
        mgr.attach("st-1", sink.clone());
        let mid = message_id_of(&sink.frames()[0]);

        mgr.handle_call_result("st-1", &mid, json!({"configurationKey": []}));
        assert_eq!(mgr.snapshot(&snap.id).unwrap().status, CommandStatus::Accepted);
    }

    #[tokio::test]
    async fn unexpected_status_fails_command() {
        let mgr = manager(1_000, 3);
        let sink = FakeSink::new();
        let snap = mgr.enqueue("st-1", "Reset", json!({}), None).unwrap();
        mgr.attach("st-1", sink.clone());
        let mid = message_id_of(&sink.frames()[0]);

        mgr.handle_call_result("st-1", &mid, json!({"status": "Scheduled"}));
        let done = mgr.snapshot(&snap.id).unwrap();
        assert_eq!(done.status, CommandStatus::Failed);
        assert!(done.last_error.unwrap().contains("unexpected status"));
    }

    #[tokio::test]
    async fn call_error_fails_command() {
        let mgr = manager(1_000, 3);
        let sink = FakeSink::new();
        let snap = mgr.enqueue("st-1", "Reset", json!({}), None).unwrap();
        mgr.attach("st-1", sink.clone());
        let mid = message_id_of(&sink.frames()[0]);

        mgr.handle_call_error("st-1", &mid, "NotSupported", "nope", json!({}));
        let done = mgr.snapshot(&snap.id).unwrap();
        assert_eq!(done.status, CommandStatus::Failed);
        assert_eq!(done.last_error.as_deref(), Some("NotSupported: nope"));
    }

    #[tokio::test]
    async fn unknown_message_id_is_dropped() {
        let mgr = manager(1_000, 3);
        let sink = FakeSink::new();
        let snap = mgr.enqueue("st-1", "Reset", json!({}), None).unwrap();
        mgr.attach("st-1", sink.clone());

        mgr.handle_call_result("st-1", "no-such-id", json!({"status": "Accepted"}));
        assert_eq!(mgr.snapshot(&snap.id).unwrap().status, CommandStatus::Pending);
    }

    #[tokio::test]
    async fn send_failure_keeps_command_queued_and_closes_socket() {
        let mgr = manager(1_000, 1);
        let sink = FakeSink::failing();
        let snap = mgr
            .enqueue("st-9", "ChangeAvailability", json!({"evseId": 3}), None)
            .unwrap();

        mgr.attach("st-9", sink.clone());

        assert!(sink.is_closed());
        let after = mgr.snapshot(&snap.id).unwrap();
        assert_eq!(after.status, CommandStatus::Queued);
        assert_eq!(after.attempts, 0);
        assert!(after.last_error.unwrap().contains("send failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_retries_then_expires() {
        let mgr = manager(20, 2);
        let sink = FakeSink::new();
        let snap = mgr
            .enqueue("st-7", "RemoteStopTransaction", json!({"transactionId": "42"}), None)
            .unwrap();
        mgr.attach("st-7", sink.clone());
        assert_eq!(sink.frames().len(), 1);

        // first timeout fires, command is resent with a fresh correlation id
        tokio::time::sleep(Duration::from_millis(30)).await;
        let frames = sink.frames();
        assert_eq!(frames.len(), 2);
        assert_ne!(message_id_of(&frames[0]), message_id_of(&frames[1]));

        // second timeout exhausts attempts
        tokio::time::sleep(Duration::from_millis(30)).await;
        let done = mgr.snapshot(&snap.id).unwrap();
        assert_eq!(done.status, CommandStatus::Timeout);
        assert_eq!(done.attempts, 2);
        assert!(done
            .last_error
            .unwrap()
            .contains("command timeout after 2 attempts"));
    }

    #[tokio::test]
    async fn fifo_one_in_flight_across_commands() {
        let mgr = manager(1_000, 3);
        let sink = FakeSink::new();
        let a = mgr.enqueue("st-1", "Reset", json!({"seq": "a"}), None).unwrap();
        let b = mgr.enqueue("st-1", "Reset", json!({"seq": "b"}), None).unwrap();

        mgr.attach("st-1", sink.clone());
        // only A went out
        assert_eq!(sink.frames().len(), 1);
        assert_eq!(mgr.snapshot(&b.id).unwrap().status, CommandStatus::Queued);

        let mid_a = message_id_of(&sink.frames()[0]);
        mgr.handle_call_result("st-1", &mid_a, json!({"status": "Accepted"}));

        // B flushes only after A's result
        let frames = sink.frames();
        assert_eq!(frames.len(), 2);
        let arr: Vec<Value> = serde_json::from_str(&frames[1]).unwrap();
        assert_eq!(arr[3]["seq"], "b");
        assert_eq!(mgr.snapshot(&a.id).unwrap().status, CommandStatus::Accepted);
    }

    #[tokio::test]
    async fn reattach_resends_pending_before_queue() {
        let mgr = manager(60_000, 3);
        let first = FakeSink::new();
        let a = mgr.enqueue("st-1", "Reset", json!({"seq": "a"}), None).unwrap();
        let _b = mgr.enqueue("st-1", "Reset", json!({"seq": "b"}), None).unwrap();

        mgr.attach("st-1", first.clone());
        assert_eq!(first.frames().len(), 1);
        let first_mid = message_id_of(&first.frames()[0]);

        let first_dyn: Arc<dyn CommandSink> = first.clone();
        mgr.detach("st-1", &first_dyn);
        let after_detach = mgr.snapshot(&a.id).unwrap();
        assert_eq!(after_detach.status, CommandStatus::Queued);
        assert_eq!(after_detach.attempts, 1);

        let second = FakeSink::new();
        mgr.attach("st-1", second.clone());

        // A is retransmitted first with a fresh correlation id
        let frames = second.frames();
        assert_eq!(frames.len(), 1);
        let arr: Vec<Value> = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(arr[3]["seq"], "a");
        let second_mid = message_id_of(&frames[0]);
        assert_ne!(first_mid, second_mid);
        // attempts only moved because of the new send, not the reconnect
        assert_eq!(mgr.snapshot(&a.id).unwrap().attempts, 2);

        mgr.handle_call_result("st-1", &second_mid, json!({"status": "Accepted"}));
        let frames = second.frames();
        assert_eq!(frames.len(), 2);
        let arr: Vec<Value> = serde_json::from_str(&frames[1]).unwrap();
        assert_eq!(arr[3]["seq"], "b");
    }

    #[tokio::test]
    async fn stale_detach_is_ignored() {
        let mgr = manager(60_000, 3);
        let first = FakeSink::new();
        let second = FakeSink::new();
        mgr.enqueue("st-1", "Reset", json!({}), None).unwrap();

        mgr.attach("st-1", first.clone());
        mgr.attach("st-1", second.clone());
        assert!(first.is_closed());

        // the evicted socket's cleanup must not sever the new one
        let first_dyn: Arc<dyn CommandSink> = first;
        mgr.detach("st-1", &first_dyn);

        let mid = message_id_of(&second.frames().last().unwrap().clone());
        mgr.handle_call_result("st-1", &mid, json!({"status": "Accepted"}));

        // session still usable through the second sink
        mgr.enqueue("st-1", "Reset", json!({"again": true}), None).unwrap();
        assert!(second.frames().len() >= 2);
    }

    #[tokio::test]
    async fn callback_fires_exactly_once() {
        let mgr = manager(1_000, 3);
        let sink = FakeSink::new();
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let calls_clone = calls.clone();

        mgr.enqueue(
            "st-1",
            "Reset",
            json!({}),
            Some(Box::new(move |result| {
                calls_clone.lock().unwrap().push(result);
            })),
        )
        .unwrap();
        mgr.attach("st-1", sink.clone());
        let mid = message_id_of(&sink.frames()[0]);

        mgr.handle_call_result("st-1", &mid, json!({"status": "Rejected"}));
        // duplicate result for the same id is dropped before the callback path
        mgr.handle_call_result("st-1", &mid, json!({"status": "Accepted"}));

        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let recorded = calls.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].status, CommandStatus::Rejected);
        assert_eq!(recorded[0].attempts, 1);
    }
}
