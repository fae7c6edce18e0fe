//! Stateful command record owned by the manager

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::task::AbortHandle;

use crate::domain::command::{CommandResult, CommandSnapshot, CommandStatus};

/// One-shot completion callback. Invoked exactly once, from a spawned task,
/// never under a session lock.
pub type CommandCallback = Box<dyn FnOnce(CommandResult) + Send + 'static>;

pub(super) struct Command {
    id: String,
    station_id: String,
    action: String,
    timeout: Duration,
    state: Mutex<CommandState>,
}

struct CommandState {
    payload: Value,
    status: CommandStatus,
    attempts: u32,
    max_attempts: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_error: Option<String>,
    last_message_id: Option<String>,
    last_response: Option<Value>,
    timer: Option<AbortHandle>,
    callback: Option<CommandCallback>,
}

impl Command {
    pub fn new(
        station_id: &str,
        action: &str,
        payload: Value,
        timeout: Duration,
        max_attempts: u32,
        callback: Option<CommandCallback>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            station_id: station_id.to_string(),
            action: action.to_string(),
            timeout,
            state: Mutex::new(CommandState {
                payload,
                status: CommandStatus::Queued,
                attempts: 0,
                max_attempts,
                created_at: now,
                updated_at: now,
                last_error: None,
                last_message_id: None,
                last_response: None,
                timer: None,
                callback,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn payload(&self) -> Value {
        self.state.lock().unwrap().payload.clone()
    }

    pub fn snapshot(&self) -> CommandSnapshot {
        let state = self.state.lock().unwrap();
        CommandSnapshot {
            id: self.id.clone(),
            station_id: self.station_id.clone(),
            action: self.action.clone(),
            status: state.status,
            attempts: state.attempts,
            max_attempts: state.max_attempts,
            last_message_id: state.last_message_id.clone(),
            last_error: state.last_error.clone(),
            created_at: state.created_at,
            updated_at: state.updated_at,
            payload: state.payload.clone(),
            last_response: state.last_response.clone(),
        }
    }

    pub fn attempts_info(&self) -> (u32, u32) {
        let state = self.state.lock().unwrap();
        (state.attempts, state.max_attempts)
    }

    /// Transition Queued → Pending after a successful write. This is the
    /// only place the attempts counter moves.
    pub fn mark_sent(&self, message_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.status = CommandStatus::Pending;
        state.last_message_id = Some(message_id.to_string());
        state.attempts += 1;
        state.updated_at = Utc::now();
    }

    /// Back to Queued for another delivery attempt. Correlation id and the
    /// stale response are cleared; attempts stay as they are.
    pub fn mark_retry(&self, reason: &str) {
        let mut state = self.state.lock().unwrap();
        state.status = CommandStatus::Queued;
        state.last_message_id = None;
        state.last_response = None;
        state.last_error = Some(reason.to_string());
        state.updated_at = Utc::now();
    }

    /// Enter a terminal state.
    pub fn complete(
        &self,
        status: CommandStatus,
        message_id: Option<&str>,
        response: Option<Value>,
        error: Option<String>,
    ) {
        let mut state = self.state.lock().unwrap();
        state.status = status;
        if let Some(mid) = message_id {
            state.last_message_id = Some(mid.to_string());
        }
        if response.is_some() {
            state.last_response = response;
        }
        state.last_error = error;
        state.updated_at = Utc::now();
    }

    pub fn set_timer(&self, handle: AbortHandle) {
        let mut state = self.state.lock().unwrap();
        if let Some(old) = state.timer.replace(handle) {
            old.abort();
        }
    }

    pub fn stop_timer(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }

    /// Take the callback out; a second call returns `None`, which is what
    /// makes exactly-once delivery structural.
    pub fn take_callback(&self) -> Option<CommandCallback> {
        self.state.lock().unwrap().callback.take()
    }

    pub fn is_expired(&self, now: DateTime<Utc>, retention: chrono::Duration) -> bool {
        let state = self.state.lock().unwrap();
        state.status.is_terminal() && state.updated_at + retention < now
    }

    /// Build the callback payload from the current state.
    pub fn result(&self, payload: Option<Value>) -> CommandResult {
        let state = self.state.lock().unwrap();
        CommandResult {
            command_id: self.id.clone(),
            station_id: self.station_id.clone(),
            action: self.action.clone(),
            message_id: state.last_message_id.clone(),
            status: state.status,
            attempts: state.attempts,
            payload,
            error: state.last_error.clone(),
            occurred_at: Utc::now(),
        }
    }
}
